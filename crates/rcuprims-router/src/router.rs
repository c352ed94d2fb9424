use std::collections::BTreeMap;
use std::ops::Range;

use tracing::{debug, warn};

use crate::error::{Result, RouterError};
use crate::handler::{CommandHandler, SharedChannel};
use crate::rcu::RcuMemoryHandler;
use crate::stream::{
    end_marker_version, is_end_marker, stream_words, CommandHeader, Group, PROTOCOL_VERSION,
};
use crate::tuning::BufferTuningHandler;

/// Configuration for stream routing.
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    /// Accept streams without end markers and with any marker version.
    pub relaxed: bool,
}

/// Outcome of one routed command.
#[derive(Debug)]
pub struct Reply {
    pub header: CommandHeader,
    pub result: Result<Vec<u32>>,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Reply words, empty for a failed command.
    pub fn words(&self) -> &[u32] {
        self.result.as_deref().unwrap_or(&[])
    }
}

/// Demultiplexes a command stream to per-group handlers.
///
/// A stream is framed completely before anything executes: unknown groups,
/// missing handlers, short payloads and end-marker problems reject the
/// whole stream. Once framed, each command runs in order and a failing
/// command does not stop the ones after it.
pub struct Router {
    handlers: BTreeMap<Group, Box<dyn CommandHandler>>,
    config: RouterConfig,
}

impl Router {
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            handlers: BTreeMap::new(),
            config,
        }
    }

    /// Router with the built-in RCU memory and buffer tuning handlers.
    pub fn for_channel(channel: SharedChannel, config: RouterConfig) -> Self {
        let mut router = Self::with_config(config);
        router.register(RcuMemoryHandler::new(SharedChannel::clone(&channel)));
        router.register(BufferTuningHandler::new(channel));
        router
    }

    /// Register `handler` for its group, returning any handler it replaces.
    pub fn register(
        &mut self,
        handler: impl CommandHandler + 'static,
    ) -> Option<Box<dyn CommandHandler>> {
        let group = handler.group();
        debug!(%group, "handler registered");
        self.handlers.insert(group, Box::new(handler))
    }

    /// Groups with a registered handler.
    pub fn groups(&self) -> Vec<Group> {
        self.handlers.keys().copied().collect()
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Route a little-endian byte stream.
    pub fn process(&mut self, bytes: &[u8]) -> Result<Vec<Reply>> {
        let words = stream_words(bytes)?;
        self.process_words(&words)
    }

    /// Route a stream of words.
    pub fn process_words(&mut self, words: &[u32]) -> Result<Vec<Reply>> {
        let commands = self.frame(words)?;
        let mut replies = Vec::with_capacity(commands.len());
        for (header, payload) in commands {
            let Some(handler) = self.handlers.get_mut(&header.group) else {
                return Err(RouterError::NoHandler(header.group));
            };
            let result = handler.handle(&header, &words[payload]);
            if let Err(err) = &result {
                warn!(%header, error = %err, "command failed");
            }
            replies.push(Reply { header, result });
        }
        Ok(replies)
    }

    /// Split `words` into commands and their payload ranges.
    fn frame(&self, words: &[u32]) -> Result<Vec<(CommandHeader, Range<usize>)>> {
        let mut commands = Vec::new();
        let mut offset = 0usize;
        let mut terminated = true;

        while offset < words.len() {
            let word = words[offset];
            if is_end_marker(word) {
                let version = end_marker_version(word);
                if version != PROTOCOL_VERSION && !self.config.relaxed {
                    return Err(RouterError::VersionMismatch {
                        found: version,
                        expected: PROTOCOL_VERSION,
                    });
                }
                offset += 1;
                terminated = true;
                continue;
            }

            let header =
                CommandHeader::decode(word).ok_or(RouterError::UnknownGroup { offset, word })?;
            let handler = self
                .handlers
                .get(&header.group)
                .ok_or(RouterError::NoHandler(header.group))?;
            let needed = handler.payload_words(&header)?;
            let start = offset + 1;
            let available = words.len() - start;
            if needed > available {
                return Err(RouterError::Truncated {
                    offset,
                    needed,
                    available,
                });
            }
            commands.push((header, start..start + needed));
            offset = start + needed;
            terminated = false;
        }

        if !terminated && !self.config.relaxed {
            return Err(RouterError::MissingEndMarker { offset });
        }
        Ok(commands)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

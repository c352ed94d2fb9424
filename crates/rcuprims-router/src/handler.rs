use std::sync::{Arc, Mutex, MutexGuard};

use rcuprims_msgbuf::Channel;

use crate::error::{Result, RouterError};
use crate::stream::{CommandHeader, Group};

/// A channel shared between handlers.
pub type SharedChannel = Arc<Mutex<Channel>>;

/// Wrap a channel for sharing between handlers.
pub fn share(channel: Channel) -> SharedChannel {
    Arc::new(Mutex::new(channel))
}

pub(crate) fn lock_channel(channel: &Mutex<Channel>) -> MutexGuard<'_, Channel> {
    channel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Executes the commands of one group.
///
/// The router first asks for the payload length so that a failing command
/// can be skipped without losing the rest of the stream.
pub trait CommandHandler: Send {
    /// Group this handler serves.
    fn group(&self) -> Group;

    /// Payload words following `header`.
    fn payload_words(&self, header: &CommandHeader) -> Result<usize>;

    /// Execute one command and return its reply words.
    fn handle(&mut self, header: &CommandHeader, payload: &[u32]) -> Result<Vec<u32>>;
}

pub(crate) fn unknown(header: &CommandHeader) -> RouterError {
    RouterError::UnknownCommand {
        group: header.group,
        id: header.id,
    }
}

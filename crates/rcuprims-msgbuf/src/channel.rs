use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rcuprims_frame::{select_format, FormatVersion, HeaderFormat};
use rcuprims_transport::{open_backend, Backend};
use tracing::{debug, info, warn};

use crate::buffers::{BufferLayout, Buffers};
use crate::config::{ChannelConfig, OptionFlags};
use crate::error::{MsgBufError, Result};
use crate::flash::FlashAccess;
use crate::poll::{Clock, SystemClock};

/// An open message-buffer channel.
///
/// Owns the backend, the host-side buffer mirror and every piece of protocol
/// state: header format, flash strategy, option flags and ownership token.
/// At most one dispatch is in flight because every operation takes
/// `&mut self`; share across threads behind a `Mutex`.
pub struct Channel {
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) format: &'static HeaderFormat,
    pub(crate) buffers: Buffers,
    pub(crate) config: ChannelConfig,
    pub(crate) owner: u32,
    firmware_version: u32,
    driver_version: u32,
    flash_access: FlashAccess,
}

/// Snapshot of a channel's negotiated parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub backend: &'static str,
    pub firmware_version: u32,
    pub driver_version: u32,
    pub format: FormatVersion,
    pub layout: BufferLayout,
    pub flash_access: FlashAccess,
    pub flags: OptionFlags,
    pub timeout: Duration,
    pub owner: u32,
    pub degraded: bool,
}

impl Channel {
    /// Open a channel by backend name with the default configuration.
    pub fn open(name: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(name, ChannelConfig::default())
    }

    /// Open a channel by backend name.
    ///
    /// Names under `/dev/` open the device; anything else opens a plain file
    /// sized from `config.file_backend`.
    pub fn open_with_config(name: impl AsRef<Path>, config: ChannelConfig) -> Result<Self> {
        let backend = open_backend(name, config.file_backend)?;
        Self::from_backend(backend, config)
    }

    /// Open a channel over an already-constructed backend.
    pub fn from_backend(backend: Box<dyn Backend>, config: ChannelConfig) -> Result<Self> {
        Self::from_backend_with_clock(backend, config, Arc::new(SystemClock::new()))
    }

    /// Open a channel with an explicit time source for polling.
    pub fn from_backend_with_clock(
        mut backend: Box<dyn Backend>,
        config: ChannelConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let layout = BufferLayout::from_sizes(
            backend.command_buffer_size()?,
            backend.result_buffer_size()?,
            backend.register_file_size()?,
        );
        let firmware_version = backend.firmware_version()?;
        let driver_version = backend.driver_version()?;
        let format = select_format(firmware_version);

        let flash_access = match config.flash_access {
            Some(FlashAccess::MessageBuffer) if !format.supports_mode_bit() => {
                return Err(MsgBufError::InvalidParameter(format!(
                    "flash access through the message buffer needs header format v2.2, \
                     firmware {} uses {}",
                    version_string(firmware_version),
                    format.version
                )));
            }
            Some(access) => access,
            None => FlashAccess::for_format(format),
        };

        if let Some(level) = config.debug_level {
            backend.set_debug_level(level)?;
        }

        let buffers = Buffers::allocate(layout);
        info!(
            backend = backend.backend_name(),
            firmware = %version_string(firmware_version),
            format = %format.version,
            command_words = layout.command_in.words(),
            result_words = layout.result_out.words(),
            register_bytes = layout.register_file.size,
            %flash_access,
            "message buffer channel opened"
        );

        Ok(Self {
            backend,
            clock,
            format,
            buffers,
            config,
            owner: 0,
            firmware_version,
            driver_version,
            flash_access,
        })
    }

    /// Close the channel, releasing any seize still held.
    pub fn close(mut self) -> Result<()> {
        if self.owner != 0 {
            let token = self.owner;
            let released = self.release(token);
            // Drop must not retry a release that already failed here.
            self.owner = 0;
            released?;
        }
        info!(backend = self.backend.backend_name(), "message buffer channel closed");
        Ok(())
    }

    pub fn format(&self) -> &'static HeaderFormat {
        self.format
    }

    pub fn layout(&self) -> &BufferLayout {
        self.buffers.layout()
    }

    pub fn firmware_version(&self) -> u32 {
        self.firmware_version
    }

    pub fn driver_version(&self) -> u32 {
        self.driver_version
    }

    pub fn flash_access(&self) -> FlashAccess {
        self.flash_access
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn flags(&self) -> OptionFlags {
        self.config.flags
    }

    /// Set option flags in `set`, then clear those in `clear`.
    pub fn update_flags(&mut self, set: OptionFlags, clear: OptionFlags) {
        self.config.flags.insert(set);
        self.config.flags.remove(clear);
        debug!(flags = ?self.config.flags, "option flags updated");
    }

    /// Default completion timeout for dispatches given a zero timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    /// Current ownership token, 0 when not seized.
    pub fn owner(&self) -> u32 {
        self.owner
    }

    /// Whether any region was below its protocol minimum at open.
    pub fn is_degraded(&self) -> bool {
        self.buffers.is_degraded()
    }

    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            backend: self.backend.backend_name(),
            firmware_version: self.firmware_version,
            driver_version: self.driver_version,
            format: self.format.version,
            layout: *self.buffers.layout(),
            flash_access: self.flash_access,
            flags: self.config.flags,
            timeout: self.config.timeout,
            owner: self.owner,
            degraded: self.buffers.is_degraded(),
        }
    }

    /// Whether packed sub-word transfers are in effect.
    pub(crate) fn compression_active(&self) -> bool {
        self.config.flags.contains(OptionFlags::COMPRESSION) && self.format.supports_data_format()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if self.owner != 0 {
            if let Err(err) = self.backend.release(self.owner) {
                warn!(error = %err, "failed to release seize on drop");
            }
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("backend", &self.backend.backend_name())
            .field("format", &self.format.version)
            .field("layout", self.buffers.layout())
            .field("flash_access", &self.flash_access)
            .field("flags", &self.config.flags)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Render a version word as `major.minor.patch`.
pub fn version_string(word: u32) -> String {
    format!(
        "{}.{}.{}",
        (word >> 16) & 0xff,
        (word >> 8) & 0xff,
        word & 0xff
    )
}

use std::time::Duration;

use bitflags::bitflags;
use rcuprims_transport::BackendConfig;

use crate::flash::FlashAccess;

/// Default completion timeout for one dispatch.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default sleep between control register polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(20);

/// Default completion timeout for flash erase commands.
pub const DEFAULT_ERASE_TIMEOUT: Duration = Duration::from_secs(20);

/// Default ceiling on legacy flash controller status polls.
pub const DEFAULT_FLASH_WAIT_STATES: u32 = 0x4000;

bitflags! {
    /// Channel option flags, settable at runtime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OptionFlags: u32 {
        /// Read back every command before executing it.
        const VERIFY = 0x0001;
        /// Log verification mismatches instead of failing.
        const IGNORE_VERIFY_ERRORS = 0x0002;
        /// Pack sub-word elements when the header format allows it.
        const COMPRESSION = 0x0004;
    }
}

/// Configuration for a message-buffer channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Option flags in effect at open.
    pub flags: OptionFlags,
    /// Completion timeout used when a dispatch is given a zero timeout.
    pub timeout: Duration,
    /// Completion timeout for flash erase commands.
    pub erase_timeout: Duration,
    /// Sleep between polls of the control and flash status registers.
    pub poll_interval: Duration,
    /// Force a flash access strategy instead of deriving it from firmware.
    pub flash_access: Option<FlashAccess>,
    /// Ceiling on legacy flash controller status polls.
    pub flash_wait_states: u32,
    /// Driver debug level applied at open.
    pub debug_level: Option<u32>,
    /// Sizes used when the channel opens a plain file.
    pub file_backend: BackendConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            flags: OptionFlags::empty(),
            timeout: DEFAULT_TIMEOUT,
            erase_timeout: DEFAULT_ERASE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            flash_access: None,
            flash_wait_states: DEFAULT_FLASH_WAIT_STATES,
            debug_level: None,
            file_backend: BackendConfig::default(),
        }
    }
}

impl ChannelConfig {
    pub fn with_flags(mut self, flags: OptionFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_flash_access(mut self, access: FlashAccess) -> Self {
        self.flash_access = Some(access);
        self
    }

    /// Timeout for a dispatch: `requested`, or the configured default when
    /// `requested` is zero.
    pub fn effective_timeout(&self, requested: Duration) -> Duration {
        if requested.is_zero() {
            self.timeout
        } else {
            requested
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.poll_interval, Duration::from_micros(20));
        assert_eq!(config.flash_wait_states, 0x4000);
        assert!(config.flags.is_empty());
    }

    #[test]
    fn zero_timeout_uses_default() {
        let config = ChannelConfig::default().with_timeout(Duration::from_millis(50));
        assert_eq!(
            config.effective_timeout(Duration::ZERO),
            Duration::from_millis(50)
        );
        assert_eq!(
            config.effective_timeout(Duration::from_secs(1)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn flags_from_bits() {
        let flags = OptionFlags::from_bits_truncate(0x0005);
        assert!(flags.contains(OptionFlags::VERIFY | OptionFlags::COMPRESSION));
        assert!(!flags.contains(OptionFlags::IGNORE_VERIFY_ERRORS));
        assert_eq!(OptionFlags::from_bits_truncate(0xff00), OptionFlags::empty());
    }
}

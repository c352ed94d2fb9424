use std::time::Duration;

use rcuprims_msgbuf::{FlashAccess, OptionFlags};
use tracing::debug;

use crate::error::Result;
use crate::handler::{lock_channel, unknown, CommandHandler, SharedChannel};
use crate::stream::{CommandHeader, Group};

/// Command ids of the buffer tuning group.
pub mod id {
    /// param = flag bits to set
    pub const SET_FLAGS: u8 = 0x1;
    /// param = flag bits to clear
    pub const CLEAR_FLAGS: u8 = 0x2;
    /// param = driver debug level
    pub const SET_DEBUG_LEVEL: u8 = 0x3;
    /// payload `[timeout in microseconds]`
    pub const SET_TIMEOUT: u8 = 0x4;
    /// reply: firmware, driver, command words, result words, register bytes,
    /// flags, flash access, format version
    pub const INFO: u8 = 0x5;
    /// reply `[token]`
    pub const SEIZE: u8 = 0x6;
    /// payload `[token]`
    pub const RELEASE: u8 = 0x7;
}

/// Channel option, timeout and ownership commands.
pub struct BufferTuningHandler {
    channel: SharedChannel,
}

impl BufferTuningHandler {
    pub fn new(channel: SharedChannel) -> Self {
        Self { channel }
    }
}

impl CommandHandler for BufferTuningHandler {
    fn group(&self) -> Group {
        Group::BufferTuning
    }

    fn payload_words(&self, header: &CommandHeader) -> Result<usize> {
        match header.id {
            id::SET_TIMEOUT | id::RELEASE => Ok(1),
            id::SET_FLAGS | id::CLEAR_FLAGS | id::SET_DEBUG_LEVEL | id::INFO | id::SEIZE => Ok(0),
            _ => Err(unknown(header)),
        }
    }

    fn handle(&mut self, header: &CommandHeader, payload: &[u32]) -> Result<Vec<u32>> {
        let mut channel = lock_channel(&self.channel);
        debug!(%header, "buffer tuning command");
        let reply = match header.id {
            id::SET_FLAGS => {
                let flags = OptionFlags::from_bits_truncate(u32::from(header.param));
                channel.update_flags(flags, OptionFlags::empty());
                vec![]
            }
            id::CLEAR_FLAGS => {
                let flags = OptionFlags::from_bits_truncate(u32::from(header.param));
                channel.update_flags(OptionFlags::empty(), flags);
                vec![]
            }
            id::SET_DEBUG_LEVEL => {
                channel.set_debug_level(u32::from(header.param))?;
                vec![]
            }
            id::SET_TIMEOUT => {
                channel.set_timeout(Duration::from_micros(u64::from(payload[0])));
                vec![]
            }
            id::INFO => {
                let info = channel.info();
                vec![
                    info.firmware_version,
                    info.driver_version,
                    info.layout.command_in.words() as u32,
                    info.layout.result_out.words() as u32,
                    info.layout.register_file.size as u32,
                    info.flags.bits(),
                    match info.flash_access {
                        FlashAccess::MessageBuffer => 0,
                        FlashAccess::LegacyBus => 1,
                    },
                    info.format as u32,
                ]
            }
            id::SEIZE => vec![channel.seize()?],
            id::RELEASE => {
                channel.release(payload[0])?;
                vec![]
            }
            _ => return Err(unknown(header)),
        };
        Ok(reply)
    }
}

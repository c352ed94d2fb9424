use rcuprims_msgbuf::{ElementLayout, FlashErase, Mode};
use tracing::debug;

use crate::error::{Result, RouterError};
use crate::handler::{lock_channel, unknown, CommandHandler, SharedChannel};
use crate::stream::{CommandHeader, Group};

/// Command ids of the RCU memory group.
pub mod id {
    /// payload `[addr]`, reply `[value]`
    pub const SINGLE_READ: u8 = 0x1;
    /// payload `[addr, value]`
    pub const SINGLE_WRITE: u8 = 0x2;
    /// sub = element size, param = count; payload `[addr]`, reply values
    pub const MULTI_READ: u8 = 0x3;
    /// sub = element size, param = count; payload `[addr, values..]`
    pub const MULTI_WRITE: u8 = 0x4;
    /// param = count; payload addresses, reply values
    pub const RANDOM_READ: u8 = 0x5;
    /// param = count; payload address/value pairs
    pub const RANDOM_WRITE: u8 = 0x6;
    /// param = count; payload `[addr]`, reply 16-bit words
    pub const FLASH_READ: u8 = 0x7;
    /// param = count; payload `[addr, words..]`
    pub const FLASH_WRITE: u8 = 0x8;
    /// sub 0 all, 1 sector `[sector]`, 2 sectors `[first, count]`
    pub const FLASH_ERASE: u8 = 0x9;
    /// reply `[manufacturer, device]`
    pub const FLASH_ID: u8 = 0xa;
    pub const FLASH_RESET: u8 = 0xb;
    /// param = mode code
    pub const SET_MODE: u8 = 0xc;
    /// reply `[mode code]`
    pub const GET_MODE: u8 = 0xd;
}

/// Mode codes used by [`id::SET_MODE`] and [`id::GET_MODE`].
pub fn mode_code(mode: Mode) -> u32 {
    match mode {
        Mode::MessageBuffer => 0,
        Mode::Flash => 1,
        Mode::SelectMap => 2,
    }
}

fn mode_from_code(code: u16) -> Result<Mode> {
    match code {
        0 => Ok(Mode::MessageBuffer),
        1 => Ok(Mode::Flash),
        2 => Ok(Mode::SelectMap),
        other => Err(RouterError::InvalidArgument(format!("mode code {other}"))),
    }
}

/// RCU memory, flash and mode commands over a shared channel.
pub struct RcuMemoryHandler {
    channel: SharedChannel,
}

impl RcuMemoryHandler {
    pub fn new(channel: SharedChannel) -> Self {
        Self { channel }
    }
}

impl CommandHandler for RcuMemoryHandler {
    fn group(&self) -> Group {
        Group::RcuMemory
    }

    fn payload_words(&self, header: &CommandHeader) -> Result<usize> {
        let count = usize::from(header.param);
        let words = match header.id {
            id::SINGLE_READ => 1,
            id::SINGLE_WRITE => 2,
            id::MULTI_READ | id::FLASH_READ => 1,
            id::MULTI_WRITE | id::FLASH_WRITE => 1 + count,
            id::RANDOM_READ => count,
            id::RANDOM_WRITE => 2 * count,
            id::FLASH_ERASE => match header.sub {
                0 => 0,
                1 => 1,
                2 => 2,
                other => {
                    return Err(RouterError::InvalidArgument(format!(
                        "flash erase kind {other}"
                    )))
                }
            },
            id::FLASH_ID | id::FLASH_RESET | id::SET_MODE | id::GET_MODE => 0,
            _ => return Err(unknown(header)),
        };
        Ok(words)
    }

    fn handle(&mut self, header: &CommandHeader, payload: &[u32]) -> Result<Vec<u32>> {
        let mut channel = lock_channel(&self.channel);
        let count = usize::from(header.param);
        debug!(%header, "rcu memory command");
        let reply = match header.id {
            id::SINGLE_READ => vec![channel.single_read(payload[0])?],
            id::SINGLE_WRITE => {
                channel.single_write(payload[0], payload[1])?;
                vec![]
            }
            id::MULTI_READ => {
                let layout = ElementLayout::from_signed(header.element_size())?;
                channel.multiple_read(payload[0], count, layout)?
            }
            id::MULTI_WRITE => {
                let layout = ElementLayout::from_signed(header.element_size())?;
                channel.multiple_write(payload[0], &payload[1..], layout)?;
                vec![]
            }
            id::RANDOM_READ => channel.random_read(payload)?,
            id::RANDOM_WRITE => {
                let pairs: Vec<(u32, u32)> = payload
                    .chunks_exact(2)
                    .map(|pair| (pair[0], pair[1]))
                    .collect();
                channel.random_write(&pairs)?;
                vec![]
            }
            id::FLASH_READ => channel
                .flash_read(payload[0], count)?
                .into_iter()
                .map(u32::from)
                .collect(),
            id::FLASH_WRITE => {
                let data: Vec<u16> = payload[1..].iter().map(|word| *word as u16).collect();
                channel.flash_write(payload[0], &data)?;
                vec![]
            }
            id::FLASH_ERASE => {
                let erase = match payload {
                    [] => FlashErase::All,
                    [sector] => FlashErase::Sector(*sector),
                    [first, count, ..] => FlashErase::Sectors {
                        first: *first,
                        count: *count,
                    },
                };
                channel.flash_erase(erase)?;
                vec![]
            }
            id::FLASH_ID => {
                let id = channel.flash_identify()?;
                vec![u32::from(id.manufacturer), u32::from(id.device)]
            }
            id::FLASH_RESET => {
                channel.flash_reset()?;
                vec![]
            }
            id::SET_MODE => {
                channel.set_mode(mode_from_code(header.param)?)?;
                vec![]
            }
            id::GET_MODE => vec![mode_code(channel.mode()?)],
            _ => return Err(unknown(header)),
        };
        Ok(reply)
    }
}

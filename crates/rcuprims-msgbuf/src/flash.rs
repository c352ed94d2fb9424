//! Configuration flash access.
//!
//! Two strategies exist. Firmware with the v2.2 header format accepts flash
//! commands through the message buffer, marked by the header mode bit. Older
//! firmware exposes a small flash controller in the register file that is
//! driven one word at a time. Either way the channel is put in flash mode for
//! the duration of the operation and returned to message-buffer mode after.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rcuprims_frame::command::{flash, MULTI_READ, MULTI_WRITE};
use rcuprims_frame::{Header, HeaderFormat, MODE_FLASH};
use tracing::{debug, error, warn};

use crate::channel::Channel;
use crate::error::{MsgBufError, Result};
use crate::mode::Mode;
use crate::ops::{advance, MULTI_OVERHEAD_WORDS};
use crate::pack::chunk_sizes;
use crate::poll::{PollLimit, PollOutcome, Poller};
use crate::registers::{
    flash_cmd, FLASH_ADDRESS, FLASH_COMMAND, FLASH_DATA, FLASH_STATUS, FLASH_STATUS_IDLE,
    FLASH_STATUS_MASK, LEGACY_FLASH_REGISTERS,
};

/// Highest address the legacy controller's 24-bit address register holds.
const LEGACY_MAX_ADDRESS: u32 = 0x00ff_ffff;

/// How flash commands reach the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashAccess {
    /// Message-buffer commands with the flash mode bit set.
    MessageBuffer,
    /// Register sequences against the legacy flash controller.
    LegacyBus,
}

impl FlashAccess {
    /// Strategy supported by a header format.
    pub fn for_format(format: &HeaderFormat) -> Self {
        if format.supports_mode_bit() {
            FlashAccess::MessageBuffer
        } else {
            FlashAccess::LegacyBus
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlashAccess::MessageBuffer => "message-buffer",
            FlashAccess::LegacyBus => "legacy-bus",
        }
    }
}

impl fmt::Display for FlashAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FlashAccess {
    type Err = MsgBufError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "message-buffer" | "msgbuf" => Ok(FlashAccess::MessageBuffer),
            "legacy-bus" | "legacy" => Ok(FlashAccess::LegacyBus),
            other => Err(MsgBufError::InvalidParameter(format!(
                "unknown flash access '{other}'"
            ))),
        }
    }
}

/// What to erase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashErase {
    All,
    Sector(u32),
    /// `count` consecutive sectors starting at `first`.
    Sectors { first: u32, count: u32 },
}

/// Identification words reported by the flash device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashId {
    pub manufacturer: u16,
    pub device: u16,
}

impl Channel {
    /// Read `count` 16-bit flash words starting at `addr`.
    pub fn flash_read(&mut self, addr: u32, count: usize) -> Result<Vec<u16>> {
        self.with_flash_mode(|channel| match channel.flash_access() {
            FlashAccess::MessageBuffer => channel.flash_read_msgbuf(addr, count),
            FlashAccess::LegacyBus => (0..count)
                .map(|i| {
                    let addr = advance(addr, i)?;
                    channel.legacy_command(flash_cmd::READ, addr, None)
                })
                .collect(),
        })
    }

    /// Write 16-bit flash words starting at `addr`.
    pub fn flash_write(&mut self, addr: u32, data: &[u16]) -> Result<()> {
        self.with_flash_mode(|channel| match channel.flash_access() {
            FlashAccess::MessageBuffer => channel.flash_write_msgbuf(addr, data),
            FlashAccess::LegacyBus => {
                for (i, value) in data.iter().enumerate() {
                    let addr = advance(addr, i)?;
                    channel.legacy_command(flash_cmd::WRITE, addr, Some(*value))?;
                }
                Ok(())
            }
        })
    }

    pub fn flash_erase(&mut self, erase: FlashErase) -> Result<()> {
        self.with_flash_mode(|channel| match channel.flash_access() {
            FlashAccess::MessageBuffer => {
                let (command, payload) = match erase {
                    FlashErase::All => (flash::ERASE_ALL, vec![]),
                    FlashErase::Sector(sector) => (flash::ERASE_SECTOR, vec![sector]),
                    FlashErase::Sectors { first, count } => {
                        (flash::MULTI_ERASE, vec![first, count])
                    }
                };
                let timeout = channel.config.erase_timeout;
                channel.execute(Header::new(command).with_mode(MODE_FLASH), payload, timeout)?;
                Ok(())
            }
            FlashAccess::LegacyBus => match erase {
                FlashErase::All => channel
                    .legacy_command(flash_cmd::ERASE_ALL, 0, None)
                    .map(drop),
                FlashErase::Sector(sector) => channel
                    .legacy_command(flash_cmd::ERASE_SECTOR, sector, None)
                    .map(drop),
                FlashErase::Sectors { first, count } => {
                    for i in 0..count {
                        let sector = advance(first, i as usize)?;
                        channel.legacy_command(flash_cmd::ERASE_SECTOR, sector, None)?;
                    }
                    Ok(())
                }
            },
        })
    }

    pub fn flash_identify(&mut self) -> Result<FlashId> {
        self.with_flash_mode(|channel| match channel.flash_access() {
            FlashAccess::MessageBuffer => {
                let header = Header::new(flash::READ_ID).with_mode(MODE_FLASH);
                let payload = channel.execute(header, vec![], Duration::ZERO)?;
                match payload.as_slice() {
                    [manufacturer, device, ..] => Ok(FlashId {
                        manufacturer: *manufacturer as u16,
                        device: *device as u16,
                    }),
                    _ => Err(MsgBufError::UnexpectedPayload {
                        expected: 2,
                        got: payload.len(),
                    }),
                }
            }
            FlashAccess::LegacyBus => Ok(FlashId {
                manufacturer: channel.legacy_command(flash_cmd::READ_ID, 0, None)?,
                device: channel.legacy_command(flash_cmd::READ_ID, 1, None)?,
            }),
        })
    }

    pub fn flash_reset(&mut self) -> Result<()> {
        self.with_flash_mode(|channel| match channel.flash_access() {
            FlashAccess::MessageBuffer => {
                let header = Header::new(flash::RESET).with_mode(MODE_FLASH);
                channel.execute(header, vec![], Duration::ZERO).map(drop)
            }
            FlashAccess::LegacyBus => channel
                .legacy_command(flash_cmd::RESET, 0, None)
                .map(drop),
        })
    }

    /// Run `op` in flash mode, returning to message-buffer mode afterwards
    /// whether or not `op` succeeded.
    fn with_flash_mode<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.set_mode(Mode::Flash)?;
        let result = op(self);
        let restored = self.set_mode(Mode::MessageBuffer);
        match (result, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(restore)) => {
                warn!(error = %restore, "failed to leave flash mode after error");
                Err(err)
            }
        }
    }

    fn flash_read_msgbuf(&mut self, addr: u32, count: usize) -> Result<Vec<u16>> {
        let max = self.read_capacity()?;
        let mut values = Vec::with_capacity(count);
        let mut done = 0usize;
        for chunk in chunk_sizes(count, max) {
            let start = advance(addr, done)?;
            let header = Header::new(MULTI_READ).with_mode(MODE_FLASH);
            let payload = self.execute(header, vec![start, chunk as u32], Duration::ZERO)?;
            if payload.len() < chunk {
                return Err(MsgBufError::UnexpectedPayload {
                    expected: chunk,
                    got: payload.len(),
                });
            }
            values.extend(payload[..chunk].iter().map(|word| *word as u16));
            done += chunk;
        }
        Ok(values)
    }

    fn flash_write_msgbuf(&mut self, addr: u32, data: &[u16]) -> Result<()> {
        let max = self.write_capacity(MULTI_OVERHEAD_WORDS)?;
        let mut done = 0usize;
        for chunk in chunk_sizes(data.len(), max) {
            let start = advance(addr, done)?;
            let mut payload = vec![start, chunk as u32];
            payload.extend(data[done..done + chunk].iter().map(|v| u32::from(*v)));
            let header = Header::new(MULTI_WRITE).with_mode(MODE_FLASH);
            self.execute(header, payload, Duration::ZERO)?;
            done += chunk;
        }
        Ok(())
    }

    /// Drive one command through the legacy flash controller and return the
    /// data register afterwards.
    fn legacy_command(&mut self, command: u8, addr: u32, data: Option<u16>) -> Result<u16> {
        let registers = self.buffers.layout().register_file.size;
        if registers < LEGACY_FLASH_REGISTERS {
            return Err(MsgBufError::InvalidParameter(format!(
                "register file of {registers} bytes has no legacy flash controller"
            )));
        }
        if addr > LEGACY_MAX_ADDRESS {
            return Err(MsgBufError::InvalidParameter(format!(
                "flash address 0x{addr:x} exceeds 24 bits"
            )));
        }

        for (i, byte) in addr.to_le_bytes()[..3].iter().enumerate() {
            self.write_register(FLASH_ADDRESS + i, *byte)?;
        }
        if let Some(value) = data {
            let [lo, hi] = value.to_le_bytes();
            self.write_register(FLASH_DATA, lo)?;
            self.write_register(FLASH_DATA + 1, hi)?;
        }
        self.write_register(FLASH_COMMAND, command)?;

        let wait_states = self.config.flash_wait_states;
        let clock = Arc::clone(&self.clock);
        let poller = Poller::new(
            clock.as_ref(),
            self.config.poll_interval,
            PollLimit::Attempts(wait_states),
        );
        let outcome = poller.run(|| {
            let status = self.read_register(FLASH_STATUS)?;
            Ok::<_, MsgBufError>(status & FLASH_STATUS_MASK == FLASH_STATUS_IDLE)
        })?;
        if outcome == PollOutcome::Expired {
            error!(command, addr, wait_states, "flash controller stayed busy");
            return Err(MsgBufError::FlashTimeout(wait_states));
        }

        let lo = self.read_register(FLASH_DATA)?;
        let hi = self.read_register(FLASH_DATA + 1)?;
        debug!(command, addr, "legacy flash command completed");
        Ok(u16::from_le_bytes([lo, hi]))
    }
}

#[cfg(test)]
mod tests {
    use rcuprims_frame::{FORMAT_V1, FORMAT_V2, FORMAT_V2_2};

    use super::*;

    #[test]
    fn strategy_follows_format() {
        assert_eq!(FlashAccess::for_format(&FORMAT_V1), FlashAccess::LegacyBus);
        assert_eq!(FlashAccess::for_format(&FORMAT_V2), FlashAccess::LegacyBus);
        assert_eq!(
            FlashAccess::for_format(&FORMAT_V2_2),
            FlashAccess::MessageBuffer
        );
    }

    #[test]
    fn parse_names() {
        assert_eq!(
            "legacy".parse::<FlashAccess>().unwrap(),
            FlashAccess::LegacyBus
        );
        assert_eq!(
            FlashAccess::MessageBuffer.to_string().parse::<FlashAccess>().unwrap(),
            FlashAccess::MessageBuffer
        );
        assert!("jtag".parse::<FlashAccess>().is_err());
    }
}

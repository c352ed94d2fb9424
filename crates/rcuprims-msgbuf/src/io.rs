use std::time::{SystemTime, UNIX_EPOCH};

use rcuprims_transport::TransportError;
use tracing::{debug, info};

use crate::channel::Channel;
use crate::error::{MsgBufError, Result};

impl Channel {
    fn register_offset(&self, addr: usize) -> Result<u64> {
        let region = self.buffers.layout().register_file;
        if addr >= region.size {
            return Err(MsgBufError::RegisterOutOfRange {
                addr,
                size: region.size,
            });
        }
        Ok((region.offset + addr) as u64)
    }

    /// Read one 8-bit register.
    pub fn read_register(&mut self, addr: usize) -> Result<u8> {
        let offset = self.register_offset(addr)?;
        let slot = &mut self.buffers.register_file_mut()[addr..addr + 1];
        self.backend.read_exact_at(offset, slot)?;
        Ok(slot[0])
    }

    /// Write one 8-bit register.
    pub fn write_register(&mut self, addr: usize, value: u8) -> Result<()> {
        let offset = self.register_offset(addr)?;
        self.buffers.register_file_mut()[addr] = value;
        self.backend
            .write_all_at(offset, &self.buffers.register_file()[addr..addr + 1])?;
        Ok(())
    }

    /// Read-modify-write: clear `clear`, then set `set`.
    pub fn update_register(&mut self, addr: usize, clear: u8, set: u8) -> Result<u8> {
        let current = self.read_register(addr)?;
        let value = (current & !clear) | set;
        self.write_register(addr, value)?;
        Ok(value)
    }

    pub fn set_register_bits(&mut self, addr: usize, bits: u8) -> Result<u8> {
        self.update_register(addr, 0, bits)
    }

    pub fn clear_register_bits(&mut self, addr: usize, bits: u8) -> Result<u8> {
        self.update_register(addr, bits, 0)
    }

    /// Enter the driver's critical section.
    pub fn lock(&mut self) -> Result<()> {
        self.backend.lock()?;
        Ok(())
    }

    pub fn unlock(&mut self) -> Result<()> {
        self.backend.unlock()?;
        Ok(())
    }

    /// Take exclusive ownership of the channel. Returns the token needed
    /// to release it.
    pub fn seize(&mut self) -> Result<u32> {
        if self.owner != 0 {
            return Err(MsgBufError::Busy);
        }
        let token = time_token();
        match self.backend.seize(token) {
            Ok(()) => {}
            Err(TransportError::Busy) => return Err(MsgBufError::Busy),
            Err(err) => return Err(err.into()),
        }
        self.owner = token;
        info!(token, "channel seized");
        Ok(token)
    }

    /// Give up ownership taken with [`seize`](Channel::seize).
    pub fn release(&mut self, token: u32) -> Result<()> {
        if token == 0 || token != self.owner {
            return Err(MsgBufError::NotOwner);
        }
        match self.backend.release(token) {
            Ok(()) => {}
            Err(TransportError::NotOwner) => return Err(MsgBufError::NotOwner),
            Err(err) => return Err(err.into()),
        }
        self.owner = 0;
        info!(token, "channel released");
        Ok(())
    }

    pub fn set_debug_level(&mut self, level: u32) -> Result<()> {
        self.backend.set_debug_level(level)?;
        self.config.debug_level = Some(level);
        debug!(level, "driver debug level set");
        Ok(())
    }
}

/// Nonzero token derived from the current time.
fn time_token() -> u32 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    ((now.as_secs() as u32) ^ now.subsec_nanos()).max(1)
}

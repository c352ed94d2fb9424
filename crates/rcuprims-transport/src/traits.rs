use std::io::ErrorKind;

use crate::error::{Result, TransportError};

/// A byte-addressable message-buffer resource.
///
/// The address space is laid out as command-in, result-out and register file,
/// back to back, in that order. All offsets are relative to the start of the
/// resource. Control operations mirror the driver's ioctl set.
pub trait Backend: Send {
    /// Position the backend at `offset` bytes from the start.
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Read into `buf` from the current position, returning the count read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf` at the current position, returning the count written.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Size of the command-in region in bytes.
    fn command_buffer_size(&mut self) -> Result<usize>;

    /// Size of the result-out region in bytes.
    fn result_buffer_size(&mut self) -> Result<usize>;

    /// Size of the register file in bytes.
    fn register_file_size(&mut self) -> Result<usize>;

    /// Firmware version word (`major << 16 | minor << 8 | patch`).
    fn firmware_version(&mut self) -> Result<u32>;

    /// Driver version word.
    fn driver_version(&mut self) -> Result<u32>;

    /// Enter the advisory critical section around a dispatch cycle.
    fn lock(&mut self) -> Result<()>;

    /// Leave the advisory critical section.
    fn unlock(&mut self) -> Result<()>;

    /// Take exclusive ownership with `token`. Fails with [`TransportError::Busy`]
    /// when already owned.
    fn seize(&mut self, token: u32) -> Result<()>;

    /// Give up ownership. Fails with [`TransportError::NotOwner`] when `token`
    /// is not the current owner.
    fn release(&mut self, token: u32) -> Result<()>;

    /// Set the driver debug level.
    fn set_debug_level(&mut self, level: u32) -> Result<()>;

    /// Backend name for diagnostics.
    fn backend_name(&self) -> &'static str;

    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.seek(offset)?;
        let mut done = 0usize;
        while done < buf.len() {
            match self.read(&mut buf[done..]) {
                Ok(0) => {
                    return Err(TransportError::ShortTransfer {
                        offset,
                        expected: buf.len(),
                        actual: done,
                    })
                }
                Ok(n) => done += n,
                Err(TransportError::Io(err)) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Write all of `data` starting at `offset`.
    fn write_all_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.seek(offset)?;
        let mut done = 0usize;
        while done < data.len() {
            match self.write(&data[done..]) {
                Ok(0) => {
                    return Err(TransportError::ShortTransfer {
                        offset,
                        expected: data.len(),
                        actual: done,
                    })
                }
                Ok(n) => done += n,
                Err(TransportError::Io(err)) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn seek(&mut self, offset: u64) -> Result<()> {
        (**self).seek(offset)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn command_buffer_size(&mut self) -> Result<usize> {
        (**self).command_buffer_size()
    }

    fn result_buffer_size(&mut self) -> Result<usize> {
        (**self).result_buffer_size()
    }

    fn register_file_size(&mut self) -> Result<usize> {
        (**self).register_file_size()
    }

    fn firmware_version(&mut self) -> Result<u32> {
        (**self).firmware_version()
    }

    fn driver_version(&mut self) -> Result<u32> {
        (**self).driver_version()
    }

    fn lock(&mut self) -> Result<()> {
        (**self).lock()
    }

    fn unlock(&mut self) -> Result<()> {
        (**self).unlock()
    }

    fn seize(&mut self, token: u32) -> Result<()> {
        (**self).seize(token)
    }

    fn release(&mut self, token: u32) -> Result<()> {
        (**self).release(token)
    }

    fn set_debug_level(&mut self, level: u32) -> Result<()> {
        (**self).set_debug_level(level)
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}

/// Sizes and identity reported by backends that cannot query real hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendConfig {
    /// Command-in region size in bytes.
    pub command_buffer_size: usize,
    /// Result-out region size in bytes.
    pub result_buffer_size: usize,
    /// Register file size in bytes.
    pub register_file_size: usize,
    /// Firmware version word reported to the channel.
    pub firmware_version: u32,
    /// Driver version word reported to the channel.
    pub driver_version: u32,
}

impl BackendConfig {
    /// Total size of the address space in bytes.
    pub fn total_size(&self) -> usize {
        self.command_buffer_size + self.result_buffer_size + self.register_file_size
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 4096,
            result_buffer_size: 4096,
            register_file_size: 256,
            firmware_version: 0x0002_0200,
            driver_version: 0x0001_0000,
        }
    }
}

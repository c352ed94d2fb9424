use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Backend;

/// Magic byte of the message-buffer driver's ioctl space.
const IOC_MAGIC: u64 = b'D' as u64;

const IOC_NONE: u64 = 0;
const IOC_WRITE: u64 = 1;
const IOC_READ: u64 = 2;

/// Linux `_IOC` encoding: dir(2) | size(14) | type(8) | nr(8).
const fn ioc(dir: u64, nr: u64, size: u64) -> u64 {
    (dir << 30) | (size << 16) | (IOC_MAGIC << 8) | nr
}

const WORD: u64 = std::mem::size_of::<u32>() as u64;

pub(crate) const IOCTL_GET_MSGBUF_IN_SIZE: u64 = ioc(IOC_READ, 1, WORD);
pub(crate) const IOCTL_GET_MSGBUF_OUT_SIZE: u64 = ioc(IOC_READ, 2, WORD);
pub(crate) const IOCTL_GET_REGFILE_SIZE: u64 = ioc(IOC_READ, 3, WORD);
pub(crate) const IOCTL_GET_FIRMWARE_VERSION: u64 = ioc(IOC_READ, 4, WORD);
pub(crate) const IOCTL_GET_DRIVER_VERSION: u64 = ioc(IOC_READ, 5, WORD);
pub(crate) const IOCTL_LOCK: u64 = ioc(IOC_NONE, 6, 0);
pub(crate) const IOCTL_UNLOCK: u64 = ioc(IOC_NONE, 7, 0);
pub(crate) const IOCTL_SEIZE: u64 = ioc(IOC_WRITE, 8, WORD);
pub(crate) const IOCTL_RELEASE: u64 = ioc(IOC_WRITE, 9, WORD);
pub(crate) const IOCTL_SET_DEBUG_LEVEL: u64 = ioc(IOC_WRITE, 10, WORD);

/// Message-buffer character device (`/dev/dcsc` and friends).
///
/// Data transfers go through `seek`/`read`/`write` on the device node, control
/// requests through the driver's ioctls.
pub struct DeviceBackend {
    file: File,
    path: PathBuf,
}

impl DeviceBackend {
    /// Open the device node read/write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;
        info!(?path, "opened message-buffer device");
        Ok(Self { file, path })
    }

    /// The device path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ioctl_read(&self, request: u64, name: &'static str) -> Result<u32> {
        let mut value: u32 = 0;
        // SAFETY: `value` is a valid writable u32 matching the size encoded in
        // `request`, and the descriptor stays open for the duration of the call.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                request as _,
                &mut value as *mut u32,
            )
        };
        if rc < 0 {
            return Err(TransportError::Control {
                request: name,
                source: std::io::Error::last_os_error(),
            });
        }
        debug!(request = name, value, "ioctl read");
        Ok(value)
    }

    fn ioctl_write(&self, request: u64, name: &'static str, value: u32) -> Result<()> {
        let mut value = value;
        // SAFETY: `value` is a valid u32 matching the size encoded in `request`;
        // the driver only reads from it.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                request as _,
                &mut value as *mut u32,
            )
        };
        if rc < 0 {
            return Err(map_ownership_error(name, std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn ioctl_none(&self, request: u64, name: &'static str) -> Result<()> {
        // SAFETY: the request carries no argument; the descriptor is open.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _) };
        if rc < 0 {
            return Err(TransportError::Control {
                request: name,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

fn map_ownership_error(request: &'static str, source: std::io::Error) -> TransportError {
    match source.raw_os_error() {
        Some(libc::EBUSY) => TransportError::Busy,
        Some(libc::EPERM) | Some(libc::EACCES) if request == "release" => TransportError::NotOwner,
        _ => TransportError::Control { request, source },
    }
}

impl Backend for DeviceBackend {
    fn seek(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.file.write(buf)?)
    }

    fn command_buffer_size(&mut self) -> Result<usize> {
        Ok(self.ioctl_read(IOCTL_GET_MSGBUF_IN_SIZE, "msgbuf_in_size")? as usize)
    }

    fn result_buffer_size(&mut self) -> Result<usize> {
        Ok(self.ioctl_read(IOCTL_GET_MSGBUF_OUT_SIZE, "msgbuf_out_size")? as usize)
    }

    fn register_file_size(&mut self) -> Result<usize> {
        Ok(self.ioctl_read(IOCTL_GET_REGFILE_SIZE, "regfile_size")? as usize)
    }

    fn firmware_version(&mut self) -> Result<u32> {
        self.ioctl_read(IOCTL_GET_FIRMWARE_VERSION, "firmware_version")
    }

    fn driver_version(&mut self) -> Result<u32> {
        self.ioctl_read(IOCTL_GET_DRIVER_VERSION, "driver_version")
    }

    fn lock(&mut self) -> Result<()> {
        self.ioctl_none(IOCTL_LOCK, "lock")
    }

    fn unlock(&mut self) -> Result<()> {
        self.ioctl_none(IOCTL_UNLOCK, "unlock")
    }

    fn seize(&mut self, token: u32) -> Result<()> {
        self.ioctl_write(IOCTL_SEIZE, "seize", token)
    }

    fn release(&mut self, token: u32) -> Result<()> {
        self.ioctl_write(IOCTL_RELEASE, "release", token)
    }

    fn set_debug_level(&mut self, level: u32) -> Result<()> {
        self.ioctl_write(IOCTL_SET_DEBUG_LEVEL, "set_debug_level", level)
    }

    fn backend_name(&self) -> &'static str {
        "device"
    }
}

impl std::fmt::Debug for DeviceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBackend")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioctl_numbers_follow_linux_encoding() {
        // _IOR('D', 1, u32) = 0x80044401
        assert_eq!(IOCTL_GET_MSGBUF_IN_SIZE, 0x8004_4401);
        // _IO('D', 6) = 0x00004406
        assert_eq!(IOCTL_LOCK, 0x0000_4406);
        // _IOW('D', 8, u32) = 0x40044408
        assert_eq!(IOCTL_SEIZE, 0x4004_4408);
    }

    #[test]
    fn open_missing_device_reports_path() {
        let result = DeviceBackend::open("/dev/rcuprims-does-not-exist");
        match result {
            Err(TransportError::Open { path, .. }) => {
                assert_eq!(path, PathBuf::from("/dev/rcuprims-does-not-exist"));
            }
            other => panic!("expected open error, got {other:?}"),
        }
    }

    #[test]
    fn busy_errno_maps_to_busy() {
        let err = map_ownership_error("seize", std::io::Error::from_raw_os_error(libc::EBUSY));
        assert!(matches!(err, TransportError::Busy));
        let err = map_ownership_error("release", std::io::Error::from_raw_os_error(libc::EPERM));
        assert!(matches!(err, TransportError::NotOwner));
    }
}

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{Backend, BackendConfig};

/// Plain-file stand-in for the message-buffer device.
///
/// The file is created (or extended) to hold the whole address space, so a
/// command block written through a channel can be inspected offline. Control
/// requests are answered from the [`BackendConfig`]; lock and seize are tracked
/// in-process.
pub struct FileBackend {
    file: File,
    path: PathBuf,
    config: BackendConfig,
    position: u64,
    lock_depth: u32,
    owner: u32,
    debug_level: u32,
}

impl FileBackend {
    /// Open or create `path` sized for `config`.
    pub fn open(path: impl AsRef<Path>, config: BackendConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;

        let wanted = config.total_size() as u64;
        let current = file
            .metadata()
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?
            .len();
        if current < wanted {
            debug!(?path, current, wanted, "extending backing file");
            file.set_len(wanted).map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;
        }

        info!(?path, "opened file backend");
        Ok(Self {
            file,
            path,
            config,
            position: 0,
            lock_depth: 0,
            owner: 0,
            debug_level: 0,
        })
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current driver debug level as last set through the backend.
    pub fn debug_level(&self) -> u32 {
        self.debug_level
    }

    fn check_range(&self, len: usize) -> Result<()> {
        let size = self.config.total_size();
        if self.position as usize + len > size {
            return Err(TransportError::OutOfRange {
                offset: self.position,
                len,
                size,
            });
        }
        Ok(())
    }
}

impl Backend for FileBackend {
    fn seek(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_range(buf.len())?;
        let n = self.file.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.check_range(buf.len())?;
        let n = self.file.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn command_buffer_size(&mut self) -> Result<usize> {
        Ok(self.config.command_buffer_size)
    }

    fn result_buffer_size(&mut self) -> Result<usize> {
        Ok(self.config.result_buffer_size)
    }

    fn register_file_size(&mut self) -> Result<usize> {
        Ok(self.config.register_file_size)
    }

    fn firmware_version(&mut self) -> Result<u32> {
        Ok(self.config.firmware_version)
    }

    fn driver_version(&mut self) -> Result<u32> {
        Ok(self.config.driver_version)
    }

    fn lock(&mut self) -> Result<()> {
        self.lock_depth += 1;
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        self.lock_depth = self.lock_depth.saturating_sub(1);
        Ok(())
    }

    fn seize(&mut self, token: u32) -> Result<()> {
        if self.owner != 0 {
            return Err(TransportError::Busy);
        }
        self.owner = token;
        Ok(())
    }

    fn release(&mut self, token: u32) -> Result<()> {
        if self.owner != token {
            return Err(TransportError::NotOwner);
        }
        self.owner = 0;
        Ok(())
    }

    fn set_debug_level(&mut self, level: u32) -> Result<()> {
        self.debug_level = level;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "rcuprims-file-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("msgbuf.bin")
    }

    #[test]
    fn creates_file_sized_for_address_space() {
        let path = temp_path("size");
        let config = BackendConfig::default();
        let backend = FileBackend::open(&path, config).unwrap();
        assert_eq!(
            std::fs::metadata(backend.path()).unwrap().len(),
            config.total_size() as u64
        );
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn write_then_read_back() {
        let path = temp_path("rw");
        let mut backend = FileBackend::open(&path, BackendConfig::default()).unwrap();

        backend.write_all_at(16, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        backend.read_exact_at(16, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn access_past_end_rejected() {
        let path = temp_path("range");
        let config = BackendConfig::default();
        let mut backend = FileBackend::open(&path, config).unwrap();

        let err = backend
            .write_all_at(config.total_size() as u64 - 2, &[0; 4])
            .unwrap_err();
        assert!(matches!(err, TransportError::OutOfRange { .. }));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn seize_is_exclusive() {
        let path = temp_path("seize");
        let mut backend = FileBackend::open(&path, BackendConfig::default()).unwrap();

        backend.seize(7).unwrap();
        assert!(matches!(backend.seize(8), Err(TransportError::Busy)));
        assert!(matches!(backend.release(8), Err(TransportError::NotOwner)));
        backend.release(7).unwrap();
        backend.seize(8).unwrap();

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}

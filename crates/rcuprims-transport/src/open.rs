use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::file::FileBackend;
use crate::traits::{Backend, BackendConfig};

/// Names starting with this prefix are opened as the real device.
pub const DEVICE_PREFIX: &str = "/dev/";

/// Open a backend by name.
///
/// Names under [`DEVICE_PREFIX`] open the message-buffer device; anything else
/// is treated as a creatable plain file sized from `config`.
pub fn open_backend(name: impl AsRef<Path>, config: BackendConfig) -> Result<Box<dyn Backend>> {
    let path = name.as_ref();
    if is_device_path(path) {
        debug!(?path, "opening device backend");
        open_device(path)
    } else {
        debug!(?path, "opening file backend");
        Ok(Box::new(FileBackend::open(path, config)?))
    }
}

fn is_device_path(path: &Path) -> bool {
    path.to_str()
        .is_some_and(|name| name.starts_with(DEVICE_PREFIX))
}

#[cfg(unix)]
fn open_device(path: &Path) -> Result<Box<dyn Backend>> {
    Ok(Box::new(crate::device::DeviceBackend::open(path)?))
}

#[cfg(not(unix))]
fn open_device(path: &Path) -> Result<Box<dyn Backend>> {
    Err(crate::error::TransportError::Open {
        path: path.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "the message-buffer device is only available on unix",
        ),
    })
}

use std::path::PathBuf;

/// Errors that can occur while talking to a message-buffer backend.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the device or backing file.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the backend.
    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A control request (ioctl) failed.
    #[error("control request {request} failed: {source}")]
    Control {
        request: &'static str,
        source: std::io::Error,
    },

    /// An access would leave the backend address space.
    #[error("access of {len} bytes at offset {offset} exceeds backend size {size}")]
    OutOfRange { offset: u64, len: usize, size: usize },

    /// The backend returned fewer bytes than requested.
    #[error("short transfer at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortTransfer {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    /// The backend is seized by another owner.
    #[error("backend is seized by another owner")]
    Busy,

    /// A release was attempted with a token that does not own the backend.
    #[error("release attempted by a non-owner")]
    NotOwner,
}

pub type Result<T> = std::result::Result<T, TransportError>;

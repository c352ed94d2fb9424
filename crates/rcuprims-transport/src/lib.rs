//! Backend abstraction for the RCU message-buffer device.
//!
//! Provides a unified interface over the resources a message-buffer channel can
//! sit on:
//! - the message-buffer character device (Linux, via ioctls)
//! - a plain file, for offline encoding and inspection
//! - an in-memory map with a pluggable device side, for simulation and tests
//!
//! This is the lowest layer of rcuprims. Everything else builds on top of the
//! [`Backend`] trait provided here.

pub mod error;
pub mod file;
pub mod memory;
pub mod open;
pub mod traits;

#[cfg(unix)]
pub mod device;

pub use error::{Result, TransportError};
pub use file::FileBackend;
pub use memory::{MemoryBackend, MemoryHandle, MemoryMap, Responder};
pub use open::{open_backend, DEVICE_PREFIX};
pub use traits::{Backend, BackendConfig};

#[cfg(unix)]
pub use device::DeviceBackend;

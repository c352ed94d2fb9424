use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{Backend, BackendConfig};

/// The in-memory address space: command-in, result-out, register file.
#[derive(Debug, Clone)]
pub struct MemoryMap {
    bytes: Vec<u8>,
    command_size: usize,
    result_size: usize,
    register_size: usize,
}

impl MemoryMap {
    fn new(config: &BackendConfig) -> Self {
        Self {
            bytes: vec![0; config.total_size()],
            command_size: config.command_buffer_size,
            result_size: config.result_buffer_size,
            register_size: config.register_file_size,
        }
    }

    /// Whole address space.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Command-in region.
    pub fn command_region(&self) -> &[u8] {
        &self.bytes[..self.command_size]
    }

    /// Result-out region.
    pub fn result_region(&self) -> &[u8] {
        &self.bytes[self.command_size..self.command_size + self.result_size]
    }

    /// Mutable result-out region.
    pub fn result_region_mut(&mut self) -> &mut [u8] {
        let start = self.command_size;
        &mut self.bytes[start..start + self.result_size]
    }

    /// Register file.
    pub fn registers(&self) -> &[u8] {
        &self.bytes[self.register_offset()..]
    }

    /// Byte offset of the register file.
    pub fn register_offset(&self) -> usize {
        self.command_size + self.result_size
    }

    /// Register file size in bytes.
    pub fn register_size(&self) -> usize {
        self.register_size
    }

    /// Read register `addr`, or 0 outside the register file.
    pub fn register(&self, addr: usize) -> u8 {
        self.registers().get(addr).copied().unwrap_or(0)
    }

    /// Write register `addr`; writes outside the register file are dropped.
    pub fn set_register(&mut self, addr: usize, value: u8) {
        let offset = self.register_offset();
        if let Some(slot) = self.bytes[offset..].get_mut(addr) {
            *slot = value;
        }
    }

    /// Decode the command-in region as little-endian words.
    pub fn command_words(&self) -> Vec<u32> {
        words_le(self.command_region())
    }

    /// Decode the result-out region as little-endian words.
    pub fn result_words(&self) -> Vec<u32> {
        words_le(self.result_region())
    }

    /// Store `words` little-endian at the start of the result-out region.
    /// Words that do not fit are dropped.
    pub fn write_result_words(&mut self, words: &[u32]) {
        let region = self.result_region_mut();
        for (chunk, word) in region.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
    }
}

fn words_le(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Hook that plays the device side of a [`MemoryBackend`].
///
/// `on_write` runs after the bytes have landed in the map; `on_read` runs after
/// the bytes have been copied into the caller's buffer and may alter them.
pub trait Responder: Send {
    fn on_write(&mut self, map: &mut MemoryMap, offset: usize, len: usize) {
        let _ = (map, offset, len);
    }

    fn on_read(&mut self, map: &mut MemoryMap, offset: usize, buf: &mut [u8]) {
        let _ = (map, offset, buf);
    }
}

struct MemoryState {
    map: MemoryMap,
    config: BackendConfig,
    responder: Option<Box<dyn Responder>>,
    lock_depth: u32,
    lock_calls: u32,
    unlock_calls: u32,
    release_calls: u32,
    owner: u32,
    debug_level: u32,
}

/// In-memory message-buffer backend.
///
/// The state lives behind an `Arc<Mutex<_>>`, so a [`MemoryHandle`] taken
/// before the backend is handed to a channel can inspect it afterwards.
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    position: u64,
}

/// Inspection handle onto a [`MemoryBackend`]'s state.
#[derive(Clone)]
pub struct MemoryHandle {
    state: Arc<Mutex<MemoryState>>,
}

fn lock_state(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryBackend {
    /// Create a backend with no device-side behavior.
    pub fn new(config: BackendConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                map: MemoryMap::new(&config),
                config,
                responder: None,
                lock_depth: 0,
                lock_calls: 0,
                unlock_calls: 0,
                release_calls: 0,
                owner: 0,
                debug_level: 0,
            })),
            position: 0,
        }
    }

    /// Create a backend whose device side is played by `responder`.
    pub fn with_responder(config: BackendConfig, responder: impl Responder + 'static) -> Self {
        let backend = Self::new(config);
        lock_state(&backend.state).responder = Some(Box::new(responder));
        backend
    }

    /// Handle for inspecting the backend after it has been moved.
    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl MemoryHandle {
    /// Run `f` against the memory map.
    pub fn with_map<R>(&self, f: impl FnOnce(&mut MemoryMap) -> R) -> R {
        f(&mut lock_state(&self.state).map)
    }

    /// Number of `lock` calls observed.
    pub fn lock_calls(&self) -> u32 {
        lock_state(&self.state).lock_calls
    }

    /// Number of `unlock` calls observed.
    pub fn unlock_calls(&self) -> u32 {
        lock_state(&self.state).unlock_calls
    }

    /// Whether a lock is currently held.
    pub fn is_locked(&self) -> bool {
        lock_state(&self.state).lock_depth > 0
    }

    /// Current seize owner token (0 = unowned).
    pub fn owner(&self) -> u32 {
        lock_state(&self.state).owner
    }

    /// Hand the seize to `token` behind the channel's back, as another
    /// process would.
    pub fn set_owner(&self, token: u32) {
        lock_state(&self.state).owner = token;
    }

    /// Number of `release` calls observed.
    pub fn release_calls(&self) -> u32 {
        lock_state(&self.state).release_calls
    }

    /// Debug level last set through the backend.
    pub fn debug_level(&self) -> u32 {
        lock_state(&self.state).debug_level
    }
}

impl Backend for MemoryBackend {
    fn seek(&mut self, offset: u64) -> Result<()> {
        self.position = offset;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut guard = lock_state(&self.state);
        let state = &mut *guard;
        let offset = self.position as usize;
        let size = state.map.bytes.len();
        if offset + buf.len() > size {
            return Err(TransportError::OutOfRange {
                offset: self.position,
                len: buf.len(),
                size,
            });
        }
        buf.copy_from_slice(&state.map.bytes[offset..offset + buf.len()]);
        if let Some(responder) = state.responder.as_mut() {
            responder.on_read(&mut state.map, offset, buf);
        }
        trace!(offset, len = buf.len(), "memory read");
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut guard = lock_state(&self.state);
        let state = &mut *guard;
        let offset = self.position as usize;
        let size = state.map.bytes.len();
        if offset + buf.len() > size {
            return Err(TransportError::OutOfRange {
                offset: self.position,
                len: buf.len(),
                size,
            });
        }
        state.map.bytes[offset..offset + buf.len()].copy_from_slice(buf);
        if let Some(responder) = state.responder.as_mut() {
            responder.on_write(&mut state.map, offset, buf.len());
        }
        trace!(offset, len = buf.len(), "memory write");
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn command_buffer_size(&mut self) -> Result<usize> {
        Ok(lock_state(&self.state).config.command_buffer_size)
    }

    fn result_buffer_size(&mut self) -> Result<usize> {
        Ok(lock_state(&self.state).config.result_buffer_size)
    }

    fn register_file_size(&mut self) -> Result<usize> {
        Ok(lock_state(&self.state).config.register_file_size)
    }

    fn firmware_version(&mut self) -> Result<u32> {
        Ok(lock_state(&self.state).config.firmware_version)
    }

    fn driver_version(&mut self) -> Result<u32> {
        Ok(lock_state(&self.state).config.driver_version)
    }

    fn lock(&mut self) -> Result<()> {
        let mut state = lock_state(&self.state);
        state.lock_depth += 1;
        state.lock_calls += 1;
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        let mut state = lock_state(&self.state);
        state.lock_depth = state.lock_depth.saturating_sub(1);
        state.unlock_calls += 1;
        Ok(())
    }

    fn seize(&mut self, token: u32) -> Result<()> {
        let mut state = lock_state(&self.state);
        if state.owner != 0 {
            return Err(TransportError::Busy);
        }
        state.owner = token;
        Ok(())
    }

    fn release(&mut self, token: u32) -> Result<()> {
        let mut state = lock_state(&self.state);
        state.release_calls += 1;
        if state.owner != token {
            return Err(TransportError::NotOwner);
        }
        state.owner = 0;
        Ok(())
    }

    fn set_debug_level(&mut self, level: u32) -> Result<()> {
        lock_state(&self.state).debug_level = level;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Responder for Echo {
        fn on_write(&mut self, map: &mut MemoryMap, offset: usize, len: usize) {
            if offset == 0 {
                let words = map.command_words();
                map.write_result_words(&words[..len / 4]);
            }
        }
    }

    struct Flip;

    impl Responder for Flip {
        fn on_read(&mut self, _map: &mut MemoryMap, _offset: usize, buf: &mut [u8]) {
            if let Some(first) = buf.first_mut() {
                *first ^= 0xff;
            }
        }
    }

    #[test]
    fn regions_follow_fixed_layout() {
        let config = BackendConfig {
            command_buffer_size: 64,
            result_buffer_size: 32,
            register_file_size: 16,
            ..BackendConfig::default()
        };
        let backend = MemoryBackend::new(config);
        backend.handle().with_map(|map| {
            assert_eq!(map.command_region().len(), 64);
            assert_eq!(map.result_region().len(), 32);
            assert_eq!(map.register_offset(), 96);
            assert_eq!(map.registers().len(), 16);
        });
    }

    #[test]
    fn responder_sees_writes() {
        let mut backend = MemoryBackend::with_responder(BackendConfig::default(), Echo);
        let handle = backend.handle();
        backend
            .write_all_at(0, &0xdead_beef_u32.to_le_bytes())
            .unwrap();
        assert_eq!(handle.with_map(|map| map.result_words()[0]), 0xdead_beef);
    }

    #[test]
    fn responder_can_alter_reads() {
        let mut backend = MemoryBackend::with_responder(BackendConfig::default(), Flip);
        backend.write_all_at(0, &[0x11]).unwrap();
        let mut buf = [0u8; 1];
        backend.read_exact_at(0, &mut buf).unwrap();
        assert_eq!(buf[0], 0xee);
    }

    #[test]
    fn out_of_range_rejected() {
        let config = BackendConfig::default();
        let mut backend = MemoryBackend::new(config);
        let mut buf = [0u8; 8];
        let err = backend
            .read_exact_at(config.total_size() as u64 - 4, &mut buf)
            .unwrap_err();
        assert!(matches!(err, TransportError::OutOfRange { .. }));
    }

    #[test]
    fn lock_calls_are_counted() {
        let mut backend = MemoryBackend::new(BackendConfig::default());
        let handle = backend.handle();
        backend.lock().unwrap();
        assert!(handle.is_locked());
        backend.unlock().unwrap();
        assert!(!handle.is_locked());
        assert_eq!((handle.lock_calls(), handle.unlock_calls()), (1, 1));
    }

    #[test]
    fn register_access_outside_file_is_ignored() {
        let config = BackendConfig {
            register_file_size: 2,
            ..BackendConfig::default()
        };
        let backend = MemoryBackend::new(config);
        backend.handle().with_map(|map| {
            map.set_register(1, 0x5a);
            map.set_register(9, 0xff);
            assert_eq!(map.register(1), 0x5a);
            assert_eq!(map.register(9), 0);
        });
    }
}

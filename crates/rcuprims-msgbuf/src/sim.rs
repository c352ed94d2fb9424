//! Simulated RCU: plays the firmware side of a [`MemoryBackend`].
//!
//! Command blocks are executed when the execute bit is raised, against a
//! sparse RCU memory and a 16-bit flash, and answered with a result block.
//! The legacy flash controller in the register file is emulated as well.
//! Faults can be injected through a [`SimHandle`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rcuprims_frame::command::{
    flash, MULTI_READ, MULTI_WRITE, RANDOM_READ, RANDOM_WRITE, SINGLE_READ, SINGLE_WRITE,
};
use rcuprims_frame::status::{
    STATUS_MISSING_END_MARKER, STATUS_MISSING_MARKER, STATUS_NO_BUS_GRANT,
    STATUS_NO_TARGET_ANSWER,
};
use rcuprims_frame::{
    select_format, BlockError, DataFormat, Header, HeaderFormat, MODE_FLASH,
};
use rcuprims_transport::{BackendConfig, MemoryBackend, MemoryMap, Responder};
use tracing::trace;

use crate::flash::FlashId;
use crate::pack::{pack, unpack, ElementLayout};
use crate::registers::{
    flash_cmd, CONTROL, CTRL_EXECUTE, CTRL_FLASH, CTRL_MODE_MASK, CTRL_REREAD, FLASH_ADDRESS,
    FLASH_COMMAND, FLASH_DATA, FLASH_STATUS, FLASH_STATUS_IDLE,
};

/// Flash words per erase sector.
pub const SIM_SECTOR_WORDS: u32 = 0x1000;

/// Identification the simulated flash reports.
pub const SIM_FLASH_ID: FlashId = FlashId {
    manufacturer: 0x0001,
    device: 0x227e,
};

const ERASED: u16 = 0xffff;

#[derive(Debug, Default)]
struct SimState {
    memory: BTreeMap<u32, u32>,
    flash: BTreeMap<u32, u16>,
    control: u8,
    executed: u32,
    last_command: Vec<u32>,
    hang: u32,
    corrupt_readback: bool,
    forced_status: Option<u32>,
    echo_override: Option<u32>,
    count_override: Option<u32>,
    flash_stuck: bool,
    ignore_mode_writes: bool,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The firmware side of a simulated board.
pub struct SimulatedRcu {
    format: &'static HeaderFormat,
    state: Arc<Mutex<SimState>>,
}

/// Inspection and fault-injection handle onto a [`SimulatedRcu`].
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedRcu {
    /// Simulated board speaking the header format of `firmware_version`.
    pub fn new(firmware_version: u32) -> (Self, SimHandle) {
        let state = Arc::new(Mutex::new(SimState::default()));
        let handle = SimHandle {
            state: Arc::clone(&state),
        };
        let sim = Self {
            format: select_format(firmware_version),
            state,
        };
        (sim, handle)
    }

    /// A memory backend with a simulated board behind it.
    pub fn backend(config: BackendConfig) -> (MemoryBackend, SimHandle) {
        let (sim, handle) = Self::new(config.firmware_version);
        (MemoryBackend::with_responder(config, sim), handle)
    }

    fn execute(&self, map: &mut MemoryMap, state: &mut SimState, control: u8) {
        let words = map.command_words();
        state.executed += 1;
        let Some(&first) = words.first() else {
            return;
        };
        let header = self.format.decode_header(first);

        let (status, data) = match self.format.check_block(&words) {
            Ok(len) => {
                state.last_command = words[..len].to_vec();
                match self.run_blocks(&words, state, control) {
                    Ok(data) => (0, data),
                    Err(status) => (status, Vec::new()),
                }
            }
            Err(BlockError::MissingEndMarker { .. }) => (STATUS_MISSING_END_MARKER, Vec::new()),
            Err(_) => (STATUS_MISSING_MARKER, Vec::new()),
        };

        let status = state.forced_status.unwrap_or(status);
        let data = if status == 0 { data } else { Vec::new() };
        let echo = state.echo_override.unwrap_or(header.command_id);
        let count = state.count_override.unwrap_or(2 + data.len() as u32);
        let mut result = Vec::with_capacity(2 + data.len());
        result.push(
            self.format.make_header(
                &Header::new(echo)
                    .with_word_count(count)
                    .with_mode(header.mode),
            ),
        );
        result.push(status);
        result.extend(data);
        map.write_result_words(&result);
        trace!(command = header.command_id, status, "simulated command executed");
    }

    fn run_blocks(
        &self,
        words: &[u32],
        state: &mut SimState,
        control: u8,
    ) -> Result<Vec<u32>, u32> {
        let mut data = Vec::new();
        let mut offset = 0usize;
        loop {
            let header = self.format.decode_header(words[offset]);
            let count = header.word_count as usize;
            let payload = &words[offset + 1..offset + 1 + count];
            data.extend(self.run_block(&header, payload, state, control)?);
            offset += count + 2;
            if header.block_number == 0 {
                return Ok(data);
            }
        }
    }

    fn run_block(
        &self,
        header: &Header,
        payload: &[u32],
        state: &mut SimState,
        control: u8,
    ) -> Result<Vec<u32>, u32> {
        let arg = |i: usize| payload.get(i).copied().ok_or(STATUS_NO_TARGET_ANSWER);
        let flash_mode = header.mode == MODE_FLASH;
        let granted = if flash_mode {
            control & CTRL_MODE_MASK == CTRL_FLASH
        } else {
            control & CTRL_MODE_MASK == 0
        };
        if !granted {
            return Err(STATUS_NO_BUS_GRANT);
        }

        if flash_mode {
            return match header.command_id {
                MULTI_READ => {
                    let (addr, count) = (arg(0)?, arg(1)?);
                    Ok((0..count)
                        .map(|i| u32::from(state.flash_word(addr.wrapping_add(i))))
                        .collect())
                }
                MULTI_WRITE => {
                    let (addr, count) = (arg(0)?, arg(1)?);
                    for i in 0..count {
                        let value = arg(2 + i as usize)? as u16;
                        state.program_flash(addr.wrapping_add(i), value);
                    }
                    Ok(Vec::new())
                }
                flash::ERASE_ALL => {
                    state.flash.clear();
                    Ok(Vec::new())
                }
                flash::ERASE_SECTOR => {
                    state.erase_sectors(arg(0)?, 1);
                    Ok(Vec::new())
                }
                flash::MULTI_ERASE => {
                    state.erase_sectors(arg(0)?, arg(1)?);
                    Ok(Vec::new())
                }
                flash::READ_ID => Ok(vec![
                    u32::from(SIM_FLASH_ID.manufacturer),
                    u32::from(SIM_FLASH_ID.device),
                ]),
                flash::RESET => Ok(Vec::new()),
                _ => Err(STATUS_NO_TARGET_ANSWER),
            };
        }

        match header.command_id {
            SINGLE_READ => Ok(vec![state.memory_word(arg(0)?)]),
            SINGLE_WRITE => {
                state.memory.insert(arg(0)?, arg(1)?);
                Ok(Vec::new())
            }
            MULTI_READ => {
                let (addr, count) = (arg(0)?, arg(1)?);
                let (layout, format) = wire_layout(header.data_format);
                let values: Vec<u32> = (0..count)
                    .map(|i| state.memory_word(addr.wrapping_add(i)))
                    .collect();
                Ok(pack(&values, layout, format))
            }
            MULTI_WRITE => {
                let (addr, count) = (arg(0)?, arg(1)?);
                let (layout, format) = wire_layout(header.data_format);
                let packed = payload.get(2..).unwrap_or(&[]);
                let values = unpack(packed, count as usize, layout, format);
                for (i, value) in values.into_iter().enumerate() {
                    state.memory.insert(addr.wrapping_add(i as u32), value);
                }
                Ok(Vec::new())
            }
            RANDOM_READ => Ok(payload.iter().map(|addr| state.memory_word(*addr)).collect()),
            RANDOM_WRITE => {
                for pair in payload.chunks_exact(2) {
                    state.memory.insert(pair[0], pair[1]);
                }
                Ok(Vec::new())
            }
            _ => Err(STATUS_NO_TARGET_ANSWER),
        }
    }

    fn legacy_flash(&self, map: &mut MemoryMap, state: &mut SimState) {
        if state.flash_stuck || map.register(CONTROL) & CTRL_MODE_MASK != CTRL_FLASH {
            map.set_register(FLASH_STATUS, 0x01);
            return;
        }
        let addr = u32::from_le_bytes([
            map.register(FLASH_ADDRESS),
            map.register(FLASH_ADDRESS + 1),
            map.register(FLASH_ADDRESS + 2),
            0,
        ]);
        let data = u16::from_le_bytes([map.register(FLASH_DATA), map.register(FLASH_DATA + 1)]);
        let out = match map.register(FLASH_COMMAND) {
            flash_cmd::READ => state.flash_word(addr),
            flash_cmd::WRITE => {
                state.program_flash(addr, data);
                data
            }
            flash_cmd::ERASE_SECTOR => {
                state.erase_sectors(addr, 1);
                data
            }
            flash_cmd::ERASE_ALL => {
                state.flash.clear();
                data
            }
            flash_cmd::READ_ID if addr == 0 => SIM_FLASH_ID.manufacturer,
            flash_cmd::READ_ID => SIM_FLASH_ID.device,
            _ => data,
        };
        let [lo, hi] = out.to_le_bytes();
        map.set_register(FLASH_DATA, lo);
        map.set_register(FLASH_DATA + 1, hi);
        map.set_register(FLASH_STATUS, FLASH_STATUS_IDLE);
    }
}

/// Element layout the firmware uses for a header data-format code.
fn wire_layout(code: u32) -> (ElementLayout, DataFormat) {
    let format = DataFormat::from_code(code).unwrap_or(DataFormat::Word32);
    let size = match format {
        DataFormat::Byte8 => 1,
        DataFormat::Half16 => 2,
        DataFormat::Sample10 => 3,
        DataFormat::Word32 => 4,
    };
    let layout = ElementLayout::new(size, false).unwrap_or(ElementLayout::WORDS);
    (layout, format)
}

impl SimState {
    fn memory_word(&self, addr: u32) -> u32 {
        self.memory.get(&addr).copied().unwrap_or(0)
    }

    fn flash_word(&self, addr: u32) -> u16 {
        self.flash.get(&addr).copied().unwrap_or(ERASED)
    }

    /// Programming only clears bits, as on NOR flash.
    fn program_flash(&mut self, addr: u32, value: u16) {
        let current = self.flash_word(addr);
        self.flash.insert(addr, current & value);
    }

    fn erase_sectors(&mut self, first: u32, count: u32) {
        let start = u64::from(first) * u64::from(SIM_SECTOR_WORDS);
        let end = start + u64::from(count) * u64::from(SIM_SECTOR_WORDS);
        self.flash
            .retain(|addr, _| !(start..end).contains(&u64::from(*addr)));
    }
}

impl Responder for SimulatedRcu {
    fn on_write(&mut self, map: &mut MemoryMap, offset: usize, len: usize) {
        let base = map.register_offset();
        let touches = |addr: usize| offset <= base + addr && base + addr < offset + len;
        let mut state = lock(&self.state);

        if touches(CONTROL) {
            let mut control = map.register(CONTROL);
            if state.ignore_mode_writes {
                control = (control & !CTRL_MODE_MASK) | (state.control & CTRL_MODE_MASK);
                map.set_register(CONTROL, control);
            }
            if control & CTRL_EXECUTE != 0 {
                if state.hang > 0 {
                    state.hang -= 1;
                } else {
                    self.execute(map, &mut state, control);
                    map.set_register(CONTROL, control & !CTRL_EXECUTE);
                }
            }
            state.control = map.register(CONTROL);
        }

        if touches(FLASH_COMMAND) {
            self.legacy_flash(map, &mut state);
        }
    }

    fn on_read(&mut self, map: &mut MemoryMap, offset: usize, buf: &mut [u8]) {
        let state = lock(&self.state);
        let rereading = map.register(CONTROL) & CTRL_REREAD != 0;
        if state.corrupt_readback && rereading && offset < map.command_region().len() {
            if let Some(byte) = buf.first_mut() {
                *byte ^= 0xff;
            }
        }
    }
}

impl SimHandle {
    pub fn memory(&self, addr: u32) -> u32 {
        lock(&self.state).memory_word(addr)
    }

    pub fn set_memory(&self, addr: u32, value: u32) {
        lock(&self.state).memory.insert(addr, value);
    }

    pub fn flash(&self, addr: u32) -> u16 {
        lock(&self.state).flash_word(addr)
    }

    pub fn set_flash(&self, addr: u32, value: u16) {
        lock(&self.state).flash.insert(addr, value);
    }

    /// Number of times the execute bit was acted on.
    pub fn executed(&self) -> u32 {
        lock(&self.state).executed
    }

    /// Words of the last well-formed command sequence.
    pub fn last_command(&self) -> Vec<u32> {
        lock(&self.state).last_command.clone()
    }

    /// Leave the execute bit raised for the next `count` commands.
    pub fn hang_next(&self, count: u32) {
        lock(&self.state).hang = count;
    }

    /// Flip the first byte of command read-backs.
    pub fn set_corrupt_readback(&self, corrupt: bool) {
        lock(&self.state).corrupt_readback = corrupt;
    }

    /// Answer every command with this status word.
    pub fn force_status(&self, status: Option<u32>) {
        lock(&self.state).forced_status = status;
    }

    /// Echo this command id instead of the one received.
    pub fn override_echo(&self, command_id: Option<u32>) {
        lock(&self.state).echo_override = command_id;
    }

    /// Declare this result word count instead of the real one.
    pub fn override_word_count(&self, count: Option<u32>) {
        lock(&self.state).count_override = count;
    }

    /// Keep the legacy flash controller busy.
    pub fn set_flash_stuck(&self, stuck: bool) {
        lock(&self.state).flash_stuck = stuck;
    }

    /// Drop writes to the control register's mode bits.
    pub fn set_ignore_mode_writes(&self, ignore: bool) {
        lock(&self.state).ignore_mode_writes = ignore;
    }
}

impl std::fmt::Debug for SimHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("SimHandle")
            .field("executed", &state.executed)
            .field("memory_words", &state.memory.len())
            .field("flash_words", &state.flash.len())
            .finish_non_exhaustive()
    }
}

//! Register file map.
//!
//! All registers are 8 bits wide; addresses are offsets within the register
//! file region of the backend.

/// Control register.
pub const CONTROL: usize = 0x00;

/// Control bit: execute the command in the command-in region. Cleared by
/// the firmware when the result is ready.
pub const CTRL_EXECUTE: u8 = 0x01;

/// Control bit: route reads of the command-in region back to the host copy.
pub const CTRL_REREAD: u8 = 0x02;

/// Control bit: flash mode.
pub const CTRL_FLASH: u8 = 0x04;

/// Control bit: selectmap mode.
pub const CTRL_SELECTMAP: u8 = 0x08;

/// Both mode bits.
pub const CTRL_MODE_MASK: u8 = CTRL_FLASH | CTRL_SELECTMAP;

/// Legacy flash controller address, 24 bits little-endian.
pub const FLASH_ADDRESS: usize = 0x04;

/// Legacy flash controller data, 16 bits little-endian.
pub const FLASH_DATA: usize = 0x07;

/// Legacy flash controller command.
pub const FLASH_COMMAND: usize = 0x09;

/// Legacy flash controller status.
pub const FLASH_STATUS: usize = 0x0a;

/// Bits of [`FLASH_STATUS`] compared against [`FLASH_STATUS_IDLE`].
pub const FLASH_STATUS_MASK: u8 = 0x81;

/// Masked status value of an idle flash controller.
pub const FLASH_STATUS_IDLE: u8 = 0x80;

/// Legacy flash controller commands.
pub mod flash_cmd {
    pub const READ: u8 = 0x01;
    pub const WRITE: u8 = 0x02;
    pub const ERASE_SECTOR: u8 = 0x03;
    pub const ERASE_ALL: u8 = 0x04;
    pub const READ_ID: u8 = 0x05;
    pub const RESET: u8 = 0x06;
}

/// Register file bytes needed by the legacy flash controller.
pub const LEGACY_FLASH_REGISTERS: usize = FLASH_STATUS + 1;

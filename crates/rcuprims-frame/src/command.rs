//! Message-buffer command ids, mode bit values and data-format codes.
//!
//! Command ids are interpreted together with the header mode bit: ids in
//! [`flash`] only have a meaning when the mode bit selects flash access.

/// Read one word.
pub const SINGLE_READ: u32 = 0x01;

/// Write one word.
pub const SINGLE_WRITE: u32 = 0x02;

/// Read consecutive words starting at an address.
pub const MULTI_READ: u32 = 0x03;

/// Write consecutive words starting at an address.
pub const MULTI_WRITE: u32 = 0x04;

/// Read a list of arbitrary addresses.
pub const RANDOM_READ: u32 = 0x05;

/// Write a list of address/data pairs.
pub const RANDOM_WRITE: u32 = 0x06;

/// Flash-mode command ids. Flash read and write reuse [`MULTI_READ`] and
/// [`MULTI_WRITE`] with the flash mode bit set.
pub mod flash {
    pub const ERASE_ALL: u32 = 0x08;
    pub const ERASE_SECTOR: u32 = 0x09;
    pub const MULTI_ERASE: u32 = 0x0a;
    pub const READ_ID: u32 = 0x0b;
    pub const RESET: u32 = 0x0c;
}

/// Mode bit value for message-buffer commands.
pub const MODE_MESSAGE_BUFFER: u32 = 0;

/// Mode bit value for flash commands.
pub const MODE_FLASH: u32 = 1;

/// Returns a human-readable name for a command id under a mode bit.
pub fn command_name(command_id: u32, mode: u32) -> &'static str {
    if mode == MODE_FLASH {
        return match command_id {
            flash::ERASE_ALL => "FLASH_ERASE_ALL",
            flash::ERASE_SECTOR => "FLASH_ERASE_SECTOR",
            flash::MULTI_ERASE => "FLASH_MULTI_ERASE",
            flash::READ_ID => "FLASH_READ_ID",
            flash::RESET => "FLASH_RESET",
            MULTI_READ => "FLASH_READ",
            MULTI_WRITE => "FLASH_WRITE",
            _ => "FLASH_UNKNOWN",
        };
    }
    match command_id {
        SINGLE_READ => "SINGLE_READ",
        SINGLE_WRITE => "SINGLE_WRITE",
        MULTI_READ => "MULTI_READ",
        MULTI_WRITE => "MULTI_WRITE",
        RANDOM_READ => "RANDOM_READ",
        RANDOM_WRITE => "RANDOM_WRITE",
        _ => "UNKNOWN",
    }
}

/// Packing of logical elements into 32-bit wire words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// One element per word.
    Word32,
    /// Four 8-bit elements per word.
    Byte8,
    /// Two 16-bit elements per word.
    Half16,
    /// Three 10-bit elements per word.
    Sample10,
}

impl DataFormat {
    /// Header data-format code.
    pub fn code(self) -> u32 {
        match self {
            DataFormat::Word32 => 0,
            DataFormat::Byte8 => 1,
            DataFormat::Half16 => 2,
            DataFormat::Sample10 => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(DataFormat::Word32),
            1 => Some(DataFormat::Byte8),
            2 => Some(DataFormat::Half16),
            3 => Some(DataFormat::Sample10),
            _ => None,
        }
    }

    /// Compressed format for an element size in bytes (3 meaning 10-bit).
    pub fn for_element_size(size: u8) -> Option<Self> {
        match size {
            1 => Some(DataFormat::Byte8),
            2 => Some(DataFormat::Half16),
            3 => Some(DataFormat::Sample10),
            4 => Some(DataFormat::Word32),
            _ => None,
        }
    }

    /// Compression factor: logical elements per wire word.
    pub fn elements_per_word(self) -> usize {
        match self {
            DataFormat::Word32 => 1,
            DataFormat::Byte8 => 4,
            DataFormat::Half16 => 2,
            DataFormat::Sample10 => 3,
        }
    }

    /// Significant bits per element.
    pub fn element_bits(self) -> u32 {
        match self {
            DataFormat::Word32 => 32,
            DataFormat::Byte8 => 8,
            DataFormat::Half16 => 16,
            DataFormat::Sample10 => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_factors() {
        let factors: Vec<usize> = (1..=4)
            .map(|size| DataFormat::for_element_size(size).unwrap().elements_per_word())
            .collect();
        assert_eq!(factors, vec![4, 2, 3, 1]);
    }

    #[test]
    fn codes_round_trip() {
        for format in [
            DataFormat::Word32,
            DataFormat::Byte8,
            DataFormat::Half16,
            DataFormat::Sample10,
        ] {
            assert_eq!(DataFormat::from_code(format.code()), Some(format));
        }
        assert_eq!(DataFormat::from_code(7), None);
    }

    #[test]
    fn names_depend_on_mode() {
        assert_eq!(command_name(MULTI_READ, MODE_MESSAGE_BUFFER), "MULTI_READ");
        assert_eq!(command_name(MULTI_READ, MODE_FLASH), "FLASH_READ");
        assert_eq!(command_name(flash::READ_ID, MODE_FLASH), "FLASH_READ_ID");
        assert_eq!(command_name(0x1f, MODE_MESSAGE_BUFFER), "UNKNOWN");
    }
}

use std::fmt;

/// A bit field inside a 32-bit header word.
///
/// A zero-width field does not exist in the format: it always encodes and
/// decodes as 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub width: u32,
    pub shift: u32,
}

impl BitField {
    /// A field the format does not carry.
    pub const ABSENT: BitField = BitField { width: 0, shift: 0 };

    pub const fn new(width: u32, shift: u32) -> Self {
        Self { width, shift }
    }

    /// Mask of the field before shifting.
    pub const fn mask(self) -> u32 {
        if self.width == 0 {
            0
        } else if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    /// Whether the format carries this field.
    pub const fn is_present(self) -> bool {
        self.width > 0
    }

    /// Largest value the field can hold.
    pub const fn max_value(self) -> u32 {
        self.mask()
    }

    /// Mask `value` to the field width and shift it into position.
    /// Excess high-order bits are dropped.
    pub fn insert(self, value: u32) -> u32 {
        (value & self.mask()).checked_shl(self.shift).unwrap_or(0)
    }

    /// Extract the field from `word`.
    pub fn extract(self, word: u32) -> u32 {
        word.checked_shr(self.shift).unwrap_or(0) & self.mask()
    }
}

/// A fixed bit pattern placed in a field of a marker word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub pattern: u32,
    pub field: BitField,
}

impl Marker {
    pub const fn new(pattern: u32, field: BitField) -> Self {
        Self { pattern, field }
    }

    /// The marker word with all non-pattern bits clear.
    pub fn word(self) -> u32 {
        self.field.insert(self.pattern)
    }

    /// Whether the pattern field of `word` holds this marker.
    pub fn matches(self, word: u32) -> bool {
        self.field.extract(word) == self.pattern & self.field.mask()
    }
}

/// Header format generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormatVersion {
    /// Legacy format: no data-format code, no mode bit.
    V1,
    /// Adds the data-format code (compression) and block checksum.
    V2,
    /// Adds the mode bit for flash access through the message buffer.
    V2_2,
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatVersion::V1 => f.write_str("v1"),
            FormatVersion::V2 => f.write_str("v2"),
            FormatVersion::V2_2 => f.write_str("v2.2"),
        }
    }
}

/// Where each header field and marker lives for one protocol generation.
///
/// Chosen once when a channel opens and passed explicitly to every encode and
/// decode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFormat {
    pub version: FormatVersion,
    /// Lowest firmware version word this format is valid for.
    pub min_firmware: u32,
    pub command_id: BitField,
    pub word_count: BitField,
    pub block_number: BitField,
    pub data_format: BitField,
    pub mode: BitField,
    pub block_marker: Marker,
    pub checksum: BitField,
    pub end_marker: Marker,
}

/// Legacy header format.
pub static FORMAT_V1: HeaderFormat = HeaderFormat {
    version: FormatVersion::V1,
    min_firmware: 0,
    command_id: BitField::new(6, 26),
    word_count: BitField::new(16, 0),
    block_number: BitField::new(10, 16),
    data_format: BitField::ABSENT,
    mode: BitField::ABSENT,
    block_marker: Marker::new(0xaaaa, BitField::new(16, 16)),
    checksum: BitField::ABSENT,
    end_marker: Marker::new(0xdddd, BitField::new(16, 16)),
};

/// Header format with data-format code and checksum.
pub static FORMAT_V2: HeaderFormat = HeaderFormat {
    version: FormatVersion::V2,
    min_firmware: 0x0002_0000,
    command_id: BitField::new(6, 26),
    word_count: BitField::new(16, 0),
    block_number: BitField::new(7, 16),
    data_format: BitField::new(3, 23),
    mode: BitField::ABSENT,
    block_marker: Marker::new(0xaaaa, BitField::new(16, 16)),
    checksum: BitField::new(16, 0),
    end_marker: Marker::new(0xdd33, BitField::new(16, 16)),
};

/// Header format with the flash mode bit.
pub static FORMAT_V2_2: HeaderFormat = HeaderFormat {
    version: FormatVersion::V2_2,
    min_firmware: 0x0002_0200,
    command_id: BitField::new(5, 27),
    word_count: BitField::new(16, 0),
    block_number: BitField::new(7, 16),
    data_format: BitField::new(3, 23),
    mode: BitField::new(1, 26),
    block_marker: Marker::new(0xaaaa, BitField::new(16, 16)),
    checksum: BitField::new(16, 0),
    end_marker: Marker::new(0xdd33, BitField::new(16, 16)),
};

/// All known formats, newest first.
pub static FORMATS: [&HeaderFormat; 3] = [&FORMAT_V2_2, &FORMAT_V2, &FORMAT_V1];

/// Pick the newest format valid for `firmware`.
pub fn select_format(firmware: u32) -> &'static HeaderFormat {
    FORMATS
        .iter()
        .copied()
        .find(|format| firmware >= format.min_firmware)
        .unwrap_or(&FORMAT_V1)
}

/// Decoded header fields.
///
/// Values are raw field contents; encoding masks each to its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub command_id: u32,
    pub word_count: u32,
    pub block_number: u32,
    pub data_format: u32,
    pub mode: u32,
}

impl Header {
    /// Header for `command_id` with all other fields zero.
    pub fn new(command_id: u32) -> Self {
        Self {
            command_id,
            ..Self::default()
        }
    }

    pub fn with_word_count(mut self, word_count: u32) -> Self {
        self.word_count = word_count;
        self
    }

    pub fn with_block_number(mut self, block_number: u32) -> Self {
        self.block_number = block_number;
        self
    }

    pub fn with_data_format(mut self, data_format: u32) -> Self {
        self.data_format = data_format;
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

impl HeaderFormat {
    /// Encode a header word.
    ///
    /// Header layout (v2.2; other versions narrow or drop fields):
    /// ```text
    /// ┌──────────┬──────┬─────────┬──────────┬──────────────────┐
    /// │ cmd (5)  │ mode │ fmt (3) │ block (7)│ word count (16)  │
    /// │ 31..27   │ 26   │ 25..23  │ 22..16   │ 15..0            │
    /// └──────────┴──────┴─────────┴──────────┴──────────────────┘
    /// ```
    pub fn make_header(&self, header: &Header) -> u32 {
        self.command_id.insert(header.command_id)
            | self.mode.insert(header.mode)
            | self.data_format.insert(header.data_format)
            | self.block_number.insert(header.block_number)
            | self.word_count.insert(header.word_count)
    }

    /// Decode a header word.
    pub fn decode_header(&self, word: u32) -> Header {
        Header {
            command_id: self.command_id.extract(word),
            word_count: self.word_count.extract(word),
            block_number: self.block_number.extract(word),
            data_format: self.data_format.extract(word),
            mode: self.mode.extract(word),
        }
    }

    /// Block-marker word carrying `checksum`.
    pub fn make_trailer(&self, checksum: u32) -> u32 {
        self.block_marker.word() | self.checksum.insert(checksum)
    }

    /// End-marker word.
    pub fn make_end_marker(&self) -> u32 {
        self.end_marker.word()
    }

    pub fn is_block_marker(&self, word: u32) -> bool {
        self.block_marker.matches(word)
    }

    pub fn is_end_marker(&self, word: u32) -> bool {
        self.end_marker.matches(word)
    }

    /// Whether headers carry the flash mode bit.
    pub fn supports_mode_bit(&self) -> bool {
        self.mode.is_present()
    }

    /// Whether headers carry a data-format code.
    pub fn supports_data_format(&self) -> bool {
        self.data_format.is_present()
    }
}

impl fmt::Display for HeaderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (firmware >= 0x{:06x})", self.version, self.min_firmware)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fits(field: BitField) -> impl Strategy<Value = u32> {
        0..=field.max_value()
    }

    fn header_within(format: &'static HeaderFormat) -> impl Strategy<Value = Header> {
        (
            fits(format.command_id),
            fits(format.word_count),
            fits(format.block_number),
            fits(format.data_format),
            fits(format.mode),
        )
            .prop_map(
                |(command_id, word_count, block_number, data_format, mode)| Header {
                    command_id,
                    word_count,
                    block_number,
                    data_format,
                    mode,
                },
            )
    }

    fn any_format() -> impl Strategy<Value = &'static HeaderFormat> {
        prop::sample::select(FORMATS.to_vec())
    }

    proptest! {
        #[test]
        fn header_round_trips(
            (format, header) in any_format().prop_flat_map(|f| (Just(f), header_within(f)))
        ) {
            prop_assert_eq!(format.decode_header(format.make_header(&header)), header);
        }

        #[test]
        fn excess_bits_are_masked(format in any_format(), raw in any::<[u32; 5]>()) {
            let wide = Header {
                command_id: raw[0],
                word_count: raw[1],
                block_number: raw[2],
                data_format: raw[3],
                mode: raw[4],
            };
            let narrow = Header {
                command_id: raw[0] & format.command_id.mask(),
                word_count: raw[1] & format.word_count.mask(),
                block_number: raw[2] & format.block_number.mask(),
                data_format: raw[3] & format.data_format.mask(),
                mode: raw[4] & format.mode.mask(),
            };
            prop_assert_eq!(format.make_header(&wide), format.make_header(&narrow));
            prop_assert_eq!(format.decode_header(format.make_header(&wide)), narrow);
        }
    }

    #[test]
    fn fields_do_not_overlap() {
        for format in FORMATS {
            let fields = [
                format.command_id,
                format.word_count,
                format.block_number,
                format.data_format,
                format.mode,
            ];
            let mut seen = 0u32;
            for field in fields {
                let bits = field.insert(u32::MAX);
                assert_eq!(seen & bits, 0, "overlap in {}", format.version);
                seen |= bits;
            }
        }
    }

    #[test]
    fn select_by_firmware_version() {
        assert_eq!(select_format(0x0001_0300).version, FormatVersion::V1);
        assert_eq!(select_format(0x0002_0000).version, FormatVersion::V2);
        assert_eq!(select_format(0x0002_01ff).version, FormatVersion::V2);
        assert_eq!(select_format(0x0002_0200).version, FormatVersion::V2_2);
        assert_eq!(select_format(0x0003_0000).version, FormatVersion::V2_2);
    }

    #[test]
    fn absent_fields_encode_as_zero() {
        let header = Header::new(2).with_mode(1).with_data_format(5);
        let word = FORMAT_V1.make_header(&header);
        let decoded = FORMAT_V1.decode_header(word);
        assert_eq!(decoded.mode, 0);
        assert_eq!(decoded.data_format, 0);
        assert_eq!(decoded.command_id, 2);
    }

    #[test]
    fn v2_2_header_layout() {
        let header = Header::new(0x02)
            .with_mode(1)
            .with_data_format(3)
            .with_block_number(5)
            .with_word_count(0x1234);
        let word = FORMAT_V2_2.make_header(&header);
        assert_eq!(word, (0x02 << 27) | (1 << 26) | (3 << 23) | (5 << 16) | 0x1234);
    }

    #[test]
    fn markers() {
        assert_eq!(FORMAT_V2.make_trailer(0), 0xaaaa_0000);
        assert_eq!(FORMAT_V2.make_trailer(0x1_2345), 0xaaaa_2345);
        assert_eq!(FORMAT_V1.make_trailer(0xffff), 0xaaaa_0000);
        assert_eq!(FORMAT_V2.make_end_marker(), 0xdd33_0000);
        assert_eq!(FORMAT_V1.make_end_marker(), 0xdddd_0000);
        assert!(FORMAT_V2.is_block_marker(0xaaaa_0042));
        assert!(!FORMAT_V2.is_block_marker(0xaaab_0000));
        assert!(FORMAT_V2_2.is_end_marker(0xdd33_0000));
        assert!(!FORMAT_V1.is_end_marker(0xdd33_0000));
    }
}

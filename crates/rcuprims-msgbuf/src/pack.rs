//! Element packing for multi-word transfers.
//!
//! Callers describe their data with a signed element size: 1, 2 or 4 bytes,
//! or 3 for 10-bit samples; a negative size asks for swapped order. With
//! compression the elements are packed several to a wire word, element `i`
//! of a word at bit `i * bits`.

use rcuprims_frame::DataFormat;

use crate::error::{MsgBufError, Result};

/// Size and order of the caller's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementLayout {
    size: u8,
    swap: bool,
}

impl ElementLayout {
    /// Plain 32-bit words.
    pub const WORDS: ElementLayout = ElementLayout {
        size: 4,
        swap: false,
    };

    pub fn new(size: u8, swap: bool) -> Result<Self> {
        if !(1..=4).contains(&size) {
            return Err(MsgBufError::InvalidParameter(format!(
                "element size {size} (expected 1, 2, 3 or 4)"
            )));
        }
        Ok(Self { size, swap })
    }

    /// From the signed convention: magnitude is the size, negative swaps.
    pub fn from_signed(size: i32) -> Result<Self> {
        let magnitude = u8::try_from(size.unsigned_abs()).map_err(|_| {
            MsgBufError::InvalidParameter(format!("element size {size} out of range"))
        })?;
        Self::new(magnitude, size < 0)
    }

    pub fn size(self) -> u8 {
        self.size
    }

    pub fn swap(self) -> bool {
        self.swap
    }

    /// Signed form of this layout.
    pub fn to_signed(self) -> i32 {
        if self.swap {
            -i32::from(self.size)
        } else {
            i32::from(self.size)
        }
    }

    /// Wire format: packed when `compress` is set, one element per word
    /// otherwise.
    pub fn data_format(self, compress: bool) -> DataFormat {
        if compress {
            DataFormat::for_element_size(self.size).unwrap_or(DataFormat::Word32)
        } else {
            DataFormat::Word32
        }
    }

    /// Significant bits of one element.
    pub fn element_mask(self) -> u32 {
        match self.size {
            1 => 0xff,
            2 => 0xffff,
            3 => 0x3ff,
            _ => u32::MAX,
        }
    }

    /// Byte-order swap of a single unpacked element.
    fn swap_value(self, value: u32) -> u32 {
        match self.size {
            4 => value.swap_bytes(),
            2 => u32::from((value as u16).swap_bytes()),
            _ => value,
        }
    }
}

/// Wire words needed for `count` elements in `format`.
pub fn words_for(count: usize, format: DataFormat) -> usize {
    count.div_ceil(format.elements_per_word())
}

/// Pack `values` into wire words.
pub fn pack(values: &[u32], layout: ElementLayout, format: DataFormat) -> Vec<u32> {
    let mask = layout.element_mask();
    let per_word = format.elements_per_word();
    if per_word == 1 {
        return values
            .iter()
            .map(|v| {
                let v = v & mask;
                if layout.swap {
                    layout.swap_value(v)
                } else {
                    v
                }
            })
            .collect();
    }

    let bits = format.element_bits();
    values
        .chunks(per_word)
        .map(|chunk| {
            chunk.iter().enumerate().fold(0u32, |word, (i, v)| {
                let position = slot(i, per_word, layout.swap) as u32;
                word | ((v & mask) << (position * bits))
            })
        })
        .collect()
}

/// Unpack `count` elements from wire words. Missing words read as zero.
pub fn unpack(words: &[u32], count: usize, layout: ElementLayout, format: DataFormat) -> Vec<u32> {
    let mask = layout.element_mask();
    let per_word = format.elements_per_word();
    if per_word == 1 {
        return (0..count)
            .map(|i| {
                let v = words.get(i).copied().unwrap_or(0);
                if layout.swap {
                    layout.swap_value(v) & mask
                } else {
                    v & mask
                }
            })
            .collect();
    }

    let bits = format.element_bits();
    (0..count)
        .map(|i| {
            let word = words.get(i / per_word).copied().unwrap_or(0);
            let position = slot(i % per_word, per_word, layout.swap) as u32;
            (word >> (position * bits)) & mask
        })
        .collect()
}

fn slot(index: usize, per_word: usize, swap: bool) -> usize {
    if swap {
        per_word - 1 - index
    } else {
        index
    }
}

/// Split `total` elements into chunks of at most `max`; the last chunk
/// carries the remainder. `max` must be nonzero.
pub fn chunk_sizes(total: usize, max: usize) -> impl Iterator<Item = usize> {
    let mut remaining = if max == 0 { 0 } else { total };
    std::iter::from_fn(move || {
        if remaining == 0 {
            return None;
        }
        let chunk = remaining.min(max);
        remaining -= chunk;
        Some(chunk)
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn signed_sizes() {
        let layout = ElementLayout::from_signed(-2).unwrap();
        assert_eq!((layout.size(), layout.swap()), (2, true));
        assert_eq!(layout.to_signed(), -2);
        assert!(ElementLayout::from_signed(0).is_err());
        assert!(ElementLayout::from_signed(5).is_err());
        assert!(ElementLayout::from_signed(i32::MIN).is_err());
    }

    #[test]
    fn compression_selects_format() {
        let layout = ElementLayout::new(3, false).unwrap();
        assert_eq!(layout.data_format(true), DataFormat::Sample10);
        assert_eq!(layout.data_format(false), DataFormat::Word32);
        assert_eq!(ElementLayout::WORDS.data_format(true), DataFormat::Word32);
    }

    #[test]
    fn bytes_pack_low_first() {
        let layout = ElementLayout::new(1, false).unwrap();
        let words = pack(&[0x11, 0x22, 0x33, 0x44, 0x55], layout, DataFormat::Byte8);
        assert_eq!(words, vec![0x4433_2211, 0x0000_0055]);
    }

    #[test]
    fn swap_reverses_element_order() {
        let layout = ElementLayout::new(2, true).unwrap();
        let words = pack(&[0x1111, 0x2222], layout, DataFormat::Half16);
        assert_eq!(words, vec![0x1111_2222]);
        assert_eq!(
            unpack(&words, 2, layout, DataFormat::Half16),
            vec![0x1111, 0x2222]
        );
    }

    #[test]
    fn ten_bit_samples() {
        let layout = ElementLayout::new(3, false).unwrap();
        let words = pack(&[0x3ff, 0x001, 0x155], layout, DataFormat::Sample10);
        assert_eq!(words, vec![0x3ff | (0x001 << 10) | (0x155 << 20)]);
        // Bits above 10 are dropped.
        assert_eq!(pack(&[0x7ff], layout, DataFormat::Sample10), vec![0x3ff]);
    }

    #[test]
    fn uncompressed_swap_reverses_bytes() {
        let layout = ElementLayout::new(4, true).unwrap();
        assert_eq!(
            pack(&[0x1122_3344], layout, DataFormat::Word32),
            vec![0x4433_2211]
        );
        let layout = ElementLayout::new(2, true).unwrap();
        assert_eq!(pack(&[0x1234], layout, DataFormat::Word32), vec![0x3412]);
        assert_eq!(unpack(&[0x3412], 1, layout, DataFormat::Word32), vec![0x1234]);
    }

    #[test]
    fn chunking() {
        assert_eq!(chunk_sizes(10, 4).collect::<Vec<_>>(), vec![4, 4, 2]);
        assert_eq!(chunk_sizes(8, 4).collect::<Vec<_>>(), vec![4, 4]);
        assert_eq!(chunk_sizes(0, 4).count(), 0);
        assert_eq!(chunk_sizes(5, 0).count(), 0);
    }

    fn formats() -> impl Strategy<Value = (ElementLayout, DataFormat)> {
        (1u8..=4, any::<bool>(), any::<bool>()).prop_map(|(size, swap, compress)| {
            let layout = ElementLayout::new(size, swap).unwrap();
            (layout, layout.data_format(compress))
        })
    }

    proptest! {
        #[test]
        fn chunks_sum_to_total(total in 0usize..10_000, max in 1usize..600) {
            let chunks: Vec<usize> = chunk_sizes(total, max).collect();
            prop_assert_eq!(chunks.iter().sum::<usize>(), total);
            prop_assert!(chunks.iter().all(|c| *c >= 1 && *c <= max));
            if let Some((last, full)) = chunks.split_last() {
                prop_assert!(full.iter().all(|c| *c == max));
                prop_assert!(*last <= max);
            }
        }

        #[test]
        fn unpack_inverts_pack(
            (layout, format) in formats(),
            values in proptest::collection::vec(any::<u32>(), 0..64),
        ) {
            let masked: Vec<u32> = values.iter().map(|v| v & layout.element_mask()).collect();
            let words = pack(&values, layout, format);
            prop_assert_eq!(words.len(), words_for(values.len(), format));
            prop_assert_eq!(unpack(&words, values.len(), layout, format), masked);
        }
    }
}

use bytes::{Buf, BufMut, BytesMut};
use tracing::debug;

use crate::codec::{Header, HeaderFormat};
use crate::error::{BlockError, Result};

/// Words in a result block before the payload: header and status.
pub const RESULT_OVERHEAD_WORDS: usize = 2;

/// Assembles a command sequence: one or more sub-blocks, each a header,
/// payload and block marker, followed by one end marker.
///
/// Block numbers count down so the last sub-block carries 0. Checksums are
/// written as 0; the firmware does not evaluate them.
#[derive(Debug, Clone)]
pub struct BlockBuilder<'f> {
    format: &'f HeaderFormat,
    blocks: Vec<(Header, Vec<u32>)>,
}

impl<'f> BlockBuilder<'f> {
    pub fn new(format: &'f HeaderFormat) -> Self {
        Self {
            format,
            blocks: Vec::new(),
        }
    }

    /// Append a sub-block for `command_id` with default format and mode bits.
    pub fn block(self, command_id: u32, payload: impl Into<Vec<u32>>) -> Self {
        self.block_with(Header::new(command_id), payload)
    }

    /// Append a sub-block using the command id, data format and mode of
    /// `header`. Word count and block number are filled in by [`finish`].
    ///
    /// [`finish`]: BlockBuilder::finish
    pub fn block_with(mut self, header: Header, payload: impl Into<Vec<u32>>) -> Self {
        self.blocks.push((header, payload.into()));
        self
    }

    /// Encode the sequence into words.
    pub fn finish(self) -> Result<Vec<u32>> {
        if self.blocks.is_empty() {
            return Err(BlockError::Empty);
        }
        let max_blocks = self.format.block_number.max_value() as usize + 1;
        if self.blocks.len() > max_blocks {
            return Err(BlockError::TooManyBlocks {
                blocks: self.blocks.len(),
                max: max_blocks,
            });
        }
        let max_words = self.format.word_count.max_value() as usize;

        let total: usize = self.blocks.iter().map(|(_, p)| p.len() + 2).sum::<usize>() + 1;
        let mut words = Vec::with_capacity(total);
        let last = self.blocks.len() - 1;
        for (index, (header, payload)) in self.blocks.into_iter().enumerate() {
            if payload.len() > max_words {
                return Err(BlockError::BlockTooLong {
                    words: payload.len(),
                    max: max_words,
                });
            }
            let header = header
                .with_word_count(payload.len() as u32)
                .with_block_number((last - index) as u32);
            words.push(self.format.make_header(&header));
            words.extend_from_slice(&payload);
            words.push(self.format.make_trailer(0));
        }
        words.push(self.format.make_end_marker());
        Ok(words)
    }
}

impl HeaderFormat {
    /// Validate the layout of a command sequence.
    ///
    /// Walks each sub-block (header, declared word count, block marker) until a
    /// block number of 0, then expects the end marker. Returns the number of
    /// words the sequence occupies. Payload contents are not interpreted.
    pub fn check_block(&self, words: &[u32]) -> Result<usize> {
        let mut offset = 0usize;
        loop {
            let header_word = *words.get(offset).ok_or(BlockError::Truncated {
                offset,
                len: words.len(),
            })?;
            let header = self.decode_header(header_word);

            let marker_offset = offset + 1 + header.word_count as usize;
            let marker = *words.get(marker_offset).ok_or(BlockError::Truncated {
                offset: marker_offset,
                len: words.len(),
            })?;
            if !self.is_block_marker(marker) {
                debug!(
                    offset = marker_offset,
                    found = marker,
                    block = header.block_number,
                    "block marker rejected"
                );
                return Err(BlockError::MissingBlockMarker {
                    offset: marker_offset,
                    found: marker,
                });
            }

            offset = marker_offset + 1;
            if header.block_number == 0 {
                break;
            }
        }

        let end = *words.get(offset).ok_or(BlockError::Truncated {
            offset,
            len: words.len(),
        })?;
        if !self.is_end_marker(end) {
            debug!(offset, found = end, "end marker rejected");
            return Err(BlockError::MissingEndMarker { offset, found: end });
        }
        Ok(offset + 1)
    }

    /// Split the first two words of a result block into header and status.
    pub fn decode_result(&self, words: &[u32]) -> Result<ResultHeader> {
        if words.len() < RESULT_OVERHEAD_WORDS {
            return Err(BlockError::Truncated {
                offset: words.len(),
                len: words.len(),
            });
        }
        Ok(ResultHeader {
            header: self.decode_header(words[0]),
            status: words[1],
        })
    }
}

/// Header and status word of a result block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultHeader {
    pub header: Header,
    pub status: u32,
}

impl ResultHeader {
    /// Declared payload length: word count minus header and status.
    /// `None` when the declared count cannot even hold those two words.
    pub fn payload_words(&self) -> Option<usize> {
        (self.header.word_count as usize).checked_sub(RESULT_OVERHEAD_WORDS)
    }
}

/// Append `words` little-endian.
pub fn encode_words(words: &[u32], dst: &mut BytesMut) {
    dst.reserve(words.len() * 4);
    for word in words {
        dst.put_u32_le(*word);
    }
}

/// Decode little-endian words; trailing bytes short of a word are ignored.
pub fn decode_words(mut src: &[u8]) -> Vec<u32> {
    let mut words = Vec::with_capacity(src.len() / 4);
    while src.remaining() >= 4 {
        words.push(src.get_u32_le());
    }
    words
}

use std::time::Duration;

use rcuprims_frame::command::{
    MULTI_READ, MULTI_WRITE, RANDOM_READ, RANDOM_WRITE, SINGLE_READ, SINGLE_WRITE,
};
use rcuprims_frame::{BlockBuilder, Header, RESULT_OVERHEAD_WORDS};
use tracing::debug;

use crate::channel::Channel;
use crate::error::{MsgBufError, Result};
use crate::pack::{chunk_sizes, pack, unpack, words_for, ElementLayout};

/// Command words around a multi-word payload: header, address, count,
/// block marker and end marker.
pub const MULTI_OVERHEAD_WORDS: usize = 5;

/// Command words around any payload: header, block marker and end marker.
pub const BLOCK_OVERHEAD_WORDS: usize = 3;

impl Channel {
    /// Build a single-block command and dispatch it.
    pub(crate) fn execute(
        &mut self,
        header: Header,
        payload: Vec<u32>,
        timeout: Duration,
    ) -> Result<Vec<u32>> {
        let words = BlockBuilder::new(self.format)
            .block_with(header, payload)
            .finish()?;
        self.dispatch(&words, timeout)
    }

    /// Most payload words one read can return.
    pub(crate) fn read_capacity(&self) -> Result<usize> {
        let layout = self.buffers.layout();
        if layout.command_in.words() < MULTI_OVERHEAD_WORDS {
            return Err(MsgBufError::InvalidParameter(format!(
                "command buffer of {} words cannot hold a read command",
                layout.command_in.words()
            )));
        }
        let words = layout
            .result_out
            .words()
            .min(self.format.word_count.max_value() as usize)
            .saturating_sub(RESULT_OVERHEAD_WORDS);
        if words == 0 {
            return Err(MsgBufError::InvalidParameter(
                "result buffer has no room for payload".to_string(),
            ));
        }
        Ok(words)
    }

    /// Most data words one write can carry after `overhead` command words.
    /// The block word count covers every payload word ahead of the data, so
    /// the field limit shrinks by the part of `overhead` inside the block.
    pub(crate) fn write_capacity(&self, overhead: usize) -> Result<usize> {
        let in_block = overhead.saturating_sub(BLOCK_OVERHEAD_WORDS);
        let words = self
            .buffers
            .layout()
            .command_in
            .words()
            .saturating_sub(overhead)
            .min((self.format.word_count.max_value() as usize).saturating_sub(in_block));
        if words == 0 {
            return Err(MsgBufError::InvalidParameter(
                "command buffer has no room for payload".to_string(),
            ));
        }
        Ok(words)
    }

    /// Read one word of RCU memory.
    pub fn single_read(&mut self, addr: u32) -> Result<u32> {
        let payload = self.execute(Header::new(SINGLE_READ), vec![addr], Duration::ZERO)?;
        payload
            .first()
            .copied()
            .ok_or(MsgBufError::UnexpectedPayload {
                expected: 1,
                got: 0,
            })
    }

    /// Write one word of RCU memory.
    pub fn single_write(&mut self, addr: u32, value: u32) -> Result<()> {
        self.execute(Header::new(SINGLE_WRITE), vec![addr, value], Duration::ZERO)?;
        Ok(())
    }

    /// Read `count` consecutive elements starting at `addr`, split over as
    /// many dispatches as the result buffer requires.
    pub fn multiple_read(
        &mut self,
        addr: u32,
        count: usize,
        layout: ElementLayout,
    ) -> Result<Vec<u32>> {
        let format = layout.data_format(self.compression_active());
        let max = self.read_capacity()? * format.elements_per_word();

        let mut values = Vec::with_capacity(count);
        let mut done = 0usize;
        for chunk in chunk_sizes(count, max) {
            let start = advance(addr, done)?;
            let header = Header::new(MULTI_READ).with_data_format(format.code());
            let payload = self.execute(header, vec![start, chunk as u32], Duration::ZERO)?;
            let expected = words_for(chunk, format);
            if payload.len() < expected {
                return Err(MsgBufError::UnexpectedPayload {
                    expected,
                    got: payload.len(),
                });
            }
            values.extend(unpack(&payload, chunk, layout, format));
            debug!(addr = start, elements = chunk, "multiple read chunk");
            done += chunk;
        }
        Ok(values)
    }

    /// Write consecutive elements starting at `addr`, split over as many
    /// dispatches as the command buffer requires.
    pub fn multiple_write(
        &mut self,
        addr: u32,
        values: &[u32],
        layout: ElementLayout,
    ) -> Result<()> {
        let format = layout.data_format(self.compression_active());
        let max = self.write_capacity(MULTI_OVERHEAD_WORDS)? * format.elements_per_word();

        let mut done = 0usize;
        for chunk in chunk_sizes(values.len(), max) {
            let start = advance(addr, done)?;
            let mut payload = vec![start, chunk as u32];
            payload.extend(pack(&values[done..done + chunk], layout, format));
            let header = Header::new(MULTI_WRITE).with_data_format(format.code());
            self.execute(header, payload, Duration::ZERO)?;
            debug!(addr = start, elements = chunk, "multiple write chunk");
            done += chunk;
        }
        Ok(())
    }

    /// Read a list of arbitrary addresses.
    pub fn random_read(&mut self, addrs: &[u32]) -> Result<Vec<u32>> {
        let max = self
            .read_capacity()?
            .min(self.write_capacity(BLOCK_OVERHEAD_WORDS)?);

        let mut values = Vec::with_capacity(addrs.len());
        for batch in addrs.chunks(max) {
            let payload = self.execute(Header::new(RANDOM_READ), batch.to_vec(), Duration::ZERO)?;
            if payload.len() < batch.len() {
                return Err(MsgBufError::UnexpectedPayload {
                    expected: batch.len(),
                    got: payload.len(),
                });
            }
            values.extend_from_slice(&payload[..batch.len()]);
        }
        Ok(values)
    }

    /// Write a list of address/value pairs.
    pub fn random_write(&mut self, pairs: &[(u32, u32)]) -> Result<()> {
        let max = self.write_capacity(BLOCK_OVERHEAD_WORDS)? / 2;
        if max == 0 {
            return Err(MsgBufError::InvalidParameter(
                "command buffer cannot hold an address/value pair".to_string(),
            ));
        }
        for batch in pairs.chunks(max) {
            let payload = batch.iter().flat_map(|(a, v)| [*a, *v]).collect::<Vec<_>>();
            self.execute(Header::new(RANDOM_WRITE), payload, Duration::ZERO)?;
        }
        Ok(())
    }
}

/// `addr + offset`, failing past the end of the address space.
pub(crate) fn advance(addr: u32, offset: usize) -> Result<u32> {
    u32::try_from(offset)
        .ok()
        .and_then(|offset| addr.checked_add(offset))
        .ok_or_else(|| {
            MsgBufError::InvalidParameter(format!(
                "address 0x{addr:x} + {offset} overflows the address space"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_advance() {
        assert_eq!(advance(0x1000, 16).unwrap(), 0x1010);
        assert!(advance(u32::MAX, 1).is_err());
    }
}

use std::sync::Arc;
use std::time::Duration;

use rcuprims_frame::command::command_name;
use rcuprims_frame::{decode_words, Header, StatusError, MODE_FLASH, RESULT_OVERHEAD_WORDS};
use tracing::{debug, error, warn};

use crate::channel::Channel;
use crate::config::OptionFlags;
use crate::error::{MsgBufError, Result};
use crate::mode::Mode;
use crate::poll::{PollLimit, PollOutcome, Poller};
use crate::registers::{CONTROL, CTRL_EXECUTE, CTRL_REREAD};

impl Channel {
    /// Execute one command sequence and return the result payload.
    ///
    /// The cycle runs inside the driver lock: check mode, write the command,
    /// optionally verify it, raise the execute bit, poll until the firmware
    /// clears it, then decode the result block. A zero `timeout` uses the
    /// configured default. The lock is released on every path.
    pub fn dispatch(&mut self, command: &[u32], timeout: Duration) -> Result<Vec<u32>> {
        self.lock()?;
        let result = self.dispatch_locked(command, timeout);
        let unlocked = self.unlock();
        let payload = result?;
        unlocked?;
        Ok(payload)
    }

    fn dispatch_locked(&mut self, command: &[u32], timeout: Duration) -> Result<Vec<u32>> {
        let Some(&header_word) = command.first() else {
            return Err(MsgBufError::InvalidParameter(
                "empty command sequence".to_string(),
            ));
        };
        let sent = self.format.decode_header(header_word);
        let name = command_name(sent.command_id, sent.mode);

        let capacity = self.buffers.layout().command_in.words();
        if command.len() > capacity {
            return Err(MsgBufError::CommandTooLarge {
                words: command.len(),
                capacity,
            });
        }

        let expected = if sent.mode == MODE_FLASH {
            Mode::Flash
        } else {
            Mode::MessageBuffer
        };
        let actual = self.mode()?;
        if actual != expected {
            return Err(MsgBufError::WrongMode { expected, actual });
        }

        let bytes = command.len() * 4;
        let staging = &mut self.buffers.command_in_mut()[..bytes];
        for (chunk, word) in staging.chunks_exact_mut(4).zip(command) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        let command_offset = self.buffers.layout().command_in.offset as u64;
        self.backend
            .write_all_at(command_offset, &self.buffers.command_in()[..bytes])?;
        debug!(command = name, words = command.len(), "command written");

        if self.config.flags.contains(OptionFlags::VERIFY) {
            self.verify_command(bytes)?;
        }

        self.set_register_bits(CONTROL, CTRL_EXECUTE)?;
        let timeout = self.config.effective_timeout(timeout);
        if self.wait_for_completion(timeout)? == PollOutcome::Expired {
            self.clear_register_bits(CONTROL, CTRL_EXECUTE)?;
            warn!(command = name, ?timeout, "command timed out");
            return Err(MsgBufError::Timeout(timeout));
        }

        let payload = self.read_result(&sent)?;
        debug!(command = name, payload_words = payload.len(), "command completed");
        Ok(payload)
    }

    /// Read the command back through the reread mux and compare it with
    /// the staged copy.
    fn verify_command(&mut self, bytes: usize) -> Result<()> {
        self.set_register_bits(CONTROL, CTRL_REREAD)?;
        let mut readback = vec![0u8; bytes];
        let command_offset = self.buffers.layout().command_in.offset as u64;
        let read = self.backend.read_exact_at(command_offset, &mut readback);
        self.clear_register_bits(CONTROL, CTRL_REREAD)?;
        read?;

        let staged = &self.buffers.command_in()[..bytes];
        let Some(offset) = staged.iter().zip(&readback).position(|(a, b)| a != b) else {
            return Ok(());
        };
        if self.config.flags.contains(OptionFlags::IGNORE_VERIFY_ERRORS) {
            warn!(offset, "command verification mismatch ignored");
            return Ok(());
        }
        Err(MsgBufError::VerificationFailed { offset })
    }

    fn wait_for_completion(&mut self, timeout: Duration) -> Result<PollOutcome> {
        let clock = Arc::clone(&self.clock);
        let poller = Poller::new(
            clock.as_ref(),
            self.config.poll_interval,
            PollLimit::Deadline(timeout),
        );
        poller.run(|| {
            let control = self.read_register(CONTROL)?;
            Ok::<_, MsgBufError>(control & CTRL_EXECUTE == 0)
        })
    }

    fn read_result(&mut self, sent: &Header) -> Result<Vec<u32>> {
        let region = self.buffers.layout().result_out;
        let capacity = region.words();
        if capacity < RESULT_OVERHEAD_WORDS {
            return Err(MsgBufError::InvalidParameter(format!(
                "result buffer of {} bytes cannot hold a result header",
                region.size
            )));
        }

        let head_bytes = RESULT_OVERHEAD_WORDS * 4;
        self.backend.read_exact_at(
            region.offset as u64,
            &mut self.buffers.result_out_mut()[..head_bytes],
        )?;
        let result = self
            .format
            .decode_result(&decode_words(&self.buffers.result_out()[..head_bytes]))?;

        if let Some(status) = StatusError::from_status(result.status) {
            debug!(status = result.status, %status, "firmware reported failure");
            return Err(status.into());
        }

        if result.header.command_id != sent.command_id {
            error!(
                sent = sent.command_id,
                echoed = result.header.command_id,
                "result echoes a different command"
            );
            return Err(MsgBufError::IdMismatch {
                sent: sent.command_id,
                echoed: result.header.command_id,
            });
        }

        let payload_words = match result.payload_words() {
            Some(words) if words <= capacity - RESULT_OVERHEAD_WORDS => words,
            _ => {
                error!(
                    declared = result.header.word_count,
                    capacity, "result declares an impossible word count"
                );
                return Err(MsgBufError::InvalidWordCount {
                    declared: result.header.word_count,
                    capacity,
                });
            }
        };

        let payload_bytes = head_bytes..head_bytes + payload_words * 4;
        self.backend.read_exact_at(
            (region.offset + head_bytes) as u64,
            &mut self.buffers.result_out_mut()[payload_bytes.clone()],
        )?;
        Ok(decode_words(&self.buffers.result_out()[payload_bytes]))
    }
}

use std::time::Duration;

use rcuprims_frame::{BlockError, StatusError};
use rcuprims_transport::TransportError;

use crate::mode::Mode;

/// Coarse classification of a [`MsgBufError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The wire or the backend failed: I/O, timeouts, verification.
    Transport,
    /// The firmware rejected this command through the status word.
    Protocol,
    /// The request was refused before touching hardware.
    Precondition,
    /// The firmware or board violated the protocol.
    HardwareFault,
}

/// Errors that can occur in message-buffer operations.
#[derive(Debug, thiserror::Error)]
pub enum MsgBufError {
    /// Backend-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The execute bit did not clear in time.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// The command read back from the buffer differs from what was written.
    #[error("command verification failed at byte {offset}")]
    VerificationFailed { offset: usize },

    /// The legacy flash controller stayed busy.
    #[error("flash controller not idle after {0} polls")]
    FlashTimeout(u32),

    /// The firmware reported a failure in the status word.
    #[error("firmware rejected command: {0}")]
    Status(#[from] StatusError),

    /// The channel is not in the mode the operation needs.
    #[error("wrong hardware mode: expected {expected}, found {actual}")]
    WrongMode { expected: Mode, actual: Mode },

    /// A mode change that would skip message-buffer mode.
    #[error("mode transition {from} -> {to} not allowed")]
    ModeTransitionNotAllowed { from: Mode, to: Mode },

    /// The command does not fit the command-in region.
    #[error("command of {words} words exceeds command buffer of {capacity} words")]
    CommandTooLarge { words: usize, capacity: usize },

    /// A register address outside the register file.
    #[error("register 0x{addr:02x} outside register file of {size} bytes")]
    RegisterOutOfRange { addr: usize, size: usize },

    /// The command sequence could not be built.
    #[error("invalid command block: {0}")]
    Block(#[from] BlockError),

    /// A caller-supplied argument is unusable.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The channel is seized by someone else (or already by us).
    #[error("channel is seized")]
    Busy,

    /// Release attempted with a token that is not the owner.
    #[error("release attempted by a non-owner")]
    NotOwner,

    /// The result echoes a different command id than was sent.
    #[error("result echoes command id {echoed:#x}, sent {sent:#x}")]
    IdMismatch { sent: u32, echoed: u32 },

    /// The result header declares an impossible word count.
    #[error("result declares {declared} words, result buffer holds {capacity}")]
    InvalidWordCount { declared: u32, capacity: usize },

    /// The result payload is shorter than the operation requires.
    #[error("result payload of {got} words, expected {expected}")]
    UnexpectedPayload { expected: usize, got: usize },

    /// A mode write did not read back.
    #[error("mode {target} not applied (control register reads 0x{readback:02x})")]
    ModeNotApplied { target: Mode, readback: u8 },

    /// Both mode bits are set in the control register.
    #[error("invalid mode bits in control register 0x{0:02x}")]
    InvalidModeBits(u8),
}

impl MsgBufError {
    /// Which layer of the taxonomy this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MsgBufError::Transport(TransportError::Busy) | MsgBufError::Busy => {
                ErrorKind::Precondition
            }
            MsgBufError::Transport(TransportError::NotOwner) | MsgBufError::NotOwner => {
                ErrorKind::Precondition
            }
            MsgBufError::Transport(_)
            | MsgBufError::Timeout(_)
            | MsgBufError::VerificationFailed { .. }
            | MsgBufError::FlashTimeout(_) => ErrorKind::Transport,
            MsgBufError::Status(_) => ErrorKind::Protocol,
            MsgBufError::WrongMode { .. }
            | MsgBufError::ModeTransitionNotAllowed { .. }
            | MsgBufError::CommandTooLarge { .. }
            | MsgBufError::RegisterOutOfRange { .. }
            | MsgBufError::Block(_)
            | MsgBufError::InvalidParameter(_) => ErrorKind::Precondition,
            MsgBufError::IdMismatch { .. }
            | MsgBufError::InvalidWordCount { .. }
            | MsgBufError::UnexpectedPayload { .. }
            | MsgBufError::ModeNotApplied { .. }
            | MsgBufError::InvalidModeBits(_) => ErrorKind::HardwareFault,
        }
    }

    /// Whether the firmware's status word caused this error.
    pub fn status(&self) -> Option<StatusError> {
        match self {
            MsgBufError::Status(status) => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MsgBufError>;

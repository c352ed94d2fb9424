use rcuprims_msgbuf::MsgBufError;

use crate::stream::Group;

/// Errors that can occur while routing a command stream.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The stream length is not a whole number of words.
    #[error("stream of {0} bytes is not word aligned")]
    Unaligned(usize),

    /// A command needs more words than the stream holds.
    #[error("command at word {offset} needs {needed} words, {available} left")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// The header's group code is not a known group.
    #[error("unknown command group in header 0x{word:08x} at word {offset}")]
    UnknownGroup { offset: usize, word: u32 },

    /// No handler is registered for the group.
    #[error("no handler registered for group {0}")]
    NoHandler(Group),

    /// The handler does not know this command id.
    #[error("unknown command 0x{id:x} in group {group}")]
    UnknownCommand { group: Group, id: u8 },

    /// A command parameter is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A command was not terminated by an end marker.
    #[error("missing end marker at word {offset}")]
    MissingEndMarker { offset: usize },

    /// The end marker carries another protocol version.
    #[error("protocol version {found} in end marker, expected {expected}")]
    VersionMismatch { found: u16, expected: u16 },

    /// The channel rejected the operation.
    #[error("channel error: {0}")]
    Channel(#[from] MsgBufError),
}

pub type Result<T> = std::result::Result<T, RouterError>;

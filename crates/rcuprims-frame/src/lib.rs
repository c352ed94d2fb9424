//! Versioned header codec and command-block layout for the RCU message buffer.
//!
//! Every command sent through the message buffer is a sequence of 32-bit words:
//! - A header carrying command id, word count, block number, data format and mode
//! - The payload (addresses, counts, data)
//! - A block marker (fixed pattern plus checksum)
//! - An end marker after the last sub-block
//!
//! Where each field lives depends on the firmware generation; a
//! [`HeaderFormat`] describes one generation and is passed explicitly to every
//! encode and decode call.

pub mod block;
pub mod codec;
pub mod command;
pub mod error;
pub mod status;

pub use block::{
    decode_words, encode_words, BlockBuilder, ResultHeader, RESULT_OVERHEAD_WORDS,
};
pub use codec::{
    select_format, BitField, FormatVersion, Header, HeaderFormat, Marker, FORMATS, FORMAT_V1,
    FORMAT_V2, FORMAT_V2_2,
};
pub use command::{DataFormat, MODE_FLASH, MODE_MESSAGE_BUFFER};
pub use error::{BlockError, Result};
pub use status::{check_status, StatusError};

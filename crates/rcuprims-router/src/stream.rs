//! Command stream header and end marker.
//!
//! ```text
//!  31    28 27    24 23            16 15                             0
//! +--------+--------+----------------+--------------------------------+
//! | group  |   id   |      sub       |             param              |
//! +--------+--------+----------------+--------------------------------+
//! ```
//!
//! `sub` carries a signed element size for transfers (negative = swap).
//! Each command, or a whole sequence, is terminated by an end marker:
//! `0xDD33` in the top half, the protocol version in the bottom half.

use std::fmt;

use bytes::BytesMut;
use rcuprims_frame::{decode_words, encode_words};

use crate::error::{Result, RouterError};

/// End marker pattern in the top 16 bits.
pub const END_MARKER_PATTERN: u16 = 0xdd33;

/// Protocol version carried by the end marker.
pub const PROTOCOL_VERSION: u16 = 1;

/// The end marker word for [`PROTOCOL_VERSION`].
pub const END_MARKER: u32 = ((END_MARKER_PATTERN as u32) << 16) | PROTOCOL_VERSION as u32;

/// Command groups selected by the top four header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Group {
    RcuMemory,
    DataReadout,
    RcuConfiguration,
    BufferTuning,
    ShellExec,
    ServiceSet,
    VendorReserved,
    ControlEngine,
}

impl Group {
    pub const ALL: [Group; 8] = [
        Group::RcuMemory,
        Group::DataReadout,
        Group::RcuConfiguration,
        Group::BufferTuning,
        Group::ShellExec,
        Group::ServiceSet,
        Group::VendorReserved,
        Group::ControlEngine,
    ];

    pub fn code(self) -> u8 {
        match self {
            Group::RcuMemory => 0x1,
            Group::DataReadout => 0x2,
            Group::RcuConfiguration => 0x3,
            Group::BufferTuning => 0x4,
            Group::ShellExec => 0x5,
            Group::ServiceSet => 0x6,
            Group::VendorReserved => 0xe,
            Group::ControlEngine => 0xf,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Group::ALL.into_iter().find(|group| group.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Group::RcuMemory => "rcu-memory",
            Group::DataReadout => "data-readout",
            Group::RcuConfiguration => "rcu-configuration",
            Group::BufferTuning => "buffer-tuning",
            Group::ShellExec => "shell-exec",
            Group::ServiceSet => "service-set",
            Group::VendorReserved => "vendor-reserved",
            Group::ControlEngine => "control-engine",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub group: Group,
    pub id: u8,
    pub sub: u8,
    pub param: u16,
}

impl CommandHeader {
    pub fn new(group: Group, id: u8) -> Self {
        Self {
            group,
            id: id & 0x0f,
            sub: 0,
            param: 0,
        }
    }

    pub fn with_sub(mut self, sub: u8) -> Self {
        self.sub = sub;
        self
    }

    /// Store a signed element size in `sub`.
    pub fn with_element_size(self, size: i8) -> Self {
        self.with_sub(size as u8)
    }

    pub fn with_param(mut self, param: u16) -> Self {
        self.param = param;
        self
    }

    /// `sub` read as a signed element size.
    pub fn element_size(&self) -> i32 {
        i32::from(self.sub as i8)
    }

    pub fn encode(&self) -> u32 {
        (u32::from(self.group.code()) << 28)
            | (u32::from(self.id & 0x0f) << 24)
            | (u32::from(self.sub) << 16)
            | u32::from(self.param)
    }

    /// Decode a header word. `None` when the group code is unknown.
    pub fn decode(word: u32) -> Option<Self> {
        let group = Group::from_code((word >> 28) as u8)?;
        Some(Self {
            group,
            id: ((word >> 24) & 0x0f) as u8,
            sub: ((word >> 16) & 0xff) as u8,
            param: (word & 0xffff) as u16,
        })
    }
}

impl fmt::Display for CommandHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/0x{:x} sub=0x{:02x} param=0x{:04x}",
            self.group, self.id, self.sub, self.param
        )
    }
}

/// Whether `word` carries the end-marker pattern, regardless of version.
pub fn is_end_marker(word: u32) -> bool {
    (word >> 16) as u16 == END_MARKER_PATTERN
}

/// Version field of an end marker.
pub fn end_marker_version(word: u32) -> u16 {
    (word & 0xffff) as u16
}

/// Split a little-endian byte stream into words.
pub fn stream_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(RouterError::Unaligned(bytes.len()));
    }
    Ok(decode_words(bytes))
}

/// Assembles a command stream, each command followed by an end marker.
#[derive(Debug, Default, Clone)]
pub struct StreamBuilder {
    words: Vec<u32>,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command(mut self, header: CommandHeader, payload: &[u32]) -> Self {
        self.words.push(header.encode());
        self.words.extend_from_slice(payload);
        self.words.push(END_MARKER);
        self
    }

    pub fn words(self) -> Vec<u32> {
        self.words
    }

    pub fn bytes(self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.words.len() * 4);
        encode_words(&self.words, &mut buf);
        buf
    }
}

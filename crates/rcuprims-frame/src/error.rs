/// Errors found while building or walking a command block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    /// The buffer ended before the layout was complete.
    #[error("block truncated: needed word {offset}, buffer holds {len}")]
    Truncated { offset: usize, len: usize },

    /// A sub-block is not followed by a block marker.
    #[error("missing block marker at word {offset} (found 0x{found:08x})")]
    MissingBlockMarker { offset: usize, found: u32 },

    /// The sequence is not terminated by an end marker.
    #[error("missing end marker at word {offset} (found 0x{found:08x})")]
    MissingEndMarker { offset: usize, found: u32 },

    /// More sub-blocks than the block-number field can count.
    #[error("too many blocks ({blocks}, max {max})")]
    TooManyBlocks { blocks: usize, max: usize },

    /// A sub-block payload longer than the word-count field can declare.
    #[error("block payload too long ({words} words, max {max})")]
    BlockTooLong { words: usize, max: usize },

    /// A builder was finished without any block.
    #[error("command sequence has no blocks")]
    Empty,
}

pub type Result<T> = std::result::Result<T, BlockError>;

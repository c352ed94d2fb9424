//! Result status word.
//!
//! The firmware reports a failed command through bits of the status word that
//! follows the result header. Several bits may be set at once; the bits are
//! checked in a fixed order and the last match wins.

/// No block marker found after the declared word count.
pub const STATUS_MISSING_MARKER: u32 = 0x01;
/// No end marker after the last block.
pub const STATUS_MISSING_END_MARKER: u32 = 0x02;
/// The addressed target did not answer.
pub const STATUS_NO_TARGET_ANSWER: u32 = 0x04;
/// The bus was not granted to the message-buffer interface.
pub const STATUS_NO_BUS_GRANT: u32 = 0x08;
/// The command used a header format the firmware no longer accepts.
pub const STATUS_STALE_FORMAT: u32 = 0x10;

/// Failure reported by the firmware in the status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StatusError {
    #[error("firmware found no block marker")]
    MissingMarker,
    #[error("firmware found no end marker")]
    MissingEndMarker,
    #[error("no answer from target")]
    NoTargetAnswer,
    #[error("no bus grant")]
    NoBusGrant,
    #[error("stale header format")]
    StaleFormat,
    #[error("unknown status 0x{0:08x}")]
    Unknown(u32),
}

impl StatusError {
    /// Map a status word to an error, `None` for success.
    pub fn from_status(status: u32) -> Option<Self> {
        if status == 0 {
            return None;
        }
        let mut error = StatusError::Unknown(status);
        if status & STATUS_MISSING_MARKER != 0 {
            error = StatusError::MissingMarker;
        }
        if status & STATUS_MISSING_END_MARKER != 0 {
            error = StatusError::MissingEndMarker;
        }
        if status & STATUS_NO_TARGET_ANSWER != 0 {
            error = StatusError::NoTargetAnswer;
        }
        if status & STATUS_NO_BUS_GRANT != 0 {
            error = StatusError::NoBusGrant;
        }
        if status & STATUS_STALE_FORMAT != 0 {
            error = StatusError::StaleFormat;
        }
        Some(error)
    }

    /// The status bit that produces this error (the raw word for `Unknown`).
    pub fn status_bits(self) -> u32 {
        match self {
            StatusError::MissingMarker => STATUS_MISSING_MARKER,
            StatusError::MissingEndMarker => STATUS_MISSING_END_MARKER,
            StatusError::NoTargetAnswer => STATUS_NO_TARGET_ANSWER,
            StatusError::NoBusGrant => STATUS_NO_BUS_GRANT,
            StatusError::StaleFormat => STATUS_STALE_FORMAT,
            StatusError::Unknown(word) => word,
        }
    }
}

/// `Ok(())` for a zero status word, the mapped error otherwise.
pub fn check_status(status: u32) -> std::result::Result<(), StatusError> {
    match StatusError::from_status(status) {
        None => Ok(()),
        Some(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_success() {
        assert_eq!(StatusError::from_status(0), None);
        assert!(check_status(0).is_ok());
    }

    #[test]
    fn single_bits() {
        assert_eq!(
            StatusError::from_status(STATUS_MISSING_MARKER),
            Some(StatusError::MissingMarker)
        );
        assert_eq!(
            StatusError::from_status(STATUS_MISSING_END_MARKER),
            Some(StatusError::MissingEndMarker)
        );
        assert_eq!(
            StatusError::from_status(STATUS_NO_BUS_GRANT),
            Some(StatusError::NoBusGrant)
        );
        assert_eq!(
            StatusError::from_status(STATUS_STALE_FORMAT),
            Some(StatusError::StaleFormat)
        );
    }

    #[test]
    fn later_checked_bit_wins() {
        assert_eq!(
            StatusError::from_status(STATUS_MISSING_MARKER | STATUS_NO_TARGET_ANSWER),
            Some(StatusError::NoTargetAnswer)
        );
        assert_eq!(
            StatusError::from_status(0x1f),
            Some(StatusError::StaleFormat)
        );
    }

    #[test]
    fn unrecognised_bits_are_kept() {
        assert_eq!(StatusError::from_status(0x40), Some(StatusError::Unknown(0x40)));
        assert_eq!(StatusError::Unknown(0x40).status_bits(), 0x40);
    }
}

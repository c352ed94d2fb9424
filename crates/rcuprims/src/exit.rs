use std::fmt;
use std::io;

use rcuprims_msgbuf::{ErrorKind, MsgBufError};
use rcuprims_router::RouterError;
use rcuprims_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
/// The firmware answered with a failure status.
pub const FIRMWARE_REJECTED: i32 = 40;
/// The board broke the protocol: bad echo, bad word count, mode not applied.
pub const HARDWARE_FAULT: i32 = 41;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
/// Seized by another owner.
pub const BUSY: i32 = 75;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_code(err.kind()), format!("{context}: {err}"))
}

pub fn transport_code(err: &TransportError) -> i32 {
    match err {
        TransportError::Open { source, .. }
        | TransportError::Control { source, .. }
        | TransportError::Io(source) => io_code(source.kind()),
        TransportError::Busy | TransportError::NotOwner => BUSY,
        _ => TRANSPORT_ERROR,
    }
}

pub fn msgbuf_code(err: &MsgBufError) -> i32 {
    match err {
        MsgBufError::Transport(err) => transport_code(err),
        MsgBufError::Timeout(_) | MsgBufError::FlashTimeout(_) => TIMEOUT,
        MsgBufError::Busy | MsgBufError::NotOwner => BUSY,
        other => match other.kind() {
            ErrorKind::Transport => TRANSPORT_ERROR,
            ErrorKind::Protocol => FIRMWARE_REJECTED,
            ErrorKind::Precondition => USAGE,
            ErrorKind::HardwareFault => HARDWARE_FAULT,
        },
    }
}

pub fn router_code(err: &RouterError) -> i32 {
    match err {
        RouterError::Channel(err) => msgbuf_code(err),
        _ => DATA_INVALID,
    }
}

pub fn msgbuf_error(context: &str, err: MsgBufError) -> CliError {
    CliError::new(msgbuf_code(&err), format!("{context}: {err}"))
}

pub fn router_error(context: &str, err: RouterError) -> CliError {
    CliError::new(router_code(&err), format!("{context}: {err}"))
}

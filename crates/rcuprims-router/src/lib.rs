//! Command-group router for RCU command streams.
//!
//! Application commands arrive as a stream of 32-bit words. Each command
//! starts with a header whose top four bits select a command group; the
//! router hands the command to the handler registered for that group and
//! collects the replies. Built-in handlers drive a shared
//! [`rcuprims_msgbuf::Channel`].

pub mod error;
pub mod handler;
pub mod rcu;
pub mod router;
pub mod stream;
pub mod tuning;

pub use error::{Result, RouterError};
pub use handler::{share, CommandHandler, SharedChannel};
pub use rcu::RcuMemoryHandler;
pub use router::{Reply, Router, RouterConfig};
pub use stream::{CommandHeader, Group, StreamBuilder, END_MARKER, PROTOCOL_VERSION};
pub use tuning::BufferTuningHandler;

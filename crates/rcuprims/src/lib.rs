//! Host-side protocol engine for the RCU message buffer.
//!
//! rcuprims drives the command-in/result-out buffer pair that sits between a
//! control host and a readout control unit: header encoding, block framing,
//! dispatch with completion polling, chunked memory and flash transfers, and
//! routing of application command streams.
//!
//! # Crate Structure
//!
//! - [`transport`]: backends for the device node, plain files and memory
//! - [`frame`]: versioned header codec and command-block layout
//! - [`msgbuf`]: the channel, dispatcher, transfers, flash and modes
//! - [`router`]: command-group router (behind `router` feature)

/// Re-export transport types.
pub mod transport {
    pub use rcuprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rcuprims_frame::*;
}

/// Re-export channel types.
pub mod msgbuf {
    pub use rcuprims_msgbuf::*;
}

/// Re-export router types (requires `router` feature).
#[cfg(feature = "router")]
pub mod router {
    pub use rcuprims_router::*;
}

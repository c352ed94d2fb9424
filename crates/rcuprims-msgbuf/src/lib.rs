//! Command/response engine for the RCU message buffer.
//!
//! A [`Channel`] owns a backend and runs the dispatch cycle: write a command
//! block into the command-in region, raise the execute bit, poll until the
//! firmware clears it, then decode the result block. On top of that sit
//! block-splitting memory transfers, configuration flash access and the
//! mode controller.
//!
//! ```no_run
//! use rcuprims_msgbuf::{Channel, ElementLayout};
//!
//! # fn main() -> rcuprims_msgbuf::Result<()> {
//! let mut channel = Channel::open("/dev/dcsc")?;
//! channel.single_write(0x7000, 0x1)?;
//! let values = channel.multiple_read(0x6000, 128, ElementLayout::WORDS)?;
//! # let _ = values;
//! channel.close()?;
//! # Ok(())
//! # }
//! ```

pub mod buffers;
pub mod channel;
pub mod config;
mod dispatch;
pub mod error;
pub mod flash;
mod io;
pub mod mode;
pub mod ops;
pub mod pack;
pub mod poll;
pub mod registers;
pub mod sim;

pub use buffers::{BufferLayout, Buffers, Region};
pub use channel::{version_string, Channel, ChannelInfo};
pub use config::{ChannelConfig, OptionFlags};
pub use error::{ErrorKind, MsgBufError, Result};
pub use flash::{FlashAccess, FlashErase, FlashId};
pub use mode::Mode;
pub use pack::{chunk_sizes, pack, unpack, ElementLayout};
pub use poll::{Clock, ManualClock, PollLimit, PollOutcome, Poller, SystemClock};
pub use sim::{SimHandle, SimulatedRcu};

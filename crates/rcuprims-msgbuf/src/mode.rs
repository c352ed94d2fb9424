use std::fmt;

use tracing::{debug, error};

use crate::channel::Channel;
use crate::error::{MsgBufError, Result};
use crate::registers::{CONTROL, CTRL_FLASH, CTRL_MODE_MASK, CTRL_SELECTMAP};

/// Hardware access mode, held in the mode bits of the control register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    MessageBuffer,
    Flash,
    SelectMap,
}

impl Mode {
    /// Decode the mode bits of a control register value.
    pub fn from_control(control: u8) -> Result<Self> {
        match control & CTRL_MODE_MASK {
            0 => Ok(Mode::MessageBuffer),
            CTRL_FLASH => Ok(Mode::Flash),
            CTRL_SELECTMAP => Ok(Mode::SelectMap),
            _ => Err(MsgBufError::InvalidModeBits(control)),
        }
    }

    /// Mode bits this mode sets in the control register.
    pub fn control_bits(self) -> u8 {
        match self {
            Mode::MessageBuffer => 0,
            Mode::Flash => CTRL_FLASH,
            Mode::SelectMap => CTRL_SELECTMAP,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::MessageBuffer => "message-buffer",
            Mode::Flash => "flash",
            Mode::SelectMap => "selectmap",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = MsgBufError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "message-buffer" | "msgbuf" => Ok(Mode::MessageBuffer),
            "flash" => Ok(Mode::Flash),
            "selectmap" => Ok(Mode::SelectMap),
            other => Err(MsgBufError::InvalidParameter(format!(
                "unknown mode '{other}'"
            ))),
        }
    }
}

impl Channel {
    /// Current mode as read from the control register.
    pub fn mode(&mut self) -> Result<Mode> {
        let control = self.read_register(CONTROL)?;
        Mode::from_control(control).inspect_err(|_| {
            error!(control, "both mode bits set in control register");
        })
    }

    /// Whether the channel is currently in `target` mode.
    pub fn check_mode(&mut self, target: Mode) -> Result<bool> {
        Ok(self.mode()? == target)
    }

    /// Switch to `target` mode.
    ///
    /// Flash and selectmap are only entered from message-buffer mode. The
    /// write is read back; a control register that does not show the new mode
    /// is a hardware fault.
    pub fn set_mode(&mut self, target: Mode) -> Result<()> {
        let current = self.mode()?;
        if current == target {
            return Ok(());
        }
        if current != Mode::MessageBuffer && target != Mode::MessageBuffer {
            return Err(MsgBufError::ModeTransitionNotAllowed {
                from: current,
                to: target,
            });
        }

        self.update_register(CONTROL, CTRL_MODE_MASK, target.control_bits())?;
        let readback = self.read_register(CONTROL)?;
        if readback & CTRL_MODE_MASK != target.control_bits() {
            error!(%target, readback, "mode change did not take effect");
            return Err(MsgBufError::ModeNotApplied { target, readback });
        }
        debug!(from = %current, to = %target, "mode changed");
        Ok(())
    }
}

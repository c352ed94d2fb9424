use rcuprims_frame::{FORMAT_V2, FORMAT_V2_2};
use rcuprims_msgbuf::{Channel, SimulatedRcu};
use rcuprims_transport::BackendConfig;
use tracing::debug;

use crate::cmd::DeviceArgs;
use crate::exit::{msgbuf_error, CliError, CliResult};

/// Device names with this prefix open a simulated board.
pub const SIM_PREFIX: &str = "sim:";

/// Firmware version word for a simulated board name, `None` for real
/// devices and files.
pub fn sim_firmware(name: &str) -> CliResult<Option<u32>> {
    let Some(variant) = name.strip_prefix(SIM_PREFIX) else {
        return Ok(None);
    };
    let firmware = match variant {
        "" | "v2.2" => FORMAT_V2_2.min_firmware,
        "v2" => FORMAT_V2.min_firmware,
        "v1" => 0x0001_0000,
        other => {
            return Err(CliError::usage(format!(
                "unknown simulated board '{other}' (expected v1, v2 or v2.2)"
            )))
        }
    };
    Ok(Some(firmware))
}

pub fn open_channel(args: &DeviceArgs) -> CliResult<Channel> {
    let config = args.channel_config()?;
    let opened = match sim_firmware(&args.device)? {
        Some(firmware_version) => {
            debug!(firmware = firmware_version, "opening simulated board");
            let (backend, _) = SimulatedRcu::backend(BackendConfig {
                firmware_version,
                ..config.file_backend
            });
            Channel::from_backend(Box::new(backend), config)
        }
        None => Channel::open_with_config(&args.device, config),
    };
    opened.map_err(|err| msgbuf_error(&format!("failed to open {}", args.device), err))
}

/// Close the channel, reporting a failed release.
pub fn close_channel(channel: Channel) -> CliResult<()> {
    channel
        .close()
        .map_err(|err| msgbuf_error("failed to close channel", err))
}

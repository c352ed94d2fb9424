use serde::Serialize;

use rcuprims_msgbuf::{version_string, ChannelInfo, OptionFlags, Region};

use crate::cmd::InfoArgs;
use crate::device::{close_channel, open_channel};
use crate::exit::{msgbuf_error, CliResult, SUCCESS};
use crate::output::{new_table, print_json, OutputFormat};

#[derive(Serialize)]
struct RegionOutput {
    offset: usize,
    size: usize,
}

impl From<Region> for RegionOutput {
    fn from(region: Region) -> Self {
        Self {
            offset: region.offset,
            size: region.size,
        }
    }
}

#[derive(Serialize)]
struct InfoOutput {
    schema_id: &'static str,
    device: String,
    backend: &'static str,
    firmware_version: String,
    driver_version: String,
    header_format: String,
    command_in: RegionOutput,
    result_out: RegionOutput,
    register_file: RegionOutput,
    flash_access: String,
    mode: String,
    flags: Vec<&'static str>,
    timeout_ms: u128,
    degraded: bool,
}

impl InfoOutput {
    fn new(device: String, info: ChannelInfo, mode: String) -> Self {
        Self {
            schema_id: "rcuprims.cli.v1.channel-info",
            device,
            backend: info.backend,
            firmware_version: version_string(info.firmware_version),
            driver_version: version_string(info.driver_version),
            header_format: info.format.to_string(),
            command_in: info.layout.command_in.into(),
            result_out: info.layout.result_out.into(),
            register_file: info.layout.register_file.into(),
            flash_access: info.flash_access.to_string(),
            mode,
            flags: flag_names(info.flags),
            timeout_ms: info.timeout.as_millis(),
            degraded: info.degraded,
        }
    }
}

fn flag_names(flags: OptionFlags) -> Vec<&'static str> {
    [
        (OptionFlags::VERIFY, "verify"),
        (OptionFlags::IGNORE_VERIFY_ERRORS, "ignore-verify-errors"),
        (OptionFlags::COMPRESSION, "compression"),
    ]
    .into_iter()
    .filter(|(flag, _)| flags.contains(*flag))
    .map(|(_, name)| name)
    .collect()
}

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let mut channel = open_channel(&args.device)?;
    let mode = channel
        .mode()
        .map_err(|err| msgbuf_error("failed to read mode", err))?;
    let out = InfoOutput::new(args.device.device.clone(), channel.info(), mode.to_string());
    close_channel(channel)?;

    print_info(&out, format);
    Ok(SUCCESS)
}

fn print_info(out: &InfoOutput, format: OutputFormat) {
    let region = |r: &RegionOutput| format!("{} bytes at 0x{:x}", r.size, r.offset);
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            table
                .add_row(vec!["device".to_string(), out.device.clone()])
                .add_row(vec!["backend".to_string(), out.backend.to_string()])
                .add_row(vec!["firmware".to_string(), out.firmware_version.clone()])
                .add_row(vec!["driver".to_string(), out.driver_version.clone()])
                .add_row(vec!["header format".to_string(), out.header_format.clone()])
                .add_row(vec!["command in".to_string(), region(&out.command_in)])
                .add_row(vec!["result out".to_string(), region(&out.result_out)])
                .add_row(vec!["registers".to_string(), region(&out.register_file)])
                .add_row(vec!["flash access".to_string(), out.flash_access.clone()])
                .add_row(vec!["mode".to_string(), out.mode.clone()])
                .add_row(vec!["flags".to_string(), out.flags.join(", ")])
                .add_row(vec!["timeout".to_string(), format!("{}ms", out.timeout_ms)])
                .add_row(vec!["degraded".to_string(), out.degraded.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Channel Info:");
            println!("  Device:        {} ({})", out.device, out.backend);
            println!(
                "  Firmware:      {} (header format {})",
                out.firmware_version, out.header_format
            );
            println!("  Driver:        {}", out.driver_version);
            println!("  Command in:    {}", region(&out.command_in));
            println!("  Result out:    {}", region(&out.result_out));
            println!("  Registers:     {}", region(&out.register_file));
            println!("  Flash access:  {}", out.flash_access);
            println!("  Mode:          {}", out.mode);
            if out.degraded {
                println!("  Warning:       buffers below minimum size");
            }
        }
        OutputFormat::Raw => println!("{}", out.header_format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_named() {
        assert!(flag_names(OptionFlags::empty()).is_empty());
        assert_eq!(
            flag_names(OptionFlags::VERIFY | OptionFlags::COMPRESSION),
            vec!["verify", "compression"]
        );
    }
}

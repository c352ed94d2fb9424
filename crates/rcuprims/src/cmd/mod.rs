use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use rcuprims_msgbuf::{ChannelConfig, FlashAccess, OptionFlags};

use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod exec;
pub mod flash;
pub mod info;
pub mod read;
pub mod version;
pub mod write;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a device and print its negotiated parameters.
    Info(InfoArgs),
    /// Read RCU memory.
    Read(ReadArgs),
    /// Write RCU memory.
    Write(WriteArgs),
    /// Read, program, erase or identify the on-board flash.
    Flash(FlashArgs),
    /// Route a command stream through the built-in handlers.
    Exec(ExecArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Info(args) => info::run(args, format),
        Command::Read(args) => read::run(args, format),
        Command::Write(args) => write::run(args),
        Command::Flash(args) => flash::run(args, format),
        Command::Exec(args) => exec::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// How to reach the board.
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Device node, backing file, or `sim:[v1|v2|v2.2]` for a simulated board.
    #[arg(env = "RCUPRIMS_DEVICE")]
    pub device: String,
    /// Completion timeout per command (e.g. 2s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
    /// Read every command back before executing it.
    #[arg(long)]
    pub verify: bool,
    /// Log verification mismatches instead of failing.
    #[arg(long, requires = "verify")]
    pub ignore_verify_errors: bool,
    /// Pack sub-word elements into wire words where the firmware allows it.
    #[arg(long)]
    pub compress: bool,
    /// Force the flash access path (message-buffer or legacy-bus).
    #[arg(long, value_parser = parse_flash_access)]
    pub flash_access: Option<FlashAccess>,
}

impl DeviceArgs {
    pub fn channel_config(&self) -> CliResult<ChannelConfig> {
        let mut flags = OptionFlags::empty();
        flags.set(OptionFlags::VERIFY, self.verify);
        flags.set(OptionFlags::IGNORE_VERIFY_ERRORS, self.ignore_verify_errors);
        flags.set(OptionFlags::COMPRESSION, self.compress);

        let mut config = ChannelConfig::default().with_flags(flags);
        if let Some(timeout) = &self.timeout {
            config = config.with_timeout(parse_duration(timeout)?);
        }
        if let Some(access) = self.flash_access {
            config = config.with_flash_access(access);
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Start address (decimal or 0x-prefixed hex).
    #[arg(value_parser = parse_number, required_unless_present = "random")]
    pub address: Option<u32>,
    /// Number of elements to read.
    #[arg(long, short = 'n', default_value = "1")]
    pub count: usize,
    /// Element size in bytes: 1, 2, 4, or 3 for 10-bit samples.
    #[arg(long, default_value = "4")]
    pub size: u8,
    /// Swap element order within each word.
    #[arg(long)]
    pub swap: bool,
    /// Read a list of arbitrary addresses instead of a range.
    #[arg(
        long,
        value_delimiter = ',',
        value_parser = parse_number,
        conflicts_with_all = ["address", "count"]
    )]
    pub random: Option<Vec<u32>>,
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Start address (decimal or 0x-prefixed hex).
    #[arg(value_parser = parse_number, required_unless_present = "pairs")]
    pub address: Option<u32>,
    /// Values written to consecutive addresses.
    #[arg(value_parser = parse_number, required_unless_present = "pairs")]
    pub values: Vec<u32>,
    /// Element size in bytes: 1, 2, 4, or 3 for 10-bit samples.
    #[arg(long, default_value = "4")]
    pub size: u8,
    /// Swap element order within each word.
    #[arg(long)]
    pub swap: bool,
    /// Write `address=value` pairs instead of a range.
    #[arg(
        long,
        value_delimiter = ',',
        value_parser = parse_pair,
        conflicts_with_all = ["address", "values"]
    )]
    pub pairs: Option<Vec<(u32, u32)>>,
}

#[derive(Args, Debug)]
pub struct FlashArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    #[command(subcommand)]
    pub action: FlashAction,
}

#[derive(Subcommand, Debug)]
pub enum FlashAction {
    /// Read 16-bit flash words.
    Read {
        #[arg(value_parser = parse_number)]
        address: u32,
        #[arg(long, short = 'n', default_value = "1")]
        count: usize,
    },
    /// Program 16-bit flash words.
    Write {
        #[arg(value_parser = parse_number)]
        address: u32,
        #[arg(value_parser = parse_half_word, required = true)]
        values: Vec<u16>,
    },
    /// Erase one sector, a run of sectors, or the whole device.
    Erase {
        #[arg(long, value_parser = parse_number, conflicts_with = "all")]
        sector: Option<u32>,
        /// Number of consecutive sectors starting at --sector.
        #[arg(long, requires = "sector")]
        count: Option<u32>,
        #[arg(long)]
        all: bool,
    },
    /// Print the manufacturer and device ids.
    Id,
    /// Return the flash to read-array mode.
    Reset,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Read the stream from a file of little-endian words.
    #[arg(long, conflicts_with = "words", required_unless_present = "words")]
    pub file: Option<PathBuf>,
    /// Stream words, comma-separated.
    #[arg(long, value_delimiter = ',', value_parser = parse_number)]
    pub words: Option<Vec<u32>>,
    /// Accept commands without end markers.
    #[arg(long)]
    pub relaxed: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Decimal or `0x`-prefixed hexadecimal.
pub fn parse_number(input: &str) -> Result<u32, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid number '{input}'"))
}

fn parse_half_word(input: &str) -> Result<u16, String> {
    let value = parse_number(input)?;
    u16::try_from(value).map_err(|_| format!("flash value {value:#x} exceeds 16 bits"))
}

fn parse_pair(input: &str) -> Result<(u32, u32), String> {
    let (address, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected address=value, got '{input}'"))?;
    Ok((parse_number(address)?, parse_number(value)?))
}

fn parse_flash_access(input: &str) -> Result<FlashAccess, String> {
    input.parse().map_err(|err: rcuprims_msgbuf::MsgBufError| err.to_string())
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

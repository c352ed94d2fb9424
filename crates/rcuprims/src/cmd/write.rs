use rcuprims_msgbuf::{Channel, ElementLayout};
use tracing::info;

use crate::cmd::WriteArgs;
use crate::device::{close_channel, open_channel};
use crate::exit::{msgbuf_error, CliError, CliResult, SUCCESS};

pub fn run(args: WriteArgs) -> CliResult<i32> {
    let mut channel = open_channel(&args.device)?;
    let written = write_values(&mut channel, &args);
    let closed = close_channel(channel);
    let count = written?;
    closed?;

    info!(count, "write complete");
    Ok(SUCCESS)
}

fn write_values(channel: &mut Channel, args: &WriteArgs) -> CliResult<usize> {
    if let Some(pairs) = &args.pairs {
        channel
            .random_write(pairs)
            .map_err(|err| msgbuf_error("random write failed", err))?;
        return Ok(pairs.len());
    }

    let address = args
        .address
        .ok_or_else(|| CliError::usage("an address is required"))?;
    if args.values.is_empty() {
        return Err(CliError::usage("at least one value is required"));
    }
    let layout = ElementLayout::new(args.size, args.swap)
        .map_err(|err| msgbuf_error("invalid element layout", err))?;

    let written = match args.values.as_slice() {
        [value] if layout == ElementLayout::WORDS => channel.single_write(address, *value),
        values => channel.multiple_write(address, values, layout),
    };
    written.map_err(|err| msgbuf_error("write failed", err))?;
    Ok(args.values.len())
}

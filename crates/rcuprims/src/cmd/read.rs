use rcuprims_msgbuf::{Channel, ElementLayout};

use crate::cmd::ReadArgs;
use crate::device::{close_channel, open_channel};
use crate::exit::{msgbuf_error, CliError, CliResult, SUCCESS};
use crate::output::{print_cells, Cell, OutputFormat};

pub fn run(args: ReadArgs, format: OutputFormat) -> CliResult<i32> {
    let mut channel = open_channel(&args.device)?;
    let read = read_cells(&mut channel, &args);
    let closed = close_channel(channel);
    let cells = read?;
    closed?;

    print_cells("memory", &cells, value_width(args.size), format);
    Ok(SUCCESS)
}

fn read_cells(channel: &mut Channel, args: &ReadArgs) -> CliResult<Vec<Cell>> {
    if let Some(addrs) = &args.random {
        let values = channel
            .random_read(addrs)
            .map_err(|err| msgbuf_error("random read failed", err))?;
        return Ok(addrs
            .iter()
            .zip(values)
            .map(|(&address, value)| Cell { address, value })
            .collect());
    }

    let address = args
        .address
        .ok_or_else(|| CliError::usage("an address is required"))?;
    let layout = ElementLayout::new(args.size, args.swap)
        .map_err(|err| msgbuf_error("invalid element layout", err))?;

    let values = if args.count == 1 && layout == ElementLayout::WORDS {
        channel
            .single_read(address)
            .map(|value| vec![value])
            .map_err(|err| msgbuf_error("read failed", err))?
    } else {
        channel
            .multiple_read(address, args.count, layout)
            .map_err(|err| msgbuf_error("read failed", err))?
    };
    Ok(sequential_cells(address, values))
}

pub(crate) fn sequential_cells(start: u32, values: Vec<u32>) -> Vec<Cell> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| Cell {
            address: start.wrapping_add(i as u32),
            value,
        })
        .collect()
}

/// Bytes needed to print one element; 10-bit samples print as half-words.
pub(crate) fn value_width(size: u8) -> usize {
    match size {
        1 => 1,
        2 | 3 => 2,
        _ => 4,
    }
}

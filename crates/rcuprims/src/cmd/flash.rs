use serde::Serialize;

use rcuprims_msgbuf::{Channel, FlashErase, FlashId};
use tracing::info;

use crate::cmd::read::sequential_cells;
use crate::cmd::{FlashAction, FlashArgs};
use crate::device::{close_channel, open_channel};
use crate::exit::{msgbuf_error, CliError, CliResult, SUCCESS};
use crate::output::{hex, new_table, print_cells, print_json, Cell, OutputFormat};

enum Outcome {
    Cells(Vec<Cell>),
    Id(FlashId),
    Done,
}

#[derive(Serialize)]
struct IdOutput {
    schema_id: &'static str,
    manufacturer: u16,
    device: u16,
}

pub fn run(args: FlashArgs, format: OutputFormat) -> CliResult<i32> {
    let erase = erase_target(&args.action)?;
    let mut channel = open_channel(&args.device)?;
    let outcome = perform(&mut channel, &args.action, erase);
    let closed = close_channel(channel);
    let outcome = outcome?;
    closed?;

    match outcome {
        Outcome::Cells(cells) => print_cells("flash", &cells, 2, format),
        Outcome::Id(id) => print_id(id, format),
        Outcome::Done => info!("flash operation complete"),
    }
    Ok(SUCCESS)
}

fn erase_target(action: &FlashAction) -> CliResult<Option<FlashErase>> {
    let FlashAction::Erase { sector, count, all } = action else {
        return Ok(None);
    };
    let erase = match (sector, count, all) {
        (None, _, true) => FlashErase::All,
        (Some(sector), None, false) => FlashErase::Sector(*sector),
        (Some(first), Some(count), false) => FlashErase::Sectors {
            first: *first,
            count: *count,
        },
        _ => return Err(CliError::usage("erase needs --sector [--count] or --all")),
    };
    Ok(Some(erase))
}

fn perform(
    channel: &mut Channel,
    action: &FlashAction,
    erase: Option<FlashErase>,
) -> CliResult<Outcome> {
    let outcome = match action {
        FlashAction::Read { address, count } => channel
            .flash_read(*address, *count)
            .map(|words| {
                Outcome::Cells(sequential_cells(
                    *address,
                    words.into_iter().map(u32::from).collect(),
                ))
            }),
        FlashAction::Write { address, values } => channel
            .flash_write(*address, values)
            .map(|()| Outcome::Done),
        FlashAction::Erase { .. } => match erase {
            Some(erase) => channel.flash_erase(erase).map(|()| Outcome::Done),
            None => return Err(CliError::usage("nothing to erase")),
        },
        FlashAction::Id => channel.flash_identify().map(Outcome::Id),
        FlashAction::Reset => channel.flash_reset().map(|()| Outcome::Done),
    };
    outcome.map_err(|err| msgbuf_error("flash operation failed", err))
}

fn print_id(id: FlashId, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&IdOutput {
            schema_id: "rcuprims.cli.v1.flash-id",
            manufacturer: id.manufacturer,
            device: id.device,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["MANUFACTURER", "DEVICE"]);
            table.add_row(vec![
                hex(u32::from(id.manufacturer), 2),
                hex(u32::from(id.device), 2),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => println!(
            "{} {}",
            hex(u32::from(id.manufacturer), 2),
            hex(u32::from(id.device), 2)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn erase(sector: Option<u32>, count: Option<u32>, all: bool) -> CliResult<Option<FlashErase>> {
        erase_target(&FlashAction::Erase { sector, count, all })
    }

    #[test]
    fn erase_targets() {
        assert_eq!(erase(None, None, true).unwrap(), Some(FlashErase::All));
        assert_eq!(erase(Some(3), None, false).unwrap(), Some(FlashErase::Sector(3)));
        assert_eq!(
            erase(Some(3), Some(2), false).unwrap(),
            Some(FlashErase::Sectors { first: 3, count: 2 })
        );
        assert!(erase(None, None, false).is_err());
        assert_eq!(erase_target(&FlashAction::Id).unwrap(), None);
    }
}

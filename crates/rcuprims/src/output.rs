use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One address/value pair from a memory or flash read.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub address: u32,
    pub value: u32,
}

#[derive(Serialize)]
struct ReadOutput<'a> {
    schema_id: &'static str,
    space: &'a str,
    count: usize,
    values: &'a [Cell],
}

/// Print read results. `space` names the address space ("memory", "flash").
/// Raw output is the values as little-endian words, or half-words for flash.
pub fn print_cells(space: &str, cells: &[Cell], value_width: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ReadOutput {
            schema_id: "rcuprims.cli.v1.read-result",
            space,
            count: cells.len(),
            values: cells,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["ADDRESS", "VALUE", "DECIMAL"]);
            for cell in cells {
                table.add_row(vec![
                    format!("0x{:06x}", cell.address),
                    hex(cell.value, value_width),
                    cell.value.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for cell in cells {
                println!("0x{:06x}: {}", cell.address, hex(cell.value, value_width));
            }
        }
        OutputFormat::Raw => {
            let mut bytes = Vec::with_capacity(cells.len() * value_width);
            for cell in cells {
                let le = cell.value.to_le_bytes();
                bytes.extend_from_slice(&le[..value_width.min(4)]);
            }
            print_raw(&bytes);
        }
    }
}

pub fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// Zero-padded hex for a value `width` bytes wide.
pub fn hex(value: u32, width: usize) -> String {
    format!("0x{value:0digits$x}", digits = width * 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_pads_to_width() {
        assert_eq!(hex(0x42, 4), "0x00000042");
        assert_eq!(hex(0xbeef, 2), "0xbeef");
        assert_eq!(hex(7, 1), "0x07");
    }

    #[test]
    fn read_output_serializes_cells() {
        let cells = [Cell {
            address: 0x1000,
            value: 0x42,
        }];
        let out = ReadOutput {
            schema_id: "rcuprims.cli.v1.read-result",
            space: "memory",
            count: 1,
            values: &cells,
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["values"][0]["address"], 4096);
        assert_eq!(json["values"][0]["value"], 66);
        assert_eq!(json["space"], "memory");
    }
}

#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::{Command, Output};

// Router stream words for the rcu-memory group (group 1).
const END: u32 = 0xdd33_0001;
const SINGLE_WRITE: u32 = 0x1200_0000;
const SINGLE_READ: u32 = 0x1100_0000;

fn rcuprims(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rcuprims"))
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("rcuprims should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("stdout should be json")
}

fn words_arg(words: &[u32]) -> String {
    words
        .iter()
        .map(|word| format!("{word:#x}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn unique_temp_file(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "rcuprims-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ))
}

#[test]
fn info_reports_simulated_board() {
    let output = rcuprims(&["--format", "json", "info", "sim:"]);
    assert!(output.status.success());

    let info = stdout_json(&output);
    assert_eq!(info["schema_id"], "rcuprims.cli.v1.channel-info");
    assert_eq!(info["header_format"], "v2.2");
    assert_eq!(info["flash_access"], "message-buffer");
    assert_eq!(info["mode"], "message-buffer");
    assert_eq!(info["degraded"], false);
}

#[test]
fn legacy_board_uses_legacy_flash() {
    let output = rcuprims(&["--format", "json", "info", "sim:v1"]);
    assert!(output.status.success());
    let info = stdout_json(&output);
    assert_eq!(info["header_format"], "v1");
    assert_eq!(info["flash_access"], "legacy-bus");
}

#[test]
fn read_range_from_fresh_board() {
    let output = rcuprims(&["--format", "json", "read", "sim:", "0x2000", "-n", "4"]);
    assert!(output.status.success());

    let read = stdout_json(&output);
    assert_eq!(read["count"], 4);
    assert_eq!(read["values"][3]["address"], 0x2003);
    assert_eq!(read["values"][3]["value"], 0);
}

#[test]
fn write_then_read_in_one_stream() {
    let stream = words_arg(&[SINGLE_WRITE, 0x1000, 0x42, END, SINGLE_READ, 0x1000, END]);
    let output = rcuprims(&["--format", "json", "exec", "sim:", "--words", &stream]);
    assert!(output.status.success());

    let exec = stdout_json(&output);
    assert_eq!(exec["commands"], 2);
    assert_eq!(exec["failed"], 0);
    assert_eq!(exec["replies"][1]["words"][0], 0x42);
}

#[test]
fn exec_reads_stream_file() {
    let path = unique_temp_file("stream");
    let bytes: Vec<u8> = [SINGLE_WRITE, 0x10, 7, END, SINGLE_READ, 0x10, END]
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .collect();
    std::fs::write(&path, bytes).expect("stream file should be writable");

    let output = rcuprims(&[
        "--format",
        "raw",
        "exec",
        "sim:",
        "--file",
        path.to_str().expect("temp path should be utf-8"),
    ]);
    let _ = std::fs::remove_file(&path);

    assert!(output.status.success());
    assert_eq!(output.stdout, 7u32.to_le_bytes());
}

#[test]
fn unterminated_stream_is_rejected() {
    let stream = words_arg(&[SINGLE_READ, 0x1000]);
    let output = rcuprims(&["exec", "sim:", "--words", &stream]);
    assert_eq!(output.status.code(), Some(60));

    let relaxed = rcuprims(&["--format", "json", "exec", "sim:", "--relaxed", "--words", &stream]);
    assert!(relaxed.status.success());
}

#[test]
fn failed_command_sets_exit_code_but_reports_all() {
    // Unknown command 0xf in rcu-memory fails framing before anything runs.
    let stream = words_arg(&[0x1f00_0000, END]);
    let output = rcuprims(&["exec", "sim:", "--words", &stream]);
    assert_eq!(output.status.code(), Some(60));

    // An invalid mode code fails at execution; the read after it still runs.
    let set_mode = 0x1c00_0009;
    let stream = words_arg(&[set_mode, END, SINGLE_READ, 0x1000, END]);
    let output = rcuprims(&["--format", "json", "exec", "sim:", "--words", &stream]);
    assert_eq!(output.status.code(), Some(60));
    let exec = stdout_json(&output);
    assert_eq!(exec["failed"], 1);
    assert_eq!(exec["replies"][1]["ok"], true);
}

#[test]
fn flash_identify_on_both_paths() {
    for device in ["sim:", "sim:v1"] {
        let output = rcuprims(&["--format", "json", "flash", device, "id"]);
        assert!(output.status.success(), "flash id failed on {device}");
        let id = stdout_json(&output);
        assert_eq!(id["manufacturer"], 0x0001);
        assert_eq!(id["device"], 0x227e);
    }
}

#[test]
fn flash_read_of_erased_device() {
    let output = rcuprims(&["--format", "json", "flash", "sim:", "read", "0x100", "-n", "2"]);
    assert!(output.status.success());
    let read = stdout_json(&output);
    assert_eq!(read["space"], "flash");
    assert_eq!(read["values"][0]["value"], 0xffff);
}

#[test]
fn erase_without_target_is_usage_error() {
    let output = rcuprims(&["flash", "sim:", "erase"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn unknown_sim_variant_is_usage_error() {
    let output = rcuprims(&["info", "sim:v9"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown simulated board"));
}

#[test]
fn version_prints_name() {
    let output = rcuprims(&["version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout)
        .starts_with(&format!("rcuprims {}", env!("CARGO_PKG_VERSION"))));
}

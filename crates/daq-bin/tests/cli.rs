//! instrument-ctl end to end, against configs that need no hardware.
//!
//! Run with: cargo test -p daq-bin --test cli

use std::io::Write;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

const BENCH: &str = r#"
[application]
name = "bench"
log_level = "warn"
log_format = "compact"

[[instruments]]
id = "counter"
type = "philips_pm6669"
config = { port = "/dev/ttyUSB0", gpib_address = 10, srq_mask = 1, function = "frequency_a" }

[[instruments]]
id = "supply"
type = "tti_pl330pd"
config = { port = "/dev/ttyS0", baud_rate = 9600 }

[[instruments]]
id = "spare"
type = "tti_pl330pd"
enabled = false
config = { port = "" }
"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn instrument_ctl(config: &NamedTempFile, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_instrument-ctl"))
        .arg("--config")
        .arg(config.path())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_help_lists_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_instrument-ctl"))
        .arg("--help")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["list", "validate", "read", "get", "set"] {
        assert!(stdout.contains(command), "help should mention {}", command);
    }
}

#[test]
fn test_validate_skips_disabled_instruments() {
    let config = write_config(BENCH);
    let output = instrument_ctl(&config, &["validate"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {}", stdout);
    assert!(stdout.contains("counter: ok"));
    assert!(stdout.contains("supply: ok"));
    assert!(!stdout.contains("spare"));
}

#[test]
fn test_validate_reports_bad_instrument() {
    let config = write_config(
        r#"
[[instruments]]
id = "supply"
type = "tti_pl330pd"
config = { port = "/dev/ttyS0", gpib_address = 31 }
"#,
    );
    let output = instrument_ctl(&config, &["validate"]);

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("supply: instrument 'supply': invalid config"));
}

#[test]
fn test_list() {
    let config = write_config(BENCH);
    let output = instrument_ctl(&config, &["list"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("counter"));
    assert!(stdout.contains("disabled"));
    assert!(stdout.contains("Philips PM 6669 Frequency Counter"));
    assert!(stdout.contains("TTi PL330PD Power Supply"));
}

#[test]
fn test_unknown_instrument() {
    let config = write_config(BENCH);
    let output = instrument_ctl(&config, &["get", "scope", "id"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no instrument 'scope'"));
}

#[test]
fn test_missing_config_file() {
    let output = Command::new(env!("CARGO_BIN_EXE_instrument-ctl"))
        .args(["--config", "/nonexistent/instruments.toml", "list"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Config file not found"));
}

#[test]
fn test_environment_overrides_log_level() {
    let config = write_config(BENCH);
    let output = Command::new(env!("CARGO_BIN_EXE_instrument-ctl"))
        .arg("--config")
        .arg(config.path())
        .arg("list")
        .env("INSTRUMENT_CTL_APPLICATION__LOG_LEVEL", "chatty")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid log level 'chatty'"));
}

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const SECRET: &str = "cli-secret";

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_clanstats")
}

/// Runs the binary against stores inside `dir`, isolated from the caller's environment.
fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(bin())
        .args(args)
        .current_dir(dir)
        .env("CLANSTATS_MEMBERS_FILE", dir.join("members.json"))
        .env("CLANSTATS_CLANS_FILE", dir.join("clans.json"))
        .env("CLANSTATS_SECRET_KEY", SECRET)
        .env_remove("CLANSTATS_MULTIPLIERS")
        .env_remove("CLANSTATS_MULTIPLIER_PRESET")
        .env_remove("GEMINI_API_KEY")
        .env("RUST_LOG", "off")
        .output()
        .expect("clanstats should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn workspace() -> TempDir {
    tempfile::tempdir().expect("temp dir should be created")
}

#[test]
fn unknown_command_prints_usage() {
    let dir = workspace();
    let output = run(dir.path(), &["simulate"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("usage: clanstats"));
}

#[test]
fn parse_and_format_commands_print_one_value_per_line() {
    let dir = workspace();
    let output = run(dir.path(), &["parse", "2M", "4.1M", "500K", "abc"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "2000000\n4100000\n500000\n0\n");

    let output = run(dir.path(), &["format", "2500000", "1500", "999"]);
    assert_eq!(stdout(&output), "2.5M\n1.5K\n999\n");
}

#[test]
fn power_command_computes_full_and_lite_totals() {
    let dir = workspace();
    let roster = dir.path().join("roster.json");
    fs::write(&roster, r#"[{"race":"Cat","power":400},{"race":"Frog","power":100}]"#).unwrap();
    let roster = roster.to_string_lossy().into_owned();

    let output = run(dir.path(), &["power", &roster]);
    assert_eq!(output.status.code(), Some(0));
    let payload: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let expected = 0.84 * (400.0 * 5.2 + 100.0 * 1.5);
    assert!((payload["total"].as_f64().unwrap() - expected).abs() < 1e-9);
    assert_eq!(payload["mode"], "ATK");

    let output = run(dir.path(), &["power", &roster, "--lite", "1000"]);
    let payload: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert!((payload["total"].as_f64().unwrap() - 2654.4).abs() < 1e-9);
    assert_eq!(payload["calc_mode"], "lite");

    let output = run(dir.path(), &["power", &roster, "--mode", "sideways"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn members_commands_share_the_store_file() {
    let dir = workspace();
    assert_eq!(run(dir.path(), &["members", "add", "Alice", "2M", "1.5K"]).status.code(), Some(0));
    assert_eq!(run(dir.path(), &["members", "add", "bob", "10"]).status.code(), Some(0));

    let output = run(dir.path(), &["members", "totals"]);
    assert_eq!(stdout(&output).trim(), "members=2 atk=2000010 (2.0M) def=1500 (1.5K)");

    let output = run(dir.path(), &["members", "delete", "alice", "wrong"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unauthorized"));

    let output = run(dir.path(), &["members", "delete", "alice", SECRET]);
    assert_eq!(output.status.code(), Some(0));

    let output = run(dir.path(), &["members", "list"]);
    let payload: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(payload["members"][0]["key"], "bob");
    assert_eq!(payload["totals"]["member_count"], 1);
}

#[test]
fn members_import_and_export_round_trip() {
    let dir = workspace();
    let import = dir.path().join("import.json");
    fs::write(&import, r#"{"zed": {"name": "Zed", "atk": "3M", "def": 4}}"#).unwrap();
    let import = import.to_string_lossy().into_owned();

    run(dir.path(), &["members", "add", "keep"]);
    let output = run(dir.path(), &["members", "import", &import]);
    assert_eq!(output.status.code(), Some(0));
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["total"], 2);

    let output = run(dir.path(), &["members", "import", &import, "--replace", SECRET]);
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["total"], 1);

    let out_dir = dir.path().join("exports");
    let output = run(dir.path(), &["members", "export", out_dir.to_string_lossy().as_ref()]);
    assert_eq!(output.status.code(), Some(0));
    let exported = stdout(&output).trim().to_string();
    assert!(exported.contains("clan_data_"));
    let body: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(exported).unwrap()).unwrap();
    assert_eq!(body["zed"]["atk"], 3_000_000);
}

#[test]
fn clans_commands_create_list_and_delete() {
    let dir = workspace();
    assert_eq!(run(dir.path(), &["clans", "create", "Wolves", "1234"]).status.code(), Some(0));
    assert_eq!(run(dir.path(), &["clans", "create", "wolves", "5678"]).status.code(), Some(1));

    let output = run(dir.path(), &["clans", "list"]);
    let clans: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(clans[0]["name"], "Wolves");
    assert!(clans[0].get("pin").is_none());

    assert_eq!(run(dir.path(), &["clans", "delete", "wolves", SECRET]).status.code(), Some(0));
    assert_eq!(run(dir.path(), &["clans", "delete"]).status.code(), Some(2));
}

#[test]
fn extract_rejects_unsupported_files_and_missing_key() {
    let dir = workspace();
    let output = run(dir.path(), &["extract", "shot.gif"]);
    assert_eq!(output.status.code(), Some(2));

    let image = dir.path().join("shot.png");
    fs::write(&image, [0x89, b'P', b'N', b'G']).unwrap();
    let output = run(dir.path(), &["extract", image.to_string_lossy().as_ref()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("GEMINI_API_KEY"));
    assert!(!dir.path().join("members.json").exists());
}

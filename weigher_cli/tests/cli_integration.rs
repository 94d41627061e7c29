use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

// Minimal valid config: local store inside the temp dir, fast probing
fn write_valid_config(dir: &Path) -> PathBuf {
    let store = dir.join("var").join("weights.jsonl");
    let toml = format!(
        r#"
[serial]
settle_ms = 1
poll_ms = 20

[identity]
source_id = "PC-TEST"
group_id = "SITE"

[storage]
mode = "local"
path = {store:?}

[api]
enabled = false
"#
    );
    let path = dir.join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn weigher(cfg: &Path) -> Command {
    let mut cmd = Command::cargo_bin("weigher").unwrap();
    cmd.arg("--config").arg(cfg).env("RUST_LOG", "warn");
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["--sim", "ports"], 0, "SIM0", "stdout")]
#[case(&["--sim", "self-check"], 0, "OK (storage: local", "stdout")]
#[case(&["--sim-profile", "nope", "ports"], 2, "weight:frames", "stderr")]
#[case(&["frobnicate"], 2, "unrecognized subcommand", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());
    let assert = weigher(&cfg).args(args).assert().code(exit_code);
    match stream {
        "stdout" => assert.stdout(predicate::str::contains(needle)),
        _ => assert.stderr(predicate::str::contains(needle)),
    };
}

#[test]
fn missing_config_is_a_config_error() {
    let dir = tempdir().unwrap();
    weigher(&dir.path().join("absent.toml"))
        .arg("self-check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("config file could not be read"));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, "[stabilization]\nwindow = 0\n").unwrap();
    weigher(&cfg)
        .arg("self-check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("stabilization.window"));
}

#[test]
fn probe_marks_the_simulated_scale() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());
    weigher(&cfg)
        .args(["--sim", "ports", "--probe"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SIM0\tscale"));
}

#[test]
fn read_now_records_and_latest_reads_it_back() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());
    weigher(&cfg)
        .args(["--sim-profile", "777:5", "read-now"])
        .assert()
        .success()
        .stdout(predicate::str::contains("777 kg (recorded)"));

    let out = weigher(&cfg)
        .args(["--json", "latest"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["valeur"], 777.0);
    assert_eq!(v["desktop"], "PC-TEST");
}

#[test]
fn dry_run_does_not_record() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());
    weigher(&cfg)
        .args(["--json", "--sim-profile", "55:5", "read-now", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""recorded":false"#));
    weigher(&cfg)
        .arg("latest")
        .assert()
        .success()
        .stdout(predicate::str::contains("no record"));
}

#[test]
fn run_collects_a_stable_weight_then_stops() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());
    weigher(&cfg)
        .args([
            "--sim-profile",
            "640:200",
            "run",
            "--no-api",
            "--stop-after-ms",
            "2000",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("collector stopped"));

    let store = fs::read_to_string(dir.path().join("var").join("weights.jsonl")).unwrap();
    let first: serde_json::Value = serde_json::from_str(store.lines().next().unwrap()).unwrap();
    assert_eq!(first["weight"], 640);
    assert_eq!(first["source_id"], "PC-TEST");
    assert_eq!(first["group_id"], "SITE");
    // one steady load is one record
    assert_eq!(store.lines().count(), 1);
}

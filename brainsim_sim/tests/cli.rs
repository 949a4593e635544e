//! Drives the `brainsim` binary.

use std::path::Path;
use std::process::{Command, Output};

fn brainsim(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_brainsim"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn config_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn set_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.json");

    let out = brainsim(&["set", "--config", config_arg(&config), "duration=12", "label=demo"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let out = brainsim(&["show", "--config", config_arg(&config)]);
    let shown: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(shown["duration"], 12);
    assert_eq!(shown["label"], "demo");
}

#[test]
fn run_prints_json_report_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.json");
    let export = dir.path().join("report.json");
    std::fs::write(&config, r#"{"duration": 8, "runs": 2, "seed": 100}"#).unwrap();

    let out = brainsim(&[
        "run",
        "--config",
        config_arg(&config),
        "--model",
        "random_walk",
        "--strategy",
        "threads",
        "--json",
        "--export",
        export.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["total"], 2);
    assert_eq!(report["passed"], 2);
    assert_eq!(report["strategy"], "threads");
    assert_eq!(report["runs"][1]["seed"], 101);
    assert_eq!(report["runs"][0]["current_time"], 8);

    let exported: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
    assert_eq!(exported["total"], 2);
}

#[test]
fn cli_flags_override_without_persisting() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{"duration": 8}"#).unwrap();

    let out = brainsim(&[
        "run", "--config", config_arg(&config), "--duration", "3", "--runs", "1", "--json",
    ]);
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["runs"][0]["current_time"], 3);

    let stored: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&config).unwrap()).unwrap();
    assert_eq!(stored, serde_json::json!({"duration": 8}));
}

#[test]
fn failed_runs_exit_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{"duration": 5, "step_sigma": -2.0}"#).unwrap();

    let out = brainsim(&["run", "--config", config_arg(&config), "--model", "random_walk"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn malformed_store_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.json");
    std::fs::write(&config, "{ not json").unwrap();

    let out = brainsim(&["show", "--config", config_arg(&config)]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Malformed"));
}

#[test]
fn worker_prints_one_record() {
    let out = brainsim(&["worker", "--model", "neuron", "--index", "2", "--params", r#"{"duration": 4}"#]);
    assert!(out.status.success());

    let stdout = String::from_utf8_lossy(&out.stdout);
    let record: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(record["index"], 2);
    assert_eq!(record["state"], "completed");
    assert_eq!(record["steps"], 4);
}

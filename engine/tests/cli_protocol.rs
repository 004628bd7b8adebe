//! CLI tests driving the compiled `engine` binary over stdin/stdout.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use engine::exit_codes;
use engine::test_support::python_available;
use serde_json::{Value, json};

fn run_engine(dir: &Path, args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_engine"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn engine");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(stdin.as_bytes())
        .expect("write stdin");
    child.wait_with_output().expect("wait engine")
}

fn response(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1, "stdout: {stdout}");
    serde_json::from_str(&stdout).expect("response json")
}

#[test]
fn malformed_request_yields_failure_response() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run_engine(temp.path(), &[], "this is not json");
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let value = response(&output);
    assert_eq!(value["ok"], json!(false));
    assert_eq!(value["assertions"], json!([]));
    assert_eq!(value["score"], json!(0));
    assert!(
        value["stderr"]
            .as_str()
            .expect("stderr")
            .starts_with("Bad JSON request")
    );
}

#[test]
fn unsafe_request_reports_safety_assertion() {
    let temp = tempfile::tempdir().expect("tempdir");
    let request = json!({"puzzle_id": "L1-P1", "code": "open('x').read()"});
    let output = run_engine(temp.path(), &["run"], &request.to_string());
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let value = response(&output);
    assert_eq!(value["ok"], json!(false));
    assert_eq!(value["assertions"][0]["name"], json!("ast_safety"));
    assert_eq!(
        value["assertions"][0]["errors"],
        json!(["Forbidden token in source: 'open'"])
    );
    assert_eq!(value["world_actions"], json!([]));
    assert_eq!(value["telemetry"], json!({"exec_ms": 0, "lines": 1}));
}

#[test]
fn invalid_config_is_reported_in_band() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("engine.toml"), "interpreter = []\n").expect("write");
    let output = run_engine(temp.path(), &[], "{}");
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let value = response(&output);
    assert_eq!(value["ok"], json!(false));
    assert!(
        value["stderr"]
            .as_str()
            .expect("stderr")
            .contains("interpreter")
    );
}

#[test]
fn analyze_exit_code_reflects_safety() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("safe.py"), "print('hi')\n").expect("write");
    std::fs::write(temp.path().join("bad.py"), "x.__class__\n").expect("write");

    let safe = run_engine(temp.path(), &["analyze", "safe.py"], "");
    assert_eq!(safe.status.code(), Some(exit_codes::OK));
    assert_eq!(response(&safe), json!({"is_safe": true, "violations": []}));

    let bad = run_engine(temp.path(), &["analyze", "bad.py"], "");
    assert_eq!(bad.status.code(), Some(exit_codes::UNSAFE));
    let value = response(&bad);
    assert_eq!(value["is_safe"], json!(false));
    assert_eq!(
        value["violations"],
        json!([
            "Forbidden dunder attribute: __class__ (line 1)",
            "Forbidden token in source: '__'"
        ])
    );

    let stdin = run_engine(temp.path(), &["analyze"], "eval('1')");
    assert_eq!(stdin.status.code(), Some(exit_codes::UNSAFE));
}

#[test]
fn runs_submission_against_puzzle_dir() {
    if !python_available() {
        eprintln!("skipping: python3 not available");
        return;
    }
    let temp = tempfile::tempdir().expect("tempdir");
    let puzzles = Path::new(env!("CARGO_MANIFEST_DIR")).join("../content/puzzles");
    let request = json!({
        "puzzle_id": "L1-P1",
        "code": "print('Door unlocked')",
        "limits": {"cpu_ms": 2000, "mem_mb": 128}
    });
    let output = run_engine(
        temp.path(),
        &["--puzzles-dir", puzzles.to_str().expect("utf-8 path")],
        &request.to_string(),
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let value = response(&output);
    assert_eq!(value["ok"], json!(true), "response: {value}");
    assert_eq!(value["score"], json!(2));
    assert_eq!(
        value["world_actions"],
        json!([{"type": "open_door", "params": {"id": "D-01"}}])
    );
}

//! End-to-end tests for the jitbroker binary.

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn jitbroker() -> Command {
    cargo_bin_cmd!("jitbroker")
}

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

const MANIFEST: &str = r#"{ "requests": [
    { "id": 1, "unit": { "holder": "demo.Loop", "name": "run", "signature": "(I)I", "code_size": 40 },
      "attempts": [
        { "bailout": { "message": "node limit exceeded" } },
        { "success": { "bytecode_size": 120, "code_size": 340 } }
      ] },
    { "id": 2, "unit": { "holder": "demo.Lock", "name": "enter", "code_size": 12 },
      "attempts": [ { "permanent_bailout": { "message": "unbalanced monitor" } } ] },
    { "id": 3, "unit": { "holder": "demo.Done", "name": "warm", "code_size": 8, "compiled": true },
      "attempts": [ { "success": { "bytecode_size": 8, "code_size": 16 } } ] }
] }"#;

fn summary_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| line.starts_with('{'))
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

mod cli_basics {
    use super::*;

    #[test]
    fn help() {
        jitbroker()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"));
    }

    #[test]
    fn version() {
        jitbroker().arg("--version").assert().success();
    }

    #[test]
    fn missing_manifest_fails() {
        let dir = TempDir::new().unwrap();
        jitbroker()
            .args(["run", "--manifest"])
            .arg(dir.path().join("absent.json"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("failed to read manifest"));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let dir = TempDir::new().unwrap();
        let manifest = write(&dir, "m.json", MANIFEST);
        jitbroker()
            .args(["run", "--log-format", "xml", "--manifest"])
            .arg(manifest)
            .assert()
            .failure();
    }
}

mod run {
    use super::*;

    #[test]
    fn prints_one_summary_per_request_then_totals() {
        let dir = TempDir::new().unwrap();
        let manifest = write(&dir, "m.json", MANIFEST);
        let output = jitbroker()
            .args(["run", "--quiet", "--manifest"])
            .arg(manifest)
            .output()
            .unwrap();
        assert!(output.status.success());

        let lines = summary_lines(&output.stdout);
        assert_eq!(lines.len(), 4);

        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[0]["unit"], "demo.Loop.run(I)I");
        assert_eq!(lines[0]["outcome"]["outcome"], "success");
        assert_eq!(lines[0]["outcome"]["attempts"], 2);
        assert_eq!(lines[0]["outcome"]["code_size_delta"], 80);

        assert_eq!(lines[1]["outcome"]["outcome"], "failure");
        assert_eq!(lines[1]["outcome"]["retryable"], false);
        assert_eq!(lines[1]["outcome"]["message"], "unbalanced monitor");

        assert_eq!(lines[2]["outcome"]["outcome"], "failure");
        assert_eq!(lines[2]["outcome"]["message"], "Already compiled");
        assert_eq!(lines[2]["outcome"]["attempts"], 0);

        assert_eq!(lines[3]["statistics"]["installed_code_size"], 340);
        assert_eq!(lines[3]["code_cache"]["installs"], 1);
    }

    #[test]
    fn console_reports_bailouts() {
        let dir = TempDir::new().unwrap();
        let manifest = write(&dir, "m.json", MANIFEST);
        let options = write(&dir, "o.json", r#"{ "print_bailout": true }"#);
        jitbroker()
            .args(["run", "--workers", "1", "--manifest"])
            .arg(manifest)
            .arg("--options")
            .arg(options)
            .assert()
            .success()
            .stdout(predicate::str::contains("Bailout in"))
            .stdout(predicate::str::contains(
                "Permanent bailout unbalanced monitor compiling method",
            ));
    }

    #[test]
    fn writes_events_file() {
        let dir = TempDir::new().unwrap();
        let manifest = write(&dir, "m.json", MANIFEST);
        let events = dir.path().join("events.jsonl");
        jitbroker()
            .args(["run", "--quiet", "--manifest"])
            .arg(manifest)
            .arg("--events")
            .arg(&events)
            .assert()
            .success();

        let text = fs::read_to_string(&events).unwrap();
        let completions = text
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
            .filter(|event| event["kind"] == "completion")
            .count();
        assert_eq!(completions, 2);
    }

    #[test]
    fn fatal_outcome_exits_after_printing_summaries() {
        let dir = TempDir::new().unwrap();
        let manifest = write(
            &dir,
            "m.json",
            r#"{ "requests": [
                { "id": 9, "unit": { "holder": "demo.Bad", "name": "f", "code_size": 4 },
                  "attempts": [ { "error": { "kind": "GraphError", "message": "broken graph" } } ] }
            ] }"#,
        );
        let options = write(&dir, "o.json", r#"{ "exit_on_exception": true }"#);
        let output = jitbroker()
            .args(["run", "--quiet", "--manifest"])
            .arg(manifest)
            .arg("--options")
            .arg(options)
            .output()
            .unwrap();
        assert!(!output.status.success());

        let lines = summary_lines(&output.stdout);
        assert_eq!(lines[0]["outcome"]["outcome"], "fatal");
        assert_eq!(lines[0]["outcome"]["exit_code"], -1);
        assert!(lines.last().unwrap().get("statistics").is_some());
    }
}

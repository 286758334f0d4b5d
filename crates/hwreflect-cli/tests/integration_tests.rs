//! Runs the `hwreflect` binary against a minimal scripted sbt.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Command, Output};

/// Compiles anything without a `FAIL_COMPILE` marker; `run` writes a netlist.
const FAKE_SBT: &str = r#"#!/bin/sh
task=""
for a in "$@"; do task="$a"; done
scala=$(ls src/main/scala/*.scala | head -n 1)
module=$(basename "$scala" .scala)
if grep -q FAIL_COMPILE "$scala"; then
  echo "[error] $scala:4:10: not found: value FAIL_COMPILE"
  exit 1
fi
if [ "$task" = "run" ]; then
  mkdir -p generated_verilog
  echo "module $module(); endmodule" > "generated_verilog/$module.v"
fi
echo "[success] $task"
"#;

const ADDER: &str = "import chisel3._\nclass Adder4 extends Module {\n  val io = IO(new Bundle {})\n}\n";

struct Env {
    dir: tempfile::TempDir,
}

impl Env {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let sbt = dir.path().join("sbt");
        fs::write(&sbt, FAKE_SBT).unwrap();
        fs::set_permissions(&sbt, fs::Permissions::from_mode(0o755)).unwrap();
        fs::create_dir(dir.path().join("ws")).unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn hwreflect(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_hwreflect"))
            .args(args)
            .current_dir(self.path())
            .env_remove("HWREFLECT_CONFIG")
            .env("HWREFLECT_SBT", self.path().join("sbt"))
            .env("HWREFLECT_WORKSPACE_ROOT", self.path().join("ws"))
            .env("XDG_CACHE_HOME", self.path().join("cache"))
            .output()
            .unwrap()
    }
}

#[test]
fn test_check_passes_and_saves() {
    let env = Env::new();
    fs::write(env.path().join("Adder4.scala"), ADDER).unwrap();

    let output = env.hwreflect(&["check", "--file", "Adder4.scala"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(0), "stdout: {}", stdout);
    assert!(stdout.contains("Module:     Adder4"));
    assert!(stdout.contains("✓ All checks passed"));
    assert!(env.path().join("tests/related_Verilog.v").exists());
    assert!(env.path().join("tests/result.json").exists());
    assert_eq!(fs::read_dir(env.path().join("ws")).unwrap().count(), 0);
}

#[test]
fn test_check_reports_only_files_written_this_run() {
    let env = Env::new();
    fs::write(env.path().join("Adder4.scala"), ADDER).unwrap();
    let output = env.hwreflect(&["check", "--file", "Adder4.scala"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(env.path().join("tests/related_Verilog.v").exists());

    // the netlist from the previous run stays on disk but is not this run's
    fs::write(env.path().join("Bad.scala"), format!("{}// FAIL_COMPILE\n", ADDER)).unwrap();
    let output = env.hwreflect(&["check", "--file", "Bad.scala", "--module", "Adder4"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(1), "stdout: {}", stdout);
    assert!(stdout.contains("Saved:      tests/result.json"), "stdout: {}", stdout);
    assert!(!stdout.contains("related_Verilog.v"), "stdout: {}", stdout);
    assert!(env.path().join("tests/related_Verilog.v").exists());
}

#[test]
fn test_check_compile_failure_exits_one() {
    let env = Env::new();
    fs::write(env.path().join("Bad.scala"), format!("{}// FAIL_COMPILE\n", ADDER)).unwrap();

    let output = env.hwreflect(&[
        "check",
        "--file",
        "Bad.scala",
        "--no-save",
        "--json",
    ]);

    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["stage"], "compilation");
    assert_eq!(report["compiled"], false);
    assert!(report["errorExcerpt"].as_str().unwrap().contains(":4:10:"));
    assert!(!env.path().join("tests").exists());
}

#[test]
fn test_check_missing_inputs_exit_two() {
    let env = Env::new();
    let output = env.hwreflect(&["check", "--file", "missing.scala"]);
    assert_eq!(output.status.code(), Some(2));

    fs::write(env.path().join("Adder4.scala"), ADDER).unwrap();
    let output = env.hwreflect(&["check", "--file", "Adder4.scala", "--testbench", "tb.cpp"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_batch_reports_stats() {
    let env = Env::new();
    let cases = [
        serde_json::json!({ "id": "good", "source": ADDER }),
        serde_json::json!({ "id": "bad", "source": format!("{}// FAIL_COMPILE\n", ADDER) }),
    ]
    .iter()
    .map(|c| c.to_string())
    .collect::<Vec<_>>()
    .join("\n");
    fs::write(env.path().join("cases.jsonl"), cases).unwrap();

    let output = env.hwreflect(&[
        "batch",
        "--cases",
        "cases.jsonl",
        "--parallel",
        "2",
        "--output",
        "out",
        "--json",
    ]);

    assert_eq!(output.status.code(), Some(1));
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["stats"]["total"], 2);
    assert_eq!(summary["stats"]["passed"], 1);
    assert_eq!(summary["stats"]["failures"]["compilation"], 1);
    assert_eq!(summary["results"][0]["id"], "good");
    assert!(env.path().join("out/good.json").exists());
    assert!(env.path().join("out/bad.json").exists());
    let netlist = fs::read_to_string(env.path().join("out/good.v")).unwrap();
    assert!(netlist.contains("module Adder4("));
    assert!(!env.path().join("out/bad.v").exists());
}

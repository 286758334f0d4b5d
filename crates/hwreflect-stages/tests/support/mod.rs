//! Shell stand-ins for sbt, verilator and make.
//!
//! They follow the real tools' file conventions (project layout in,
//! `generated_verilog/<M>.v` and `obj_dir/V<M>` out) so the stages cannot tell
//! the difference. Harnesses are `#!/bin/sh` scripts that "make" installs as
//! the simulation binary.
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use hwreflect_core::{ExecutionContext, ReflectConfig, ToolchainConfig};
use tempfile::TempDir;

const FAKE_SBT: &str = r#"#!/bin/sh
task=""
for a in "$@"; do task="$a"; done
scala=$(ls src/main/scala/*.scala | head -n 1)
module=$(basename "$scala" .scala)
case "$task" in
  compile)
    if grep -q 'COMPILE_HANG' "$scala"; then sleep 30; fi
    echo "[info] compiling 1 Scala source to target/scala-2.13/classes ..."
    line=$(grep -n -E '[-+*/][[:space:]]*$' "$scala" | head -n 1 | cut -d: -f1)
    if [ -n "$line" ]; then
      echo "[error] $scala:$((line + 1)):3: illegal start of simple expression"
      echo "[error] one error found"
      echo "[error] (Compile / compileIncremental) Compilation failed" >&2
      exit 1
    fi
    echo "[success] Total time: 1 s"
    ;;
  run)
    if grep -q 'ELAB_FAIL' "$scala"; then
      echo "[info] running $module"
      echo 'Exception in thread "main" chisel3.ChiselException: Connection between sink and source failed' >&2
      echo "	at chisel3.internal.Builder\$.error(Builder.scala:1)" >&2
      exit 1
    fi
    if grep -q 'ELAB_SILENT' "$scala"; then exit 0; fi
    mkdir -p generated_verilog
    printf 'module %s(\n  input clock,\n  input reset\n);\nendmodule\n' "$module" > "generated_verilog/$module.v"
    echo "[success] Total time: 2 s"
    ;;
  *)
    echo "unknown task $task" >&2
    exit 2
    ;;
esac
"#;

const FAKE_VERILATOR: &str = r#"#!/bin/sh
top=""; cpp=""; v=""; prev=""
for a in "$@"; do
  case "$a" in
    *.cpp) cpp="$a" ;;
    *.v) v="$a" ;;
  esac
  if [ "$prev" = "--top-module" ]; then top="$a"; fi
  prev="$a"
done
if grep -q 'VERILATOR_REJECT' "$cpp"; then
  echo "%Error: $cpp:1:1: syntax error, unexpected IDENTIFIER" >&2
  exit 1
fi
mkdir -p obj_dir
cp "$cpp" obj_dir/tb.sh
touch "obj_dir/V$top.mk"
"#;

const FAKE_MAKE: &str = r#"#!/bin/sh
dir="."; target=""; prev=""
for a in "$@"; do
  if [ "$prev" = "-C" ]; then dir="$a"; fi
  prev="$a"; target="$a"
done
cp "$dir/tb.sh" "$dir/$target" && chmod +x "$dir/$target"
"#;

pub const ADDER: &str = r#"
import chisel3._

class Adder4 extends Module {
  val io = IO(new Bundle {
    val a = Input(UInt(4.W))
    val b = Input(UInt(4.W))
    val sum = Output(UInt(5.W))
  })
  io.sum := io.a +& io.b
}
"#;

/// [`ADDER`] under another class name.
pub fn adder_named(name: &str) -> String {
    ADDER.replace("Adder4", name)
}

pub const DANGLING_OPERATOR: &str = r#"
import chisel3._

class Adder4 extends Module {
  val io = IO(new Bundle {
    val a = Input(UInt(4.W))
    val b = Input(UInt(4.W))
    val sum = Output(UInt(5.W))
  })
  io.sum := io.a +
}
"#;

pub const TRUNCATING: &str = r#"
import chisel3._

class Accumulator extends Module {
  val io = IO(new Bundle {
    val in = Input(UInt(4.W))
    val out = Output(UInt(4.W))
  })
  val acc = RegInit(0.U(3.W))
  acc := acc +& io.in
  io.out := acc
}
"#;

pub const PASSING_HARNESS: &str = r#"#!/bin/sh
echo '$timescale 1ns $end' > waveform.vcd
echo "Checked 256 input combinations, 0 mismatches"
echo "PASSED: 256  FAILED: 0"
echo "TEST PASSED"
"#;

pub const MISMATCH_HARNESS: &str = r#"#!/bin/sh
echo "cycle 3: in=9"
echo "Mismatch at cycle 3: expected 12, got 4"
echo "TEST FAILED"
exit 1
"#;

pub const HANGING_HARNESS: &str = r#"#!/bin/sh
echo "starting"
while true; do sleep 1; done
"#;

pub struct FakeToolchain {
    pub dir: TempDir,
}

impl FakeToolchain {
    pub fn install() -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in [("sbt", FAKE_SBT), ("verilator", FAKE_VERILATOR), ("make", FAKE_MAKE)] {
            write_executable(&dir.path().join("bin").join(name), body);
        }
        fs::create_dir_all(dir.path().join("workspaces")).unwrap();
        Self { dir }
    }

    pub fn workspace_root(&self) -> std::path::PathBuf {
        self.dir.path().join("workspaces")
    }

    pub fn config(&self) -> ReflectConfig {
        let bin = self.dir.path().join("bin");
        let tool = |name: &str| bin.join(name).to_string_lossy().into_owned();
        ReflectConfig {
            toolchain: ToolchainConfig {
                sbt: tool("sbt"),
                verilator: tool("verilator"),
                make: tool("make"),
                cache_dir: Some(self.dir.path().join("cache")),
                ..Default::default()
            },
            workspace_root: Some(self.workspace_root()),
            ..Default::default()
        }
    }

    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::new(self.config())
    }

    /// Workspaces still on disk.
    pub fn leftover_workspaces(&self) -> usize {
        fs::read_dir(self.workspace_root()).unwrap().count()
    }
}

fn write_executable(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

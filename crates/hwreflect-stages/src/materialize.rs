//! Source Materializer: lays a request out as a single-module sbt project
//!
//! ```text
//! <workspace>/
//!   build.sbt                      chisel + plugin, main class = emitter
//!   src/main/scala/<Module>.scala  imports, caller source, emitter object
//!   tb_<Module>.cpp                harness (when supplied)
//!   tmp/ runtime/ .sbt/            sbt scratch, kept inside the workspace
//!   logs/                          captured tool output
//! ```
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use hwreflect_core::{
    ReflectError, StageError, ToolCommand, ToolchainConfig, VerificationRequest, Workspace,
};

/// `class Name[(params)] extends Module` / `RawModule`
static MODULE_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bclass\s+([A-Za-z_][A-Za-z0-9_]*)\s*(?:\[[^\]]*\])?\s*(?:\([^)]*\))?\s*extends\s+(?:Raw)?Module\b")
        .unwrap()
});

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

pub const GENERATED_DIR: &str = "generated_verilog";
pub const OBJ_DIR: &str = "obj_dir";
pub const WAVEFORM_FILE: &str = "waveform.vcd";

/// First module declared in `source`.
pub fn detect_module_name(source: &str) -> Option<String> {
    MODULE_DECL
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Explicit name (validated) or the detected one. Fails before any stage.
pub fn resolve_module_name(request: &VerificationRequest) -> Result<String, ReflectError> {
    if request.source.trim().is_empty() {
        return Err(ReflectError::config("source text is empty"));
    }
    match &request.module_name {
        Some(name) if IDENTIFIER.is_match(name) => Ok(name.clone()),
        Some(name) => Err(ReflectError::config(format!(
            "module name '{}' is not a valid identifier",
            name
        ))),
        None => detect_module_name(&request.source).ok_or_else(|| {
            ReflectError::config(
                "no module declaration found (expected `class <Name> extends Module`); \
                 pass the module name explicitly",
            )
        }),
    }
}

/// A materialized project and the commands that drive it.
#[derive(Debug, Clone)]
pub struct SbtProject {
    pub module: String,
    /// Per-request emitter object name
    pub emitter: String,
    pub root: PathBuf,
    pub scala_file: PathBuf,
    pub verilog_path: PathBuf,
    pub harness_path: Option<PathBuf>,
    sbt_env: BTreeMap<String, String>,
}

impl SbtProject {
    /// `sbt [args] <task>` with the workspace-scoped environment.
    pub fn sbt_task(&self, toolchain: &ToolchainConfig, task: &str) -> ToolCommand {
        let mut command = ToolCommand::new(&toolchain.sbt)
            .args(toolchain.sbt_args.iter().cloned())
            .arg(task);
        command.env.extend(self.sbt_env.clone());
        command
    }

    pub fn verilate_command(&self, toolchain: &ToolchainConfig) -> Option<ToolCommand> {
        let harness = self.harness_path.as_ref()?;
        Some(
            ToolCommand::new(&toolchain.verilator)
                .arg("-cc")
                .args(toolchain.verilator_args.iter().cloned())
                .arg("--exe")
                .arg(path_arg(harness))
                .arg(path_arg(&self.verilog_path))
                .args(["--top-module", self.module.as_str()]),
        )
    }

    pub fn build_command(&self, toolchain: &ToolchainConfig) -> ToolCommand {
        let model = self.model_name();
        ToolCommand::new(&toolchain.make).args([
            "-C".to_string(),
            OBJ_DIR.to_string(),
            "-f".to_string(),
            format!("{}.mk", model),
            model,
        ])
    }

    pub fn simulation_command(&self) -> ToolCommand {
        ToolCommand::new(path_arg(&self.root.join(OBJ_DIR).join(self.model_name())))
    }

    pub fn waveform_path(&self) -> PathBuf {
        self.root.join(WAVEFORM_FILE)
    }

    /// Verilator's class / binary name for the top module.
    pub fn model_name(&self) -> String {
        format!("V{}", self.module)
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Writes the project for `module` into `workspace`.
pub fn materialize(
    workspace: &Workspace,
    request: &VerificationRequest,
    module: &str,
    toolchain: &ToolchainConfig,
) -> Result<SbtProject, StageError> {
    let root = workspace.path().to_path_buf();
    let emitter = format!("ReflectEmitter_{}", workspace.suffix());

    let scala_dir = root.join("src").join("main").join("scala");
    for dir in [&scala_dir, &root.join("tmp"), &root.join("runtime")] {
        fs::create_dir_all(dir).map_err(|e| StageError::io(format!("create {}", dir.display()), e))?;
    }

    write(&root.join("build.sbt"), &build_descriptor(toolchain, &emitter))?;

    let scala_file = scala_dir.join(format!("{}.scala", module));
    write(&scala_file, &scala_source(&request.source, module, &emitter))?;

    let harness_path = match &request.harness {
        Some(harness) => {
            let path = root.join(format!("tb_{}.cpp", module));
            write(&path, harness)?;
            Some(path)
        }
        None => None,
    };

    let cache = toolchain.resolve_cache_dir();
    // shared across requests; only ever created, never cleaned here
    fs::create_dir_all(&cache)
        .map_err(|e| StageError::io(format!("create cache {}", cache.display()), e))?;

    let mut sbt_env = BTreeMap::new();
    sbt_env.insert(
        "SBT_OPTS".to_string(),
        [
            format!("-Dsbt.global.base={}", root.join(".sbt").display()),
            format!("-Dsbt.boot.directory={}", cache.join("boot").display()),
            format!("-Dsbt.ivy.home={}", cache.join("ivy2").display()),
            format!("-Djava.io.tmpdir={}", root.join("tmp").display()),
            "-Dsbt.server.forcestart=false".to_string(),
            "-Dsbt.color=false".to_string(),
            "-Dsbt.supershell=false".to_string(),
        ]
        .join(" "),
    );
    sbt_env.insert(
        "XDG_RUNTIME_DIR".to_string(),
        root.join("runtime").display().to_string(),
    );

    tracing::debug!(module, emitter = %emitter, "project materialized");
    Ok(SbtProject {
        module: module.to_string(),
        verilog_path: root.join(GENERATED_DIR).join(format!("{}.v", module)),
        emitter,
        root,
        scala_file,
        harness_path,
        sbt_env,
    })
}

fn write(path: &Path, text: &str) -> Result<(), StageError> {
    fs::write(path, text).map_err(|e| StageError::io(format!("write {}", path.display()), e))
}

fn build_descriptor(toolchain: &ToolchainConfig, emitter: &str) -> String {
    format!(
        r#"scalaVersion := "{scala}"

libraryDependencies ++= Seq(
  "org.chipsalliance" %% "chisel" % "{chisel}"
)

addCompilerPlugin("org.chipsalliance" % "chisel-plugin" % "{chisel}" cross CrossVersion.full)

Compile / run / mainClass := Some("{emitter}")
"#,
        scala = toolchain.scala_version,
        chisel = toolchain.chisel_version,
        emitter = emitter,
    )
}

fn scala_source(source: &str, module: &str, emitter: &str) -> String {
    format!(
        r#"import chisel3._
import circt.stage.ChiselStage
import java.io.PrintWriter
import java.io.File

{source}

object {emitter} extends App {{
  new File("{dir}").mkdirs()
  val verilog = ChiselStage.emitSystemVerilog(
    new {module}(),
    firtoolOpts = Array("-disable-all-randomization", "-strip-debug-info")
  )
  val writer = new PrintWriter(new File("{dir}/{module}.v"))
  writer.write(verilog)
  writer.close()
}}
"#,
        source = source,
        emitter = emitter,
        module = module,
        dir = GENERATED_DIR,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDER: &str = r#"
import chisel3._

class Adder4 extends Module {
  val io = IO(new Bundle {
    val a = Input(UInt(4.W))
    val b = Input(UInt(4.W))
    val c = Output(UInt(4.W))
  })
  io.c := io.a + io.b
}
"#;

    #[test]
    fn test_detects_plain_module() {
        assert_eq!(detect_module_name(ADDER).as_deref(), Some("Adder4"));
    }

    #[test]
    fn test_detects_parameterized_module() {
        let src = "class SimpleCounter(w: Int = 8) extends Module { }";
        assert_eq!(detect_module_name(src).as_deref(), Some("SimpleCounter"));
        let raw = "class Glue extends RawModule { }";
        assert_eq!(detect_module_name(raw).as_deref(), Some("Glue"));
    }

    #[test]
    fn test_first_declaration_wins() {
        let src = "class Inner extends Module {}\nclass Outer extends Module {}";
        assert_eq!(detect_module_name(src).as_deref(), Some("Inner"));
    }

    #[test]
    fn test_bundle_is_not_a_module() {
        assert_eq!(detect_module_name("class Io extends Bundle { }"), None);
        assert_eq!(detect_module_name("class X extends ModuleLike { }"), None);
    }

    #[test]
    fn test_resolve_rejects_bad_inputs() {
        let missing = VerificationRequest::new("object Foo");
        assert!(resolve_module_name(&missing).unwrap_err().is_configuration());

        let empty = VerificationRequest::new("   \n");
        assert!(resolve_module_name(&empty).unwrap_err().is_configuration());

        let hostile = VerificationRequest::new(ADDER).module("../../etc/passwd");
        assert!(resolve_module_name(&hostile).unwrap_err().is_configuration());
    }

    #[test]
    fn test_explicit_name_wins() {
        let request = VerificationRequest::new(ADDER).module("Top");
        assert_eq!(resolve_module_name(&request).unwrap(), "Top");
    }

    #[test]
    fn test_materialize_layout() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::acquire(root.path()).unwrap();
        let toolchain = ToolchainConfig {
            cache_dir: Some(root.path().join("cache")),
            ..Default::default()
        };
        let request = VerificationRequest::new(ADDER).harness("int main() { return 0; }");

        let project = materialize(&workspace, &request, "Adder4", &toolchain).unwrap();

        let build = fs::read_to_string(workspace.join("build.sbt")).unwrap();
        assert!(build.contains("\"org.chipsalliance\" %% \"chisel\" % \"6.0.0\""));
        assert!(build.contains(&project.emitter));

        let scala = fs::read_to_string(&project.scala_file).unwrap();
        assert!(scala.contains("class Adder4 extends Module"));
        assert!(scala.contains(&format!("object {} extends App", project.emitter)));
        assert!(scala.contains("new Adder4()"));
        assert!(project.emitter.ends_with(&workspace.suffix()));

        assert_eq!(
            fs::read_to_string(project.harness_path.as_ref().unwrap()).unwrap(),
            "int main() { return 0; }"
        );
        assert!(project.verilog_path.ends_with("generated_verilog/Adder4.v"));
    }

    #[test]
    fn test_commands() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::acquire(root.path()).unwrap();
        let toolchain = ToolchainConfig {
            cache_dir: Some(root.path().join("cache")),
            ..Default::default()
        };
        let request = VerificationRequest::new(ADDER).harness("tb");
        let project = materialize(&workspace, &request, "Adder4", &toolchain).unwrap();

        let compile = project.sbt_task(&toolchain, "compile");
        assert_eq!(compile.args, vec!["-batch".to_string(), "compile".to_string()]);
        let opts = &compile.env["SBT_OPTS"];
        assert!(opts.contains(&format!("-Dsbt.global.base={}", workspace.join(".sbt").display())));
        assert!(opts.contains(&format!("-Dsbt.ivy.home={}", root.path().join("cache/ivy2").display())));

        let verilate = project.verilate_command(&toolchain).unwrap();
        assert_eq!(verilate.args[0], "-cc");
        assert!(verilate.args.ends_with(&["--top-module".to_string(), "Adder4".to_string()]));

        assert_eq!(
            project.build_command(&toolchain).display(),
            "make -C obj_dir -f VAdder4.mk VAdder4"
        );
        assert!(project.simulation_command().program.ends_with("obj_dir/VAdder4"));
    }

    #[test]
    fn test_no_harness_means_no_verilate() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::acquire(root.path()).unwrap();
        let toolchain = ToolchainConfig {
            cache_dir: Some(root.path().join("cache")),
            ..Default::default()
        };
        let project =
            materialize(&workspace, &VerificationRequest::new(ADDER), "Adder4", &toolchain).unwrap();
        assert!(project.harness_path.is_none());
        assert!(project.verilate_command(&toolchain).is_none());
    }
}

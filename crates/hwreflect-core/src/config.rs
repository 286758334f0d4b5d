//! Configuration: toolchain binding, budgets, marker table
//!
//! Loaded from YAML (`--config` / `HWREFLECT_CONFIG`), then environment
//! overrides, then defaults for anything left unset.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classifier::MarkerTable;
use crate::data_model::TimeoutBudgets;
use crate::error::ReflectError;
use crate::invoker::DEFAULT_MAX_CAPTURE_BYTES;

pub const CONFIG_ENV: &str = "HWREFLECT_CONFIG";

/// External tools and the versions written into the build descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolchainConfig {
    /// sbt launcher
    pub sbt: String,
    /// Arguments placed before the sbt task (e.g. `-batch`)
    pub sbt_args: Vec<String>,
    pub verilator: String,
    /// Warning switches passed to verilator
    pub verilator_args: Vec<String>,
    pub make: String,
    pub scala_version: String,
    pub chisel_version: String,
    /// Shared, read-mostly dependency cache (sbt boot + ivy)
    pub cache_dir: Option<PathBuf>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            sbt: "sbt".to_string(),
            sbt_args: vec!["-batch".to_string()],
            verilator: "verilator".to_string(),
            verilator_args: vec!["-Wno-UNUSED".to_string(), "-Wno-lint".to_string()],
            make: "make".to_string(),
            scala_version: "2.13.12".to_string(),
            chisel_version: "6.0.0".to_string(),
            cache_dir: None,
        }
    }
}

impl ToolchainConfig {
    /// Cache location: configured, else `<user cache>/hwreflect/sbt`.
    pub fn resolve_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("hwreflect")
                .join("sbt")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReflectConfig {
    pub toolchain: ToolchainConfig,
    pub timeouts: TimeoutBudgets,
    pub classifier: MarkerTable,
    /// Parent of per-request workspaces; OS temp dir when unset
    pub workspace_root: Option<PathBuf>,
    /// Tail kept per captured stream
    pub max_capture_bytes: usize,
}

impl Default for ReflectConfig {
    fn default() -> Self {
        Self {
            toolchain: ToolchainConfig::default(),
            timeouts: TimeoutBudgets::default(),
            classifier: MarkerTable::default(),
            workspace_root: None,
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
        }
    }
}

impl ReflectConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ReflectError> {
        serde_yaml::from_str(yaml).map_err(|e| ReflectError::config(format!("invalid config: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, ReflectError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReflectError::config(format!("cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    /// Explicit path, else `HWREFLECT_CONFIG`, else defaults; environment
    /// overrides are applied last.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ReflectError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => match std::env::var_os(CONFIG_ENV) {
                Some(path) => Self::load(Path::new(&path))?,
                None => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `HWREFLECT_*` overrides through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(sbt) = lookup("HWREFLECT_SBT") {
            self.toolchain.sbt = sbt;
        }
        if let Some(verilator) = lookup("HWREFLECT_VERILATOR") {
            self.toolchain.verilator = verilator;
        }
        if let Some(make) = lookup("HWREFLECT_MAKE") {
            self.toolchain.make = make;
        }
        if let Some(root) = lookup("HWREFLECT_WORKSPACE_ROOT") {
            self.workspace_root = Some(PathBuf::from(root));
        }
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

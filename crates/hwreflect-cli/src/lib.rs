//! hwreflect command line: `check` for a single module, `batch` for a cases file
//!
//! Exit codes: 0 when every request passed, 1 when a stage failed, 2 for
//! configuration or input errors.

pub mod batch;
pub mod check;
pub mod output;

use std::path::Path;

use anyhow::Context;
use hwreflect_core::{ExecutionContext, ReflectConfig};

pub const EXIT_PASSED: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

/// Configuration from `path` (or `HWREFLECT_CONFIG`), environment overrides
/// applied, wrapped in a fresh context.
pub fn load_context(path: Option<&Path>) -> anyhow::Result<ExecutionContext> {
    let config = ReflectConfig::resolve(path).context("loading configuration")?;
    tracing::debug!(
        sbt = %config.toolchain.sbt,
        verilator = %config.toolchain.verilator,
        workspace_root = %config.workspace_root().display(),
        "configuration resolved"
    );
    Ok(ExecutionContext::new(config))
}

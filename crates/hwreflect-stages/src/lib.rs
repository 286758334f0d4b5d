//! hwreflect stages: the Chisel toolchain binding
//!
//! # Pipeline Flow
//!
//! ```text
//! source ─▶ materialize ─▶ sbt compile ─▶ sbt run ─▶ verilator ─▶ make ─▶ V<Module>
//!                              │             │        └──────── simulation ────────┘
//!                          compilation   elaboration
//! ```
//!
//! [`reflect`] runs one request end to end; [`reflect_many`] runs a batch
//! with bounded parallelism.

mod compile;
mod elaborate;
pub mod materialize;
mod reflect;
mod simulate;

pub use compile::CompileStage;
pub use elaborate::ElaborateStage;
pub use materialize::{detect_module_name, materialize, resolve_module_name, SbtProject};
pub use reflect::{reflect, reflect_many, Reflection};
pub use simulate::SimulateStage;

use std::sync::Arc;

use hwreflect_core::{Classification, Stage, StageOutcome};

/// Stages for `project`, simulation only when a harness was written.
pub fn default_stages(project: SbtProject) -> Vec<Box<dyn Stage>> {
    let project = Arc::new(project);
    let mut stages: Vec<Box<dyn Stage>> = vec![
        Box::new(CompileStage::new(Arc::clone(&project))),
        Box::new(ElaborateStage::new(Arc::clone(&project))),
    ];
    if project.harness_path.is_some() {
        stages.push(Box::new(SimulateStage::new(project)));
    }
    stages
}

pub(crate) fn conclude(outcome: StageOutcome, classification: Classification) -> StageOutcome {
    match (classification.success, classification.failure) {
        (true, _) => outcome.succeed(),
        (false, Some(kind)) => outcome.fail(kind, classification.excerpt.unwrap_or_default()),
        (false, None) => {
            let kind = hwreflect_core::FailureKind::for_stage(outcome.stage);
            outcome.fail(kind, classification.excerpt.unwrap_or_default())
        }
    }
}

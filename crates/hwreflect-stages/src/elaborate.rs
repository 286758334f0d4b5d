use async_trait::async_trait;
use std::io::ErrorKind;
use std::sync::Arc;

use hwreflect_core::classifier::classify_build;
use hwreflect_core::{
    ExecutionContext, FailureKind, Stage, StageError, StageId, StageOutcome, ToolchainInvoker,
    Workspace,
};

use crate::conclude;
use crate::materialize::SbtProject;

/// `sbt run`: executes the emitter and collects the generated netlist.
///
/// A clean exit is not enough; the netlist file must exist and be non-empty,
/// otherwise the stage fails with an elaboration error.
pub struct ElaborateStage {
    project: Arc<SbtProject>,
}

impl ElaborateStage {
    pub fn new(project: Arc<SbtProject>) -> Self {
        Self { project }
    }
}

#[async_trait]
impl Stage for ElaborateStage {
    fn id(&self) -> StageId {
        StageId::Elaboration
    }

    async fn run(
        &self,
        workspace: &Workspace,
        ctx: &ExecutionContext,
    ) -> Result<StageOutcome, StageError> {
        let command = self.project.sbt_task(&ctx.config.toolchain, "run");
        let budget = ctx.budgets.elaborate();
        let result = ToolchainInvoker::new(ctx.config.max_capture_bytes)
            .run(&command, workspace.path(), budget, &workspace.logs_dir(), "elaborate")
            .await?;

        let mut outcome = StageOutcome::begin(self.id());
        outcome.record(&result);
        let classification = classify_build(self.id(), &result, budget);
        if !classification.success {
            return Ok(conclude(outcome, classification));
        }

        let path = &self.project.verilog_path;
        let missing = format!(
            "Elaboration Error: `{}` finished but {} was not produced",
            result.command,
            path.strip_prefix(workspace.path()).unwrap_or(path).display()
        );
        match tokio::fs::read_to_string(path).await {
            Ok(text) if !text.trim().is_empty() => {
                tracing::debug!(bytes = text.len(), "netlist collected");
                outcome.artifact = Some(text);
                Ok(outcome.succeed())
            }
            Ok(_) => Ok(outcome.fail(
                FailureKind::ElaborationError,
                format!("{} (file is empty)", missing),
            )),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Ok(outcome.fail(FailureKind::ElaborationError, missing))
            }
            Err(e) => Err(StageError::io(format!("read {}", path.display()), e)),
        }
    }
}

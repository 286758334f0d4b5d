use async_trait::async_trait;
use std::sync::Arc;

use hwreflect_core::classifier::classify_build;
use hwreflect_core::{ExecutionContext, Stage, StageError, StageId, StageOutcome, ToolchainInvoker, Workspace};

use crate::conclude;
use crate::materialize::SbtProject;

/// `sbt compile`: type-checks the module and its emitter.
pub struct CompileStage {
    project: Arc<SbtProject>,
}

impl CompileStage {
    pub fn new(project: Arc<SbtProject>) -> Self {
        Self { project }
    }
}

#[async_trait]
impl Stage for CompileStage {
    fn id(&self) -> StageId {
        StageId::Compilation
    }

    async fn run(
        &self,
        workspace: &Workspace,
        ctx: &ExecutionContext,
    ) -> Result<StageOutcome, StageError> {
        let command = self.project.sbt_task(&ctx.config.toolchain, "compile");
        let budget = ctx.budgets.compile();
        let result = ToolchainInvoker::new(ctx.config.max_capture_bytes)
            .run(&command, workspace.path(), budget, &workspace.logs_dir(), "compile")
            .await?;

        let mut outcome = StageOutcome::begin(self.id());
        outcome.record(&result);
        Ok(conclude(outcome, classify_build(self.id(), &result, budget)))
    }
}

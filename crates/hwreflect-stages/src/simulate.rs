use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use hwreflect_core::classifier::{classify_simulation, classify_step};
use hwreflect_core::{
    ExecutionContext, InvocationResult, Stage, StageError, StageId, StageOutcome,
    ToolCommand, ToolchainInvoker, Workspace,
};

use crate::conclude;
use crate::materialize::SbtProject;

/// Verilate, build, run. Any step failing ends the stage; only the final run
/// is judged by pass/fail markers.
pub struct SimulateStage {
    project: Arc<SbtProject>,
}

impl SimulateStage {
    pub fn new(project: Arc<SbtProject>) -> Self {
        Self { project }
    }

    async fn step(
        &self,
        invoker: &ToolchainInvoker,
        workspace: &Workspace,
        command: &ToolCommand,
        budget: Duration,
        stem: &str,
    ) -> Result<InvocationResult, StageError> {
        Ok(invoker
            .run(command, workspace.path(), budget, &workspace.logs_dir(), stem)
            .await?)
    }
}

#[async_trait]
impl Stage for SimulateStage {
    fn id(&self) -> StageId {
        StageId::Simulation
    }

    async fn run(
        &self,
        workspace: &Workspace,
        ctx: &ExecutionContext,
    ) -> Result<StageOutcome, StageError> {
        let toolchain = &ctx.config.toolchain;
        let verilate = self
            .project
            .verilate_command(toolchain)
            .ok_or_else(|| StageError::MissingInput("no harness supplied".to_string()))?;
        let invoker = ToolchainInvoker::new(ctx.config.max_capture_bytes);
        let mut outcome = StageOutcome::begin(self.id());

        let budget = ctx.budgets.verilate();
        let result = self.step(&invoker, workspace, &verilate, budget, "verilate").await?;
        outcome.record(&result);
        let classification = classify_step("Verilator", &result, budget);
        if !classification.success {
            return Ok(conclude(outcome, classification));
        }

        let budget = ctx.budgets.build();
        let build = self.project.build_command(toolchain);
        let result = self.step(&invoker, workspace, &build, budget, "build").await?;
        outcome.record(&result);
        let classification = classify_step("Build", &result, budget);
        if !classification.success {
            return Ok(conclude(outcome, classification));
        }

        let budget = ctx.budgets.simulate();
        let run = self.project.simulation_command();
        let result = self.step(&invoker, workspace, &run, budget, "simulate").await?;
        outcome.record(&result);
        outcome.waveform = read_waveform(&self.project, ctx.config.max_capture_bytes).await;

        Ok(conclude(
            outcome,
            classify_simulation(&result, &ctx.config.classifier, budget),
        ))
    }
}

/// Dump left by the harness, if any and if small enough to carry.
async fn read_waveform(project: &SbtProject, limit: usize) -> Option<String> {
    let path = project.waveform_path();
    let metadata = tokio::fs::metadata(&path).await.ok()?;
    if metadata.len() > limit as u64 {
        tracing::warn!(bytes = metadata.len(), limit, "waveform too large, not attached");
        return None;
    }
    match tokio::fs::read(&path).await {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            tracing::warn!(error = %e, "waveform unreadable");
            None
        }
    }
}

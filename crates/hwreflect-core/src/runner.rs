//! Pipeline Runner: drives stages through the verification state machine
//!
//! ```text
//! Compile ──ok──▶ Elaborate ──ok──▶ Simulate ──ok──▶ Passed
//!    │               │   └──ok, no harness──────────▶ Passed
//!    ▼               ▼                   ▼
//! Failed(compilation) Failed(elaboration) Failed(simulation)
//!
//! any stage ──fault──▶ Exception
//! ```
//!
//! Exactly one stage is in flight per request. A stage runs only after every
//! earlier stage succeeded and nothing is ever revisited.
use std::time::Instant;

use crate::context::ExecutionContext;
use crate::data_model::{FailureKind, StageId, StageOutcome};
use crate::error::ReflectError;
use crate::journal::{self, JournalEvent};
use crate::stage::Stage;
use crate::workspace::Workspace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    /// Stage currently in flight
    Running(StageId),
    Passed,
    Failed(StageId),
    Exception { stage: StageId, description: String },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running(_))
    }

    /// Transition once the in-flight stage has reported. `next` is the stage
    /// registered after it, if any.
    pub fn advance(self, outcome: &StageOutcome, next: Option<StageId>) -> Self {
        let Self::Running(current) = self else {
            return self;
        };
        debug_assert_eq!(current, outcome.stage);

        if outcome.failure == Some(FailureKind::UnexpectedFault) {
            return Self::Exception {
                stage: current,
                description: outcome.excerpt.clone().unwrap_or_default(),
            };
        }
        match (outcome.success, next) {
            (false, _) => Self::Failed(current),
            (true, Some(next)) => Self::Running(next),
            (true, None) => Self::Passed,
        }
    }
}

/// Everything the report builder needs from one run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub outcomes: Vec<StageOutcome>,
    pub state: PipelineState,
}

impl PipelineRun {
    /// A fault raised before the first stage could start (for instance while
    /// materializing sources). Attributed to the first stage.
    pub fn fault_before_start(description: impl Into<String>) -> Self {
        Self {
            outcomes: Vec::new(),
            state: PipelineState::Exception {
                stage: StageId::Compilation,
                description: description.into(),
            },
        }
    }

    pub fn outcome(&self, stage: StageId) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage == stage)
    }
}

pub struct PipelineRunner {
    stages: Vec<Box<dyn Stage>>,
    pipeline_id: String,
}

impl PipelineRunner {
    /// Stages must be given in strictly increasing pipeline order.
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Result<Self, ReflectError> {
        if stages.is_empty() {
            return Err(ReflectError::config("pipeline needs at least one stage"));
        }
        if stages.windows(2).any(|w| w[0].id() >= w[1].id()) {
            return Err(ReflectError::config(
                "stages must be ordered compilation → elaboration → simulation without repeats",
            ));
        }

        let pipeline_id = stages
            .iter()
            .map(|s| s.id().as_str())
            .collect::<Vec<_>>()
            .join("→");

        Ok(Self { stages, pipeline_id })
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub async fn run(&self, workspace: &Workspace, ctx: &ExecutionContext) -> PipelineRun {
        let mut outcomes = Vec::with_capacity(self.stages.len());
        let mut state = PipelineState::Running(self.stages[0].id());

        for (index, stage) in self.stages.iter().enumerate() {
            if state.is_terminal() {
                break;
            }
            let id = stage.id();
            journal::record(ctx, JournalEvent::StageStarted { stage: id }).await;
            tracing::info!(stage = %id, "stage started");

            let start = Instant::now();
            let outcome = match stage.run(workspace, ctx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(stage = %id, error = %e, "stage fault");
                    let mut outcome = StageOutcome::fault(
                        id,
                        format!("Unexpected fault during {}: {}", id, e),
                    );
                    outcome.elapsed_ms = start.elapsed().as_millis() as u64;
                    outcome
                }
            };

            tracing::info!(
                stage = %id,
                success = outcome.success,
                elapsed_ms = outcome.elapsed_ms,
                "stage finished"
            );
            journal::record(
                ctx,
                JournalEvent::StageFinished {
                    stage: id,
                    success: outcome.success,
                    elapsed_ms: outcome.elapsed_ms,
                    failure: outcome.failure,
                },
            )
            .await;

            let next = self.stages.get(index + 1).map(|s| s.id());
            state = state.advance(&outcome, next);
            outcomes.push(outcome);
        }

        PipelineRun { outcomes, state }
    }
}

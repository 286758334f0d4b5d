//! Stage Trait: single contract for compile, elaborate and simulate
use async_trait::async_trait;
use thiserror::Error;

use crate::context::ExecutionContext;
use crate::data_model::{StageId, StageOutcome};
use crate::invoker::InvokeError;
use crate::workspace::Workspace;

/// One step of the verification pipeline.
///
/// A stage reports what its tool said through the returned
/// [`StageOutcome`], including failures. `Err` is reserved for faults the
/// tool never got to judge (spawn failure, unreadable workspace, ...); the
/// runner turns those into a terminal `exception`.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    async fn run(
        &self,
        workspace: &Workspace,
        ctx: &ExecutionContext,
    ) -> Result<StageOutcome, StageError>;
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("STAGE/INVOKE: {0}")]
    Invoke(#[from] InvokeError),

    #[error("STAGE/IO: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("STAGE/INPUT: {0}")]
    MissingInput(String),
}

impl StageError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

//! hwreflect core: workspace, toolchain invoker, classifier and stage runner
//!
//! Verification of a hardware module is a fixed sequence of external tool
//! runs (compile → elaborate → simulate). This crate owns the generic
//! machinery: an isolated scratch [`Workspace`] per request, a bounded
//! [`ToolchainInvoker`], the output [`classifier`], the [`Stage`] contract
//! with its [`PipelineRunner`] state machine, and the [`ReflectionReport`]
//! builder and persister.

pub mod classifier;
pub mod config;
pub mod context;
pub mod data_model;
pub mod error;
pub mod invoker;
pub mod journal;
pub mod persist;
pub mod report;
pub mod runner;
pub mod stage;
pub mod workspace;

pub use classifier::{Classification, MarkerTable};
pub use config::{ReflectConfig, ToolchainConfig};
pub use context::ExecutionContext;
pub use data_model::{
    FailureKind, ReflectionReport, SimVerdict, StageId, StageOutcome, TerminalStage,
    TimeoutBudgets, VerificationRequest,
};
pub use error::ReflectError;
pub use invoker::{InvocationResult, InvokeError, ToolCommand, ToolchainInvoker};
pub use persist::{ArtifactPersister, PersistSummary};
pub use report::{build_report, ReportMeta};
pub use runner::{PipelineRun, PipelineRunner, PipelineState};
pub use stage::{Stage, StageError};
pub use workspace::Workspace;

/// hwreflect engine version
pub const HWREFLECT_VERSION: &str = env!("CARGO_PKG_VERSION");

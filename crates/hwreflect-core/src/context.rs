//! Execution Context: per-request state threaded through every call
//!
//! Nothing here is read from process-wide mutable state. Workers that run in
//! separate tasks or processes receive everything they need, including the
//! journal destination, through this value.
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ReflectConfig;
use crate::data_model::TimeoutBudgets;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub trace_id: String,
    pub config: Arc<ReflectConfig>,
    /// Budgets in force for this request
    pub budgets: TimeoutBudgets,
    /// Append-only JSON-lines file receiving stage transitions
    pub journal: Option<PathBuf>,
}

impl ExecutionContext {
    pub fn new(config: ReflectConfig) -> Self {
        Self::with_shared_config(Arc::new(config))
    }

    pub fn with_shared_config(config: Arc<ReflectConfig>) -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            budgets: config.timeouts.clone(),
            config,
            journal: None,
        }
    }

    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal = Some(path.into());
        self
    }

    pub fn with_budgets(mut self, budgets: TimeoutBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    /// Same configuration and journal, fresh trace id and default budgets.
    pub fn fork(&self) -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            config: Arc::clone(&self.config),
            budgets: self.config.timeouts.clone(),
            journal: self.journal.clone(),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(ReflectConfig::default())
    }
}

//! Unified Error Model
//!
//! Only failures that happen before a stage-attributed report can exist are
//! surfaced as errors. Everything a stage observes is captured in the report.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReflectError {
    #[error("CONFIG/{0}")]
    Configuration(String),

    #[error("WORKSPACE/{0}")]
    Workspace(String),

    #[error("IO/{0}")]
    Io(#[from] std::io::Error),

    #[error("SERIALIZE/{0}")]
    Serialize(String),

    #[error("WORKER/{0}")]
    Worker(String),
}

impl ReflectError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Configuration errors fail a request before any stage is attempted.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<serde_json::Error> for ReflectError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e.to_string())
    }
}

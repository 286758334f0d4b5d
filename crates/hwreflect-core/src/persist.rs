//! Artifact Persister: writes the netlist and the report to caller-named files
//!
//! Each file is written independently; one failing write neither blocks the
//! other nor touches the in-memory report.
use std::path::{Path, PathBuf};

use crate::data_model::ReflectionReport;
use crate::error::ReflectError;

pub const DEFAULT_ARTIFACT_FILENAME: &str = "related_Verilog.v";
pub const DEFAULT_REPORT_FILENAME: &str = "result.json";

/// Per-file outcome of a persist call. `None` means nothing to write.
#[derive(Debug, Default)]
pub struct PersistSummary {
    pub artifact: Option<Result<PathBuf, ReflectError>>,
    pub report: Option<Result<PathBuf, ReflectError>>,
}

impl PersistSummary {
    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact.as_ref().and_then(|r| r.as_ref().ok()).map(PathBuf::as_path)
    }

    pub fn report_path(&self) -> Option<&Path> {
        self.report.as_ref().and_then(|r| r.as_ref().ok()).map(PathBuf::as_path)
    }

    pub fn errors(&self) -> Vec<&ReflectError> {
        [&self.artifact, &self.report]
            .into_iter()
            .filter_map(|r| r.as_ref().and_then(|r| r.as_ref().err()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactPersister {
    output_dir: PathBuf,
    artifact_filename: String,
    report_filename: String,
}

impl ArtifactPersister {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            artifact_filename: DEFAULT_ARTIFACT_FILENAME.to_string(),
            report_filename: DEFAULT_REPORT_FILENAME.to_string(),
        }
    }

    /// Custom names are taken verbatim.
    pub fn with_artifact_filename(mut self, name: Option<&str>) -> Self {
        if let Some(name) = name {
            self.artifact_filename = name.to_string();
        }
        self
    }

    pub fn with_report_filename(mut self, name: Option<&str>) -> Self {
        if let Some(name) = name {
            self.report_filename = name.to_string();
        }
        self
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir.join(&self.artifact_filename)
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(&self.report_filename)
    }

    pub async fn persist(&self, report: &ReflectionReport) -> PersistSummary {
        let artifact = match &report.generated_artifact {
            Some(text) => Some(write_file(&self.artifact_path(), text.as_bytes()).await),
            None => None,
        };

        let report = match serde_json::to_vec_pretty(report) {
            Ok(json) => write_file(&self.report_path(), &json).await,
            Err(e) => Err(ReflectError::from(e)),
        };
        let report = Some(report);

        let summary = PersistSummary { artifact, report };
        for error in summary.errors() {
            tracing::warn!(error = %error, "persist failed");
        }
        summary
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<PathBuf, ReflectError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(path.to_path_buf())
}

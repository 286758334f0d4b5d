//! Data Model: VerificationRequest, StageOutcome, ReflectionReport
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ReflectError;
use crate::invoker::InvocationResult;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageId {
    Compilation,
    Elaboration,
    Simulation,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compilation => "compilation",
            Self::Elaboration => "elaboration",
            Self::Simulation => "simulation",
        }
    }

    /// Human label used in excerpts ("Compilation timeout: ...").
    pub fn label(&self) -> &'static str {
        match self {
            Self::Compilation => "Compilation",
            Self::Elaboration => "Elaboration",
            Self::Simulation => "Simulation",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal marker of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalStage {
    Compilation,
    Elaboration,
    Simulation,
    Passed,
    Exception,
}

impl TerminalStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compilation => "compilation",
            Self::Elaboration => "elaboration",
            Self::Simulation => "simulation",
            Self::Passed => "passed",
            Self::Exception => "exception",
        }
    }
}

impl From<StageId> for TerminalStage {
    fn from(stage: StageId) -> Self {
        match stage {
            StageId::Compilation => Self::Compilation,
            StageId::Elaboration => Self::Elaboration,
            StageId::Simulation => Self::Simulation,
        }
    }
}

impl fmt::Display for TerminalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Simulation verdict. `NotAttempted` is its own state and serializes as
/// `null`; it is never folded into `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SimVerdict {
    Passed,
    Failed,
    #[default]
    NotAttempted,
}

impl SimVerdict {
    pub fn as_option(&self) -> Option<bool> {
        match self {
            Self::Passed => Some(true),
            Self::Failed => Some(false),
            Self::NotAttempted => None,
        }
    }

    pub fn is_attempted(&self) -> bool {
        !matches!(self, Self::NotAttempted)
    }
}

impl From<Option<bool>> for SimVerdict {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::Passed,
            Some(false) => Self::Failed,
            None => Self::NotAttempted,
        }
    }
}

impl Serialize for SimVerdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_option().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SimVerdict {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<bool>::deserialize(deserializer).map(Self::from)
    }
}

/// Classified failure taxonomy carried by every non-passed report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    CompileError,
    ElaborationError,
    SimulationFailure,
    ToolchainTimeout,
    UnexpectedFault,
}

impl FailureKind {
    /// Failure kind a stage reports when its tool says no.
    pub fn for_stage(stage: StageId) -> Self {
        match stage {
            StageId::Compilation => Self::CompileError,
            StageId::Elaboration => Self::ElaborationError,
            StageId::Simulation => Self::SimulationFailure,
        }
    }
}

/// Wall-clock budgets for every external step, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutBudgets {
    pub compile_secs: u64,
    pub elaborate_secs: u64,
    pub verilate_secs: u64,
    pub build_secs: u64,
    pub simulate_secs: u64,
}

impl TimeoutBudgets {
    pub fn compile(&self) -> Duration {
        Duration::from_secs(self.compile_secs)
    }

    pub fn elaborate(&self) -> Duration {
        Duration::from_secs(self.elaborate_secs)
    }

    pub fn verilate(&self) -> Duration {
        Duration::from_secs(self.verilate_secs)
    }

    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build_secs)
    }

    pub fn simulate(&self) -> Duration {
        Duration::from_secs(self.simulate_secs)
    }
}

impl Default for TimeoutBudgets {
    fn default() -> Self {
        Self {
            // first sbt run may have to resolve dependencies
            compile_secs: 180,
            elaborate_secs: 180,
            verilate_secs: 60,
            build_secs: 60,
            simulate_secs: 10,
        }
    }
}

/// One verification request. Immutable for the duration of a call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    /// Hardware description source text
    pub source: String,
    /// Top module; detected from the source when absent
    pub module_name: Option<String>,
    /// Test harness source (C++ driving the verilated model)
    pub harness: Option<String>,
    /// Where artifact and report are persisted; nothing is written when absent
    pub output_dir: Option<PathBuf>,
    /// Overrides the default artifact filename
    pub artifact_filename: Option<String>,
    /// Overrides the default report filename
    pub report_filename: Option<String>,
    /// Overrides the configured budgets
    pub budgets: Option<TimeoutBudgets>,
}

impl VerificationRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn module(mut self, name: impl Into<String>) -> Self {
        self.module_name = Some(name.into());
        self
    }

    pub fn harness(mut self, harness: impl Into<String>) -> Self {
        self.harness = Some(harness.into());
        self
    }

    /// Reads the harness from disk. An unreadable harness is a configuration
    /// error: no stage has been attempted yet.
    pub fn harness_from_path(mut self, path: impl AsRef<Path>) -> Result<Self, ReflectError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReflectError::config(format!("cannot read harness '{}': {}", path.display(), e))
        })?;
        self.harness = Some(text);
        Ok(self)
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn artifact_filename(mut self, name: impl Into<String>) -> Self {
        self.artifact_filename = Some(name.into());
        self
    }

    pub fn report_filename(mut self, name: impl Into<String>) -> Self {
        self.report_filename = Some(name.into());
        self
    }

    pub fn budgets(mut self, budgets: TimeoutBudgets) -> Self {
        self.budgets = Some(budgets);
        self
    }

    pub fn has_harness(&self) -> bool {
        self.harness.is_some()
    }

    /// Content digest of everything that determines the verdict.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.source.as_bytes());
        hasher.update(&[0]);
        if let Some(module) = &self.module_name {
            hasher.update(module.as_bytes());
        }
        hasher.update(&[0]);
        if let Some(harness) = &self.harness {
            hasher.update(harness.as_bytes());
        }
        format!("blake3:{}", hasher.finalize())
    }
}

/// Result of one attempted stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub stage: StageId,
    pub success: bool,
    /// Exit code of the last invocation (None when killed or never spawned)
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub elapsed_ms: u64,
    /// Command lines run by this stage, in order
    pub commands: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// Generated netlist text (elaboration only)
    #[serde(skip)]
    pub artifact: Option<String>,
    /// Waveform dump left behind by the harness (simulation only)
    #[serde(skip)]
    pub waveform: Option<String>,
}

impl StageOutcome {
    pub fn begin(stage: StageId) -> Self {
        Self {
            stage,
            success: false,
            exit_code: None,
            timed_out: false,
            elapsed_ms: 0,
            commands: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            failure: None,
            excerpt: None,
            artifact: None,
            waveform: None,
        }
    }

    /// Appends one invocation's streams and status.
    pub fn record(&mut self, result: &InvocationResult) {
        self.commands.push(result.command.clone());
        append_stream(&mut self.stdout, &result.command, &result.stdout);
        append_stream(&mut self.stderr, &result.command, &result.stderr);
        self.exit_code = result.exit_code;
        self.timed_out |= result.timed_out;
        self.elapsed_ms += result.elapsed.as_millis() as u64;
    }

    pub fn succeed(mut self) -> Self {
        self.success = true;
        self.failure = None;
        self.excerpt = None;
        self
    }

    pub fn fail(mut self, kind: FailureKind, excerpt: impl Into<String>) -> Self {
        self.success = false;
        self.failure = Some(kind);
        self.excerpt = Some(excerpt.into());
        self
    }

    /// Outcome for a stage that raised an unexpected fault.
    pub fn fault(stage: StageId, description: impl Into<String>) -> Self {
        Self::begin(stage).fail(FailureKind::UnexpectedFault, description)
    }
}

fn append_stream(buffer: &mut String, command: &str, text: &str) {
    if !buffer.is_empty() && !buffer.ends_with('\n') {
        buffer.push('\n');
    }
    buffer.push_str("==> ");
    buffer.push_str(command);
    buffer.push('\n');
    buffer.push_str(text);
}

/// The structured pass/fail report returned by `reflect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionReport {
    pub request_id: String,
    pub module_name: String,
    pub compiled: bool,
    pub elaborated: bool,
    pub sim_passed: SimVerdict,
    pub error_excerpt: Option<String>,
    pub generated_artifact: Option<String>,
    pub full_stdout: Option<String>,
    pub full_stderr: Option<String>,
    pub stage: TerminalStage,
    pub failure_kind: Option<FailureKind>,
    pub timestamp: DateTime<Utc>,
    /// hwreflect version that produced the report
    #[serde(default)]
    pub engine_version: String,
    pub source_digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waveform: Option<String>,
    pub stages: Vec<StageOutcome>,
}

impl ReflectionReport {
    pub fn passed(&self) -> bool {
        self.stage == TerminalStage::Passed
    }

    /// Structural invariants every report must satisfy. Returns the list of
    /// violated rules; empty means consistent.
    pub fn invariant_violations(&self) -> Vec<&'static str> {
        let mut violations = Vec::new();
        let all_green = self.compiled
            && self.elaborated
            && matches!(self.sim_passed, SimVerdict::Passed | SimVerdict::NotAttempted);

        if self.passed() != self.error_excerpt.is_none() {
            violations.push("errorExcerpt must be null exactly when stage is passed");
        }
        if self.passed() && !all_green {
            violations.push("passed requires compiled, elaborated and a non-failing simulation");
        }
        // a fault can stop a run whose recorded stages were all green
        if !self.passed() && all_green && self.stage != TerminalStage::Exception {
            violations.push("a failed stage must leave a failing flag");
        }
        if self.generated_artifact.is_some() && !self.elaborated {
            violations.push("generatedArtifact requires elaboration");
        }
        if self.elaborated && !self.compiled {
            violations.push("elaboration requires compilation");
        }
        if self.sim_passed.is_attempted() && !self.elaborated {
            violations.push("simulation verdict requires elaboration");
        }
        if self.passed() != self.failure_kind.is_none() {
            violations.push("failureKind must be set exactly when stage is not passed");
        }
        if self.stages.windows(2).any(|w| w[0].stage >= w[1].stage) {
            violations.push("stages must be strictly ordered");
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sim_verdict_serializes_tri_state() {
        assert_eq!(serde_json::to_value(SimVerdict::Passed).unwrap(), json!(true));
        assert_eq!(serde_json::to_value(SimVerdict::Failed).unwrap(), json!(false));
        assert_eq!(serde_json::to_value(SimVerdict::NotAttempted).unwrap(), json!(null));

        let back: SimVerdict = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(back, SimVerdict::NotAttempted);
    }

    #[test]
    fn test_terminal_stage_names() {
        assert_eq!(
            serde_json::to_value(TerminalStage::Exception).unwrap(),
            json!("exception")
        );
        assert_eq!(TerminalStage::from(StageId::Elaboration).as_str(), "elaboration");
    }

    #[test]
    fn test_digest_depends_on_harness() {
        let plain = VerificationRequest::new("class A extends Module {}");
        let with_tb = plain.clone().harness("int main() {}");
        assert_ne!(plain.digest(), with_tb.digest());
        assert_eq!(plain.digest(), plain.clone().digest());
        assert!(plain.digest().starts_with("blake3:"));
    }

    #[test]
    fn test_record_concatenates_streams() {
        let mut outcome = StageOutcome::begin(StageId::Simulation);
        outcome.record(&InvocationResult {
            command: "verilator -cc".to_string(),
            exit_code: Some(0),
            stdout: "ok\n".to_string(),
            stderr: String::new(),
            timed_out: false,
            elapsed: Duration::from_millis(5),
        });
        outcome.record(&InvocationResult {
            command: "make".to_string(),
            exit_code: Some(2),
            stdout: "built".to_string(),
            stderr: "boom".to_string(),
            timed_out: false,
            elapsed: Duration::from_millis(7),
        });

        assert_eq!(outcome.commands.len(), 2);
        assert_eq!(outcome.exit_code, Some(2));
        assert_eq!(outcome.elapsed_ms, 12);
        assert!(outcome.stdout.contains("==> verilator -cc\nok\n==> make\nbuilt"));
        assert!(outcome.stderr.ends_with("boom"));
    }

    #[test]
    fn test_unreadable_harness_is_configuration_error() {
        let err = VerificationRequest::new("x")
            .harness_from_path("/definitely/not/here/tb.cpp")
            .unwrap_err();
        assert!(err.is_configuration());
    }
}

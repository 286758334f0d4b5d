//! Result Builder: folds a pipeline run into a `ReflectionReport`
use chrono::Utc;

use crate::data_model::{
    FailureKind, ReflectionReport, SimVerdict, StageId, StageOutcome, TerminalStage,
};
use crate::runner::{PipelineRun, PipelineState};
use crate::HWREFLECT_VERSION;

/// Request-level facts that do not come from the stages.
#[derive(Debug, Clone)]
pub struct ReportMeta {
    pub request_id: String,
    pub module_name: String,
    pub source_digest: String,
}

pub fn build_report(meta: ReportMeta, run: PipelineRun) -> ReflectionReport {
    let succeeded = |stage: StageId| run.outcome(stage).map_or(false, |o| o.success);
    let compiled = succeeded(StageId::Compilation);
    let elaborated = succeeded(StageId::Elaboration);

    // a fault (missing simulator, spawn error) means the design was never
    // exercised, so there is no verdict
    let sim_passed = match run.outcome(StageId::Simulation) {
        Some(outcome) if outcome.failure == Some(FailureKind::UnexpectedFault) => {
            SimVerdict::NotAttempted
        }
        Some(outcome) if elaborated => SimVerdict::from(Some(outcome.success)),
        _ => SimVerdict::NotAttempted,
    };

    let generated_artifact = run
        .outcome(StageId::Elaboration)
        .filter(|o| o.success)
        .and_then(|o| o.artifact.clone());
    let waveform = run
        .outcome(StageId::Simulation)
        .and_then(|o| o.waveform.clone());

    let (stage, failure_kind, error_excerpt) = match &run.state {
        PipelineState::Passed => (TerminalStage::Passed, None, None),
        PipelineState::Failed(stage) => {
            let outcome = run.outcome(*stage);
            let kind = outcome
                .and_then(|o| o.failure)
                .unwrap_or_else(|| FailureKind::for_stage(*stage));
            (
                TerminalStage::from(*stage),
                Some(kind),
                Some(failure_excerpt(*stage, outcome)),
            )
        }
        PipelineState::Exception { description, .. } => (
            TerminalStage::Exception,
            Some(FailureKind::UnexpectedFault),
            Some(non_empty(description, "Unexpected fault")),
        ),
        // the runner always ends terminal; treat a dangling state as a fault
        PipelineState::Running(stage) => (
            TerminalStage::Exception,
            Some(FailureKind::UnexpectedFault),
            Some(format!("Pipeline stopped while {} was in flight", stage)),
        ),
    };

    let (full_stdout, full_stderr) = if run.outcomes.is_empty() {
        (None, None)
    } else {
        (
            Some(join_streams(&run.outcomes, |o| &o.stdout)),
            Some(join_streams(&run.outcomes, |o| &o.stderr)),
        )
    };

    let report = ReflectionReport {
        request_id: meta.request_id,
        module_name: meta.module_name,
        compiled,
        elaborated,
        sim_passed,
        error_excerpt,
        generated_artifact,
        full_stdout,
        full_stderr,
        stage,
        failure_kind,
        timestamp: Utc::now(),
        engine_version: HWREFLECT_VERSION.to_string(),
        source_digest: meta.source_digest,
        waveform,
        stages: run.outcomes,
    };
    debug_assert!(
        report.invariant_violations().is_empty(),
        "inconsistent report: {:?}",
        report.invariant_violations()
    );
    report
}

fn failure_excerpt(stage: StageId, outcome: Option<&StageOutcome>) -> String {
    match outcome {
        Some(o) => match &o.excerpt {
            Some(excerpt) => non_empty(excerpt, &format!("{} failed", stage.label())),
            None => match o.exit_code {
                Some(code) => format!("{} failed with exit code {}", stage.label(), code),
                None => format!("{} failed", stage.label()),
            },
        },
        None => format!("{} failed", stage.label()),
    }
}

fn non_empty(text: &str, fallback: &str) -> String {
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text.to_string()
    }
}

fn join_streams(outcomes: &[StageOutcome], stream: impl Fn(&StageOutcome) -> &String) -> String {
    outcomes
        .iter()
        .map(|o| stream(o).as_str())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

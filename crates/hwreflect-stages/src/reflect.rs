//! `reflect`: one request through workspace, stages, report and persistence
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::Instrument;

use hwreflect_core::journal::{self, JournalEvent};
use hwreflect_core::{
    build_report, ArtifactPersister, ExecutionContext, PersistSummary, PipelineRun,
    PipelineRunner, ReflectError, ReflectionReport, ReportMeta, VerificationRequest, Workspace,
};

use crate::default_stages;
use crate::materialize::{materialize, resolve_module_name};

/// A finished request.
#[derive(Debug)]
pub struct Reflection {
    pub report: ReflectionReport,
    /// What this run wrote; `None` when the request named no output directory.
    pub persisted: Option<PersistSummary>,
}

/// Runs `request` and returns its report, persisted first when the request
/// names an output directory.
///
/// `Err` only for problems detected before any stage runs (bad input,
/// unusable workspace root). Tool failures, timeouts and faults all come
/// back as a report. The workspace is gone by the time this returns.
pub async fn reflect(
    request: &VerificationRequest,
    ctx: &ExecutionContext,
) -> Result<Reflection, ReflectError> {
    let module = resolve_module_name(request)?;
    let ctx = match &request.budgets {
        Some(budgets) => ctx.clone().with_budgets(budgets.clone()),
        None => ctx.clone(),
    };
    let span = tracing::info_span!("reflect", trace_id = %ctx.trace_id, module = %module);
    run_request(request, &ctx, module).instrument(span).await
}

async fn run_request(
    request: &VerificationRequest,
    ctx: &ExecutionContext,
    module: String,
) -> Result<Reflection, ReflectError> {
    let workspace = Workspace::acquire(&ctx.config.workspace_root())?;
    journal::record(
        ctx,
        JournalEvent::RequestStarted {
            module: module.clone(),
        },
    )
    .await;
    tracing::info!(workspace = %workspace.path().display(), harness = request.has_harness(), "request started");

    let run = match materialize(&workspace, request, &module, &ctx.config.toolchain) {
        Ok(project) => match PipelineRunner::new(default_stages(project)) {
            Ok(runner) => {
                tracing::debug!(pipeline = runner.pipeline_id(), "pipeline assembled");
                runner.run(&workspace, ctx).await
            }
            Err(e) => PipelineRun::fault_before_start(e.to_string()),
        },
        Err(e) => {
            tracing::error!(error = %e, "materialization failed");
            PipelineRun::fault_before_start(format!(
                "Unexpected fault while preparing workspace: {}",
                e
            ))
        }
    };

    if let Err(e) = workspace.release() {
        tracing::warn!(error = %e, "workspace cleanup failed");
    }

    let report = build_report(
        ReportMeta {
            request_id: ctx.trace_id.clone(),
            module_name: module,
            source_digest: request.digest(),
        },
        run,
    );
    journal::record(
        ctx,
        JournalEvent::RequestFinished {
            stage: report.stage.as_str().to_string(),
        },
    )
    .await;
    tracing::info!(stage = report.stage.as_str(), "request finished");

    let persisted = match &request.output_dir {
        Some(dir) => Some(
            ArtifactPersister::new(dir)
                .with_artifact_filename(request.artifact_filename.as_deref())
                .with_report_filename(request.report_filename.as_deref())
                .persist(&report)
                .await,
        ),
        None => None,
    };
    Ok(Reflection { report, persisted })
}

/// Runs `requests` with at most `parallelism` in flight. Results come back in
/// request order, each under its own trace id and workspace.
pub async fn reflect_many(
    requests: Vec<VerificationRequest>,
    ctx: &ExecutionContext,
    parallelism: usize,
) -> Vec<Result<Reflection, ReflectError>> {
    let permits = Arc::new(Semaphore::new(parallelism.max(1)));
    let handles: Vec<_> = requests
        .into_iter()
        .map(|request| {
            let permits = Arc::clone(&permits);
            let ctx = ctx.fork();
            tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| ReflectError::Worker(e.to_string()))?;
                reflect(&request, &ctx).await
            })
        })
        .collect();

    futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap_or_else(|e| Err(ReflectError::Worker(e.to_string()))))
        .collect()
}

//! Request journal: one JSON line per stage transition
//!
//! The destination comes from [`ExecutionContext::journal`]. Writes are
//! best-effort; a journal that cannot be written never fails a request.
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::context::ExecutionContext;
use crate::data_model::{FailureKind, StageId};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEvent {
    RequestStarted { module: String },
    StageStarted { stage: StageId },
    #[serde(rename_all = "camelCase")]
    StageFinished {
        stage: StageId,
        success: bool,
        elapsed_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        failure: Option<FailureKind>,
    },
    RequestFinished { stage: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JournalLine<'a> {
    ts: String,
    trace_id: &'a str,
    #[serde(flatten)]
    event: &'a JournalEvent,
}

/// Appends `event` to the context's journal, if it has one.
pub async fn record(ctx: &ExecutionContext, event: JournalEvent) {
    let Some(path) = &ctx.journal else {
        return;
    };
    let line = JournalLine {
        ts: Utc::now().to_rfc3339(),
        trace_id: &ctx.trace_id,
        event: &event,
    };
    let json = match serde_json::to_string(&line) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "journal event not serializable");
            return;
        }
    };
    if let Err(e) = append_line(path, &json).await {
        tracing::warn!(journal = %path.display(), error = %e, "journal write failed");
    }
}

async fn append_line(path: &Path, json: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    // single write so concurrent appenders do not interleave lines
    file.write_all(format!("{}\n", json).as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_journal_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let ctx = ExecutionContext::default().with_journal(&path);

        record(&ctx, JournalEvent::StageStarted { stage: StageId::Compilation }).await;
        record(
            &ctx,
            JournalEvent::StageFinished {
                stage: StageId::Compilation,
                success: false,
                elapsed_ms: 12,
                failure: Some(FailureKind::CompileError),
            },
        )
        .await;

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "stage_started");
        assert_eq!(lines[1]["stage"], "compilation");
        assert_eq!(lines[1]["elapsedMs"], 12);
        assert_eq!(lines[1]["failure"], "compileError");
        assert_eq!(lines[1]["traceId"], ctx.trace_id.as_str());
    }

    #[tokio::test]
    async fn test_no_journal_is_noop() {
        let ctx = ExecutionContext::default();
        record(&ctx, JournalEvent::RequestFinished { stage: "passed".to_string() }).await;
    }
}

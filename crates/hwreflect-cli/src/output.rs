//! Human-readable rendering for the terminal
use std::fmt::Write;
use std::path::Path;

use hwreflect_core::{PersistSummary, ReflectionReport, SimVerdict};

use crate::batch::BatchStats;

/// Characters of the excerpt shown inline; the full text is in the report.
pub const EXCERPT_PREVIEW_CHARS: usize = 500;

const RULE_WIDTH: usize = 60;

fn rule(ch: char) -> String {
    ch.to_string().repeat(RULE_WIDTH)
}

pub struct CheckHeader<'a> {
    pub file: &'a Path,
    pub module: &'a str,
    pub testbench: Option<&'a Path>,
    pub output: Option<&'a Path>,
}

pub fn render_header(header: &CheckHeader<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule('='));
    let _ = writeln!(out, "hwreflect check");
    let _ = writeln!(out, "{}", rule('='));
    let _ = writeln!(out, "Source:     {}", header.file.display());
    let _ = writeln!(out, "Module:     {}", header.module);
    let _ = writeln!(
        out,
        "Testbench:  {}",
        header
            .testbench
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none, compile and elaborate only)".to_string())
    );
    let _ = writeln!(
        out,
        "Output:     {}",
        header
            .output
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not saved)".to_string())
    );
    let _ = writeln!(out, "{}", rule('='));
    out
}

fn mark(ok: bool, yes: &str, no: &str) -> String {
    if ok {
        format!("✓ {}", yes)
    } else {
        format!("✗ {}", no)
    }
}

pub fn render_summary(report: &ReflectionReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule('='));
    let _ = writeln!(out, "Summary");
    let _ = writeln!(out, "{}", rule('='));
    let _ = writeln!(out, "Compile:    {}", mark(report.compiled, "ok", "failed"));
    let _ = writeln!(out, "Elaborate:  {}", mark(report.elaborated, "ok", "failed"));
    let sim = match report.sim_passed {
        SimVerdict::NotAttempted => "(not run)".to_string(),
        verdict => mark(verdict == SimVerdict::Passed, "passed", "failed"),
    };
    let _ = writeln!(out, "Simulate:   {}", sim);
    let _ = writeln!(out, "Stage:      {}", report.stage.as_str());
    if let Some(kind) = report.failure_kind {
        let _ = writeln!(out, "Failure:    {:?}", kind);
    }
    let _ = writeln!(out, "Timestamp:  {}", report.timestamp.to_rfc3339());
    for outcome in &report.stages {
        let status = if outcome.success {
            "ok"
        } else if outcome.timed_out {
            "timeout"
        } else {
            "failed"
        };
        let _ = writeln!(
            out,
            "  {:<12} {:<8} {:>7} ms",
            outcome.stage.as_str(),
            status,
            outcome.elapsed_ms
        );
    }

    if let Some(excerpt) = &report.error_excerpt {
        let _ = writeln!(out);
        let _ = writeln!(out, "Error excerpt:");
        let _ = writeln!(out, "{}", rule('-'));
        let total = excerpt.chars().count();
        let preview: String = excerpt.chars().take(EXCERPT_PREVIEW_CHARS).collect();
        let _ = writeln!(out, "{}", preview);
        if total > EXCERPT_PREVIEW_CHARS {
            let _ = writeln!(out, "...");
            let _ = writeln!(out, "({} characters in total, see the saved report)", total);
        }
    }
    let _ = writeln!(out, "{}", rule('='));
    if report.passed() {
        let _ = writeln!(out, "✓ All checks passed");
    } else {
        let _ = writeln!(out, "✗ Failed at stage: {}", report.stage.as_str());
    }
    out
}

/// Files written by this run only.
pub fn render_saved(summary: &PersistSummary) -> String {
    let mut out = String::new();
    for path in [summary.artifact_path(), summary.report_path()].into_iter().flatten() {
        let _ = writeln!(out, "Saved:      {}", path.display());
    }
    out
}

pub fn render_stats(stats: &BatchStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule('='));
    let _ = writeln!(out, "Total:      {}", stats.total);
    let _ = writeln!(out, "Passed:     {}", stats.passed);
    for (stage, count) in &stats.failures {
        let _ = writeln!(out, "{:<11} {}", format!("{}:", stage), count);
    }
    if stats.errors > 0 {
        let _ = writeln!(out, "Errors:     {}", stats.errors);
    }
    let _ = writeln!(out, "Pass rate:  {:.1}%", stats.pass_rate() * 100.0);
    out
}

//! Output Classifier: decides pass/fail from exit codes and captured text
//!
//! Third-party tools are never modified; their verdict is read from exit
//! status plus a fixed pattern table per stage:
//!
//! | stage       | success                                   | failure evidence                                              |
//! |-------------|-------------------------------------------|---------------------------------------------------------------|
//! | compilation | exit 0, no diagnostic line                | nonzero exit, `[error]` / `error:` lines                      |
//! | elaboration | exit 0, no diagnostic or exception line   | nonzero exit, diagnostic lines, JVM / Chisel exception traces |
//! | simulation  | exit 0, a pass token, no failure evidence | failure token, expected-vs-actual mismatch, nonzero exit      |
//!
//! Timeouts are classified before any text is looked at.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::data_model::{FailureKind, StageId};
use crate::invoker::InvocationResult;

/// Maximum number of lines kept in an excerpt.
pub const MAX_EXCERPT_LINES: usize = 80;

lazy_static! {
    /// sbt / scalac diagnostics: `[error] Foo.scala:7:23: ...` or `Foo.scala:7: error: ...`
    static ref DIAGNOSTIC: Regex =
        Regex::new(r"^\s*\[error\]|(^|\s)error:\s").unwrap();

    /// Elaboration blow-ups that do not always come with `[error]`.
    static ref EXCEPTION: Regex =
        Regex::new(r"Exception in thread|ChiselException|firrtl\.\S*Exception|circt\.\S*Exception|^\s*at [\w$.]+\(").unwrap();

    /// `expected X, got Y` / `expected: X but was Y`
    static ref EXPECTED_GOT: Regex = Regex::new(
        r"(?i)\bexpected\W+([\w.']+).*?\b(?:got|actual|received|was)\W+([\w.']+)"
    ).unwrap();

    /// `got Y, expected X`
    static ref GOT_EXPECTED: Regex = Regex::new(
        r"(?i)\b(?:got|actual|received)\W+([\w.']+).*?\bexpected\W+([\w.']+)"
    ).unwrap();

    /// `9 + 8 => 1 (expected 17)`
    static ref PAREN_EXPECTED: Regex =
        Regex::new(r"(?i)([\w.']+)\s*\(expected:?\s*([\w.']+)\)").unwrap();

    static ref MISMATCH_WORD: Regex = Regex::new(r"(?i)\bmismatch(?:es|ed)?\b").unwrap();

    /// A count of zero around a token: `0 mismatches`, `FAILED: 0`, `no mismatch`.
    static ref ZERO_BEFORE: Regex = Regex::new(r"(?i)\b(?:0|no|zero)\s+$").unwrap();
    static ref ZERO_AFTER: Regex = Regex::new(r"(?i)^\s*[:=]?\s*(?:0|none)\b").unwrap();

    /// sbt colours its log levels when it thinks it has a terminal.
    static ref ANSI: Regex = Regex::new(r"\x1b\[[0-9;]*m").unwrap();
}

/// Pass / failure tokens printed by harnesses. Matched as whole words,
/// case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkerTable {
    pub pass_tokens: Vec<String>,
    pub fail_tokens: Vec<String>,
}

impl Default for MarkerTable {
    fn default() -> Self {
        Self {
            pass_tokens: vec![
                "TEST PASSED".to_string(),
                "PASSED".to_string(),
                "PASS".to_string(),
            ],
            fail_tokens: vec![
                "TEST FAILED".to_string(),
                "FAILED".to_string(),
                "FAIL".to_string(),
            ],
        }
    }
}

impl MarkerTable {
    /// A token counts unless it only reports a count of zero.
    fn line_has_token(line: &str, tokens: &[String]) -> bool {
        tokens.iter().any(|token| {
            word_matches(line, token).any(|(start, end)| !is_zero_count(line, start, end))
        })
    }

    pub fn is_pass_line(&self, line: &str) -> bool {
        Self::line_has_token(line, &self.pass_tokens)
    }

    pub fn is_fail_line(&self, line: &str) -> bool {
        Self::line_has_token(line, &self.fail_tokens) || is_mismatch_line(line)
    }
}

/// Spans where `token` occurs in `line` not glued to other word characters.
fn word_matches<'a>(line: &'a str, token: &'a str) -> impl Iterator<Item = (usize, usize)> + 'a {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    line.match_indices(token)
        .filter(move |_| !token.is_empty())
        .map(move |(start, _)| (start, start + token.len()))
        .filter(move |&(start, end)| {
            let before = line[..start].chars().next_back();
            let after = line[end..].chars().next();
            !before.map_or(false, is_word) && !after.map_or(false, is_word)
        })
}

fn is_zero_count(line: &str, start: usize, end: usize) -> bool {
    ZERO_BEFORE.is_match(&line[..start]) || ZERO_AFTER.is_match(&line[end..])
}

/// Expected-vs-actual report whose two values differ, or a mismatch that is
/// not a zero count.
fn is_mismatch_line(line: &str) -> bool {
    values_differ(&EXPECTED_GOT, line)
        || values_differ(&GOT_EXPECTED, line)
        || values_differ(&PAREN_EXPECTED, line)
        || MISMATCH_WORD
            .find_iter(line)
            .any(|m| !is_zero_count(line, m.start(), m.end()))
}

fn values_differ(re: &Regex, line: &str) -> bool {
    re.captures_iter(line)
        .any(|caps| !same_value(&caps[1], &caps[2]))
}

fn same_value(a: &str, b: &str) -> bool {
    let trim = |v: &str| v.trim_end_matches(|c: char| c == '.' || c == '\'').to_string();
    trim(a).eq_ignore_ascii_case(&trim(b))
}

/// Verdict for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub success: bool,
    pub failure: Option<FailureKind>,
    pub excerpt: Option<String>,
}

impl Classification {
    pub fn pass() -> Self {
        Self {
            success: true,
            failure: None,
            excerpt: None,
        }
    }

    pub fn fail(kind: FailureKind, excerpt: impl Into<String>) -> Self {
        Self {
            success: false,
            failure: Some(kind),
            excerpt: Some(excerpt.into()),
        }
    }
}

/// Classifies a compile or elaborate invocation.
pub fn classify_build(stage: StageId, result: &InvocationResult, budget: Duration) -> Classification {
    if result.timed_out {
        return Classification::fail(
            FailureKind::ToolchainTimeout,
            timeout_excerpt(stage, &result.command, budget),
        );
    }

    let include_exceptions = stage == StageId::Elaboration;
    let diagnostics: Vec<String> = stream_lines(result)
        .filter(|line| {
            DIAGNOSTIC.is_match(line) || (include_exceptions && EXCEPTION.is_match(line))
        })
        .collect();

    if result.exit_code == Some(0) && diagnostics.is_empty() {
        return Classification::pass();
    }

    let body = if diagnostics.is_empty() {
        fallback_tail(result)
    } else {
        cap_lines(diagnostics.iter().map(String::as_str))
    };
    let title = match stage {
        StageId::Compilation => "Compilation Error",
        StageId::Elaboration => "Elaboration Error",
        StageId::Simulation => "Simulation Error",
    };
    Classification::fail(
        FailureKind::for_stage(stage),
        format!("{} ({}):\n{}", title, exit_text(result), body),
    )
}

/// Classifies the harness run. A pass requires exit 0, a pass token and no
/// failure evidence anywhere in the output.
pub fn classify_simulation(
    result: &InvocationResult,
    table: &MarkerTable,
    budget: Duration,
) -> Classification {
    if result.timed_out {
        return Classification::fail(
            FailureKind::ToolchainTimeout,
            format!(
                "{} (no pass marker was printed before the process was killed)",
                timeout_excerpt(StageId::Simulation, &result.command, budget)
            ),
        );
    }

    let lines: Vec<String> = stream_lines(result).collect();
    let fail_lines: Vec<&str> = lines
        .iter()
        .map(String::as_str)
        .filter(|line| table.is_fail_line(line))
        .collect();
    let has_pass = lines.iter().any(|line| table.is_pass_line(line));

    if result.exit_code == Some(0) && has_pass && fail_lines.is_empty() {
        return Classification::pass();
    }

    let excerpt = if !fail_lines.is_empty() {
        format!("Simulation Test Failed:\n{}", cap_lines(fail_lines.into_iter()))
    } else if result.exit_code != Some(0) {
        format!(
            "Simulation Runtime Error ({}):\n{}",
            exit_text(result),
            fallback_tail(result)
        )
    } else {
        format!(
            "Simulation Test Failed: pass marker not found in output\n{}",
            fallback_tail(result)
        )
    };
    Classification::fail(FailureKind::SimulationFailure, excerpt)
}

/// Classifies a helper step of the simulation stage (model generation, C++
/// build). These have no markers; only exit status matters.
pub fn classify_step(step: &str, result: &InvocationResult, budget: Duration) -> Classification {
    if result.timed_out {
        return Classification::fail(
            FailureKind::ToolchainTimeout,
            timeout_excerpt(StageId::Simulation, &result.command, budget),
        );
    }
    if result.exit_code == Some(0) {
        return Classification::pass();
    }
    Classification::fail(
        FailureKind::SimulationFailure,
        format!("{} Error ({}):\n{}", step, exit_text(result), fallback_tail(result)),
    )
}

/// Timeout excerpt, distinct from any tool-reported failure.
pub fn timeout_excerpt(stage: StageId, command: &str, budget: Duration) -> String {
    format!(
        "{} timeout: `{}` exceeded {}",
        stage.label(),
        command,
        format_budget(budget)
    )
}

fn format_budget(budget: Duration) -> String {
    if budget.subsec_millis() == 0 {
        format!("{}s", budget.as_secs())
    } else {
        format!("{}ms", budget.as_millis())
    }
}

fn exit_text(result: &InvocationResult) -> String {
    match result.exit_code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// stdout then stderr, ANSI-stripped, without the `==>` headers.
fn stream_lines(result: &InvocationResult) -> impl Iterator<Item = String> + '_ {
    result
        .stdout
        .lines()
        .chain(result.stderr.lines())
        .map(|line| ANSI.replace_all(line, "").into_owned())
}

fn cap_lines<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    let lines: Vec<&str> = lines.collect();
    let mut text = lines
        .iter()
        .take(MAX_EXCERPT_LINES)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    if lines.len() > MAX_EXCERPT_LINES {
        text.push_str(&format!("\n... ({} more lines)", lines.len() - MAX_EXCERPT_LINES));
    }
    text
}

/// Last lines of stderr, or of stdout when stderr is empty.
fn fallback_tail(result: &InvocationResult) -> String {
    let source = if result.stderr.trim().is_empty() {
        &result.stdout
    } else {
        &result.stderr
    };
    tail(source, MAX_EXCERPT_LINES)
}

/// Last `n` lines of `text`.
pub fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    let body = lines[start..].join("\n");
    if body.trim().is_empty() {
        "(no output)".to_string()
    } else {
        body
    }
}

//! `hwreflect batch`: a JSON-lines file of cases, run with bounded parallelism
use clap::Args;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hwreflect_core::{
    ArtifactPersister, ExecutionContext, ReflectError, ReflectionReport, VerificationRequest,
};
use hwreflect_stages::reflect_many;

use crate::output::render_stats;
use crate::{EXIT_FAILED, EXIT_PASSED, EXIT_USAGE};

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// JSON-lines file, one case per line
    #[arg(long, short = 'c')]
    pub cases: PathBuf,

    /// Requests in flight at once (defaults to available cores)
    #[arg(long, short = 'p')]
    pub parallel: Option<usize>,

    /// Directory receiving `<id>.json` and `<id>.v` per case
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Print results and statistics as JSON
    #[arg(long)]
    pub json: bool,
}

/// One line of the cases file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCase {
    pub id: String,
    pub source: String,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub harness: Option<String>,
    /// Relative paths resolve against the cases file's directory
    #[serde(default)]
    pub harness_path: Option<PathBuf>,
}

impl BatchCase {
    pub fn to_request(&self, base_dir: &Path) -> Result<VerificationRequest, ReflectError> {
        let mut request = VerificationRequest::new(self.source.clone());
        if let Some(module) = &self.module {
            request = request.module(module.clone());
        }
        match (&self.harness, &self.harness_path) {
            (Some(_), Some(_)) => {
                return Err(ReflectError::config(format!(
                    "case '{}': give either harness or harnessPath, not both",
                    self.id
                )))
            }
            (Some(harness), None) => request = request.harness(harness.clone()),
            (None, Some(path)) => request = request.harness_from_path(base_dir.join(path))?,
            (None, None) => {}
        }
        Ok(request)
    }
}

fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Parses the cases file. Blank lines are skipped; ids must be unique and
/// usable as file names.
pub fn parse_cases(text: &str) -> Result<Vec<BatchCase>, ReflectError> {
    let mut cases: Vec<BatchCase> = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let case: BatchCase = serde_json::from_str(line)
            .map_err(|e| ReflectError::config(format!("line {}: {}", index + 1, e)))?;
        if !valid_id(&case.id) {
            return Err(ReflectError::config(format!(
                "line {}: id '{}' must be a plain file name",
                index + 1,
                case.id
            )));
        }
        if cases.iter().any(|c| c.id == case.id) {
            return Err(ReflectError::config(format!(
                "line {}: duplicate id '{}'",
                index + 1,
                case.id
            )));
        }
        cases.push(case);
    }
    Ok(cases)
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub total: usize,
    pub passed: usize,
    /// Failed cases per terminal stage
    pub failures: BTreeMap<String, usize>,
    /// Cases rejected before any stage ran
    pub errors: usize,
}

impl BatchStats {
    pub fn collect<'a>(results: impl IntoIterator<Item = &'a Result<ReflectionReport, ReflectError>>) -> Self {
        let mut stats = Self::default();
        for result in results {
            stats.total += 1;
            match result {
                Ok(report) if report.passed() => stats.passed += 1,
                Ok(report) => {
                    *stats
                        .failures
                        .entry(report.stage.as_str().to_string())
                        .or_insert(0) += 1
                }
                Err(_) => stats.errors += 1,
            }
        }
        stats
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CaseLine<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn run(args: &BatchArgs, ctx: ExecutionContext) -> i32 {
    let text = match std::fs::read_to_string(&args.cases) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: cannot read cases '{}': {}", args.cases.display(), e);
            return EXIT_USAGE;
        }
    };
    let cases = match parse_cases(&text) {
        Ok(cases) => cases,
        Err(e) => {
            eprintln!("error: {}: {}", args.cases.display(), e);
            return EXIT_USAGE;
        }
    };
    let base_dir = args
        .cases
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let requests = match cases
        .iter()
        .map(|case| case.to_request(&base_dir))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(requests) => requests,
        Err(e) => {
            eprintln!("error: {}", e);
            return EXIT_USAGE;
        }
    };

    let parallel = args.parallel.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    tracing::info!(cases = cases.len(), parallel, "batch started");
    let results: Vec<Result<ReflectionReport, ReflectError>> =
        reflect_many(requests, &ctx, parallel)
            .await
            .into_iter()
            .map(|result| result.map(|reflection| reflection.report))
            .collect();

    let mut lines = Vec::with_capacity(cases.len());
    for (case, result) in cases.iter().zip(&results) {
        let line = match result {
            Ok(report) => {
                if let Some(dir) = &args.output {
                    save_case(dir, &case.id, report).await;
                }
                CaseLine {
                    id: &case.id,
                    stage: Some(report.stage.as_str()),
                    error: None,
                }
            }
            Err(e) => CaseLine {
                id: &case.id,
                stage: None,
                error: Some(e.to_string()),
            },
        };
        if !args.json {
            match (&line.stage, &line.error) {
                (Some("passed"), _) => println!("[ok]   {}", line.id),
                (Some(stage), _) => println!("[fail] {}  {}", line.id, stage),
                (None, Some(error)) => println!("[err]  {}  {}", line.id, error),
                (None, None) => {}
            }
        }
        lines.push(line);
    }

    let stats = BatchStats::collect(&results);
    if args.json {
        let summary = serde_json::json!({ "results": lines, "stats": stats });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("error: {}", e),
        }
    } else {
        print!("{}", render_stats(&stats));
    }

    if stats.passed == stats.total {
        EXIT_PASSED
    } else {
        EXIT_FAILED
    }
}

/// Writes `<id>.json` and, when elaboration produced one, `<id>.v`.
async fn save_case(dir: &Path, id: &str, report: &ReflectionReport) {
    let summary = case_persister(dir, id).persist(report).await;
    for error in summary.errors() {
        eprintln!("warning: case '{}' not saved: {}", id, error);
    }
}

fn case_persister(dir: &Path, id: &str) -> ArtifactPersister {
    ArtifactPersister::new(dir)
        .with_artifact_filename(Some(&format!("{}.v", id)))
        .with_report_filename(Some(&format!("{}.json", id)))
}

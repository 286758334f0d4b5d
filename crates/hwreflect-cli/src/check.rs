//! `hwreflect check`: one source file through the pipeline
use clap::Args;
use std::path::PathBuf;

use hwreflect_core::{ExecutionContext, ReflectError, VerificationRequest};
use hwreflect_stages::{reflect, resolve_module_name, Reflection};

use crate::output::{render_header, render_saved, render_summary, CheckHeader};
use crate::{EXIT_FAILED, EXIT_PASSED, EXIT_USAGE};

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Chisel source file
    #[arg(long, short = 'f')]
    pub file: PathBuf,

    /// Simulation harness; without it only compile and elaborate run
    #[arg(long, short = 't')]
    pub testbench: Option<PathBuf>,

    /// Directory receiving the netlist and the JSON report
    #[arg(long, short = 'o', default_value = "tests")]
    pub output: PathBuf,

    /// Top module name (detected from the source when omitted)
    #[arg(long, short = 'm')]
    pub module: Option<String>,

    /// Netlist file name inside the output directory
    #[arg(long)]
    pub artifact: Option<String>,

    /// Report file name inside the output directory
    #[arg(long)]
    pub result: Option<String>,

    /// Do not write anything to the output directory
    #[arg(long)]
    pub no_save: bool,

    /// Print the report as JSON instead of the summary
    #[arg(long)]
    pub json: bool,

    /// Append stage transitions to this JSON-lines file
    #[arg(long)]
    pub journal: Option<PathBuf>,
}

impl CheckArgs {
    /// Reads the input files into a request. Missing files are configuration
    /// errors, reported before any tool runs.
    pub fn to_request(&self) -> Result<VerificationRequest, ReflectError> {
        let source = std::fs::read_to_string(&self.file).map_err(|e| {
            ReflectError::config(format!("cannot read source '{}': {}", self.file.display(), e))
        })?;

        let mut request = VerificationRequest::new(source);
        if let Some(module) = &self.module {
            request = request.module(module.clone());
        }
        if let Some(testbench) = &self.testbench {
            request = request.harness_from_path(testbench)?;
        }
        if !self.no_save {
            request = request.output_dir(&self.output);
            if let Some(name) = &self.artifact {
                request = request.artifact_filename(name.clone());
            }
            if let Some(name) = &self.result {
                request = request.report_filename(name.clone());
            }
        }
        Ok(request)
    }
}

pub async fn run(args: &CheckArgs, ctx: ExecutionContext) -> i32 {
    let ctx = match &args.journal {
        Some(path) => ctx.with_journal(path),
        None => ctx,
    };

    let request = match args.to_request() {
        Ok(request) => request,
        Err(e) => {
            eprintln!("error: {}", e);
            return EXIT_USAGE;
        }
    };
    let module = match resolve_module_name(&request) {
        Ok(module) => module,
        Err(e) => {
            eprintln!("error: {}", e);
            return EXIT_USAGE;
        }
    };

    if !args.json {
        print!(
            "{}",
            render_header(&CheckHeader {
                file: &args.file,
                module: &module,
                testbench: args.testbench.as_deref(),
                output: request.output_dir.as_deref(),
            })
        );
    }

    let Reflection { report, persisted } = match reflect(&request, &ctx).await {
        Ok(reflection) => reflection,
        Err(e) if e.is_configuration() => {
            eprintln!("error: {}", e);
            return EXIT_USAGE;
        }
        Err(e) => {
            eprintln!("error: {}", e);
            return EXIT_FAILED;
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("error: {}", e),
        }
    } else {
        print!("{}", render_summary(&report));
        if let Some(summary) = &persisted {
            print!("{}", render_saved(summary));
        }
    }
    if let Some(summary) = &persisted {
        for error in summary.errors() {
            eprintln!("warning: not saved: {}", error);
        }
    }

    if report.passed() {
        EXIT_PASSED
    } else {
        EXIT_FAILED
    }
}

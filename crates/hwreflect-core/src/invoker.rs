//! Toolchain Invoker: runs one external process under a wall-clock budget
//!
//! Output streams go to log files inside the caller's workspace so chatty
//! tools never grow an in-memory pipe buffer; the text is read back (tail
//! capped) once the process is gone. The invoker keeps no state between calls.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::process::{Child, Command};

/// Default cap on captured bytes per stream.
pub const DEFAULT_MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// A program plus arguments and extra environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Shell-like rendering for logs and reports.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What one invocation produced.
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub command: String,
    /// None when the process was killed by a signal or by the budget
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl InvocationResult {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("SPAWN/{program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CAPTURE/{}: {source}", path.display())]
    Capture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("WAIT/{program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ToolchainInvoker {
    max_capture_bytes: usize,
}

impl ToolchainInvoker {
    pub fn new(max_capture_bytes: usize) -> Self {
        Self { max_capture_bytes }
    }

    /// Runs `command` in `working_dir`, capturing into
    /// `<capture_dir>/<stem>.stdout.log` and `<stem>.stderr.log`.
    pub async fn run(
        &self,
        command: &ToolCommand,
        working_dir: &Path,
        budget: Duration,
        capture_dir: &Path,
        stem: &str,
    ) -> Result<InvocationResult, InvokeError> {
        let stdout_path = capture_dir.join(format!("{}.stdout.log", stem));
        let stderr_path = capture_dir.join(format!("{}.stderr.log", stem));
        let stdout_file = create_capture(&stdout_path)?;
        let stderr_file = create_capture(&stderr_path)?;

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .envs(&command.env)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file))
            .kill_on_drop(true);
        #[cfg(unix)]
        process.process_group(0);

        let rendered = command.display();
        tracing::debug!(command = %rendered, budget_ms = budget.as_millis() as u64, "spawning tool");

        let started = Instant::now();
        let mut child = process.spawn().map_err(|source| InvokeError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        let (exit_code, timed_out) = match tokio::time::timeout(budget, child.wait()).await {
            Ok(status) => {
                let status = status.map_err(|source| InvokeError::Wait {
                    program: command.program.clone(),
                    source,
                })?;
                (status.code(), false)
            }
            Err(_) => {
                tracing::warn!(command = %rendered, "budget exceeded, killing process group");
                terminate(&mut child).await;
                (None, true)
            }
        };
        let elapsed = started.elapsed();

        Ok(InvocationResult {
            command: rendered,
            exit_code,
            stdout: read_capture(&stdout_path, self.max_capture_bytes).await?,
            stderr: read_capture(&stderr_path, self.max_capture_bytes).await?,
            timed_out,
            elapsed,
        })
    }
}

impl Default for ToolchainInvoker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CAPTURE_BYTES)
    }
}

fn create_capture(path: &Path) -> Result<std::fs::File, InvokeError> {
    std::fs::File::create(path).map_err(|source| InvokeError::Capture {
        path: path.to_path_buf(),
        source,
    })
}

/// Kills the child and everything it spawned.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // the child leads its own group; a negative pid addresses all of it
        let _ = Command::new("kill")
            .args(["-s", "KILL", "--", &format!("-{}", pid)])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
    }
    let _ = child.kill().await;
}

/// Reads a capture file, keeping only the last `max_bytes`.
async fn read_capture(path: &Path, max_bytes: usize) -> Result<String, InvokeError> {
    let capture_err = |source| InvokeError::Capture {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::open(path).await.map_err(capture_err)?;
    let len = file.metadata().await.map_err(capture_err)?.len() as usize;

    let mut bytes = Vec::with_capacity(len.min(max_bytes));
    let dropped = len.saturating_sub(max_bytes);
    if dropped > 0 {
        file.seek(SeekFrom::Start(dropped as u64))
            .await
            .map_err(capture_err)?;
    }
    file.read_to_end(&mut bytes).await.map_err(capture_err)?;

    let text = String::from_utf8_lossy(&bytes);
    if dropped > 0 {
        Ok(format!("[... {} bytes truncated ...]\n{}", dropped, text))
    } else {
        Ok(text.into_owned())
    }
}

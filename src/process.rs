//! Locate-and-invoke for external executables.
//!
//! Every subprocess the crate starts goes through a [`CommandRunner`], which
//! returns captured stdout/stderr and the exit code. [`ExternalTool`] adds
//! discovery on top: an ordered list of candidate program names is probed
//! once, and the first one that answers its probe successfully is kept for
//! the rest of the run as a [`LocatedTool`].
//!
//! Tests swap [`SystemRunner`] for an in-process fake.

use crate::error::{BatchError, ToolError};
use crate::fallback::first_match_async;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;

/// Upper bound for one availability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured result of one process run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs a program to completion and captures its output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`. A non-zero exit is *not* an error at this
    /// level; inspect [`CommandOutput::code`].
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ToolError>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ToolError> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.output();
        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, child)
                .await
                .map_err(|_| ToolError::Timeout {
                    program: program.to_string(),
                    secs: limit.as_secs(),
                })?,
            None => child.await,
        }
        .map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ToolError::NotFound {
                tried: vec![program.to_string()],
            },
            _ => ToolError::Spawn {
                program: program.to_string(),
                source,
            },
        })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
        })
    }
}

/// An external program known by several possible names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTool {
    /// Human-readable name for messages, e.g. `"PDF watermark tool"`.
    pub label: String,
    /// Program names or paths, probed in order.
    pub candidates: Vec<String>,
    /// Arguments of the availability probe, e.g. `["--help"]`.
    pub probe_args: Vec<String>,
    /// Installation hint shown when nothing is found.
    pub hint: String,
}

impl ExternalTool {
    /// Probe the candidates in order and keep the first that exits with 0.
    ///
    /// Not finding any candidate is a run-level precondition failure.
    pub async fn locate(&self, runner: &dyn CommandRunner) -> Result<LocatedTool, BatchError> {
        let found = first_match_async(self.candidates.iter(), |program| async move {
            match runner.run(program, &self.probe_args, Some(PROBE_TIMEOUT)).await {
                Ok(out) if out.success() => Some(program.clone()),
                Ok(out) => {
                    debug!("Probe of '{}' exited with {:?}", program, out.code);
                    None
                }
                Err(e) => {
                    debug!("Probe of '{}' failed: {}", program, e);
                    None
                }
            }
        })
        .await;

        match found {
            Some(program) => {
                debug!("{} located: {}", self.label, program);
                Ok(LocatedTool {
                    label: self.label.clone(),
                    program,
                })
            }
            None => Err(BatchError::ToolNotFound {
                tool: self.label.clone(),
                tried: self.candidates.clone(),
                hint: self.hint.clone(),
            }),
        }
    }
}

/// A tool whose executable has been confirmed to respond.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedTool {
    pub label: String,
    pub program: String,
}

impl LocatedTool {
    /// Run the tool; a non-zero exit becomes [`ToolError::NonZeroExit`]
    /// carrying stderr.
    pub async fn invoke(
        &self,
        runner: &dyn CommandRunner,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ToolError> {
        debug!("{} {}", self.program, args.join(" "));
        let out = runner.run(&self.program, args, timeout).await?;
        if out.success() {
            Ok(out)
        } else {
            Err(ToolError::NonZeroExit {
                program: self.program.clone(),
                code: out.code,
                stderr: out.stderr.trim().to_string(),
            })
        }
    }
}

//! Build tool execution

use crate::config::schema::BuildStepConfig;
use crate::error::{QuillError, QuillResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Max number of output lines to include in build error messages.
const BUILD_ERROR_TAIL_LINES: usize = 50;

/// One named build-tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
    pub name: String,
    pub command: Vec<String>,
}

impl BuildStep {
    pub fn new<I, S>(name: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            command: command.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<&BuildStepConfig> for BuildStep {
    fn from(config: &BuildStepConfig) -> Self {
        Self::new(config.name.clone(), config.command.iter().cloned())
    }
}

/// Runs a build step in a working directory
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the step to completion and return its stdout.
    ///
    /// A non-zero exit is `BuildTool`; running past `timeout` is `BuildToolTimeout`.
    async fn run(&self, workdir: &Path, step: &BuildStep, timeout: Duration) -> QuillResult<String>;
}

/// Runs build steps as child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessToolRunner;

impl ProcessToolRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run(&self, workdir: &Path, step: &BuildStep, timeout: Duration) -> QuillResult<String> {
        let Some((program, args)) = step.command.split_first() else {
            return Err(QuillError::BuildTool {
                step: step.name.clone(),
                reason: "empty command".to_string(),
            });
        };
        let program = resolve_executable(program, cfg!(windows));
        debug!("Executing: {} {:?} in {}", program, args, workdir.display());

        let child = Command::new(&program)
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => QuillError::ToolNotFound {
                    command: step.command.join(" "),
                },
                _ => QuillError::command_failed(step.command.join(" "), e),
            })?;

        // Dropping the child on timeout kills it
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| QuillError::command_failed(step.command.join(" "), e))?,
            Err(_) => {
                return Err(QuillError::BuildToolTimeout {
                    step: step.name.clone(),
                    secs: timeout.as_secs(),
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = build_error_output(&stdout, &stderr);
            Err(QuillError::BuildTool {
                step: step.name.clone(),
                reason: if tail.trim().is_empty() {
                    format!("exited with {} and no output", output.status)
                } else {
                    tail
                },
            })
        }
    }
}

/// `npm` and `npx` are batch shims on Windows
fn resolve_executable(name: &str, windows: bool) -> String {
    if windows && matches!(name, "npm" | "npx") {
        format!("{}.cmd", name)
    } else {
        name.to_string()
    }
}

/// Extract the useful tail of build output for error diagnostics.
///
/// Combines stdout and stderr, then returns the last `BUILD_ERROR_TAIL_LINES`
/// lines so error messages are actionable without being overwhelming.
fn build_error_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let start = lines.len().saturating_sub(BUILD_ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

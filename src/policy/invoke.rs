//! Policy engine invocation.
//!
//! The engine runs as a subprocess confined to a small set of mount paths.
//! This module builds the command line from the opaque argument string, runs
//! it with a bounded wait, and sorts failures into "never started" versus
//! "ran and exited nonzero"; the latter may still carry a usable report on
//! stdout.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// Flag the engine expects in front of the document under evaluation.
const DOCUMENT_FLAG: &str = "-p";

/// A fully resolved engine command, built once per validation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Directories the sandbox grants the engine access to.
    pub mount_paths: BTreeSet<PathBuf>,
    pub timeout: Duration,
}

/// The configured argument string could not be turned into an argv.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("invalid policy engine arguments: {0}")]
    Arguments(#[from] shell_words::ParseError),
}

impl ResolvedInvocation {
    /// Split the configured argument string and append the document pointer.
    pub fn new(
        program: &str,
        arguments: &str,
        document: &Path,
        working_dir: &Path,
        mount_paths: BTreeSet<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, InvocationError> {
        let mut args = shell_words::split(arguments)?;
        args.push(DOCUMENT_FLAG.to_string());
        args.push(document.display().to_string());

        Ok(Self {
            program: program.to_string(),
            args,
            working_dir: working_dir.to_path_buf(),
            mount_paths,
            timeout,
        })
    }
}

/// Captured output of a completed engine run.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum CommandError {
    /// The engine never started; there is nothing to salvage.
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine started but collecting its output failed.
    #[error("i/o failure while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine ran past its deadline and was killed.
    #[error("`{program}` did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    /// Nonzero exit. Engines commonly exit nonzero when violations are
    /// found, so captured stdout may still hold a report.
    #[error("`{program}` exited with status {}", exit_label(.code))]
    Exit {
        program: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "unknown".to_string(),
    }
}

/// Boundary to the sandboxed command runner.
#[tower_lsp::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &ResolvedInvocation) -> Result<CommandOutput, CommandError>;
}

/// Runner that executes the engine directly on the host.
///
/// Mount paths are carried for the engine's confinement but not enforced
/// here; a container-backed runner enforces them.
pub struct LocalRunner;

#[tower_lsp::async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, invocation: &ResolvedInvocation) -> Result<CommandOutput, CommandError> {
        log::debug!(
            "running {} {:?} in {} (mounts: {:?})",
            invocation.program,
            invocation.args,
            invocation.working_dir.display(),
            invocation.mount_paths,
        );

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(CommandError::Io {
                    program: invocation.program.clone(),
                    source,
                });
            }
            Err(_) => {
                return Err(CommandError::Timeout {
                    program: invocation.program.clone(),
                    timeout: invocation.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(CommandError::Exit {
                program: invocation.program.clone(),
                code: output.status.code(),
                stdout,
                stderr,
            })
        }
    }
}

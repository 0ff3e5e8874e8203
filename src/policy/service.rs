//! Validation orchestration.
//!
//! One `validate` call runs the full pipeline for a document: configuration
//! discovery, mount computation, engine invocation, report parsing, and
//! diagnostic mapping. The service owns progress and error reporting through
//! an injected [`EditorBridge`], so it can run without an editor host.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::policy::diagnostics::{self, DiagnosticMap};
use crate::policy::discovery;
use crate::policy::invoke::{
    CommandError, CommandRunner, InvocationError, LocalRunner, ResolvedInvocation,
};
use crate::policy::report::{self, ReportError};

pub const PROGRESS_TITLE: &str = "Policy check";
pub const PROGRESS_MESSAGE: &str = "Processing files...";

/// Progress and notification channel back to the editor.
#[tower_lsp::async_trait]
pub trait EditorBridge: Send + Sync {
    async fn progress_begin(&self, title: &str, message: &str);
    async fn progress_done(&self);
    async fn show_error(&self, message: &str);
}

/// One document validation, immutable while it runs.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub document_path: PathBuf,
    pub workspace_root: PathBuf,
    /// Raw argument string for the engine, straight from configuration.
    pub engine_arguments: String,
}

/// Engine identity and the bounded wait for one run.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub program: String,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
enum ValidationError {
    #[error(transparent)]
    Arguments(#[from] InvocationError),

    #[error(transparent)]
    Engine(CommandError),

    #[error("could not parse `{program}` output; check the engine installation and configuration")]
    Report {
        program: String,
        #[source]
        source: ReportError,
    },
}

/// Sequences discovery, invocation, parsing, and mapping for one document.
pub struct ValidationService {
    engine: EngineSettings,
    runner: Arc<dyn CommandRunner>,
}

impl ValidationService {
    pub fn new(engine: EngineSettings) -> Self {
        Self::with_runner(engine, Arc::new(LocalRunner))
    }

    /// Use a custom runner, e.g. a container-backed sandbox.
    pub fn with_runner(engine: EngineSettings, runner: Arc<dyn CommandRunner>) -> Self {
        Self { engine, runner }
    }

    /// Validate one document and return its diagnostics grouped by file.
    ///
    /// `None` means the run failed outright and nothing is known about the
    /// document; callers must not treat it as "clean". The progress
    /// indicator is released on every path, and a fatal request surfaces
    /// exactly one user-visible error.
    pub async fn validate(
        &self,
        request: &ValidationRequest,
        bridge: &dyn EditorBridge,
    ) -> Option<DiagnosticMap> {
        bridge.progress_begin(PROGRESS_TITLE, PROGRESS_MESSAGE).await;
        let outcome = self.validate_inner(request).await;
        bridge.progress_done().await;

        match outcome {
            Ok(map) => Some(map),
            Err(error) => {
                bridge.show_error(&error.to_string()).await;
                None
            }
        }
    }

    async fn validate_inner(
        &self,
        request: &ValidationRequest,
    ) -> Result<DiagnosticMap, ValidationError> {
        let mut arguments = request.engine_arguments.clone();
        let mut mount_paths = BTreeSet::from([request.workspace_root.clone()]);

        // Explicit configuration always wins over discovery
        let explicit = discovery::explicit_config_path(&arguments);
        log::debug!("explicit engine config: {explicit:?}");
        if explicit.is_none() {
            if let Some(config_file) =
                discovery::find_config_file(&request.document_path, &request.workspace_root).await
            {
                log::debug!("discovered engine config: {}", config_file.display());
                if let Some(config_dir) = config_file.parent() {
                    mount_paths.insert(config_dir.to_path_buf());
                }
                arguments = format!("{arguments} -c \"{}\"", config_file.display());
            }
        }
        if let Some(document_dir) = request.document_path.parent() {
            mount_paths.insert(document_dir.to_path_buf());
        }

        let invocation = ResolvedInvocation::new(
            &self.engine.program,
            &arguments,
            &request.document_path,
            &request.workspace_root,
            mount_paths,
            self.engine.timeout,
        )?;
        log::info!(
            "running {} with arguments {:?} for {}",
            self.engine.program,
            invocation.args,
            request.document_path.display(),
        );

        let stdout = match self.runner.run(&invocation).await {
            Ok(output) => {
                if !output.stderr.is_empty() {
                    log::info!("{}: {}", self.engine.program, output.stderr);
                }
                output.stdout
            }
            // Engines report violations through a nonzero exit; the report
            // on stdout is still good
            Err(CommandError::Exit { stdout, stderr, .. }) if !stdout.is_empty() => {
                if !stderr.is_empty() {
                    log::info!("{}: {}", self.engine.program, stderr);
                }
                stdout
            }
            Err(error) => {
                if let CommandError::Exit { stderr, .. } = &error {
                    if !stderr.is_empty() {
                        log::error!("{}: {}", self.engine.program, stderr);
                    }
                }
                return Err(ValidationError::Engine(error));
            }
        };

        let records = report::parse_report(&stdout, &request.document_path).map_err(|error| {
            log::error!(
                "failed to parse policy engine output: {}\ntried to parse:\n{}",
                error.source,
                error.raw,
            );
            ValidationError::Report {
                program: self.engine.program.clone(),
                source: error,
            }
        })?;
        log::debug!(
            "{} violation record(s) for {}",
            records.len(),
            request.document_path.display(),
        );

        Ok(diagnostics::to_diagnostics(records, &request.document_path))
    }
}

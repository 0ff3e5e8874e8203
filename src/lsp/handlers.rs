use std::path::Path;
use std::sync::atomic::Ordering;

use tower_lsp::lsp_types::*;

use crate::lsp::backend::Backend;
use crate::lsp::bridge::ClientBridge;
use crate::policy::{self, ValidationRequest, ValidationService};

/// Trait for running the external policy check on a document
#[tower_lsp::async_trait]
pub trait HandlePolicyCheck {
    async fn run_policy_check(&self, uri: Url);
}

#[tower_lsp::async_trait]
impl HandlePolicyCheck for Backend {
    /// Run the engine for one document and publish the resulting diagnostics
    async fn run_policy_check(&self, uri: Url) {
        let Ok(document_path) = uri.to_file_path() else {
            self.client
                .log_message(
                    MessageType::WARNING,
                    format!("skipping policy check for non-file document {uri}"),
                )
                .await;
            return;
        };

        let config = self.settings.lock().await.clone();
        let workspace_root = self
            .workspace_root
            .lock()
            .await
            .clone()
            .or_else(|| document_path.parent().map(Path::to_path_buf));
        let Some(workspace_root) = workspace_root else {
            return;
        };

        let docs = self.documents.lock().await;
        let version = docs.get(&uri).map(|doc| doc.version);
        if let Some(doc) = docs.get(&uri) {
            if let Ok(on_disk) = tokio::fs::read_to_string(&document_path).await {
                if on_disk != doc.content {
                    log::debug!(
                        "buffer for {} differs from disk; the engine checks the saved file",
                        document_path.display(),
                    );
                }
            }
        }
        drop(docs);

        let request = ValidationRequest {
            document_path: document_path.clone(),
            workspace_root,
            engine_arguments: config.engine_arguments.clone(),
        };
        let service = ValidationService::with_runner(config.engine_settings(), self.runner.clone());
        let bridge = ClientBridge::new(
            self.client.clone(),
            self.progress_supported.load(Ordering::Relaxed),
        );

        let Some(mut by_file) = service.validate(&request, &bridge).await else {
            // A failed run means "unknown", not "clean": leave whatever
            // diagnostics the editor already shows untouched
            return;
        };

        let diagnostics = by_file
            .remove(&document_path)
            .unwrap_or_default()
            .into_iter()
            .map(to_lsp_diagnostic)
            .collect();
        self.client
            .publish_diagnostics(uri, diagnostics, version)
            .await;

        for (path, findings) in by_file {
            if let Ok(target) = Url::from_file_path(&path) {
                let diagnostics = findings.into_iter().map(to_lsp_diagnostic).collect();
                self.client
                    .publish_diagnostics(target, diagnostics, None)
                    .await;
            }
        }
    }
}

/// Render a pipeline diagnostic as an LSP diagnostic
pub fn to_lsp_diagnostic(diagnostic: policy::Diagnostic) -> Diagnostic {
    let severity = match diagnostic.severity {
        policy::Severity::Error => DiagnosticSeverity::ERROR,
        policy::Severity::Warning => DiagnosticSeverity::WARNING,
    };

    Diagnostic {
        // The report has no column detail: cover the reported line in full
        // with an open-ended end column
        range: Range::new(
            Position::new(diagnostic.line, 0),
            Position::new(diagnostic.line, u32::MAX),
        ),
        severity: Some(severity),
        code: diagnostic.code.map(NumberOrString::String),
        code_description: diagnostic
            .help
            .as_deref()
            .and_then(|href| Url::parse(href).ok())
            .map(|href| CodeDescription { href }),
        source: Some(policy::SOURCE_LABEL.to_string()),
        message: diagnostic.message,
        related_information: None,
        tags: None,
        data: None,
    }
}

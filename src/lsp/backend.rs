use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::config::{ClientSettings, Config};
use crate::lsp::document::DocumentState;
use crate::lsp::handlers::HandlePolicyCheck;
use crate::policy::{CommandRunner, LocalRunner};

/// Command id for an editor-triggered check of a specific document.
pub const CHECK_COMMAND: &str = "policy-ls.check";

/// The main LSP backend that holds state and implements the Language Server Protocol
pub struct Backend {
    pub client: Client,
    pub settings: Arc<Mutex<Config>>,
    pub documents: Arc<Mutex<HashMap<Url, DocumentState>>>,
    pub workspace_root: Arc<Mutex<Option<PathBuf>>>,
    pub progress_supported: Arc<AtomicBool>,
    pub runner: Arc<dyn CommandRunner>,
}

impl Backend {
    pub fn new(client: Client, config: Config) -> Self {
        Self::with_runner(client, config, Arc::new(LocalRunner))
    }

    /// Construct with a custom engine runner (useful for testing)
    pub fn with_runner(client: Client, config: Config, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            client,
            settings: Arc::new(Mutex::new(config)),
            documents: Arc::new(Mutex::new(HashMap::new())),
            workspace_root: Arc::new(Mutex::new(None)),
            progress_supported: Arc::new(AtomicBool::new(false)),
            runner,
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(
        &self,
        params: InitializeParams,
    ) -> tower_lsp::jsonrpc::Result<InitializeResult> {
        let progress = params
            .capabilities
            .window
            .as_ref()
            .and_then(|window| window.work_done_progress)
            .unwrap_or(false);
        self.progress_supported.store(progress, Ordering::Relaxed);

        let root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|folder| folder.uri.to_file_path().ok());
        #[allow(deprecated)]
        let root = root.or_else(|| {
            params
                .root_uri
                .as_ref()
                .and_then(|uri| uri.to_file_path().ok())
        });
        *self.workspace_root.lock().await = root;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::Supported(true)),
                        ..Default::default()
                    },
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![CHECK_COMMAND.to_string()],
                    work_done_progress_options: Default::default(),
                }),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "policy-language-server initialized")
            .await;
    }

    async fn shutdown(&self) -> tower_lsp::jsonrpc::Result<()> {
        Ok(())
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let section = params
            .settings
            .get("policyCheck")
            .cloned()
            .unwrap_or(Value::Null);
        if section.is_null() {
            return;
        }
        match serde_json::from_value::<ClientSettings>(section) {
            Ok(update) => {
                self.settings.lock().await.apply_client_settings(&update);
                log::info!("applied policyCheck settings from the client");
            }
            Err(error) => log::warn!("ignoring malformed policyCheck settings: {error}"),
        }
    }

    // Validate on open; the engine reads the saved file from disk
    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        let doc_state = DocumentState {
            content: params.text_document.text,
            version: params.text_document.version,
        };

        let mut docs = self.documents.lock().await;
        docs.insert(uri.clone(), doc_state);
        drop(docs); // Release the lock before running the check

        self.run_policy_check(uri).await;
    }

    // Change events only refresh the tracked buffer; diagnostics wait for
    // the save that puts the content on disk where the engine can see it
    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let version = params.text_document.version;
        let uri = params.text_document.uri;
        if let Some(change) = params.content_changes.into_iter().last() {
            let mut docs = self.documents.lock().await;
            docs.insert(
                uri,
                DocumentState {
                    content: change.text,
                    version,
                },
            );
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        self.run_policy_check(params.text_document.uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.documents.lock().await.remove(&params.text_document.uri);
    }

    async fn execute_command(
        &self,
        params: ExecuteCommandParams,
    ) -> tower_lsp::jsonrpc::Result<Option<Value>> {
        if params.command == CHECK_COMMAND {
            let target = params
                .arguments
                .first()
                .and_then(Value::as_str)
                .and_then(|raw| Url::parse(raw).ok());
            match target {
                Some(uri) => self.run_policy_check(uri).await,
                None => {
                    self.client
                        .show_message(
                            MessageType::ERROR,
                            "could not determine the target file for the policy check",
                        )
                        .await;
                }
            }
        }
        Ok(None)
    }
}

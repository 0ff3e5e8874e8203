//! Progress and notification plumbing toward the connected editor.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tower_lsp::lsp_types::notification::Progress;
use tower_lsp::lsp_types::request::WorkDoneProgressCreate;
use tower_lsp::lsp_types::*;
use tower_lsp::Client;

use crate::policy::EditorBridge;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Routes validation progress and fatal failures to the editor.
///
/// Progress is only emitted when the client advertised the workDoneProgress
/// capability; errors always go through `window/showMessage`.
pub struct ClientBridge {
    client: Client,
    progress_supported: bool,
    token: Mutex<Option<ProgressToken>>,
}

impl ClientBridge {
    pub fn new(client: Client, progress_supported: bool) -> Self {
        Self {
            client,
            progress_supported,
            token: Mutex::new(None),
        }
    }
}

#[tower_lsp::async_trait]
impl EditorBridge for ClientBridge {
    async fn progress_begin(&self, title: &str, message: &str) {
        if !self.progress_supported {
            return;
        }
        let token = ProgressToken::String(format!(
            "policy-check/{}",
            NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
        ));
        let created = self
            .client
            .send_request::<WorkDoneProgressCreate>(WorkDoneProgressCreateParams {
                token: token.clone(),
            })
            .await;
        if created.is_err() {
            return;
        }

        self.client
            .send_notification::<Progress>(ProgressParams {
                token: token.clone(),
                value: ProgressParamsValue::WorkDone(WorkDoneProgress::Begin(
                    WorkDoneProgressBegin {
                        title: title.to_string(),
                        cancellable: Some(false),
                        message: Some(message.to_string()),
                        percentage: None,
                    },
                )),
            })
            .await;
        *self.token.lock().await = Some(token);
    }

    async fn progress_done(&self) {
        if let Some(token) = self.token.lock().await.take() {
            self.client
                .send_notification::<Progress>(ProgressParams {
                    token,
                    value: ProgressParamsValue::WorkDone(WorkDoneProgress::End(
                        WorkDoneProgressEnd { message: None },
                    )),
                })
                .await;
        }
    }

    async fn show_error(&self, message: &str) {
        self.client
            .show_message(MessageType::ERROR, message.to_string())
            .await;
    }
}

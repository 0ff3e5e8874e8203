//! Engine configuration discovery.
//!
//! Mirrors the policy engine's own lookup so editor-discovered configuration
//! matches what a command-line run would pick up: walk from the document's
//! directory upward toward the workspace root and take the first config file
//! found. An explicit `-c` in the argument string wins and suppresses the
//! walk entirely.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// File name the policy engine recognizes as its per-project configuration.
pub const CONFIG_FILE_NAME: &str = ".gatekeeper";

/// Extract the value of the first `-c` flag in an engine argument string.
///
/// Accepts double-quoted, single-quoted, and bare whitespace-separated
/// values. Returns `None` when no `-c` flag is present.
pub fn explicit_config_path(arguments: &str) -> Option<String> {
    static FLAG: OnceLock<Regex> = OnceLock::new();
    let flag = FLAG.get_or_init(|| {
        Regex::new(r#"(?:^|\s)-c(?:\s*"([^"]+)"|\s*'([^']+)'|\s+([^\s"']\S*))"#)
            .expect("config flag pattern")
    });

    let captures = flag.captures(arguments)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .or_else(|| captures.get(3))
        .map(|value| value.as_str().to_string())
}

/// Search upward from the document for the nearest engine config file.
///
/// Stops as soon as the walk would leave `workspace_root`. Filesystem errors
/// count as "not found" so a broken directory never blocks validation.
pub async fn find_config_file(document: &Path, workspace_root: &Path) -> Option<PathBuf> {
    let mut dir = document.parent()?;
    loop {
        if !dir.starts_with(workspace_root) {
            return None;
        }
        let candidate = dir.join(CONFIG_FILE_NAME);
        if tokio::fs::metadata(&candidate)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
        {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
}

//! Translation of violation records into diagnostics.
//!
//! Kept free of protocol types so the pipeline can be exercised without an
//! editor attached; the LSP layer renders these into wire diagnostics.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::policy::report::ViolationRecord;

/// Source label attached to every diagnostic this server produces.
pub const SOURCE_LABEL: &str = "policy-ls";

/// Severity of a diagnostic message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A positional finding ready for the editor's diagnostics view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 0-based line. The finding spans the whole line since the report
    /// carries no column detail.
    pub line: u32,
    pub message: String,
    pub severity: Severity,
    /// Target kind reported by the engine, e.g. "task".
    pub code: Option<String>,
    /// Policy identifier, doubling as a documentation reference.
    pub help: Option<String>,
}

/// Diagnostics grouped per document, iterable in path order.
pub type DiagnosticMap = BTreeMap<PathBuf, Vec<Diagnostic>>;

/// Group violation records into per-document diagnostics.
///
/// Report lines are 1-based, diagnostics 0-based: a record pointing at
/// line 1 lands on line 0. Per-file order follows record order. The report
/// schema carries no severity, so every finding is an error.
pub fn to_diagnostics(records: Vec<ViolationRecord>, document: &Path) -> DiagnosticMap {
    let mut by_file = DiagnosticMap::new();
    for record in records {
        by_file
            .entry(document.to_path_buf())
            .or_default()
            .push(Diagnostic {
                line: record.begin_line.saturating_sub(1),
                message: record.message,
                severity: Severity::Error,
                code: record.target_type,
                help: record.policy_name,
            });
    }
    by_file
}

//! Document Management
//!
//! Per-document state tracked between editor notifications.

/// State for each open document
#[derive(Debug)]
pub struct DocumentState {
    /// Last buffer content pushed by the editor. The engine reads the file
    /// from disk, so this is only consulted to detect unsaved changes.
    pub content: String,
    pub version: i32,
}

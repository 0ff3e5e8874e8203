//! Policy Validation Pipeline
//!
//! Configuration discovery, engine invocation, and report translation.

pub mod diagnostics;
pub mod discovery;
pub mod invoke;
pub mod report;
pub mod service;

pub use diagnostics::{to_diagnostics, Diagnostic, DiagnosticMap, Severity, SOURCE_LABEL};
pub use discovery::{explicit_config_path, find_config_file, CONFIG_FILE_NAME};
pub use invoke::{
    CommandError, CommandOutput, CommandRunner, InvocationError, LocalRunner, ResolvedInvocation,
};
pub use report::{parse_report, ReportError, ViolationRecord};
pub use service::{EditorBridge, EngineSettings, ValidationRequest, ValidationService};

//! Engine report parsing.
//!
//! The engine writes one JSON report covering every file it evaluated. Only
//! entries for the requested document become violation records; the rest of
//! the report is skipped. Schema surprises are tolerated: a report that is
//! valid JSON but does not look like a report yields no records, while text
//! that fails to parse at all is a hard error since it usually means a
//! broken engine installation.

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Report text that is not valid JSON.
#[derive(Debug, Error)]
#[error("could not parse policy engine output: {source}")]
pub struct ReportError {
    pub source: serde_json::Error,
    /// Raw engine output, kept so the failure can be diagnosed from the log.
    pub raw: String,
}

/// One policy violation attributed to the requested document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationRecord {
    pub message: String,
    /// Policy identifier, when the engine names one.
    pub policy_name: Option<String>,
    /// Kind of construct the policy was evaluated against, e.g. "task".
    pub target_type: Option<String>,
    /// 1-based first line of the offending construct.
    pub begin_line: u32,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    path: Option<String>,
    #[serde(default)]
    policies: Vec<PolicyEntry>,
}

#[derive(Debug, Deserialize)]
struct PolicyEntry {
    #[serde(default)]
    violation: bool,
    policy_name: Option<String>,
    target_type: Option<String>,
    #[serde(default)]
    targets: Vec<TargetEntry>,
}

#[derive(Debug, Deserialize)]
struct TargetEntry {
    validated: Option<bool>,
    message: Option<String>,
    lines: Option<LineRange>,
}

#[derive(Debug, Deserialize)]
struct LineRange {
    begin: Option<u32>,
}

/// Parse raw engine output into the violation records for `document`.
///
/// Empty output is not an error: the run is taken as clean and logged as a
/// warning. Entries for other files, non-violating policies, and validated
/// targets are filtered out. Record order follows report order.
pub fn parse_report(raw: &str, document: &Path) -> Result<Vec<ViolationRecord>, ReportError> {
    if raw.trim().is_empty() {
        log::warn!(
            "policy engine output for {} is suspiciously empty",
            document.display()
        );
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(raw).map_err(|source| ReportError {
        source,
        raw: raw.to_string(),
    })?;

    let Some(files) = value.get("files").and_then(Value::as_array) else {
        log::info!(
            "policy engine report for {} carries no file entries: {}",
            document.display(),
            raw
        );
        return Ok(Vec::new());
    };

    let mut records = Vec::new();
    for entry in files {
        let entry: FileEntry = match serde_json::from_value(entry.clone()) {
            Ok(entry) => entry,
            Err(error) => {
                log::debug!("skipping unexpected file entry in report: {error}");
                continue;
            }
        };
        // The report may cover more files than requested
        if entry
            .path
            .as_deref()
            .is_some_and(|path| Path::new(path) != document)
        {
            continue;
        }

        for policy in entry.policies {
            if !policy.violation {
                continue;
            }
            for target in policy.targets {
                if target.validated == Some(true) {
                    continue;
                }
                let begin_line = match target.lines.as_ref().and_then(|lines| lines.begin) {
                    Some(line) if line > 0 => line,
                    _ => 1,
                };
                records.push(ViolationRecord {
                    message: target.message.unwrap_or_default(),
                    policy_name: policy.policy_name.clone(),
                    target_type: policy.target_type.clone(),
                    begin_line,
                });
            }
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "/ws/play.yml";

    fn doc() -> &'static Path {
        Path::new(DOC)
    }

    fn report(files: serde_json::Value) -> String {
        serde_json::json!({ "files": files }).to_string()
    }

    #[test]
    fn empty_output_is_clean() {
        assert!(parse_report("", doc()).expect("parse").is_empty());
        assert!(parse_report("  \n ", doc()).expect("parse").is_empty());
    }

    #[test]
    fn malformed_json_is_fatal() {
        let error = parse_report("{not json", doc()).expect_err("must fail");
        assert_eq!(error.raw, "{not json");
    }

    #[test]
    fn non_object_report_yields_nothing() {
        assert!(parse_report("[1, 2, 3]", doc()).expect("parse").is_empty());
        assert!(parse_report("42", doc()).expect("parse").is_empty());
    }

    #[test]
    fn missing_files_array_yields_nothing() {
        assert!(parse_report("{}", doc()).expect("parse").is_empty());
        assert!(
            parse_report(r#"{"files": "oops"}"#, doc())
                .expect("parse")
                .is_empty()
        );
    }

    #[test]
    fn other_files_are_skipped() {
        let raw = report(serde_json::json!([{
            "path": "/ws/other.yml",
            "policies": [{
                "violation": true,
                "targets": [{ "validated": false, "message": "M", "lines": { "begin": 3 } }]
            }]
        }]));
        assert!(parse_report(&raw, doc()).expect("parse").is_empty());
    }

    #[test]
    fn entry_without_path_is_processed() {
        let raw = report(serde_json::json!([{
            "policies": [{
                "violation": true,
                "targets": [{ "message": "M", "lines": { "begin": 3 } }]
            }]
        }]));
        let records = parse_report(&raw, doc()).expect("parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].begin_line, 3);
    }

    #[test]
    fn non_violating_policies_are_skipped() {
        let raw = report(serde_json::json!([{
            "path": DOC,
            "policies": [
                { "violation": false, "targets": [{ "message": "A" }] },
                { "targets": [{ "message": "B" }] }
            ]
        }]));
        assert!(parse_report(&raw, doc()).expect("parse").is_empty());
    }

    #[test]
    fn validated_targets_are_skipped() {
        let raw = report(serde_json::json!([{
            "path": DOC,
            "policies": [{
                "violation": true,
                "policy_name": "check_become",
                "targets": [
                    { "validated": true, "message": "clean" },
                    { "validated": false, "message": "dirty", "lines": { "begin": 7 } }
                ]
            }]
        }]));
        let records = parse_report(&raw, doc()).expect("parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "dirty");
    }

    #[test]
    fn absent_validated_counts_as_unvalidated() {
        let raw = report(serde_json::json!([{
            "path": DOC,
            "policies": [{
                "violation": true,
                "targets": [{ "message": "no flag" }]
            }]
        }]));
        assert_eq!(parse_report(&raw, doc()).expect("parse").len(), 1);
    }

    #[test]
    fn begin_line_defaults_to_one_when_absent_or_zero() {
        let raw = report(serde_json::json!([{
            "path": DOC,
            "policies": [{
                "violation": true,
                "targets": [
                    { "message": "absent" },
                    { "message": "zero", "lines": { "begin": 0 } },
                    { "message": "five", "lines": { "begin": 5 } }
                ]
            }]
        }]));
        let records = parse_report(&raw, doc()).expect("parse");
        assert_eq!(
            records.iter().map(|r| r.begin_line).collect::<Vec<_>>(),
            vec![1, 1, 5]
        );
    }

    #[test]
    fn optional_identifiers_carry_through() {
        let raw = report(serde_json::json!([{
            "path": DOC,
            "policies": [{
                "violation": true,
                "policy_name": "check_become",
                "target_type": "task",
                "targets": [{ "message": "M", "lines": { "begin": 2 } }]
            }]
        }]));
        let records = parse_report(&raw, doc()).expect("parse");
        assert_eq!(records[0].policy_name.as_deref(), Some("check_become"));
        assert_eq!(records[0].target_type.as_deref(), Some("task"));
    }

    #[test]
    fn unexpected_file_entries_are_skipped_not_fatal() {
        let raw = report(serde_json::json!([
            "not an object",
            7,
            {
                "path": DOC,
                "policies": [{
                    "violation": true,
                    "targets": [{ "message": "kept" }]
                }]
            }
        ]));
        let records = parse_report(&raw, doc()).expect("parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "kept");
    }

    #[test]
    fn record_order_follows_report_order() {
        let raw = report(serde_json::json!([{
            "path": DOC,
            "policies": [
                {
                    "violation": true,
                    "targets": [
                        { "message": "first", "lines": { "begin": 9 } },
                        { "message": "second", "lines": { "begin": 2 } }
                    ]
                },
                {
                    "violation": true,
                    "targets": [{ "message": "third", "lines": { "begin": 5 } }]
                }
            ]
        }]));
        let records = parse_report(&raw, doc()).expect("parse");
        assert_eq!(
            records.iter().map(|r| r.message.as_str()).collect::<Vec<_>>(),
            vec!["first", "second", "third"]
        );
    }
}

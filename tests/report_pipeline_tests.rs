//! End-to-end tests of report parsing and diagnostic mapping
use std::path::Path;

use policy_language_server::policy::{parse_report, to_diagnostics, Severity};

const DOC: &str = "/ws/play.yml";

fn single_violation_report(path: &str, message: &str, begin: u32) -> String {
    serde_json::json!({
        "files": [{
            "path": path,
            "policies": [{
                "policy_name": "check_become",
                "target_type": "task",
                "violation": true,
                "targets": [{
                    "validated": false,
                    "message": message,
                    "lines": { "begin": begin, "end": begin + 2 }
                }]
            }]
        }]
    })
    .to_string()
}

#[test]
fn one_violation_becomes_one_error_diagnostic() {
    let raw = single_violation_report(DOC, "M", 5);
    let records = parse_report(&raw, Path::new(DOC)).expect("parse");
    let map = to_diagnostics(records, Path::new(DOC));

    let diags = &map[Path::new(DOC)];
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].message, "M");
    assert_eq!(diags[0].line, 4);
    assert_eq!(diags[0].severity, Severity::Error);
    assert_eq!(diags[0].code.as_deref(), Some("task"));
    assert_eq!(diags[0].help.as_deref(), Some("check_become"));
}

#[test]
fn reports_for_other_files_produce_no_diagnostics() {
    let raw = single_violation_report("/ws/other.yml", "M", 5);
    let records = parse_report(&raw, Path::new(DOC)).expect("parse");
    assert!(to_diagnostics(records, Path::new(DOC)).is_empty());
}

#[test]
fn reparsing_identical_text_is_idempotent() {
    let raw = single_violation_report(DOC, "M", 5);
    let first = parse_report(&raw, Path::new(DOC)).expect("first parse");
    let second = parse_report(&raw, Path::new(DOC)).expect("second parse");
    assert_eq!(first, second);
    assert_eq!(
        to_diagnostics(first, Path::new(DOC)),
        to_diagnostics(second, Path::new(DOC))
    );
}

#[test]
fn multiple_policies_accumulate_in_report_order() {
    let raw = serde_json::json!({
        "files": [{
            "path": DOC,
            "policies": [
                {
                    "policy_name": "check_become",
                    "violation": true,
                    "targets": [
                        { "message": "first", "lines": { "begin": 12 } },
                        { "validated": true, "message": "resolved" }
                    ]
                },
                {
                    "policy_name": "check_tasks",
                    "violation": false,
                    "targets": [{ "message": "ignored" }]
                },
                {
                    "policy_name": "check_vars",
                    "violation": true,
                    "targets": [{ "message": "second", "lines": { "begin": 3 } }]
                }
            ]
        }]
    })
    .to_string();

    let records = parse_report(&raw, Path::new(DOC)).expect("parse");
    let map = to_diagnostics(records, Path::new(DOC));
    let messages: Vec<_> = map[Path::new(DOC)]
        .iter()
        .map(|d| d.message.as_str())
        .collect();
    assert_eq!(messages, vec!["first", "second"]);
}

#[test]
fn malformed_json_never_degrades_to_empty() {
    assert!(parse_report("{not json", Path::new(DOC)).is_err());
}

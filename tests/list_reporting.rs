//! List output: one line per identifier, or a single summary line.

mod common;

use std::sync::{Arc, Mutex};

use serde_json::json;

use common::{harness_with, RegistryState, OWNER};
use vaultgate::allowlist::OwnerKind;
use vaultgate::response::ItemReport;
use vaultgate::Outcome;

fn list_with(payload: serde_json::Value) -> Vec<ItemReport> {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(Mutex::new(RegistryState {
        approve_everything: true,
        ..Default::default()
    }));
    let h = harness_with(OwnerKind::Eoa, dir.path(), Some(payload), registry);
    match h.handler.execute_list(None, None).unwrap() {
        Outcome::Submitted { reports, .. } => reports,
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_empty_list_prints_summary() {
    let reports = list_with(json!({ "identifiers": [], "success": true }));
    assert_eq!(reports, vec![ItemReport::NoSecrets]);
    assert_eq!(reports[0].to_string(), "No secrets found");
}

#[test]
fn test_populated_list_prints_each_identifier() {
    let reports = list_with(json!({
        "identifiers": [
            { "key": "a", "owner": OWNER, "namespace": "main" },
            { "key": "b", "owner": OWNER, "namespace": "main" }
        ],
        "success": true
    }));
    assert_eq!(reports.len(), 2);
    assert_eq!(
        reports[1].to_string(),
        format!("Secret identifier: secret_id=b, owner={OWNER}, namespace=main")
    );
}

#[test]
fn test_failed_list_is_a_report_not_an_error() {
    let reports = list_with(json!({ "success": false, "error": "owner unknown" }));
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_failure());
    assert_eq!(reports[0].to_string(), "secret list failed: success=false error=owner unknown");
}

//! MSIG owners park requests as bundles and replay them after approval.

mod common;

use std::fs;
use std::sync::{Arc, Mutex};

use common::{harness, harness_with, secret, RegistryState};
use vaultgate::allowlist::OwnerKind;
use vaultgate::bundle;
use vaultgate::jsonrpc::Method;
use vaultgate::{Outcome, VaultError};

#[test]
fn test_first_run_writes_bundle_and_skips_gateway() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(OwnerKind::Msig, dir.path());

    let outcome = h
        .handler
        .execute_upsert(Method::SecretsCreate, &[secret("k1", "v1")], None)
        .unwrap();
    let Outcome::Parked(steps) = outcome else {
        panic!("expected a parked request");
    };

    assert_eq!(steps.bundle_path, dir.path().join(bundle::bundle_filename(&steps.digest)));
    assert!(steps.tx_data.starts_with("0x"));
    assert_eq!(steps.tx_data.len(), 2 + 2 * (4 + 32 + 32));
    assert!(steps.tx_data.contains(&steps.digest.to_hex()));

    let saved = bundle::load_bundle(&steps.bundle_path).unwrap();
    assert_eq!(saved.method, "vault_secretsCreate");
    assert_eq!(saved.digest().unwrap(), steps.digest);

    assert!(h.gateway.lock().unwrap().secret_posts.is_empty());
    assert_eq!(h.registry.lock().unwrap().txs, 0);

    let text = steps.to_string();
    assert!(text.contains("MSIG transaction prepared!"));
    assert!(text.contains(&steps.bundle_path.display().to_string()));
}

#[test]
fn test_request_id_before_finalization_fails() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(OwnerKind::Msig, dir.path());

    let Outcome::Parked(steps) = h
        .handler
        .execute_upsert(Method::SecretsCreate, &[secret("k1", "v1")], None)
        .unwrap()
    else {
        panic!("expected a parked request");
    };
    let saved = bundle::load_bundle(&steps.bundle_path).unwrap();

    let err = h
        .handler
        .execute_upsert(Method::SecretsCreate, &[], Some(&saved.request_id))
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFinalized { .. }));
    assert!(err.to_string().contains("not finalized"));
    assert!(h.gateway.lock().unwrap().secret_posts.is_empty());

    let err = h.handler.execute_bundle(&steps.bundle_path).unwrap_err();
    assert!(matches!(err, VaultError::NotFinalized { .. }));
    assert!(h.gateway.lock().unwrap().secret_posts.is_empty());
}

#[test]
fn test_execute_replays_saved_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(Mutex::new(RegistryState::default()));
    let h = harness_with(OwnerKind::Msig, dir.path(), None, Arc::clone(&registry));

    let Outcome::Parked(steps) = h
        .handler
        .execute_upsert(Method::SecretsUpdate, &[secret("k1", "v1")], None)
        .unwrap()
    else {
        panic!("expected a parked request");
    };
    let saved = bundle::load_bundle(&steps.bundle_path).unwrap();

    // The multisig approves out of band.
    registry.lock().unwrap().allowlisted.insert(*steps.digest.as_bytes());

    let Outcome::Submitted { digest, reports } = h.handler.execute_bundle(&steps.bundle_path).unwrap() else {
        panic!("expected submission");
    };
    assert_eq!(digest, steps.digest);
    assert!(reports[0].to_string().starts_with("Secret updated: secret_id=k1"));

    let log = h.gateway.lock().unwrap();
    assert_eq!(log.secret_posts.len(), 1);
    assert_eq!(log.secret_posts[0], saved.body_bytes());
}

#[test]
fn test_request_id_replays_bundle_after_approval() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(Mutex::new(RegistryState::default()));
    let h = harness_with(OwnerKind::Msig, dir.path(), None, Arc::clone(&registry));

    let Outcome::Parked(steps) = h
        .handler
        .execute_upsert(Method::SecretsCreate, &[secret("k1", "v1")], None)
        .unwrap()
    else {
        panic!("expected a parked request");
    };
    let saved = bundle::load_bundle(&steps.bundle_path).unwrap();
    registry.lock().unwrap().approve_everything = true;

    let outcome = h
        .handler
        .execute_upsert(Method::SecretsCreate, &[], Some(&saved.request_id))
        .unwrap();
    assert!(matches!(outcome, Outcome::Submitted { .. }));
    assert_eq!(h.gateway.lock().unwrap().secret_posts[0], saved.body_bytes());
}

#[test]
fn test_bundle_with_unknown_method_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(Mutex::new(RegistryState {
        approve_everything: true,
        ..Default::default()
    }));
    let h = harness_with(OwnerKind::Msig, dir.path(), None, registry);

    let path = dir.path().join("bundle.json");
    fs::write(
        &path,
        format!(
            r#"{{"request_id":"r","method":"vault_publicKey_get","digest_hex":"0x{}","request_body":{{}},"created_at":"2026-01-01T00:00:00Z"}}"#,
            "00".repeat(32)
        ),
    )
    .unwrap();

    let err = h.handler.execute_bundle(&path).unwrap_err();
    assert!(err.to_string().contains("unsupported method"));
    assert!(h.gateway.lock().unwrap().secret_posts.is_empty());
}

#[test]
fn test_msig_delete_second_pass_rederives_digest() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(Mutex::new(RegistryState::default()));
    let h = harness_with(OwnerKind::Msig, dir.path(), None, Arc::clone(&registry));
    let items = [secret("old", "")];

    let Outcome::Parked(steps) = h.handler.execute_delete(&items, None).unwrap() else {
        panic!("expected a parked request");
    };
    registry.lock().unwrap().allowlisted.insert(*steps.digest.as_bytes());

    let fresh_id = vaultgate::settings::new_request_id();
    let Outcome::Submitted { digest, .. } = h.handler.execute_delete(&items, Some(&fresh_id)).unwrap() else {
        panic!("expected submission");
    };
    assert_eq!(digest, steps.digest);
}

//! Shared in-memory fakes for the gateway and the registry.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ring::agreement::{EphemeralPrivateKey, ECDH_P256};
use ring::rand::SystemRandom;
use serde_json::{json, Value};

use vaultgate::allowlist::{AllowlistRegistry, OwnerKind, TxOutcome};
use vaultgate::digest::Digest;
use vaultgate::gateway::Gateway;
use vaultgate::settings::Settings;
use vaultgate::{Handler, Result};

pub const OWNER: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

/// Uncompressed P-256 public key of a throwaway recipient.
pub fn test_public_key_hex() -> String {
    let rng = SystemRandom::new();
    let private = EphemeralPrivateKey::generate(&ECDH_P256, &rng).unwrap();
    hex::encode(private.compute_public_key().unwrap().as_ref())
}

#[derive(Default)]
pub struct GatewayLog {
    /// Bodies of every secret-method POST, in order.
    pub secret_posts: Vec<Vec<u8>>,
    pub public_key_fetches: usize,
}

/// Answers `vault_publicKey_get` itself and replies to secret methods with a
/// fixed payload, or with per-item success when none is set.
pub struct FakeGateway {
    pub log: Arc<Mutex<GatewayLog>>,
    pub public_key: String,
    pub payload: Option<Value>,
}

impl FakeGateway {
    pub fn new(log: Arc<Mutex<GatewayLog>>) -> Self {
        Self {
            log,
            public_key: test_public_key_hex(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

impl Gateway for FakeGateway {
    fn post(&self, body: &[u8]) -> Result<(Vec<u8>, u16)> {
        let req: Value = serde_json::from_slice(body).unwrap();
        let method = req["method"].as_str().unwrap().to_string();
        let mut log = self.log.lock().unwrap();

        let reply = if method == "vault_publicKey_get" {
            log.public_key_fetches += 1;
            json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "method": method,
                "result": { "public_key": self.public_key }
            })
        } else {
            log.secret_posts.push(body.to_vec());
            let payload = self.payload.clone().unwrap_or_else(|| echo_payload(&req));
            json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "method": method,
                "result": { "payload": payload, "context": "", "signatures": [] }
            })
        };
        Ok((reply.to_string().into_bytes(), 200))
    }
}

fn echo_payload(req: &Value) -> Value {
    let params = &req["params"];
    let ids: Vec<Value> = if let Some(secrets) = params["encrypted_secrets"].as_array() {
        secrets.iter().map(|s| s["id"].clone()).collect()
    } else {
        params["ids"].as_array().cloned().unwrap_or_default()
    };
    json!({
        "responses": ids
            .into_iter()
            .map(|id| json!({ "id": id, "success": true }))
            .collect::<Vec<_>>()
    })
}

#[derive(Default)]
pub struct RegistryState {
    pub allowlisted: HashSet<[u8; 32]>,
    pub approve_everything: bool,
    pub owner_unlinked: bool,
    pub txs: usize,
    /// Number of `is_request_allowlisted` lookups.
    pub reads: usize,
}

/// Allowlist kept in memory; transactions take effect immediately.
pub struct FakeRegistry {
    pub state: Arc<Mutex<RegistryState>>,
}

impl AllowlistRegistry for FakeRegistry {
    fn is_owner_linked(&self, _owner: &ethabi::Address) -> Result<bool> {
        Ok(!self.state.lock().unwrap().owner_unlinked)
    }

    fn is_request_allowlisted(&self, _owner: &ethabi::Address, digest: &Digest) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        Ok(state.approve_everything || state.allowlisted.contains(digest.as_bytes()))
    }

    fn allowlist_request(&self, digest: &Digest, _duration: Duration) -> Result<TxOutcome> {
        let mut state = self.state.lock().unwrap();
        state.txs += 1;
        state.allowlisted.insert(*digest.as_bytes());
        Ok(TxOutcome {
            tx_hash: format!("0x{:064x}", state.txs),
        })
    }
}

pub struct Harness {
    pub handler: Handler,
    pub gateway: Arc<Mutex<GatewayLog>>,
    pub registry: Arc<Mutex<RegistryState>>,
}

pub fn harness(kind: OwnerKind, bundle_dir: &Path) -> Harness {
    harness_with(kind, bundle_dir, None, Arc::new(Mutex::new(RegistryState::default())))
}

pub fn harness_with(
    kind: OwnerKind,
    bundle_dir: &Path,
    payload: Option<Value>,
    registry: Arc<Mutex<RegistryState>>,
) -> Harness {
    let gateway = Arc::new(Mutex::new(GatewayLog::default()));
    let mut fake = FakeGateway::new(Arc::clone(&gateway));
    if let Some(payload) = payload {
        fake = fake.with_payload(payload);
    }
    build(kind, bundle_dir, fake, gateway, registry)
}

/// EOA harness whose gateway publishes `public_key` as the vault key.
pub fn harness_with_public_key(bundle_dir: &Path, public_key: &str) -> Harness {
    let gateway = Arc::new(Mutex::new(GatewayLog::default()));
    let mut fake = FakeGateway::new(Arc::clone(&gateway));
    fake.public_key = public_key.to_string();
    build(
        OwnerKind::Eoa,
        bundle_dir,
        fake,
        gateway,
        Arc::new(Mutex::new(RegistryState::default())),
    )
}

fn build(
    kind: OwnerKind,
    bundle_dir: &Path,
    fake: FakeGateway,
    gateway: Arc<Mutex<GatewayLog>>,
    registry: Arc<Mutex<RegistryState>>,
) -> Harness {

    let owner = vaultgate::allowlist::parse_address(OWNER).unwrap();
    let mut settings = Settings::new("http://gateway.invalid", owner, kind);
    settings.bundle_dir = bundle_dir.to_path_buf();
    settings.chain_name = "ethereum-testnet-sepolia".into();
    settings.registry_address = ethabi::Address::repeat_byte(0x77);

    let handler = Handler::new(
        Box::new(fake),
        Box::new(FakeRegistry {
            state: Arc::clone(&registry),
        }),
        settings,
    );
    Harness {
        handler,
        gateway,
        registry,
    }
}

pub fn secret(id: &str, value: &str) -> vaultgate::types::SecretItem {
    vaultgate::types::SecretItem {
        id: id.into(),
        value: value.into(),
        namespace: "main".into(),
    }
}

//! Operation orchestrator.
//!
//! Each operation runs the same pipeline: build the request, fingerprint it,
//! make sure the fingerprint is allowlisted for the owner, POST the exact
//! bytes that were fingerprinted and turn the reply into report lines.
//!
//! ```text
//! inputs -> seal -> digest -> allowlist -> gateway -> parse -> reports
//!                                 |
//!                                 +-- MSIG, not yet approved: park as bundle
//! ```
//!
//! The allowlist check always happens before the POST. Nothing is sent to the
//! gateway for a digest the registry has not approved, apart from the
//! public-key fetch that precedes sealing.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use zeroize::Zeroize;

use crate::allowlist::{self, AllowlistRegistry, OwnerKind};
use crate::bundle::{self, UnsignedBundle};
use crate::digest::{self, Digest, DigestScope};
use crate::error::{Result, VaultError};
use crate::gateway::{self, Gateway};
use crate::inputs;
use crate::jsonrpc::{Method, Request, Response, JSONRPC_VERSION};
use crate::keys::{self, ENCRYPTION_KEY_SECRET_NAME};
use crate::response::{self, ItemReport};
use crate::settings::{self, Settings};
use crate::threshold::{self, VaultPublicKey};
use crate::types::{
    CreateSecretsRequest, DeleteSecretsRequest, EncryptedSecret, GetPublicKeyRequest, GetPublicKeyResponse,
    ListSecretIdentifiersRequest, SecretIdentifier, SecretItem, UpdateSecretsRequest, DEFAULT_NAMESPACE,
};

/// Operator steps for approving a parked request through a multisig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsigInstructions {
    pub chain_name: String,
    pub registry_address: String,
    /// 0x-prefixed `allowlistRequest` call data.
    pub tx_data: String,
    pub bundle_path: PathBuf,
    pub digest: Digest,
}

impl fmt::Display for MsigInstructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "MSIG transaction prepared!")?;
        writeln!(f)?;
        writeln!(f, "Next steps:")?;
        writeln!(f)?;
        writeln!(f, "   1. Submit the following transaction on the target chain:")?;
        writeln!(f, "      Chain:            {}", self.chain_name)?;
        writeln!(f, "      Contract Address: {}", self.registry_address)?;
        writeln!(f)?;
        writeln!(f, "   2. Use the following transaction data:")?;
        writeln!(f)?;
        writeln!(f, "      {}", self.tx_data)?;
        writeln!(f)?;
        writeln!(f, "   3. Save this bundle file; you will need it on the second run:")?;
        writeln!(f, "      Bundle Path: {}", self.bundle_path.display())?;
        writeln!(f, "      Digest:      {}", self.digest)?;
        writeln!(f)?;
        writeln!(f, "   4. After the transaction is finalized on-chain, run:")?;
        writeln!(f)?;
        writeln!(f, "      vaultgate secrets execute {} --unsigned", self.bundle_path.display())
    }
}

/// What an operation ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The request reached the vault; one report per output line.
    Submitted { digest: Digest, reports: Vec<ItemReport> },
    /// The request waits for multisig approval.
    Parked(MsigInstructions),
}

/// Runs secrets operations for one owner against one gateway and registry.
pub struct Handler {
    gateway: Box<dyn Gateway>,
    registry: Box<dyn AllowlistRegistry>,
    settings: Settings,
}

impl Handler {
    pub fn new(gateway: Box<dyn Gateway>, registry: Box<dyn AllowlistRegistry>, settings: Settings) -> Self {
        Self {
            gateway,
            registry,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // ---------------------------------------------------------------------
    // Sealing
    // ---------------------------------------------------------------------

    /// Ask the gateway for the vault's public key.
    pub fn fetch_public_key(&self) -> Result<VaultPublicKey> {
        let request_id = settings::new_request_id();
        let request = Request::new(request_id.clone(), Method::PublicKeyGet, GetPublicKeyRequest::default());
        let body = to_json(&request)?;

        let (resp_body, status) = self
            .gateway
            .post(&body)
            .map_err(|e| VaultError::Gateway(format!("public key fetch failed: {e}")))?;
        if status != 200 {
            return Err(VaultError::Gateway(format!(
                "gateway returned non-200: {status} body={}",
                String::from_utf8_lossy(&resp_body)
            )));
        }

        let resp: Response<GetPublicKeyResponse> = serde_json::from_slice(&resp_body)
            .map_err(|e| VaultError::Protocol(format!("failed to unmarshal public key response: {e}")))?;
        if let Some(err) = resp.error {
            return Err(VaultError::Gateway(format!("vault public key fetch error: {err}")));
        }
        if resp.jsonrpc != JSONRPC_VERSION {
            return Err(VaultError::Protocol(format!("jsonrpc version mismatch: got {:?}", resp.jsonrpc)));
        }
        if resp.id != request_id {
            return Err(VaultError::Protocol(format!(
                "jsonrpc id mismatch: got {:?} want {:?}",
                resp.id, request_id
            )));
        }
        if let Some(method) = resp.method.as_deref() {
            if method != Method::PublicKeyGet.as_str() {
                return Err(VaultError::Protocol(format!("jsonrpc method mismatch: got {method:?}")));
            }
        }
        let public_key = resp
            .result
            .map(|r| r.public_key)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| VaultError::Protocol("empty result in public key response".into()))?;

        VaultPublicKey::from_hex(&public_key)
    }

    /// Seal every item under the vault key. Any failure fails the batch.
    pub fn encrypt_secrets(&self, items: &[SecretItem]) -> Result<Vec<EncryptedSecret>> {
        let public_key = self.fetch_public_key()?;
        let owner = self.settings.owner_hex();

        items
            .iter()
            .map(|item| {
                let encrypted_value = threshold::seal_secret(&item.value, &public_key, &self.settings.owner)
                    .map_err(|e| {
                        VaultError::Encryption(format!(
                            "failed to encrypt secret (key={} ns={}): {e}",
                            item.id, item.namespace
                        ))
                    })?;
                Ok(EncryptedSecret {
                    id: SecretIdentifier {
                        key: item.id.clone(),
                        namespace: item.namespace.clone(),
                        owner: owner.clone(),
                    },
                    encrypted_value,
                })
            })
            .collect()
    }

    // ---------------------------------------------------------------------
    // Operations
    // ---------------------------------------------------------------------

    /// Create or update secrets.
    ///
    /// With `request_id`, the bundle saved for that id is replayed instead;
    /// sealed values are randomized, so the request cannot be rebuilt.
    pub fn execute_upsert(&self, method: Method, items: &[SecretItem], request_id: Option<&str>) -> Result<Outcome> {
        if !matches!(method, Method::SecretsCreate | Method::SecretsUpdate) {
            return Err(VaultError::validation(format!(
                "unsupported method {:?} (expected {:?} or {:?})",
                method.as_str(),
                Method::SecretsCreate.as_str(),
                Method::SecretsUpdate.as_str()
            )));
        }

        if let Some(request_id) = request_id {
            let (path, bundle) = bundle::find_by_request_id(&self.settings.bundle_dir, request_id)?.ok_or_else(|| {
                VaultError::validation(format!(
                    "no saved bundle for request id {request_id} in {}",
                    self.settings.bundle_dir.display()
                ))
            })?;
            if bundle.method != method.as_str() {
                return Err(VaultError::validation(format!(
                    "bundle {} is for {}, not {}",
                    path.display(),
                    bundle.method,
                    method
                )));
            }
            return self.replay(&bundle);
        }

        inputs::validate_items(items)?;
        allowlist::ensure_owner_linked(self.registry.as_ref(), &self.settings.owner)?;
        let encrypted_secrets = self.encrypt_secrets(items)?;
        let request_id = settings::new_request_id();

        let (digest, body) = match method {
            Method::SecretsCreate => fingerprint(
                &Request::new(
                    request_id.clone(),
                    method,
                    CreateSecretsRequest {
                        request_id: request_id.clone(),
                        encrypted_secrets,
                    },
                ),
                DigestScope::Request,
            )?,
            _ => fingerprint(
                &Request::new(
                    request_id.clone(),
                    method,
                    UpdateSecretsRequest {
                        request_id: request_id.clone(),
                        encrypted_secrets,
                    },
                ),
                DigestScope::Request,
            )?,
        };

        self.authorize_and_submit(method, &request_id, digest, body)
    }

    /// Delete secrets by id, in the given order.
    pub fn execute_delete(&self, items: &[SecretItem], request_id: Option<&str>) -> Result<Outcome> {
        if items.is_empty() {
            return Err(VaultError::validation("no secrets provided: file contains empty array"));
        }
        let owner = self.settings.owner_hex();
        let ids = items
            .iter()
            .map(|item| SecretIdentifier {
                key: item.id.clone(),
                namespace: item.namespace.clone(),
                owner: owner.clone(),
            })
            .collect();

        let id = resolve_request_id(request_id)?;
        let request = Request::new(
            id.clone(),
            Method::SecretsDelete,
            DeleteSecretsRequest {
                request_id: id.clone(),
                ids,
            },
        );
        let (digest, body) = fingerprint(&request, DigestScope::ParamsOnly)?;

        if request_id.is_some() {
            return self.submit_finalized(Method::SecretsDelete, digest, &body);
        }
        self.authorize_and_submit(Method::SecretsDelete, &id, digest, body)
    }

    /// List secret identifiers in `namespace`.
    pub fn execute_list(&self, namespace: Option<&str>, request_id: Option<&str>) -> Result<Outcome> {
        let namespace = namespace
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(DEFAULT_NAMESPACE);

        let id = resolve_request_id(request_id)?;
        allowlist::ensure_owner_linked(self.registry.as_ref(), &self.settings.owner)?;
        let request = Request::new(
            id.clone(),
            Method::SecretsList,
            ListSecretIdentifiersRequest {
                request_id: id.clone(),
                owner: self.settings.owner_hex(),
                namespace: namespace.to_string(),
            },
        );
        let (digest, body) = fingerprint(&request, DigestScope::ParamsOnly)?;

        if request_id.is_some() {
            return self.submit_finalized(Method::SecretsList, digest, &body);
        }
        self.authorize_and_submit(Method::SecretsList, &id, digest, body)
    }

    /// Second MSIG step: replay a saved bundle once it is allowlisted.
    pub fn execute_bundle(&self, path: &Path) -> Result<Outcome> {
        if self.settings.owner_kind != OwnerKind::Msig {
            return Err(VaultError::validation(
                "execute is only for MSIG owners; rerun with --unsigned",
            ));
        }
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return Err(VaultError::validation(format!(
                "bundle path must end in .json: {}",
                path.display()
            )));
        }
        let bundle = bundle::load_bundle(path)?;
        self.replay(&bundle)
    }

    /// Derive the response-encryption key from `passphrase` and store it in
    /// the vault through the ordinary create flow.
    pub fn store_encryption_key(&self, passphrase: &str, request_id: Option<&str>) -> Result<Outcome> {
        if request_id.is_some() {
            return self.execute_upsert(Method::SecretsCreate, &[], request_id);
        }
        if passphrase.is_empty() {
            return Err(VaultError::validation("passphrase must not be empty"));
        }
        let key = keys::derive_encryption_key(passphrase)?;
        let mut item = SecretItem {
            id: ENCRYPTION_KEY_SECRET_NAME.to_string(),
            value: key.to_hex(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        };
        let outcome = self.execute_upsert(Method::SecretsCreate, std::slice::from_ref(&item), None);
        item.value.zeroize();
        outcome
    }

    // ---------------------------------------------------------------------
    // Pipeline
    // ---------------------------------------------------------------------

    fn authorize_and_submit(&self, method: Method, request_id: &str, digest: Digest, body: Vec<u8>) -> Result<Outcome> {
        let owner = &self.settings.owner;
        info!(method = %method, request_id, digest = %digest, "request prepared");

        match self.settings.owner_kind {
            OwnerKind::Eoa => {
                allowlist::ensure_allowlisted(self.registry.as_ref(), owner, &digest, self.settings.allowlist_duration)?;
                self.post_and_parse(method, digest, &body)
            }
            OwnerKind::Msig => {
                let allowlisted = self
                    .registry
                    .is_request_allowlisted(owner, &digest)
                    .map_err(|e| VaultError::Chain(format!("allowlist check failed: {e}")))?;
                if allowlisted {
                    info!(owner = %self.settings.owner_hex(), digest = %digest, "digest already allowlisted; proceeding to gateway POST");
                    return self.post_and_parse(method, digest, &body);
                }
                self.park(method, request_id, digest, body)
            }
        }
    }

    fn park(&self, method: Method, request_id: &str, digest: Digest, body: Vec<u8>) -> Result<Outcome> {
        let bundle = UnsignedBundle::new(request_id, method.as_str(), &digest, body)?;
        let bundle_path = bundle::save_bundle(&self.settings.bundle_dir, &bundle)?;

        let deadline = allowlist::deadline(Utc::now(), self.settings.allowlist_duration)?;
        let tx_data = allowlist::pack_allowlist_request(&digest, deadline);
        info!(path = %bundle_path.display(), digest = %digest, "request parked for MSIG approval");

        Ok(Outcome::Parked(MsigInstructions {
            chain_name: self.settings.chain_name.clone(),
            registry_address: allowlist::checksum(&self.settings.registry_address),
            tx_data: format!("0x{}", hex::encode(tx_data)),
            bundle_path,
            digest,
        }))
    }

    fn replay(&self, bundle: &UnsignedBundle) -> Result<Outcome> {
        let method = Method::from_name(&bundle.method)
            .filter(Method::is_secrets_method)
            .ok_or_else(|| VaultError::Bundle(format!("unsupported method in bundle: {:?}", bundle.method)))?;
        let digest = bundle.digest()?;
        debug!(request_id = %bundle.request_id, digest = %digest, "replaying bundle");
        self.submit_finalized(method, digest, bundle.body_bytes())
    }

    fn submit_finalized(&self, method: Method, digest: Digest, body: &[u8]) -> Result<Outcome> {
        allowlist::require_allowlisted(self.registry.as_ref(), &self.settings.owner, &digest)?;
        self.post_and_parse(method, digest, body)
    }

    fn post_and_parse(&self, method: Method, digest: Digest, body: &[u8]) -> Result<Outcome> {
        let (resp_body, status) = self.gateway.post(body)?;
        gateway::ensure_ok(status, &resp_body)?;
        let reports = response::parse_gateway_response(method.as_str(), &resp_body)?;
        Ok(Outcome::Submitted { digest, reports })
    }
}

fn resolve_request_id(request_id: Option<&str>) -> Result<String> {
    match request_id {
        Some(id) => settings::parse_request_id(id),
        None => Ok(settings::new_request_id()),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| VaultError::Protocol(format!("failed to marshal JSON-RPC request: {e}")))
}

/// Digest `request` and serialize it once; the returned bytes are what
/// gets posted or bundled.
fn fingerprint<T: Serialize>(request: &Request<T>, scope: DigestScope) -> Result<(Digest, Vec<u8>)> {
    let digest = digest::compute(request, scope)?;
    Ok((digest, to_json(request)?))
}

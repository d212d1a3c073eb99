//! Gateway response decoding and per-item reporting.
//!
//! The gateway wraps each vault reply in a signed OCR envelope. The envelope's
//! `payload` is protobuf-JSON for a method-specific message; some gateways
//! embed it as a JSON object, others as a base64 string of the JSON bytes.
//! Both are accepted.
//!
//! Parsing yields one [`ItemReport`] per line of operator output. A secret the
//! vault rejected is a report, not an error.

use std::fmt;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use tracing::warn;

use crate::error::{Result, VaultError};
use crate::jsonrpc::{Method, Response};
use crate::types::{ListSecretIdentifiersResponse, SecretIdentifier, SecretsResponse, SignedOcrResponse};

/// Which mutation a per-secret report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    fn past(self) -> &'static str {
        match self {
            Self::Create => "created",
            Self::Update => "updated",
            Self::Delete => "deleted",
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// One line of outcome for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemReport {
    /// Result for one secret of a create, update or delete.
    Secret {
        action: Action,
        id: Option<SecretIdentifier>,
        success: bool,
        error: String,
    },
    /// One identifier returned by a list.
    Identifier(SecretIdentifier),
    /// A successful list with nothing in it.
    NoSecrets,
    /// A list the vault refused.
    ListFailed { error: String },
}

impl ItemReport {
    /// Whether the line reports a failure.
    pub fn is_failure(&self) -> bool {
        match self {
            Self::Secret { success, .. } => !success,
            Self::ListFailed { .. } => true,
            Self::Identifier(_) | Self::NoSecrets => false,
        }
    }
}

impl fmt::Display for ItemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret { action, id, success, error } => {
                let id = id.clone().unwrap_or_default();
                if *success {
                    write!(
                        f,
                        "Secret {}: secret_id={}, owner={}, namespace={}, success=true",
                        action.past(),
                        id.key,
                        id.owner,
                        id.namespace
                    )
                } else {
                    write!(
                        f,
                        "Secret {} failed: secret_id={} owner={} namespace={} success=false error={}",
                        action.verb(),
                        id.key,
                        id.owner,
                        id.namespace,
                        error
                    )
                }
            }
            Self::Identifier(id) => write!(
                f,
                "Secret identifier: secret_id={}, owner={}, namespace={}",
                id.key, id.owner, id.namespace
            ),
            Self::NoSecrets => f.write_str("No secrets found"),
            Self::ListFailed { error } => write!(f, "secret list failed: success=false error={error}"),
        }
    }
}

/// Decode a gateway reply to `method` into report lines.
///
/// Unknown methods are logged and produce no lines.
pub fn parse_gateway_response(method: &str, body: &[u8]) -> Result<Vec<ItemReport>> {
    let envelope: Response<SignedOcrResponse> = serde_json::from_slice(body)
        .map_err(|e| VaultError::Protocol(format!("failed to unmarshal JSON-RPC response: {e}")))?;

    if let Some(err) = envelope.error {
        return Err(VaultError::Gateway(format!("vault gateway returned an error: {err}")));
    }

    let payload = envelope
        .result
        .and_then(|r| r.payload)
        .filter(|p| !matches!(p.get(), "null" | "\"\""))
        .ok_or_else(|| VaultError::Protocol("empty SignedOCRResponse payload".into()))?;

    let action = match Method::from_name(method) {
        Some(Method::SecretsCreate) => Action::Create,
        Some(Method::SecretsUpdate) => Action::Update,
        Some(Method::SecretsDelete) => Action::Delete,
        Some(Method::SecretsList) => return list_reports(decode_payload(&payload, method)?),
        Some(Method::PublicKeyGet) | None => {
            warn!(method, "unsupported method in gateway response; nothing to report");
            return Ok(Vec::new());
        }
    };

    let decoded: SecretsResponse = decode_payload(&payload, method)?;
    Ok(decoded
        .responses
        .into_iter()
        .map(|r| ItemReport::Secret {
            action,
            id: r.id,
            success: r.success,
            error: r.error,
        })
        .collect())
}

fn list_reports(resp: ListSecretIdentifiersResponse) -> Result<Vec<ItemReport>> {
    if !resp.success {
        return Ok(vec![ItemReport::ListFailed { error: resp.error }]);
    }
    if resp.identifiers.is_empty() {
        return Ok(vec![ItemReport::NoSecrets]);
    }
    Ok(resp.identifiers.into_iter().map(ItemReport::Identifier).collect())
}

fn decode_payload<T: DeserializeOwned>(payload: &RawValue, method: &str) -> Result<T> {
    let text = payload.get();
    let decoded = if text.starts_with('"') {
        let encoded: String = serde_json::from_str(text)
            .map_err(|e| VaultError::Protocol(format!("failed to decode payload string: {e}")))?;
        let bytes = STANDARD
            .decode(encoded.trim())
            .or_else(|_| STANDARD_NO_PAD.decode(encoded.trim().trim_end_matches('=')))
            .map_err(|e| VaultError::Protocol(format!("payload is not base64: {e}")))?;
        serde_json::from_slice(&bytes)
    } else {
        serde_json::from_str(text)
    };
    decoded.map_err(|e| VaultError::Protocol(format!("failed to decode {method} payload: {e}")))
}

//! Request fingerprinting.
//!
//! A digest is the on-chain allowlist key for a request, so it has to be
//! stable across processes and independent of map ordering. Requests are
//! first converted to a JSON value and written in canonical form: object
//! keys sorted, no insignificant whitespace. The canonical bytes are hashed
//! with SHA-256.
//!
//! There is a single digest function. Callers choose what it covers with
//! [`DigestScope`]:
//!
//! - `Request` hashes the whole envelope (`jsonrpc`, `id`, `method`,
//!   `params`). Two requests only collide when their ids match too.
//! - `ParamsOnly` hashes the params with the top-level `request_id`
//!   removed, so the same logical operation maps to the same digest no
//!   matter which request id carries it.

use std::fmt;

use ring::digest::{digest, SHA256};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, VaultError};
use crate::jsonrpc::Request;

/// Length of a digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// What part of a request a digest covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestScope {
    /// The full JSON-RPC envelope, including the request id.
    Request,
    /// The params alone, without any request id.
    ParamsOnly,
}

/// A 32-byte request fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse 64 hex characters, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(s)
            .map_err(|e| VaultError::validation(format!("invalid hex for digest: {e}")))?;
        let bytes: [u8; DIGEST_LEN] = raw.as_slice().try_into().map_err(|_| {
            VaultError::validation(format!("digest must be {} bytes, got {}", DIGEST_LEN, raw.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Lowercase hex with a `0x` prefix.
    pub fn to_prefixed_hex(&self) -> String {
        format!("0x{}", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_prefixed_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_prefixed_hex())
    }
}

/// Compute the digest of `request` under `scope`.
pub fn compute<T: Serialize>(request: &Request<T>, scope: DigestScope) -> Result<Digest> {
    let value = match scope {
        DigestScope::Request => to_value(request)?,
        DigestScope::ParamsOnly => {
            let mut params = to_value(&request.params)?;
            if let Value::Object(map) = &mut params {
                map.remove("request_id");
            }
            params
        }
    };

    let mut canonical = Vec::new();
    write_canonical(&value, &mut canonical)?;

    let hash = digest(&SHA256, &canonical);
    let bytes: [u8; DIGEST_LEN] = hash
        .as_ref()
        .try_into()
        .map_err(|_| VaultError::Protocol("unexpected SHA-256 output length".into()))?;
    Ok(Digest(bytes))
}

fn to_value<T: Serialize>(v: &T) -> Result<Value> {
    serde_json::to_value(v)
        .map_err(|e| VaultError::Protocol(format!("failed to marshal json request params: {e}")))
}

/// Write `value` with sorted object keys and no whitespace.
fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_scalar(&Value::String(key.clone()), out)?;
                out.push(b':');
                write_canonical(&map[key], out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        scalar => write_scalar(scalar, out)?,
    }
    Ok(())
}

fn write_scalar(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    serde_json::to_writer(&mut *out, value)
        .map_err(|e| VaultError::Protocol(format!("failed to canonicalize request: {e}")))
}

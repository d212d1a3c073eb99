//! Unsigned bundles.
//!
//! When an MSIG owner has not yet approved a request, the prepared request
//! is parked on disk as a bundle. The bundle is named after the digest, so
//! preparing the same request twice overwrites the same file. `request_body`
//! is kept as the exact bytes that were fingerprinted and is replayed without
//! re-encoding.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tracing::{debug, warn};

use crate::digest::Digest;
use crate::error::{Result, VaultError};

/// A request prepared for MSIG approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsignedBundle {
    pub request_id: String,
    pub method: String,
    pub digest_hex: String,
    pub request_body: Box<RawValue>,
    pub created_at: DateTime<Utc>,
}

impl PartialEq for UnsignedBundle {
    fn eq(&self, other: &Self) -> bool {
        self.request_id == other.request_id
            && self.method == other.method
            && self.digest_hex == other.digest_hex
            && self.request_body.get() == other.request_body.get()
            && self.created_at == other.created_at
    }
}

impl UnsignedBundle {
    /// Bundle `request_body` under `digest`.
    pub fn new(request_id: impl Into<String>, method: impl Into<String>, digest: &Digest, request_body: Vec<u8>) -> Result<Self> {
        let text = String::from_utf8(request_body)
            .map_err(|_| VaultError::Bundle("request body is not UTF-8".into()))?;
        let request_body = RawValue::from_string(text)
            .map_err(|e| VaultError::Bundle(format!("request body is not JSON: {e}")))?;
        Ok(Self {
            request_id: request_id.into(),
            method: method.into(),
            digest_hex: digest.to_prefixed_hex(),
            request_body,
            created_at: Utc::now(),
        })
    }

    /// Digest recorded in the bundle.
    pub fn digest(&self) -> Result<Digest> {
        Digest::from_hex(&self.digest_hex)
            .map_err(|e| VaultError::Bundle(format!("invalid digest_hex: {e}")))
    }

    /// The saved request bytes, exactly as fingerprinted.
    pub fn body_bytes(&self) -> &[u8] {
        self.request_body.get().as_bytes()
    }
}

/// Optional-field mirror used to report missing fields as a bundle error.
#[derive(Deserialize)]
struct PartialBundle {
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    method: String,
    #[serde(default)]
    digest_hex: String,
    #[serde(default)]
    request_body: Option<Box<RawValue>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// `<hex digest>.json`
pub fn bundle_filename(digest: &Digest) -> String {
    format!("{}.json", digest.to_hex())
}

/// Write `bundle` into `dir` and return its path. The file is only readable
/// by the owner.
pub fn save_bundle(dir: &Path, bundle: &UnsignedBundle) -> Result<PathBuf> {
    let digest = bundle.digest()?;
    fs::create_dir_all(dir)
        .map_err(|e| VaultError::Bundle(format!("failed to create bundle directory {}: {e}", dir.display())))?;
    let path = dir.join(bundle_filename(&digest));

    let json = serde_json::to_vec_pretty(bundle)
        .map_err(|e| VaultError::Bundle(format!("failed to encode bundle: {e}")))?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(&path)
        .map_err(|e| VaultError::Bundle(format!("failed to write bundle {}: {e}", path.display())))?;
    file.write_all(&json)
        .map_err(|e| VaultError::Bundle(format!("failed to write bundle {}: {e}", path.display())))?;

    debug!(path = %path.display(), digest = %digest, "bundle saved");
    Ok(path)
}

/// Read a bundle, failing on any missing required field.
pub fn load_bundle(path: &Path) -> Result<UnsignedBundle> {
    let raw = fs::read(path)
        .map_err(|e| VaultError::Bundle(format!("failed to read bundle {}: {e}", path.display())))?;
    let partial: PartialBundle = serde_json::from_slice(&raw)
        .map_err(|e| VaultError::Bundle(format!("invalid bundle: {e}")))?;

    let request_body = match partial.request_body {
        Some(body) if body.get() != "null" => body,
        _ => return Err(missing_fields()),
    };
    if partial.request_id.is_empty() || partial.method.is_empty() || partial.digest_hex.is_empty() {
        return Err(missing_fields());
    }

    Ok(UnsignedBundle {
        request_id: partial.request_id,
        method: partial.method,
        digest_hex: partial.digest_hex,
        request_body,
        created_at: partial.created_at.unwrap_or_default(),
    })
}

fn missing_fields() -> VaultError {
    VaultError::Bundle("invalid bundle: missing required fields".into())
}

/// Find the bundle in `dir` whose `request_id` equals `request_id`.
pub fn find_by_request_id(dir: &Path, request_id: &str) -> Result<Option<(PathBuf, UnsignedBundle)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(VaultError::Bundle(format!(
                "failed to list bundle directory {}: {e}",
                dir.display()
            )))
        }
    };

    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match load_bundle(&path) {
            Ok(bundle) if bundle.request_id == request_id => return Ok(Some((path, bundle))),
            Ok(_) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable bundle"),
        }
    }
    Ok(None)
}

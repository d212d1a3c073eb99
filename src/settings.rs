//! Runtime settings consumed by the handler.
//!
//! Values come from CLI flags or their environment variables; this module
//! only holds and validates them.

use std::path::PathBuf;
use std::time::Duration;

use ethabi::Address;
use uuid::Uuid;

use crate::allowlist::{self, OwnerKind, DEFAULT_ALLOWLIST_DURATION};
use crate::error::{Result, VaultError};

/// Validated settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Vault gateway endpoint.
    pub gateway_url: String,
    /// Workflow owner whose secrets are managed.
    pub owner: Address,
    pub owner_kind: OwnerKind,
    /// Registry contract holding the allowlist.
    pub registry_address: Address,
    /// Human name of the registry chain, used in MSIG instructions.
    pub chain_name: String,
    /// How long an allowlist entry stays valid.
    pub allowlist_duration: Duration,
    /// Where unsigned bundles are written and searched.
    pub bundle_dir: PathBuf,
}

impl Settings {
    pub fn new(gateway_url: impl Into<String>, owner: Address, owner_kind: OwnerKind) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            owner,
            owner_kind,
            registry_address: Address::zero(),
            chain_name: String::new(),
            allowlist_duration: DEFAULT_ALLOWLIST_DURATION,
            bundle_dir: PathBuf::from("."),
        }
    }

    /// Checksummed owner address, the form sent to the vault.
    pub fn owner_hex(&self) -> String {
        allowlist::checksum(&self.owner)
    }
}

/// Parse durations such as `90s`, `30m`, `48h`, `2d` or `1h30m`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(VaultError::validation("empty duration"));
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            _ => return Err(VaultError::validation(format!("invalid duration {s:?}: unknown unit {c:?}"))),
        };
        let n: u64 = digits
            .parse()
            .map_err(|_| VaultError::validation(format!("invalid duration {s:?}")))?;
        total = n
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| VaultError::validation(format!("duration {s:?} overflows")))?;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(VaultError::validation(format!("invalid duration {s:?}: missing unit")));
    }
    Ok(Duration::from_secs(total))
}

/// Parse and bound-check `--timeout`.
pub fn parse_allowlist_duration(s: &str) -> Result<Duration> {
    allowlist::validate_duration(parse_duration(s)?).map_err(|_| {
        VaultError::validation(format!(
            "invalid --timeout: must be greater than 0 and at most {}h ({}d)",
            allowlist::MAX_ALLOWLIST_DURATION.as_secs() / 3600,
            allowlist::MAX_ALLOWLIST_DURATION.as_secs() / 86_400
        ))
    })
}

/// Validate a `--request-id` value and return its canonical form.
pub fn parse_request_id(s: &str) -> Result<String> {
    Uuid::parse_str(s.trim())
        .map(|u| u.to_string())
        .map_err(|_| VaultError::validation(format!("--request-id must be a UUID, got {s:?}")))
}

/// A fresh request id.
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

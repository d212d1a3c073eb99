//! On-chain allowlist coordination.
//!
//! The workflow registry contract keeps a map from `(owner, digest)` to an
//! approval with a deadline. A request may only reach the vault gateway once
//! its digest is allowlisted for the owner.
//!
//! Two owner kinds approve differently:
//! - **EOA**: the handler signs and sends `allowlistRequest` itself.
//! - **MSIG**: the handler only packs the call data; the multisig submits it
//!   out of band.
//!
//! Chain access goes through [`AllowlistRegistry`] so the orchestrator can run
//! against a live node or an in-memory fake.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ethabi::{Address, ParamType, Token};
use sha3::{Digest as _, Keccak256};
use tracing::{debug, info};

use crate::digest::Digest;
use crate::error::{Result, VaultError};

/// Default validity of an allowlist entry.
pub const DEFAULT_ALLOWLIST_DURATION: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// Longest validity the registry accepts.
pub const MAX_ALLOWLIST_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Function name of the allowlist mutation on the registry.
pub const ALLOWLIST_REQUEST_FN: &str = "allowlistRequest";

/// Function name of the allowlist lookup on the registry.
pub const IS_REQUEST_ALLOWLISTED_FN: &str = "isRequestAllowlisted";

/// Function name of the owner link lookup on the registry.
pub const IS_OWNER_LINKED_FN: &str = "isOwnerLinked";

/// How the workflow owner approves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnerKind {
    /// Externally owned account; the handler holds the signing key.
    #[default]
    Eoa,
    /// Multisig; approvals are submitted out of band.
    Msig,
}

impl FromStr for OwnerKind {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eoa" => Ok(Self::Eoa),
            "msig" | "multisig" => Ok(Self::Msig),
            other => Err(VaultError::validation(format!(
                "unknown owner type {other:?}; expected eoa or msig"
            ))),
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eoa => f.write_str("eoa"),
            Self::Msig => f.write_str("msig"),
        }
    }
}

/// Result of a submitted allowlist transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    /// 0x-prefixed transaction hash.
    pub tx_hash: String,
}

/// Read and write access to the allowlist on the workflow registry.
pub trait AllowlistRegistry {
    /// Whether `owner` has linked its key on the registry.
    fn is_owner_linked(&self, owner: &Address) -> Result<bool>;

    /// Whether `digest` is currently allowlisted for `owner`.
    fn is_request_allowlisted(&self, owner: &Address, digest: &Digest) -> Result<bool>;

    /// Allowlist `digest` for the signing account for `duration`.
    fn allowlist_request(&self, digest: &Digest, duration: Duration) -> Result<TxOutcome>;
}

/// Make sure `digest` is allowlisted for an EOA `owner`, submitting a
/// transaction only when it is not already.
///
/// Returns the transaction outcome when one was sent.
pub fn ensure_allowlisted(
    registry: &dyn AllowlistRegistry,
    owner: &Address,
    digest: &Digest,
    duration: Duration,
) -> Result<Option<TxOutcome>> {
    let allowlisted = registry
        .is_request_allowlisted(owner, digest)
        .map_err(|e| VaultError::Chain(format!("allowlist verification failed: {e}")))?;
    if allowlisted {
        info!(owner = %checksum(owner), digest = %digest, "request already allowlisted");
        return Ok(None);
    }

    debug!(digest = %digest, duration_secs = duration.as_secs(), "submitting allowlist request");
    let outcome = registry
        .allowlist_request(digest, duration)
        .map_err(|e| VaultError::Chain(format!("allowlist request failed: {e}")))?;
    info!(digest = %digest, tx_hash = %outcome.tx_hash, "digest allowlisted");
    Ok(Some(outcome))
}

/// Fail unless `owner` is linked on the registry. Runs before anything is
/// sealed or allowlisted.
pub fn ensure_owner_linked(registry: &dyn AllowlistRegistry, owner: &Address) -> Result<()> {
    let linked = registry
        .is_owner_linked(owner)
        .map_err(|e| VaultError::Chain(format!("failed to check owner link status: {e}")))?;
    info!(owner = %checksum(owner), linked, "workflow owner link status");
    if !linked {
        return Err(VaultError::validation(format!(
            "owner {} not linked; link the owner key on the workflow registry first",
            checksum(owner)
        )));
    }
    Ok(())
}

/// Fail unless the EOA `signer` is the workflow `owner`; the registry
/// allowlists under the sending account.
pub fn ensure_signer_matches(signer: Address, owner: &Address) -> Result<()> {
    if signer != *owner {
        return Err(VaultError::validation(format!(
            "ETH_PRIVATE_KEY belongs to {}, not workflow owner {}",
            checksum(&signer),
            checksum(owner)
        )));
    }
    Ok(())
}

/// Fail with [`VaultError::NotFinalized`] unless `digest` is allowlisted.
pub fn require_allowlisted(
    registry: &dyn AllowlistRegistry,
    owner: &Address,
    digest: &Digest,
) -> Result<()> {
    let allowlisted = registry
        .is_request_allowlisted(owner, digest)
        .map_err(|e| VaultError::Chain(format!("allowlist check failed: {e}")))?;
    if !allowlisted {
        return Err(VaultError::NotFinalized {
            digest: digest.to_prefixed_hex(),
        });
    }
    Ok(())
}

/// Check that an allowlist duration is positive and within the registry cap.
pub fn validate_duration(duration: Duration) -> Result<Duration> {
    if duration.is_zero() {
        return Err(VaultError::validation("--timeout must be greater than zero"));
    }
    if duration > MAX_ALLOWLIST_DURATION {
        return Err(VaultError::validation(format!(
            "--timeout must not exceed {}h",
            MAX_ALLOWLIST_DURATION.as_secs() / 3600
        )));
    }
    Ok(duration)
}

/// Unix deadline for an allowlist entry created at `now`.
pub fn deadline(now: DateTime<Utc>, duration: Duration) -> Result<u32> {
    let secs = now.timestamp().saturating_add(duration.as_secs() as i64);
    u32::try_from(secs)
        .map_err(|_| VaultError::validation(format!("allowlist deadline {secs} does not fit in uint32")))
}

/// ABI call data for `allowlistRequest(bytes32,uint32)`.
pub fn pack_allowlist_request(digest: &Digest, deadline: u32) -> Vec<u8> {
    let selector = ethabi::short_signature(
        ALLOWLIST_REQUEST_FN,
        &[ParamType::FixedBytes(32), ParamType::Uint(32)],
    );
    let args = ethabi::encode(&[
        Token::FixedBytes(digest.as_bytes().to_vec()),
        Token::Uint(deadline.into()),
    ]);
    [selector.as_slice(), args.as_slice()].concat()
}

/// ABI call data for `isRequestAllowlisted(address,bytes32)`.
pub fn pack_is_request_allowlisted(owner: &Address, digest: &Digest) -> Vec<u8> {
    let selector = ethabi::short_signature(
        IS_REQUEST_ALLOWLISTED_FN,
        &[ParamType::Address, ParamType::FixedBytes(32)],
    );
    let args = ethabi::encode(&[
        Token::Address(*owner),
        Token::FixedBytes(digest.as_bytes().to_vec()),
    ]);
    [selector.as_slice(), args.as_slice()].concat()
}

/// ABI call data for `isOwnerLinked(address)`.
pub fn pack_is_owner_linked(owner: &Address) -> Vec<u8> {
    let selector = ethabi::short_signature(IS_OWNER_LINKED_FN, &[ParamType::Address]);
    let args = ethabi::encode(&[Token::Address(*owner)]);
    [selector.as_slice(), args.as_slice()].concat()
}

/// Decode the `bool` returned by `isRequestAllowlisted` or `isOwnerLinked`.
pub fn decode_bool(data: &[u8]) -> Result<bool> {
    let tokens = ethabi::decode(&[ParamType::Bool], data)
        .map_err(|e| VaultError::Chain(format!("failed to decode allowlist result: {e}")))?;
    match tokens.as_slice() {
        [Token::Bool(b)] => Ok(*b),
        _ => Err(VaultError::Chain("allowlist result is not a bool".into())),
    }
}

/// Parse a 20-byte hex address, with or without `0x`.
pub fn parse_address(s: &str) -> Result<Address> {
    let s = s.trim();
    let body = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    let raw = hex::decode(body)
        .map_err(|_| VaultError::validation(format!("invalid owner address {s:?}")))?;
    if raw.len() != 20 {
        return Err(VaultError::validation(format!(
            "owner address must be 20 bytes, got {}",
            raw.len()
        )));
    }
    Ok(Address::from_slice(&raw))
}

/// EIP-55 mixed-case form of `address`.
pub fn checksum(address: &Address) -> String {
    let lower = hex::encode(address.as_bytes());
    let hash = Keccak256::digest(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

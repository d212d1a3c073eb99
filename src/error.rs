//! Error types for vaultgate.
//!
//! Variants follow the failure taxonomy of a submission: local validation,
//! cryptography, chain, gateway transport, protocol decoding and bundle
//! handling. Messages carry the failing step so an operator can tell which
//! stage to rerun. Cryptographic variants stay terse and never echo key
//! material.

use thiserror::Error;

/// The single error type for all vaultgate operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Malformed input file, missing environment variable, bad UUID, bad
    /// timeout range or similar. Raised before any network interaction.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Sealing a secret or a payload failed (bad public key, cipher error).
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// AES-GCM open failed, or the ciphertext is structurally invalid.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// HKDF expansion failed.
    #[error("key derivation failed")]
    KeyDerivation,

    /// The system random number generator failed to produce bytes.
    #[error("randomness source failed")]
    Randomness,

    /// Reading or mutating allowlist state on-chain failed.
    #[error("chain error: {0}")]
    Chain(String),

    /// Transport failure or non-200 status from the vault gateway.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Unexpected JSON-RPC shape or payload decoding failure.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A persisted bundle could not be read, written or was incomplete.
    #[error("bundle error: {0}")]
    Bundle(String),

    /// The digest is not (yet) allowlisted on-chain for the owner.
    #[error("on-chain request (digest {digest}) is not finalized/allowlisted; finalize the allowlist tx, then rerun this command")]
    NotFinalized { digest: String },

    /// Filesystem failure outside of bundle handling.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// Build a validation error from anything displayable.
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VaultError>;

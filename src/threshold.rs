//! Sealing secret values for the vault.
//!
//! The vault publishes a single public key whose private half only exists
//! as shares held by the vault nodes. Values are sealed to that key one at a
//! time; nothing here can open them again.
//!
//! Each value is sealed with an ephemeral P-256 key agreement:
//!
//! ```text
//! shared = ECDH(ephemeral_secret, vault_public_key)
//! key    = HKDF-SHA256(salt = label, ikm = shared, info = INFO || ephemeral_public)
//! out    = ephemeral_public (65) || AES-256-GCM(key, value, aad = label)
//! ```
//!
//! `label` is 12 zero bytes followed by the 20-byte owner address, so a
//! ciphertext cannot be replayed under a different owner.

use ethabi::Address;
use ring::agreement::{self, EphemeralPrivateKey, UnparsedPublicKey, ECDH_P256};
use ring::hkdf;
use ring::rand::SystemRandom;
use zeroize::Zeroizing;

use crate::crypto::{self, KEY_LEN};
use crate::error::{Result, VaultError};

const SEAL_INFO: &[u8] = b"vault-secret-seal-v1";

/// Length of an uncompressed SEC1 P-256 point.
pub const PUBLIC_KEY_LEN: usize = 65;

/// The vault's published public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultPublicKey {
    bytes: Vec<u8>,
}

impl VaultPublicKey {
    /// Parse the hex form returned by `vault_publicKey_get`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)
            .map_err(|e| VaultError::Encryption(format!("failed to decode master public key: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// Wrap raw SEC1 bytes, rejecting anything that is not an uncompressed point.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_LEN || bytes[0] != 0x04 {
            return Err(VaultError::Encryption(format!(
                "failed to unmarshal master public key: expected {} byte uncompressed point, got {} bytes",
                PUBLIC_KEY_LEN,
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Build the 32-byte owner label: left-padded 20-byte address.
pub fn owner_label(owner: &Address) -> [u8; 32] {
    let mut label = [0u8; 32];
    label[12..].copy_from_slice(owner.as_bytes());
    label
}

fn derive_seal_key(shared: &[u8], label: &[u8; 32], ephemeral_public: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, label);
    let prk = salt.extract(shared);
    let info = [SEAL_INFO, ephemeral_public];
    let okm = prk
        .expand(&info, hkdf::HKDF_SHA256)
        .map_err(|_| VaultError::KeyDerivation)?;
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    okm.fill(&mut key[..]).map_err(|_| VaultError::KeyDerivation)?;
    Ok(key)
}

/// Seal `secret` to the vault key for `owner`, returning lowercase hex.
pub fn seal_secret(secret: &str, public_key: &VaultPublicKey, owner: &Address) -> Result<String> {
    let rng = SystemRandom::new();
    let ephemeral = EphemeralPrivateKey::generate(&ECDH_P256, &rng)
        .map_err(|_| VaultError::Randomness)?;
    let ephemeral_public = ephemeral
        .compute_public_key()
        .map_err(|_| VaultError::Encryption("failed to compute ephemeral public key".into()))?;

    let label = owner_label(owner);
    let peer = UnparsedPublicKey::new(&ECDH_P256, public_key.as_bytes());
    let key = agreement::agree_ephemeral(ephemeral, &peer, |shared| {
        derive_seal_key(shared, &label, ephemeral_public.as_ref())
    })
    .map_err(|_| VaultError::Encryption("key agreement with vault public key failed".into()))??;

    let sealed = crypto::seal_with_aad(&key, secret.as_bytes(), &label)?;

    let mut out = Vec::with_capacity(PUBLIC_KEY_LEN + sealed.len());
    out.extend_from_slice(ephemeral_public.as_ref());
    out.extend_from_slice(&sealed);
    Ok(hex::encode(out))
}

//! Low-level cryptographic operations.
//!
//! Every AES-GCM operation in the crate goes through this module; `keys` owns
//! HKDF and `threshold` owns key agreement, but neither touches the cipher
//! directly.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption)
//! - **Nonce**: 96-bit (12 bytes), generated fresh per operation via `SystemRandom`
//! - **Key size**: 256 bits (32 bytes)
//!
//! # Wire format
//! ```text
//! [ nonce (12 bytes) ][ ciphertext ][ GCM tag (16 bytes) ]
//! ```

use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};

/// The AEAD algorithm used throughout vaultgate.
const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Size of a symmetric key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Smallest well-formed ciphertext: a nonce plus an empty body and its tag.
pub const MIN_CIPHERTEXT_LEN: usize = NONCE_LEN + TAG_LEN;

/// Fill `buf` from the system RNG.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<()> {
    let rng = SystemRandom::new();
    rng.fill(buf).map_err(|_| VaultError::Randomness)
}

fn generate_nonce() -> Result<[u8; NONCE_LEN]> {
    let mut buf = [0u8; NONCE_LEN];
    fill_random(&mut buf)?;
    Ok(buf)
}

fn cipher_key(key_bytes: &[u8; KEY_LEN]) -> Result<LessSafeKey> {
    let unbound = UnboundKey::new(ALGORITHM, key_bytes)
        .map_err(|_| VaultError::Encryption("invalid AES-256 key".into()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Seal `plaintext` under `key_bytes`, binding `aad` into the tag.
///
/// Returns `nonce || ciphertext || tag`.
pub fn seal_with_aad(key_bytes: &[u8; KEY_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let key = cipher_key(key_bytes)?;
    let nonce_bytes = generate_nonce()?;

    let mut sealed = plaintext.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::from(aad),
        &mut sealed,
    )
    .map_err(|_| VaultError::Encryption("AES-GCM seal failed".into()))?;

    let mut output = Vec::with_capacity(NONCE_LEN + sealed.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&sealed);
    Ok(output)
}

/// Open a `nonce || ciphertext || tag` buffer produced by [`seal_with_aad`].
///
/// Fails closed: input shorter than [`MIN_CIPHERTEXT_LEN`] is rejected before
/// touching the cipher, and a tag mismatch yields no partial plaintext.
pub fn open_with_aad(key_bytes: &[u8; KEY_LEN], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < MIN_CIPHERTEXT_LEN {
        return Err(VaultError::Decryption(format!(
            "ciphertext too short: need at least {} bytes, got {}",
            MIN_CIPHERTEXT_LEN,
            ciphertext.len()
        )));
    }

    let nonce_bytes: [u8; NONCE_LEN] = ciphertext[..NONCE_LEN]
        .try_into()
        .map_err(|_| VaultError::Decryption("malformed nonce".into()))?;

    let unbound = UnboundKey::new(ALGORITHM, key_bytes)
        .map_err(|_| VaultError::Decryption("invalid AES-256 key".into()))?;
    let key = LessSafeKey::new(unbound);

    let mut payload = ciphertext[NONCE_LEN..].to_vec();
    let plaintext = key
        .open_in_place(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::from(aad),
            &mut payload,
        )
        .map_err(|_| VaultError::Decryption("gcm tag mismatch".into()))?;

    Ok(plaintext.to_vec())
}

/// Encrypt with AES-256-GCM and no associated data.
pub fn encrypt(key_bytes: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    seal_with_aad(key_bytes, plaintext, &[])
}

/// Decrypt AES-256-GCM ciphertext in the `nonce || ciphertext || tag` layout.
pub fn decrypt(key_bytes: &[u8; KEY_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
    open_with_aad(key_bytes, ciphertext, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let key = [7u8; KEY_LEN];
        let sealed = encrypt(&key, b"hello confidential http").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + 23 + TAG_LEN);
        assert_eq!(decrypt(&key, &sealed).unwrap(), b"hello confidential http");
    }

    #[test]
    fn test_empty_plaintext_is_minimum_length() {
        let key = [1u8; KEY_LEN];
        let sealed = encrypt(&key, b"").unwrap();
        assert_eq!(sealed.len(), MIN_CIPHERTEXT_LEN);
        assert!(decrypt(&key, &sealed).unwrap().is_empty());
    }

    #[test]
    fn test_nonce_leads_and_is_fresh() {
        let key = [9u8; KEY_LEN];
        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();
        assert_ne!(&a[..NONCE_LEN], &b[..NONCE_LEN]);
        assert_ne!(&a[NONCE_LEN..], b"same");
        assert_eq!(decrypt(&key, &b).unwrap(), b"same");
    }

    #[test]
    fn test_too_short_is_rejected() {
        let key = [0u8; KEY_LEN];
        for len in [0, 10, MIN_CIPHERTEXT_LEN - 1] {
            let err = decrypt(&key, &vec![0u8; len]).unwrap_err();
            assert!(err.to_string().contains("too short"), "{err}");
        }
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = [3u8; KEY_LEN];
        let mut sealed = encrypt(&key, b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(decrypt(&key, &sealed).is_err());
    }

    #[test]
    fn test_aad_mismatch_fails() {
        let key = [4u8; KEY_LEN];
        let sealed = seal_with_aad(&key, b"payload", b"label-a").unwrap();
        assert!(open_with_aad(&key, &sealed, b"label-b").is_err());
        assert_eq!(open_with_aad(&key, &sealed, b"label-a").unwrap(), b"payload");
    }
}

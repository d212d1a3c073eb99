//! Passphrase key derivation and ownership.
//!
//! The confidential-HTTP feature lets workflows encrypt response bodies with
//! an AES-256 key that the operator stores in the vault. Both the store and
//! the local decrypt path derive that key from a passphrase the same way:
//!
//! ```text
//! HKDF-SHA256(
//!     ikm  = passphrase,
//!     salt = None,
//!     info = "confidential-http-encryption-key-v1"
//! )
//! ```
//!
//! The output must stay byte-identical to other implementations of the same
//! derivation, so the info string and the empty salt are fixed.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use ring::hkdf;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{self, KEY_LEN};
use crate::error::{Result, VaultError};

/// Name under which the derived key is stored in the vault.
pub const ENCRYPTION_KEY_SECRET_NAME: &str = "san_marino_aes_gcm_encryption_key";

const HKDF_INFO: &str = "confidential-http-encryption-key-v1";

/// A derived AES-256 key.
///
/// - Not `Clone`.
/// - Zeroised on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_LEN],
}

impl EncryptionKey {
    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Lowercase hex of the key, the form stored as a vault secret value.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Decrypt a `nonce || ciphertext || tag` buffer sealed under this key.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        crypto::decrypt(&self.bytes, ciphertext)
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Derive the 32-byte AES-256 key for `passphrase`.
pub fn derive_encryption_key(passphrase: &str) -> Result<EncryptionKey> {
    // An empty salt is treated by HKDF as a zero-filled salt of hash length.
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, &[]);
    let prk = salt.extract(passphrase.as_bytes());

    let info = [HKDF_INFO.as_bytes()];
    let okm = prk
        .expand(&info, hkdf::HKDF_SHA256)
        .map_err(|_| VaultError::KeyDerivation)?;

    let mut bytes = [0u8; KEY_LEN];
    okm.fill(&mut bytes).map_err(|_| VaultError::KeyDerivation)?;

    Ok(EncryptionKey { bytes })
}

/// Text form of a ciphertext handed to [`decrypt_output`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CiphertextEncoding {
    /// Standard alphabet, padded or unpadded.
    #[default]
    Base64,
    Hex,
    /// Bytes as-is.
    Raw,
}

impl std::str::FromStr for CiphertextEncoding {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "base64" => Ok(Self::Base64),
            "hex" => Ok(Self::Hex),
            "raw" => Ok(Self::Raw),
            other => Err(VaultError::validation(format!(
                "unsupported encoding {other:?}: use base64, hex, or raw"
            ))),
        }
    }
}

/// Turn `input` into ciphertext bytes according to `encoding`.
pub fn decode_ciphertext(input: &[u8], encoding: CiphertextEncoding) -> Result<Vec<u8>> {
    match encoding {
        CiphertextEncoding::Raw => Ok(input.to_vec()),
        CiphertextEncoding::Hex => {
            let text = std::str::from_utf8(input)
                .map_err(|_| VaultError::validation("hex decode failed: input is not text"))?;
            hex::decode(text.trim()).map_err(|e| VaultError::validation(format!("hex decode failed: {e}")))
        }
        CiphertextEncoding::Base64 => {
            let text = std::str::from_utf8(input)
                .map_err(|_| VaultError::validation("base64 decode failed: input is not text"))?
                .trim();
            STANDARD
                .decode(text)
                .or_else(|_| STANDARD_NO_PAD.decode(text))
                .map_err(|e| VaultError::validation(format!("base64 decode failed: {e}")))
        }
    }
}

/// Decrypt a confidential-HTTP response body locally.
pub fn decrypt_output(passphrase: &str, input: &[u8], encoding: CiphertextEncoding) -> Result<Vec<u8>> {
    if passphrase.is_empty() {
        return Err(VaultError::validation("--passphrase is required and must not be empty"));
    }
    let ciphertext = decode_ciphertext(input, encoding)?;
    let key = derive_encryption_key(passphrase)?;
    key.decrypt(&ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_language_vector() {
        let key = derive_encryption_key("test-passphrase-for-ci").unwrap();
        assert_eq!(
            key.to_hex(),
            "521af99325c07c9bd0d224c5bf3ca25666c68b5fbb7fa7884019b4f60a8e6eb5"
        );
    }

    #[test]
    fn test_deterministic_and_distinct() {
        let a = derive_encryption_key("alpha").unwrap();
        let b = derive_encryption_key("alpha").unwrap();
        let c = derive_encryption_key("beta").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
    }

    #[test]
    fn test_decrypt_roundtrip() {
        let key = derive_encryption_key("round-trip-test").unwrap();
        let sealed = crypto::encrypt(key.as_bytes(), b"hello confidential http").unwrap();
        assert_eq!(key.decrypt(&sealed).unwrap(), b"hello confidential http");
    }

    #[test]
    fn test_debug_redacts() {
        let key = derive_encryption_key("any").unwrap();
        assert_eq!(format!("{key:?}"), "EncryptionKey(..)");
    }

    #[test]
    fn test_decrypt_output_encodings() {
        let key = derive_encryption_key("pw").unwrap();
        let sealed = crypto::encrypt(key.as_bytes(), b"body").unwrap();

        let b64 = format!("{}\n", STANDARD.encode(&sealed));
        let raw_b64 = STANDARD_NO_PAD.encode(&sealed);
        let hexed = hex::encode(&sealed);

        assert_eq!(decrypt_output("pw", b64.as_bytes(), CiphertextEncoding::Base64).unwrap(), b"body");
        assert_eq!(decrypt_output("pw", raw_b64.as_bytes(), CiphertextEncoding::Base64).unwrap(), b"body");
        assert_eq!(decrypt_output("pw", hexed.as_bytes(), CiphertextEncoding::Hex).unwrap(), b"body");
        assert_eq!(decrypt_output("pw", &sealed, CiphertextEncoding::Raw).unwrap(), b"body");
    }

    #[test]
    fn test_decrypt_output_failures() {
        assert!(decrypt_output("", b"AAAA", CiphertextEncoding::Base64).is_err());
        assert!(decrypt_output("pw", b"!!", CiphertextEncoding::Base64).is_err());
        assert!(decrypt_output("wrong", &[0u8; 40], CiphertextEncoding::Raw).is_err());
        assert!("b64".parse::<CiphertextEncoding>().is_err());
    }
}

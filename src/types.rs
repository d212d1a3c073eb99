//! Vault wire messages.
//!
//! Request params use the snake_case field names the gateway decodes.
//! Response payloads are protobuf-JSON, which omits default values and may
//! use lowerCamelCase, so every response field defaults and accepts both
//! spellings.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "main";

/// A secret as supplied by the operator. `value` only ever lives in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretItem {
    pub id: String,
    pub value: String,
    pub namespace: String,
}

impl std::fmt::Debug for SecretItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretItem")
            .field("id", &self.id)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Fully qualified name of a stored secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretIdentifier {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub owner: String,
}

/// A secret value sealed to the vault key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub id: SecretIdentifier,
    pub encrypted_value: String,
}

/// Params of `vault_secretsCreate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSecretsRequest {
    pub request_id: String,
    pub encrypted_secrets: Vec<EncryptedSecret>,
}

/// Params of `vault_secretsUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSecretsRequest {
    pub request_id: String,
    pub encrypted_secrets: Vec<EncryptedSecret>,
}

/// Params of `vault_secretsDelete`. Order of `ids` is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSecretsRequest {
    pub request_id: String,
    pub ids: Vec<SecretIdentifier>,
}

/// Params of `vault_secretsList`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSecretIdentifiersRequest {
    pub request_id: String,
    pub owner: String,
    pub namespace: String,
}

/// Params of `vault_publicKey_get`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetPublicKeyRequest {}

/// Result of `vault_publicKey_get`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetPublicKeyResponse {
    #[serde(default, alias = "publicKey")]
    pub public_key: String,
}

/// Result envelope of the secret methods: a signed, aggregated response whose
/// `payload` holds the method-specific message.
#[derive(Debug, Deserialize)]
pub struct SignedOcrResponse {
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,
    #[serde(default)]
    pub context: Option<Box<RawValue>>,
    #[serde(default)]
    pub signatures: Option<Box<RawValue>>,
}

/// Outcome for one secret of a create, update or delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretResponse {
    #[serde(default)]
    pub id: Option<SecretIdentifier>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: String,
}

/// Decoded payload of create, update and delete responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretsResponse {
    #[serde(default)]
    pub responses: Vec<SecretResponse>,
}

/// Decoded payload of `vault_secretsList`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSecretIdentifiersResponse {
    #[serde(default)]
    pub identifiers: Vec<SecretIdentifier>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: String,
}

//! JSON-RPC 2.0 framing for the vault gateway.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// The only protocol version the gateway speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// Content type the gateway expects on POST bodies.
pub const CONTENT_TYPE: &str = "application/jsonrpc";

/// Gateway methods understood by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    SecretsCreate,
    SecretsUpdate,
    SecretsDelete,
    SecretsList,
    PublicKeyGet,
}

impl Method {
    /// Every secret-bearing method, in the order the CLI documents them.
    pub const SECRETS: [Method; 4] = [
        Method::SecretsCreate,
        Method::SecretsUpdate,
        Method::SecretsDelete,
        Method::SecretsList,
    ];

    /// Wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecretsCreate => "vault_secretsCreate",
            Self::SecretsUpdate => "vault_secretsUpdate",
            Self::SecretsDelete => "vault_secretsDelete",
            Self::SecretsList => "vault_secretsList",
            Self::PublicKeyGet => "vault_publicKey_get",
        }
    }

    /// Look up a method by wire name. Unknown names return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "vault_secretsCreate" => Some(Self::SecretsCreate),
            "vault_secretsUpdate" => Some(Self::SecretsUpdate),
            "vault_secretsDelete" => Some(Self::SecretsDelete),
            "vault_secretsList" => Some(Self::SecretsList),
            "vault_publicKey_get" => Some(Self::PublicKeyGet),
            _ => None,
        }
    }

    /// True for the four methods that can be allowlisted and bundled.
    pub fn is_secrets_method(&self) -> bool {
        !matches!(self, Self::PublicKeyGet)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A JSON-RPC request parameterized by its method-specific params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request<T> {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: T,
}

impl<T> Request<T> {
    pub fn new(id: impl Into<String>, method: Method, params: T) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.as_str().to_string(),
            params,
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "jsonrpc error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC response carrying either `result` or `error`.
///
/// Error replies may carry `"id": null`; a null `id` or `jsonrpc` reads as
/// an empty string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response<T> {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub jsonrpc: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

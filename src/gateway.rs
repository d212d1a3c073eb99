//! Vault gateway transport.
//!
//! One blocking POST per call, `Content-Type: application/jsonrpc`, fixed
//! timeout, no retries. Status handling is left to the caller.

use std::time::Duration;

use tracing::debug;
use ureq::Agent;

use crate::error::{Result, VaultError};
use crate::jsonrpc::CONTENT_TYPE;

/// Timeout for a single gateway round trip.
pub const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can deliver a JSON-RPC body to the vault gateway.
pub trait Gateway {
    /// POST `body` and return the response body and HTTP status.
    fn post(&self, body: &[u8]) -> Result<(Vec<u8>, u16)>;
}

/// [`Gateway`] over HTTP(S).
pub struct HttpGateway {
    agent: Agent,
    url: String,
}

impl HttpGateway {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, GATEWAY_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: Agent::new_with_config(config),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Gateway for HttpGateway {
    fn post(&self, body: &[u8]) -> Result<(Vec<u8>, u16)> {
        debug!(url = %self.url, bytes = body.len(), "posting to vault gateway");
        let mut resp = self
            .agent
            .post(&self.url)
            .header("Content-Type", CONTENT_TYPE)
            .send(body)
            .map_err(|e| VaultError::Gateway(format!("failed to POST to {}: {e}", self.url)))?;

        let status = resp.status().as_u16();
        let bytes = resp
            .body_mut()
            .read_to_vec()
            .map_err(|e| VaultError::Gateway(format!("failed to read response body: {e}")))?;
        debug!(status, bytes = bytes.len(), "gateway responded");
        Ok((bytes, status))
    }
}

/// Fail unless `status` is 200.
pub fn ensure_ok(status: u16, body: &[u8]) -> Result<()> {
    if status == 200 {
        return Ok(());
    }
    Err(VaultError::Gateway(format!(
        "gateway returned a non-200 status code: status_code={status}, body={}",
        String::from_utf8_lossy(body)
    )))
}

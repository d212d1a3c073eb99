//! Workflow registry access over Ethereum JSON-RPC.
//!
//! Reads go through `eth_call`. Writes are legacy EIP-155 transactions signed
//! locally with the EOA key and sent with `eth_sendRawTransaction`; the
//! registry then waits for the receipt before returning.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use ethabi::Address;
use k256::ecdsa::SigningKey;
use rlp::RlpStream;
use serde::Deserialize;
use serde_json::{json, Value};
use sha3::{Digest as _, Keccak256};
use tracing::{debug, info};
use ureq::Agent;
use zeroize::Zeroizing;

use crate::allowlist::{self, AllowlistRegistry, TxOutcome};
use crate::digest::Digest;
use crate::error::{Result, VaultError};
use crate::jsonrpc::{RpcError, JSONRPC_VERSION};

/// Gas headroom added on top of `eth_estimateGas`, in percent.
const GAS_MARGIN_PERCENT: u64 = 20;

/// The EOA key that signs allowlist transactions.
pub struct TxSigner {
    key: SigningKey,
    address: Address,
}

impl TxSigner {
    /// Load a secp256k1 private key from hex, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let raw = Zeroizing::new(
            hex::decode(s).map_err(|_| VaultError::validation("private key is not valid hex"))?,
        );
        let key = SigningKey::from_slice(&raw)
            .map_err(|_| VaultError::validation("private key is not a valid secp256k1 scalar"))?;
        let address = address_of(&key);
        Ok(Self { key, address })
    }

    /// Account address of the key.
    pub fn address(&self) -> Address {
        self.address
    }
}

impl std::fmt::Debug for TxSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxSigner")
            .field("address", &allowlist::checksum(&self.address))
            .finish_non_exhaustive()
    }
}

fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Unsigned legacy transaction fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTx {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas: u64,
    pub to: Address,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTx {
    fn rlp_fields(&self, s: &mut RlpStream) {
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas);
        s.append(&self.to.as_bytes().to_vec());
        s.append(&0u64);
        s.append(&self.data);
    }

    /// Keccak hash signed under EIP-155.
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut s = RlpStream::new_list(9);
        self.rlp_fields(&mut s);
        s.append(&self.chain_id);
        s.append(&0u64);
        s.append(&0u64);
        Keccak256::digest(&s.out()).into()
    }

    /// Sign and RLP-encode the transaction.
    pub fn sign(&self, signer: &TxSigner) -> Result<Vec<u8>> {
        let hash = self.signing_hash();
        let (sig, recid) = signer
            .key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| VaultError::Chain(format!("failed to sign transaction: {e}")))?;
        let v = self.chain_id * 2 + 35 + u64::from(recid.to_byte());
        let (r, s) = sig.split_bytes();

        let mut stream = RlpStream::new_list(9);
        self.rlp_fields(&mut stream);
        stream.append(&v);
        stream.append(&trim_leading_zeros(&r));
        stream.append(&trim_leading_zeros(&s));
        Ok(stream.out().to_vec())
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

#[derive(Debug, Deserialize)]
struct EthResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct Receipt {
    #[serde(default)]
    status: Option<String>,
}

/// [`AllowlistRegistry`] backed by an Ethereum node.
pub struct RpcRegistry {
    agent: Agent,
    rpc_url: String,
    contract: Address,
    signer: Option<TxSigner>,
    next_id: AtomicU64,
    poll_interval: Duration,
    max_polls: u32,
}

impl RpcRegistry {
    /// Registry at `contract` reachable through `rpc_url`. Without a signer
    /// the registry is read-only.
    pub fn new(rpc_url: impl Into<String>, contract: Address, signer: Option<TxSigner>) -> Self {
        Self {
            agent: Agent::new_with_defaults(),
            rpc_url: rpc_url.into(),
            contract,
            signer,
            next_id: AtomicU64::new(1),
            poll_interval: Duration::from_secs(2),
            max_polls: 90,
        }
    }

    /// Override how often and how long to wait for a receipt.
    pub fn with_receipt_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "chain rpc");

        let mut resp = self
            .agent
            .post(&self.rpc_url)
            .send_json(&body)
            .map_err(|e| VaultError::Chain(format!("{method}: {e}")))?;
        let decoded: EthResponse = resp
            .body_mut()
            .read_json()
            .map_err(|e| VaultError::Chain(format!("{method}: invalid response: {e}")))?;

        if let Some(err) = decoded.error {
            return Err(VaultError::Chain(format!("{method}: {err}")));
        }
        Ok(decoded.result.unwrap_or(Value::Null))
    }

    fn quantity(&self, method: &str, params: Value) -> Result<u128> {
        let value = self.rpc(method, params)?;
        let s = value
            .as_str()
            .ok_or_else(|| VaultError::Chain(format!("{method}: expected hex quantity")))?;
        parse_quantity(s).map_err(|e| VaultError::Chain(format!("{method}: {e}")))
    }

    fn wait_for_receipt(&self, tx_hash: &str) -> Result<()> {
        for _ in 0..self.max_polls {
            let value = self.rpc("eth_getTransactionReceipt", json!([tx_hash]))?;
            if !value.is_null() {
                let receipt: Receipt = serde_json::from_value(value)
                    .map_err(|e| VaultError::Chain(format!("invalid receipt: {e}")))?;
                return match receipt.status.as_deref() {
                    Some("0x1") | None => Ok(()),
                    Some(status) => Err(VaultError::Chain(format!(
                        "transaction {tx_hash} reverted (status {status})"
                    ))),
                };
            }
            std::thread::sleep(self.poll_interval);
        }
        Err(VaultError::Chain(format!(
            "timed out waiting for receipt of {tx_hash}"
        )))
    }
}

fn parse_quantity(s: &str) -> std::result::Result<u128, String> {
    let digits = s.strip_prefix("0x").ok_or_else(|| format!("quantity {s:?} lacks 0x prefix"))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity {s:?}: {e}"))
}

fn to_u64(v: u128, what: &str) -> Result<u64> {
    u64::try_from(v).map_err(|_| VaultError::Chain(format!("{what} out of range")))
}

fn hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

impl RpcRegistry {
    fn call_bool(&self, data: &[u8]) -> Result<bool> {
        let value = self.rpc(
            "eth_call",
            json!([{ "to": hex_data(self.contract.as_bytes()), "data": hex_data(data) }, "latest"]),
        )?;
        let s = value
            .as_str()
            .ok_or_else(|| VaultError::Chain("eth_call: expected hex data".into()))?;
        let raw = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| VaultError::Chain(format!("eth_call: invalid hex: {e}")))?;
        allowlist::decode_bool(&raw)
    }
}

impl AllowlistRegistry for RpcRegistry {
    fn is_owner_linked(&self, owner: &Address) -> Result<bool> {
        self.call_bool(&allowlist::pack_is_owner_linked(owner))
    }

    fn is_request_allowlisted(&self, owner: &Address, digest: &Digest) -> Result<bool> {
        self.call_bool(&allowlist::pack_is_request_allowlisted(owner, digest))
    }

    fn allowlist_request(&self, digest: &Digest, duration: Duration) -> Result<TxOutcome> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| VaultError::Chain("no private key configured for allowlist transaction".into()))?;

        let deadline = allowlist::deadline(Utc::now(), duration)?;
        let data = allowlist::pack_allowlist_request(digest, deadline);
        let from = hex_data(signer.address().as_bytes());
        let to = hex_data(self.contract.as_bytes());

        let chain_id = to_u64(self.quantity("eth_chainId", json!([]))?, "chain id")?;
        let nonce = to_u64(
            self.quantity("eth_getTransactionCount", json!([from, "pending"]))?,
            "nonce",
        )?;
        let gas_price = self.quantity("eth_gasPrice", json!([]))?;
        let estimate = to_u64(
            self.quantity(
                "eth_estimateGas",
                json!([{ "from": from, "to": to, "data": hex_data(&data) }]),
            )?,
            "gas estimate",
        )?;
        let gas = estimate.saturating_add(estimate * GAS_MARGIN_PERCENT / 100);

        let tx = LegacyTx {
            nonce,
            gas_price,
            gas,
            to: self.contract,
            data,
            chain_id,
        };
        let raw = tx.sign(signer)?;

        let tx_hash = self
            .rpc("eth_sendRawTransaction", json!([hex_data(&raw)]))?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| VaultError::Chain("eth_sendRawTransaction: expected tx hash".into()))?;
        info!(tx_hash = %tx_hash, deadline, "allowlist transaction sent");

        self.wait_for_receipt(&tx_hash)?;
        Ok(TxOutcome { tx_hash })
    }
}

//! # vaultgate
//!
//! Allowlist-gated secret submission to a threshold-encryption vault.
//!
//! Secret values are sealed to the vault's public key, the resulting request
//! is fingerprinted, and the fingerprint must be allowlisted on the workflow
//! registry for the owner before the request is posted to the vault gateway.
//! EOA owners allowlist in-line; multisig owners get a bundle to approve out
//! of band and replay later.
//!
//! ## Public API
//!
//! [`handler::Handler`] runs every operation. It talks to the outside world
//! only through the [`gateway::Gateway`] and [`allowlist::AllowlistRegistry`]
//! traits, with [`gateway::HttpGateway`] and [`registry::RpcRegistry`] as the
//! network implementations.

pub(crate) mod crypto;
pub mod error;
pub mod keys;
pub mod threshold;

pub mod jsonrpc;
pub mod types;
pub mod digest;

pub mod allowlist;
pub mod registry;
pub mod bundle;
pub mod gateway;
pub mod response;

pub mod inputs;
pub mod settings;
pub mod logging;
pub mod handler;

pub use error::{Result, VaultError};
pub use handler::{Handler, MsigInstructions, Outcome};

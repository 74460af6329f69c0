//! Steem capability for pyre.
//!
//! Provides:
//! - A JSON-RPC client for the condenser_api calls the agent needs
//! - Operation and transaction types in condenser wire form
//! - Signing through an external signer program
//! - [`SteemSubmitter`], the single-node [`pyre_broadcast::Submitter`]

mod client;
mod error;
mod signer;
mod submitter;
mod types;

pub use client::SteemRpc;
pub use error::{SignerError, SteemError};
pub use signer::{CommandSigner, PostingKey, TransactionSigner};
pub use submitter::{DEFAULT_EXPIRATION_SECS, SteemSubmitter};
pub use types::*;

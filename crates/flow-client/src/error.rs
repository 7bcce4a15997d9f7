//! Error types for the Flow client

use crate::types::TxId;
use std::time::Duration;
use thiserror::Error;

/// Error type for every client operation.
///
/// Nothing in this crate recovers from an error locally: each variant is handed back to the
/// caller as-is.
#[derive(Error, Debug)]
pub enum ClientError {
    /// A configuration value could not be used
    #[error("invalid configuration for `{key}`: {reason}")]
    Config { key: String, reason: String },

    /// The wallet handshake failed or was cancelled by the user
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// An operation needed an authenticated user and there was none
    #[error("no authenticated user")]
    NotAuthenticated,

    /// The access node could not be reached
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The access node answered with an error status
    #[error("access node returned {status}: {message}")]
    Node { status: u16, message: String },

    /// The script failed while executing on the network
    #[error("script execution failed: {0}")]
    ScriptFailed(String),

    /// The transaction request is malformed and was not sent
    #[error("invalid transaction request: {0}")]
    InvalidRequest(String),

    /// A signer refused or failed to produce a signature
    #[error("signing failed: {0}")]
    Signing(String),

    /// The transaction was rejected during execution
    #[error("transaction {id} failed with status code {status_code}: {message}")]
    TransactionFailed {
        id: TxId,
        status_code: u32,
        message: String,
    },

    /// The transaction expired before it could be sealed
    #[error("transaction {0} expired before sealing")]
    Expired(TxId),

    /// Waiting on a transaction took longer than allowed
    #[error("timed out after {after:?} waiting for transaction {id}")]
    Timeout { id: TxId, after: Duration },

    /// The status stream ended without a terminal result
    #[error("status stream for transaction {0} ended before a terminal state")]
    StreamClosed(TxId),

    /// A response could not be understood
    #[error("malformed response: {0}")]
    Decode(String),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    pub(crate) fn config(key: &str, reason: impl Into<String>) -> Self {
        Self::Config {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// True for failures reported by the network after a transaction id was issued.
    pub fn is_transaction_failure(&self) -> bool {
        matches!(
            self,
            Self::TransactionFailed { .. } | Self::Expired(_) | Self::Timeout { .. }
        )
    }
}

/// Result type for the Flow client
pub type Result<T> = std::result::Result<T, ClientError>;

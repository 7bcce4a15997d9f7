//! Client library for Flow applications: configuration, wallet sessions, scripts,
//! transactions and transaction status observation over the access node REST API.

pub mod access;
pub mod authz;
pub mod cadence;
pub mod client;
pub mod config;
pub mod consts;
pub mod encoding;
pub mod error;
pub mod session;
pub mod status;
pub mod subscription;
pub mod transaction;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use access::{AccessNode, Account, AccountKey, BlockHeader, RestAccessNode};
pub use authz::{RoleFlags, Roles, Signable, SignableRole, Signature, Signer};
pub use cadence::{ArgBuilder, Argument, Script};
pub use client::FlowClient;
pub use config::{ClientConfig, DiscoveryMethod, load_config_from_path};
pub use error::{ClientError, Result};
pub use session::{CurrentUser, Session, WalletProvider};
pub use status::{Event, TransactionResult, TransactionStatus, TransactionWatcher};
pub use subscription::Subscription;
pub use transaction::{SignedTransaction, TransactionPayload, TransactionRequest};
pub use types::{Address, Identifier, TxId};

//! Transport to the network's access layer.
//!
//! Every read and write goes through an [`AccessNode`]. [`RestAccessNode`] talks to the
//! public REST API; tests substitute the fake from [`crate::testing`].

use crate::cadence::Argument;
use crate::error::Result;
use crate::status::TransactionResult;
use crate::transaction::SignedTransaction;
use crate::types::{Address, Identifier, TxId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod rest;

pub use rest::RestAccessNode;

/// Header of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub id: Identifier,
    pub parent_id: Identifier,
    pub height: u64,
    pub timestamp: String,
}

/// Public key registered on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountKey {
    pub index: u32,
    pub public_key: String,
    pub signing_algorithm: String,
    pub hashing_algorithm: String,
    pub sequence_number: u64,
    pub weight: u32,
    pub revoked: bool,
}

/// On-chain account with its keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    /// Balance in the smallest unit (1e-8 FLOW)
    pub balance: u64,
    pub keys: Vec<AccountKey>,
}

impl Account {
    pub fn key(&self, index: u32) -> Option<&AccountKey> {
        self.keys.iter().find(|k| k.index == index)
    }

    /// Balance formatted as a FLOW amount with 8 decimals.
    pub fn formatted_balance(&self) -> String {
        format!("{}.{:08}", self.balance / 100_000_000, self.balance % 100_000_000)
    }
}

/// Operations the client needs from the network.
#[async_trait]
pub trait AccessNode: Send + Sync {
    /// Latest block, sealed or merely finalized.
    async fn latest_block(&self, sealed: bool) -> Result<BlockHeader>;

    /// Account state including keys.
    async fn account(&self, address: Address) -> Result<Account>;

    /// Execute a read-only script at the latest sealed block, returning the raw
    /// JSON-Cadence result.
    async fn execute_script(&self, cadence: &str, arguments: &[Argument])
    -> Result<serde_json::Value>;

    /// Submit a signed transaction. Returns as soon as the node has accepted it.
    async fn send_transaction(&self, transaction: &SignedTransaction) -> Result<TxId>;

    /// Current execution result of a transaction.
    async fn transaction_result(&self, id: TxId) -> Result<TransactionResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatted_balance() {
        let account = Account {
            address: "0x01".parse().unwrap(),
            balance: 123_456_789,
            keys: vec![],
        };
        assert_eq!(account.formatted_balance(), "1.23456789");
    }
}

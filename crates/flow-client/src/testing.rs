//! In-memory doubles for the network and the wallet.
//!
//! Compiled for this crate's tests and, behind the `testing` feature, for downstream tests.

use crate::access::{AccessNode, Account, AccountKey, BlockHeader};
use crate::authz::{Signable, Signature, Signer};
use crate::cadence::Argument;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::session::WalletProvider;
use crate::status::{TransactionResult, TransactionStatus};
use crate::transaction::SignedTransaction;
use crate::types::{Address, Identifier, TxId};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Account `0x0000000000000001`.
pub fn fake_address() -> Address {
    Address::new([0, 0, 0, 0, 0, 0, 0, 1])
}

/// Identifier whose last eight bytes are `n`.
pub fn fake_id(n: u64) -> Identifier {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&n.to_be_bytes());
    Identifier::new(bytes)
}

/// JSON-Cadence `Optional` wrapping a struct with the given fields.
pub fn cadence_struct(id: &str, fields: &[(&str, Value)]) -> Value {
    let fields: Vec<Value> = fields
        .iter()
        .map(|(name, value)| json!({"name": name, "value": value}))
        .collect();
    json!({
        "type": "Optional",
        "value": {"type": "Struct", "value": {"id": id, "fields": fields}}
    })
}

pub fn cadence_string(value: &str) -> Value {
    json!({"type": "String", "value": value})
}

pub fn cadence_nil() -> Value {
    json!({"type": "Optional", "value": null})
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Signer producing deterministic signatures and recording every request.
pub struct FakeSigner {
    address: Address,
    key_id: u32,
    requests: Mutex<Vec<Signable>>,
    refuse: Option<String>,
}

impl FakeSigner {
    pub fn new(address: Address, key_id: u32) -> Self {
        Self {
            address,
            key_id,
            requests: Mutex::new(Vec::new()),
            refuse: None,
        }
    }

    /// A signer that rejects every request.
    pub fn refusing(address: Address, reason: &str) -> Self {
        Self {
            refuse: Some(reason.to_string()),
            ..Self::new(address, 0)
        }
    }

    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<Signable> {
        lock(&self.requests).clone()
    }

    /// The signature this signer returns for `message`.
    pub fn expected_signature(&self, message: &str) -> Vec<u8> {
        let mut signature = self.address.as_bytes().to_vec();
        signature.extend_from_slice(&self.key_id.to_be_bytes());
        signature.extend_from_slice(&(message.len() as u64).to_be_bytes());
        signature
    }
}

#[async_trait]
impl Signer for FakeSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn key_id(&self) -> u32 {
        self.key_id
    }

    async fn sign(&self, signable: &Signable) -> Result<Signature> {
        lock(&self.requests).push(signable.clone());
        if let Some(reason) = &self.refuse {
            return Err(ClientError::Signing(reason.clone()));
        }
        Ok(Signature {
            address: self.address,
            key_id: self.key_id,
            signature: self.expected_signature(&signable.message),
        })
    }
}

/// Wallet that authenticates a fixed account, or declines every handshake.
pub struct FakeWallet {
    outcome: std::result::Result<Address, String>,
    signer: Option<Arc<FakeSigner>>,
    logouts: AtomicUsize,
}

impl FakeWallet {
    pub fn new(address: Address) -> Self {
        Self {
            outcome: Ok(address),
            signer: Some(Arc::new(FakeSigner::new(address, 0))),
            logouts: AtomicUsize::new(0),
        }
    }

    pub fn declining(reason: &str) -> Self {
        Self {
            outcome: Err(reason.to_string()),
            signer: None,
            logouts: AtomicUsize::new(0),
        }
    }

    /// Signer handed out for the authenticated account.
    pub fn user_signer(&self) -> Option<Arc<FakeSigner>> {
        self.signer.clone()
    }

    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletProvider for FakeWallet {
    async fn authenticate(&self, _config: &ClientConfig) -> Result<Address> {
        self.outcome
            .clone()
            .map_err(ClientError::Authentication)
    }

    async fn unauthenticate(&self) -> Result<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn signer(&self, addr: Address) -> Arc<dyn Signer> {
        match &self.signer {
            Some(signer) if signer.address() == addr => signer.clone(),
            _ => Arc::new(FakeSigner::new(addr, 0)),
        }
    }
}

/// Script invocation seen by [`FakeAccessNode`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptCall {
    pub cadence: String,
    pub arguments: Vec<Argument>,
}

/// Scripted access node.
///
/// Scripts answer from a queue (`nil` once it is empty). Every submitted transaction follows
/// the same status sequence, one entry per poll, repeating the last entry forever. Accounts
/// not registered explicitly have a single key 0 with sequence number 0. As on the network, a
/// proposal key's sequence number only advances once its transaction is observed sealed.
pub struct FakeAccessNode {
    scripts: Mutex<VecDeque<Result<Value>>>,
    script_calls: Mutex<Vec<ScriptCall>>,
    statuses: Mutex<Vec<TransactionResult>>,
    polls: Mutex<HashMap<TxId, usize>>,
    submitted: Mutex<Vec<SignedTransaction>>,
    unsealed: Mutex<HashMap<TxId, (Address, u32)>>,
    reject_with: Mutex<Option<String>>,
    accounts: Mutex<HashMap<Address, Account>>,
    next_tx: AtomicU64,
}

impl Default for FakeAccessNode {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAccessNode {
    /// A node that seals every transaction after pending and executed.
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            script_calls: Mutex::new(Vec::new()),
            statuses: Mutex::new(vec![
                TransactionResult::with_status(TransactionStatus::Pending),
                TransactionResult::with_status(TransactionStatus::Executed),
                TransactionResult::with_status(TransactionStatus::Sealed),
            ]),
            polls: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            unsealed: Mutex::new(HashMap::new()),
            reject_with: Mutex::new(None),
            accounts: Mutex::new(HashMap::new()),
            next_tx: AtomicU64::new(1),
        }
    }

    /// Queue the raw JSON-Cadence result of the next script.
    pub fn push_script_result(&self, value: Value) -> &Self {
        lock(&self.scripts).push_back(Ok(value));
        self
    }

    /// Queue a failure for the next script.
    pub fn push_script_error(&self, error: ClientError) -> &Self {
        lock(&self.scripts).push_back(Err(error));
        self
    }

    /// Status sequence reported for every transaction.
    pub fn set_statuses(&self, statuses: Vec<TransactionResult>) -> &Self {
        *lock(&self.statuses) = statuses;
        self
    }

    /// Transactions stay pending forever.
    pub fn never_seal(&self) -> &Self {
        self.set_statuses(vec![TransactionResult::with_status(TransactionStatus::Pending)])
    }

    /// Reject submissions with a node error.
    pub fn reject_submissions(&self, message: &str) -> &Self {
        *lock(&self.reject_with) = Some(message.to_string());
        self
    }

    pub fn accept_submissions(&self) -> &Self {
        *lock(&self.reject_with) = None;
        self
    }

    pub fn set_account(&self, account: Account) -> &Self {
        lock(&self.accounts).insert(account.address, account);
        self
    }

    pub fn submitted(&self) -> Vec<SignedTransaction> {
        lock(&self.submitted).clone()
    }

    pub fn script_calls(&self) -> Vec<ScriptCall> {
        lock(&self.script_calls).clone()
    }

    /// Number of status polls made for `id`.
    pub fn polls(&self, id: TxId) -> usize {
        lock(&self.polls).get(&id).copied().unwrap_or(0)
    }

    /// Advance the proposer's sequence number the first time `id` is seen sealed.
    fn seal(&self, id: TxId) {
        let Some((address, key_index)) = lock(&self.unsealed).remove(&id) else {
            return;
        };
        let mut accounts = lock(&self.accounts);
        let account = accounts
            .entry(address)
            .or_insert_with(|| Self::default_account(address));
        if let Some(key) = account.keys.iter_mut().find(|k| k.index == key_index) {
            key.sequence_number += 1;
        }
    }

    fn default_account(address: Address) -> Account {
        Account {
            address,
            balance: 100_000_000,
            keys: vec![AccountKey {
                index: 0,
                public_key: "00".repeat(64),
                signing_algorithm: "ECDSA_P256".to_string(),
                hashing_algorithm: "SHA3_256".to_string(),
                sequence_number: 0,
                weight: 1000,
                revoked: false,
            }],
        }
    }
}

#[async_trait]
impl AccessNode for FakeAccessNode {
    async fn latest_block(&self, sealed: bool) -> Result<BlockHeader> {
        let height = if sealed { 100 } else { 101 };
        Ok(BlockHeader {
            id: fake_id(height),
            parent_id: fake_id(height - 1),
            height,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
        })
    }

    async fn account(&self, address: Address) -> Result<Account> {
        Ok(lock(&self.accounts)
            .get(&address)
            .cloned()
            .unwrap_or_else(|| Self::default_account(address)))
    }

    async fn execute_script(&self, cadence: &str, arguments: &[Argument]) -> Result<Value> {
        lock(&self.script_calls).push(ScriptCall {
            cadence: cadence.to_string(),
            arguments: arguments.to_vec(),
        });
        lock(&self.scripts).pop_front().unwrap_or_else(|| Ok(cadence_nil()))
    }

    async fn send_transaction(&self, transaction: &SignedTransaction) -> Result<TxId> {
        if let Some(message) = lock(&self.reject_with).clone() {
            return Err(ClientError::Node {
                status: 400,
                message,
            });
        }
        lock(&self.submitted).push(transaction.clone());

        let id = fake_id(0x1000 + self.next_tx.fetch_add(1, Ordering::SeqCst));
        let proposal = &transaction.payload.proposal_key;
        lock(&self.unsealed).insert(id, (proposal.address, proposal.key_index));
        Ok(id)
    }

    async fn transaction_result(&self, id: TxId) -> Result<TransactionResult> {
        let poll = {
            let mut polls = lock(&self.polls);
            let count = polls.entry(id).or_insert(0);
            *count += 1;
            *count - 1
        };
        let result = {
            let statuses = lock(&self.statuses);
            statuses
                .get(poll)
                .or_else(|| statuses.last())
                .cloned()
                .unwrap_or_else(TransactionResult::unknown)
        };
        if result.status == TransactionStatus::Sealed {
            self.seal(id);
        }
        Ok(result)
    }
}

//! # Transaction submission
//!
//! Builds, signs and sends transactions. The submitter handles:
//! - Request validation before anything touches the network
//! - Contract alias resolution in the source text
//! - Proposal key lookup under a lock. The access node reports sequence numbers from sealed
//!   state, so the submitter also remembers the last number it used per proposal key and
//!   never hands out the same one twice while earlier transactions are still unsealed
//! - Payload and envelope signature collection according to [`Roles`], over the
//!   domain-tagged RLP encoding from [`crate::encoding`]
//!
//! ## Usage
//!
//! ```ignore
//! let request = TransactionRequest::new(INIT_ACCOUNT).limit(50);
//! let tx_id = client.mutate(request).await?;
//! let sealed = client.tx(tx_id).once_sealed(Duration::from_secs(60)).await?;
//! ```

use crate::access::AccessNode;
use crate::authz::{Roles, Signable, SignableRole, Signature, Signer};
use crate::cadence::{ArgBuilder, Argument};
use crate::config::ClientConfig;
use crate::consts::DEFAULT_COMPUTE_LIMIT;
use crate::error::{ClientError, Result};
use crate::encoding::{envelope_message, payload_message};
use crate::types::{Address, Identifier, TxId};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A state-changing transaction to submit.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    cadence: String,
    arguments: Vec<Argument>,
    roles: Option<Roles>,
    compute_limit: u64,
}

impl TransactionRequest {
    pub fn new(cadence: impl Into<String>) -> Self {
        Self {
            cadence: cadence.into(),
            arguments: Vec::new(),
            roles: None,
            compute_limit: DEFAULT_COMPUTE_LIMIT,
        }
    }

    /// Build the argument list from local values.
    pub fn args<F>(mut self, build: F) -> Self
    where
        F: FnOnce(ArgBuilder) -> Vec<Argument>,
    {
        self.arguments = build(ArgBuilder);
        self
    }

    /// Assign proposer, payer and authorizers. Without this the current user fills all three.
    pub fn roles(mut self, roles: Roles) -> Self {
        self.roles = Some(roles);
        self
    }

    /// Computation limit ceiling.
    pub fn limit(mut self, compute_limit: u64) -> Self {
        self.compute_limit = compute_limit;
        self
    }

    pub fn cadence(&self) -> &str {
        &self.cadence
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn compute_limit(&self) -> u64 {
        self.compute_limit
    }

    pub(crate) fn take_roles(&mut self) -> Option<Roles> {
        self.roles.take()
    }
}

/// Key whose sequence number orders the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalKey {
    pub address: Address,
    pub key_index: u32,
    pub sequence_number: u64,
}

/// Everything the proposer and authorizers sign.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionPayload {
    pub script: String,
    /// JSON-Cadence encoded arguments
    pub arguments: Vec<Value>,
    pub reference_block_id: Identifier,
    pub compute_limit: u64,
    pub proposal_key: ProposalKey,
    pub payer: Address,
    pub authorizers: Vec<Address>,
}

/// A fully signed transaction ready to send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignedTransaction {
    pub payload: TransactionPayload,
    pub payload_signatures: Vec<Signature>,
    pub envelope_signatures: Vec<Signature>,
}

/// Last sequence number handed out per proposal key `(address, key index)`.
pub(crate) type SequenceLedger = HashMap<(Address, u32), u64>;

#[derive(Clone)]
pub(crate) struct TransactionSubmitter {
    tx_lock: Arc<Mutex<SequenceLedger>>,
}

impl TransactionSubmitter {
    pub(crate) fn new(tx_lock: Arc<Mutex<SequenceLedger>>) -> Self {
        Self { tx_lock }
    }

    pub(crate) async fn submit<N: AccessNode + ?Sized>(
        &self,
        node: &N,
        config: &ClientConfig,
        request: TransactionRequest,
        roles: Roles,
    ) -> Result<TxId> {
        if request.cadence.trim().is_empty() {
            return Err(ClientError::InvalidRequest(
                "transaction source is empty".to_string(),
            ));
        }
        if request.compute_limit == 0 {
            return Err(ClientError::InvalidRequest(
                "compute limit must be greater than zero".to_string(),
            ));
        }

        let script = config.resolve_imports(&request.cadence);
        let reference = node.latest_block(true).await?;

        // Hold the lock from reading the sequence number until the node has the transaction
        let mut ledger = self.tx_lock.lock().await;

        let proposer = &roles.proposer;
        let account = node.account(proposer.address()).await?;
        let key = account.key(proposer.key_id()).ok_or_else(|| {
            ClientError::InvalidRequest(format!(
                "account {} has no key with index {}",
                proposer.address(),
                proposer.key_id()
            ))
        })?;
        if key.revoked {
            return Err(ClientError::InvalidRequest(format!(
                "key {} of account {} is revoked",
                key.index,
                proposer.address()
            )));
        }

        let ledger_key = (proposer.address(), key.index);
        let sequence_number = match ledger.get(&ledger_key) {
            Some(last) => key.sequence_number.max(last + 1),
            None => key.sequence_number,
        };

        let payload = TransactionPayload {
            script,
            arguments: request.arguments.iter().map(Argument::to_json).collect(),
            reference_block_id: reference.id,
            compute_limit: request.compute_limit,
            proposal_key: ProposalKey {
                address: proposer.address(),
                key_index: key.index,
                sequence_number,
            },
            payer: roles.payer.address(),
            authorizers: roles.authorizers.iter().map(|s| s.address()).collect(),
        };

        let payload_voucher = serde_json::to_value(&payload)?;
        let message = payload_message(&payload)?;
        let mut payload_signatures = Vec::new();
        for signer in roles.payload_signers() {
            let signature = collect_signature(
                signer.as_ref(),
                &roles,
                SignableRole::Payload,
                &message,
                &payload_voucher,
            )
            .await?;
            payload_signatures.push(signature);
        }

        let envelope_voucher = json!({
            "payload": payload_voucher,
            "payload_signatures": payload_signatures,
        });
        let message = envelope_message(&payload, &payload_signatures)?;
        let envelope_signature = collect_signature(
            roles.payer.as_ref(),
            &roles,
            SignableRole::Envelope,
            &message,
            &envelope_voucher,
        )
        .await?;

        let transaction = SignedTransaction {
            payload,
            payload_signatures,
            envelope_signatures: vec![envelope_signature],
        };
        let tx_id = node.send_transaction(&transaction).await?;
        ledger.insert(ledger_key, sequence_number);

        info!(
            tx_id = %tx_id,
            proposer = %transaction.payload.proposal_key.address,
            sequence_number = transaction.payload.proposal_key.sequence_number,
            payer = %transaction.payload.payer,
            authorizers = transaction.payload.authorizers.len(),
            compute_limit = transaction.payload.compute_limit,
            "Transaction submitted"
        );
        Ok(tx_id)
    }
}

async fn collect_signature(
    signer: &dyn Signer,
    roles: &Roles,
    role: SignableRole,
    message: &[u8],
    voucher: &Value,
) -> Result<Signature> {
    let signable = Signable {
        address: signer.address(),
        key_id: signer.key_id(),
        role,
        roles: roles.flags_for(signer.address(), signer.key_id()),
        message: hex::encode(message),
        voucher: voucher.clone(),
    };

    debug!(address = %signable.address, key_id = signable.key_id, ?role, "Requesting signature");
    let signature = signer.sign(&signable).await?;
    if signature.address != signable.address || signature.key_id != signable.key_id {
        return Err(ClientError::Signing(format!(
            "signer for {} key {} returned a signature for {} key {}",
            signable.address, signable.key_id, signature.address, signature.key_id
        )));
    }
    Ok(signature)
}

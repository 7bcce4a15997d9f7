//! Signing capabilities and transaction roles.
//!
//! Key management and the actual cryptography live outside this crate. A [`Signer`] is
//! anything that can turn a [`Signable`] into a [`Signature`] for one account key: a wallet
//! session, a remote signing service, or a test double.

use crate::error::Result;
use crate::types::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use std::fmt;
use std::sync::Arc;

/// Which part of the transaction is being signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignableRole {
    /// Proposer and authorizers sign the payload
    Payload,
    /// The payer signs the payload together with the payload signatures
    Envelope,
}

/// Roles the signing account plays in the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleFlags {
    pub proposer: bool,
    pub payer: bool,
    pub authorizer: bool,
}

/// Request handed to a signer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signable {
    pub address: Address,
    pub key_id: u32,
    pub role: SignableRole,
    pub roles: RoleFlags,
    /// Hex of the domain-tagged RLP encoding the signature must cover
    pub message: String,
    /// Readable form of what is being signed, for display only
    pub voucher: serde_json::Value,
}

/// Signature produced by one account key.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub address: Address,
    pub key_id: u32,
    #[serde_as(as = "Hex")]
    pub signature: Vec<u8>,
}

/// A signing capability for one account key.
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    fn key_id(&self) -> u32;

    async fn sign(&self, signable: &Signable) -> Result<Signature>;
}

/// Who proposes, pays for and authorizes a transaction.
///
/// The common case is one user in all three roles ([`Roles::single`]); each role can be
/// reassigned independently.
#[derive(Clone)]
pub struct Roles {
    pub proposer: Arc<dyn Signer>,
    pub payer: Arc<dyn Signer>,
    pub authorizers: Vec<Arc<dyn Signer>>,
}

impl Roles {
    pub fn single(signer: Arc<dyn Signer>) -> Self {
        Self {
            proposer: signer.clone(),
            payer: signer.clone(),
            authorizers: vec![signer],
        }
    }

    pub fn with_proposer(mut self, proposer: Arc<dyn Signer>) -> Self {
        self.proposer = proposer;
        self
    }

    pub fn with_payer(mut self, payer: Arc<dyn Signer>) -> Self {
        self.payer = payer;
        self
    }

    pub fn with_authorizers(mut self, authorizers: Vec<Arc<dyn Signer>>) -> Self {
        self.authorizers = authorizers;
        self
    }

    /// Roles held by the given account key.
    pub fn flags_for(&self, address: Address, key_id: u32) -> RoleFlags {
        let same = |s: &Arc<dyn Signer>| s.address() == address && s.key_id() == key_id;
        RoleFlags {
            proposer: same(&self.proposer),
            payer: same(&self.payer),
            authorizer: self.authorizers.iter().any(same),
        }
    }

    /// Signers of the payload: proposer and authorizers, minus the payer's account, each
    /// account key once.
    pub fn payload_signers(&self) -> Vec<Arc<dyn Signer>> {
        let payer = self.payer.address();
        let mut seen: Vec<(Address, u32)> = Vec::new();
        let mut signers = Vec::new();
        for signer in std::iter::once(&self.proposer).chain(self.authorizers.iter()) {
            let key = (signer.address(), signer.key_id());
            if key.0 == payer || seen.contains(&key) {
                continue;
            }
            seen.push(key);
            signers.push(signer.clone());
        }
        signers
    }
}

impl fmt::Debug for Roles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let authorizers: Vec<String> = self
            .authorizers
            .iter()
            .map(|s| s.address().to_string())
            .collect();
        f.debug_struct("Roles")
            .field("proposer", &self.proposer.address().to_string())
            .field("payer", &self.payer.address().to_string())
            .field("authorizers", &authorizers)
            .finish()
    }
}

//! Canonical transaction encoding.
//!
//! Flow nodes verify signatures against the RLP encoding of the transaction, prefixed with a
//! domain tag:
//!
//! ```text
//! payload  = [script, [arg...], reference_block_id, compute_limit,
//!             proposer, proposer_key, sequence_number, payer, [authorizer...]]
//! envelope = [payload, [[signer_index, key_id, signature]...]]
//! message  = "FLOW-V0.0-transaction" (right-padded to 32 bytes) || rlp(...)
//! ```
//!
//! `signer_index` is the position of the signature's account in the signer list: proposer,
//! payer, then authorizers, each account once in order of first appearance.

use crate::authz::Signature;
use crate::error::{ClientError, Result};
use crate::transaction::TransactionPayload;
use crate::types::Address;
use alloy_rlp::{BufMut, Encodable, Header};
use serde_json::Value;

/// `FLOW-V0.0-transaction`, right-padded with zeros to 32 bytes.
pub const TRANSACTION_DOMAIN_TAG: [u8; 32] = domain_tag(b"FLOW-V0.0-transaction");

const fn domain_tag(tag: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut i = 0;
    while i < tag.len() {
        out[i] = tag[i];
        i += 1;
    }
    out
}

/// Bytes of one JSON-Cadence argument, as signed and as sent to the access node.
pub fn argument_bytes(argument: &Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(argument)?)
}

enum Item {
    Bytes(Vec<u8>),
    Uint(u64),
    List(Vec<Item>),
}

impl Item {
    fn payload_length(items: &[Item]) -> usize {
        items.iter().map(|item| item.length()).sum()
    }
}

impl Encodable for Item {
    fn encode(&self, out: &mut dyn BufMut) {
        match self {
            Item::Bytes(bytes) => bytes.as_slice().encode(out),
            Item::Uint(n) => n.encode(out),
            Item::List(items) => {
                Header {
                    list: true,
                    payload_length: Self::payload_length(items),
                }
                .encode(out);
                for item in items {
                    item.encode(out);
                }
            }
        }
    }

    fn length(&self) -> usize {
        match self {
            Item::Bytes(bytes) => bytes.as_slice().length(),
            Item::Uint(n) => n.length(),
            Item::List(items) => {
                let payload_length = Self::payload_length(items);
                alloy_rlp::length_of_length(payload_length) + payload_length
            }
        }
    }
}

fn address(addr: &Address) -> Item {
    Item::Bytes(addr.as_bytes().to_vec())
}

fn payload_item(payload: &TransactionPayload) -> Result<Item> {
    let arguments = payload
        .arguments
        .iter()
        .map(|a| argument_bytes(a).map(Item::Bytes))
        .collect::<Result<Vec<_>>>()?;
    Ok(Item::List(vec![
        Item::Bytes(payload.script.as_bytes().to_vec()),
        Item::List(arguments),
        Item::Bytes(payload.reference_block_id.as_bytes().to_vec()),
        Item::Uint(payload.compute_limit),
        address(&payload.proposal_key.address),
        Item::Uint(payload.proposal_key.key_index.into()),
        Item::Uint(payload.proposal_key.sequence_number),
        address(&payload.payer),
        Item::List(payload.authorizers.iter().map(address).collect()),
    ]))
}

/// Accounts that sign the transaction, in signer-index order.
pub fn signer_list(payload: &TransactionPayload) -> Vec<Address> {
    let mut signers = Vec::new();
    let candidates = [payload.proposal_key.address, payload.payer]
        .into_iter()
        .chain(payload.authorizers.iter().copied());
    for addr in candidates {
        if !signers.contains(&addr) {
            signers.push(addr);
        }
    }
    signers
}

fn signatures_item(payload: &TransactionPayload, signatures: &[Signature]) -> Result<Item> {
    let signers = signer_list(payload);
    let mut indexed = signatures
        .iter()
        .map(|sig| {
            let index = signers
                .iter()
                .position(|a| *a == sig.address)
                .ok_or_else(|| {
                    ClientError::Signing(format!(
                        "{} signed but plays no role in the transaction",
                        sig.address
                    ))
                })?;
            Ok((index as u64, sig))
        })
        .collect::<Result<Vec<_>>>()?;
    indexed.sort_by_key(|(index, sig)| (*index, sig.key_id));

    Ok(Item::List(
        indexed
            .into_iter()
            .map(|(index, sig)| {
                Item::List(vec![
                    Item::Uint(index),
                    Item::Uint(sig.key_id.into()),
                    Item::Bytes(sig.signature.clone()),
                ])
            })
            .collect(),
    ))
}

fn encode(item: &Item) -> Vec<u8> {
    let mut out = Vec::with_capacity(item.length());
    item.encode(&mut out);
    out
}

fn tagged(rlp: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(TRANSACTION_DOMAIN_TAG.len() + rlp.len());
    out.extend_from_slice(&TRANSACTION_DOMAIN_TAG);
    out.extend_from_slice(&rlp);
    out
}

/// RLP encoding of the payload, without domain tag.
pub fn payload_rlp(payload: &TransactionPayload) -> Result<Vec<u8>> {
    Ok(encode(&payload_item(payload)?))
}

/// RLP encoding of the envelope, without domain tag.
pub fn envelope_rlp(
    payload: &TransactionPayload,
    payload_signatures: &[Signature],
) -> Result<Vec<u8>> {
    let envelope = Item::List(vec![
        payload_item(payload)?,
        signatures_item(payload, payload_signatures)?,
    ]);
    Ok(encode(&envelope))
}

/// Bytes proposers and authorizers sign.
pub fn payload_message(payload: &TransactionPayload) -> Result<Vec<u8>> {
    Ok(tagged(payload_rlp(payload)?))
}

/// Bytes the payer signs.
pub fn envelope_message(
    payload: &TransactionPayload,
    payload_signatures: &[Signature],
) -> Result<Vec<u8>> {
    Ok(tagged(envelope_rlp(payload, payload_signatures)?))
}

//! Access node client for the Flow REST API (`/v1`).
//!
//! 64-bit numbers travel as decimal strings, binary fields as base64 and addresses as hex
//! without prefix. The DTOs below mirror that wire shape and are converted into the crate's
//! own types at the boundary.

use super::{AccessNode, Account, AccountKey, BlockHeader};
use crate::authz::Signature;
use crate::cadence::{self, Argument};
use crate::config::ClientConfig;
use crate::consts::{ACCESS_NODE_API, HTTP_TIMEOUT_SECS};
use crate::encoding::argument_bytes;
use crate::error::{ClientError, Result};
use crate::status::{Event, TransactionResult};
use crate::transaction::SignedTransaction;
use crate::types::{Address, Identifier, TxId};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client as HttpClient, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DisplayFromStr, serde_as};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ErrorDto {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct BlockDto {
    header: BlockHeaderDto,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct BlockHeaderDto {
    id: Identifier,
    parent_id: Identifier,
    #[serde_as(as = "DisplayFromStr")]
    height: u64,
    timestamp: String,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct AccountDto {
    address: Address,
    #[serde_as(as = "DisplayFromStr")]
    balance: u64,
    #[serde(default)]
    keys: Vec<AccountKeyDto>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct AccountKeyDto {
    #[serde_as(as = "DisplayFromStr")]
    index: u32,
    public_key: String,
    signing_algorithm: String,
    hashing_algorithm: String,
    #[serde_as(as = "DisplayFromStr")]
    sequence_number: u64,
    #[serde_as(as = "DisplayFromStr")]
    weight: u32,
    #[serde(default)]
    revoked: bool,
}

#[derive(Debug, Serialize)]
struct ScriptDto {
    script: String,
    arguments: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ProposalKeyDto {
    address: String,
    key_index: String,
    sequence_number: String,
}

#[derive(Debug, Serialize)]
struct SignatureDto {
    address: String,
    key_index: String,
    signature: String,
}

#[derive(Debug, Serialize)]
struct TransactionDto {
    script: String,
    arguments: Vec<String>,
    reference_block_id: String,
    gas_limit: String,
    payer: String,
    proposal_key: ProposalKeyDto,
    authorizers: Vec<String>,
    payload_signatures: Vec<SignatureDto>,
    envelope_signatures: Vec<SignatureDto>,
}

#[derive(Debug, Deserialize)]
struct TransactionIdDto {
    id: TxId,
}

#[derive(Debug, Deserialize)]
struct TransactionResultDto {
    #[serde(default)]
    block_id: String,
    status: String,
    #[serde(default)]
    status_code: u32,
    #[serde(default)]
    error_message: String,
    #[serde(default)]
    computation_used: Option<String>,
    #[serde(default)]
    events: Vec<EventDto>,
}

#[derive(Debug, Deserialize)]
struct EventDto {
    #[serde(rename = "type")]
    event_type: String,
    transaction_id: TxId,
    transaction_index: String,
    event_index: String,
    payload: String,
}

impl From<&Signature> for SignatureDto {
    fn from(sig: &Signature) -> Self {
        Self {
            address: sig.address.sans_prefix(),
            key_index: sig.key_id.to_string(),
            signature: BASE64.encode(&sig.signature),
        }
    }
}

impl TryFrom<&SignedTransaction> for TransactionDto {
    type Error = ClientError;

    fn try_from(tx: &SignedTransaction) -> Result<Self> {
        let payload = &tx.payload;
        Ok(Self {
            script: BASE64.encode(payload.script.as_bytes()),
            arguments: payload
                .arguments
                .iter()
                .map(encode_json_base64)
                .collect::<Result<_>>()?,
            reference_block_id: payload.reference_block_id.to_string(),
            gas_limit: payload.compute_limit.to_string(),
            payer: payload.payer.sans_prefix(),
            proposal_key: ProposalKeyDto {
                address: payload.proposal_key.address.sans_prefix(),
                key_index: payload.proposal_key.key_index.to_string(),
                sequence_number: payload.proposal_key.sequence_number.to_string(),
            },
            authorizers: payload.authorizers.iter().map(Address::sans_prefix).collect(),
            payload_signatures: tx.payload_signatures.iter().map(SignatureDto::from).collect(),
            envelope_signatures: tx.envelope_signatures.iter().map(SignatureDto::from).collect(),
        })
    }
}

impl TryFrom<TransactionResultDto> for TransactionResult {
    type Error = ClientError;

    fn try_from(dto: TransactionResultDto) -> Result<Self> {
        let block_id = if dto.block_id.is_empty() {
            None
        } else {
            Some(
                dto.block_id
                    .parse()
                    .map_err(|e| ClientError::Decode(format!("block_id: {e}")))?,
            )
        };
        let computation_used = match dto.computation_used.as_deref() {
            None | Some("") => 0,
            Some(raw) => parse_number(raw, "computation_used")?,
        };
        let events = dto
            .events
            .into_iter()
            .map(|e| {
                Ok(Event {
                    payload: cadence::decode(&decode_json_base64(&e.payload)?)?,
                    event_type: e.event_type,
                    transaction_id: e.transaction_id,
                    transaction_index: parse_number(&e.transaction_index, "transaction_index")?,
                    event_index: parse_number(&e.event_index, "event_index")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TransactionResult {
            status: dto.status.parse()?,
            status_code: dto.status_code,
            error_message: dto.error_message,
            block_id,
            computation_used,
            events,
        })
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, field: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ClientError::Decode(format!("{field} `{raw}`: {e}")))
}

fn encode_json_base64(value: &Value) -> Result<String> {
    Ok(BASE64.encode(argument_bytes(value)?))
}

fn decode_json_base64(raw: &str) -> Result<Value> {
    let bytes = BASE64
        .decode(raw.trim())
        .map_err(|e| ClientError::Decode(format!("invalid base64: {e}")))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// [`AccessNode`] backed by the REST API of a Flow access node.
#[derive(Debug, Clone)]
pub struct RestAccessNode {
    base_url: String,
    http: HttpClient,
}

impl RestAccessNode {
    /// Create a client for the configured `accessNode.api`. The URL itself is only checked
    /// when the first request is made.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = config.access_node_api()?.trim_end_matches('/').to_string();
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ClientError::config(ACCESS_NODE_API, format!("`{}`: {e}", self.base_url)))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        debug!(%url, "GET");
        let response = self.http.get(url).send().await?;
        Self::read_json(response).await
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let (status, message) = Self::read_error(response).await;
            return Err(ClientError::Node {
                status: status.as_u16(),
                message,
            });
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn read_error(response: Response) -> (StatusCode, String) {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorDto>(&text)
            .map(|e| e.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or(text);
        (status, message)
    }
}

#[async_trait]
impl AccessNode for RestAccessNode {
    async fn latest_block(&self, sealed: bool) -> Result<BlockHeader> {
        let height = if sealed { "sealed" } else { "final" };
        let blocks: Vec<BlockDto> = self.get_json(&format!("/v1/blocks?height={height}")).await?;
        let block = blocks
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Decode("empty block list".to_string()))?;
        Ok(BlockHeader {
            id: block.header.id,
            parent_id: block.header.parent_id,
            height: block.header.height,
            timestamp: block.header.timestamp,
        })
    }

    async fn account(&self, address: Address) -> Result<Account> {
        let dto: AccountDto = self
            .get_json(&format!("/v1/accounts/{}?expand=keys", address.sans_prefix()))
            .await?;
        Ok(Account {
            address: dto.address,
            balance: dto.balance,
            keys: dto
                .keys
                .into_iter()
                .map(|k| AccountKey {
                    index: k.index,
                    public_key: k.public_key,
                    signing_algorithm: k.signing_algorithm,
                    hashing_algorithm: k.hashing_algorithm,
                    sequence_number: k.sequence_number,
                    weight: k.weight,
                    revoked: k.revoked,
                })
                .collect(),
        })
    }

    async fn execute_script(&self, cadence: &str, arguments: &[Argument]) -> Result<Value> {
        let body = ScriptDto {
            script: BASE64.encode(cadence.as_bytes()),
            arguments: arguments
                .iter()
                .map(|a| encode_json_base64(&a.to_json()))
                .collect::<Result<_>>()?,
        };
        let url = self.url("/v1/scripts?block_height=sealed")?;
        debug!(%url, arguments = arguments.len(), "POST script");
        let response = self.http.post(url).json(&body).send().await?;

        if response.status() == StatusCode::BAD_REQUEST {
            let (_, message) = Self::read_error(response).await;
            return Err(ClientError::ScriptFailed(message));
        }
        let encoded: String = Self::read_json(response).await?;
        decode_json_base64(&encoded)
    }

    async fn send_transaction(&self, transaction: &SignedTransaction) -> Result<TxId> {
        let body = TransactionDto::try_from(transaction)?;
        let url = self.url("/v1/transactions")?;
        debug!(%url, "POST transaction");
        let response = self.http.post(url).json(&body).send().await?;
        let created: TransactionIdDto = Self::read_json(response).await?;
        Ok(created.id)
    }

    async fn transaction_result(&self, id: TxId) -> Result<TransactionResult> {
        let url = self.url(&format!("/v1/transaction_results/{id}"))?;
        let response = self.http.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            // Not indexed yet right after submission
            return Ok(TransactionResult::unknown());
        }
        let dto: TransactionResultDto = Self::read_json(response).await?;
        dto.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::TransactionStatus;
    use crate::testing::fake_id;
    use crate::transaction::{ProposalKey, TransactionPayload};
    use httpmock::prelude::*;
    use serde_json::json;

    fn node_for(server: &MockServer) -> RestAccessNode {
        let config = ClientConfig::new().with(ACCESS_NODE_API, format!("{}/", server.base_url()));
        RestAccessNode::new(&config).unwrap()
    }

    fn b64(value: &Value) -> String {
        BASE64.encode(serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn test_missing_access_node_is_config_error() {
        let err = RestAccessNode::new(&ClientConfig::new()).unwrap_err();
        assert!(matches!(err, ClientError::Config { ref key, .. } if key == ACCESS_NODE_API));
    }

    #[tokio::test]
    async fn test_latest_block() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/blocks").query_param("height", "sealed");
                then.status(200).json_body(json!([{
                    "header": {
                        "id": fake_id(7).to_string(),
                        "parent_id": fake_id(6).to_string(),
                        "height": "7",
                        "timestamp": "2024-01-01T00:00:00Z"
                    }
                }]));
            })
            .await;

        let block = node_for(&server).latest_block(true).await.unwrap();
        mock.assert_async().await;
        assert_eq!(block.id, fake_id(7));
        assert_eq!(block.height, 7);
    }

    #[tokio::test]
    async fn test_account_with_keys() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/accounts/0000000000000001")
                    .query_param("expand", "keys");
                then.status(200).json_body(json!({
                    "address": "0000000000000001",
                    "balance": "150000000",
                    "keys": [{
                        "index": "0",
                        "public_key": "abcd",
                        "signing_algorithm": "ECDSA_P256",
                        "hashing_algorithm": "SHA3_256",
                        "sequence_number": "42",
                        "weight": "1000",
                        "revoked": false
                    }]
                }));
            })
            .await;

        let account = node_for(&server)
            .account("0x01".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(account.formatted_balance(), "1.50000000");
        assert_eq!(account.key(0).unwrap().sequence_number, 42);
    }

    #[tokio::test]
    async fn test_execute_script_decodes_base64_result() {
        let server = MockServer::start_async().await;
        let result = json!({"type": "Optional", "value": {"type": "String", "value": "Alice"}});
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/scripts")
                    .query_param("block_height", "sealed");
                then.status(200).json_body(json!(b64(&result)));
            })
            .await;

        let value = node_for(&server)
            .execute_script("pub fun main(): String? { return \"Alice\" }", &[])
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(value, result);
    }

    #[tokio::test]
    async fn test_script_rejection_maps_to_script_failed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/scripts");
                then.status(400)
                    .json_body(json!({"code": 400, "message": "cannot find type `Profile`"}));
            })
            .await;

        let err = node_for(&server)
            .execute_script("pub fun main() {}", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ScriptFailed(ref m) if m == "cannot find type `Profile`"));
    }

    #[tokio::test]
    async fn test_send_transaction() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/transactions");
                then.status(201).json_body(json!({"id": fake_id(9).to_string()}));
            })
            .await;

        let addr: Address = "0x01".parse().unwrap();
        let tx = SignedTransaction {
            payload: TransactionPayload {
                script: "transaction {}".to_string(),
                arguments: vec![],
                reference_block_id: fake_id(1),
                compute_limit: 100,
                proposal_key: ProposalKey {
                    address: addr,
                    key_index: 0,
                    sequence_number: 3,
                },
                payer: addr,
                authorizers: vec![addr],
            },
            payload_signatures: vec![],
            envelope_signatures: vec![Signature {
                address: addr,
                key_id: 0,
                signature: vec![1, 2, 3],
            }],
        };

        let body = serde_json::to_value(TransactionDto::try_from(&tx).unwrap()).unwrap();
        assert_eq!(body["gas_limit"], "100");
        assert_eq!(body["payer"], "0000000000000001");
        assert_eq!(body["proposal_key"]["sequence_number"], "3");
        assert_eq!(body["envelope_signatures"][0]["signature"], "AQID");
        assert_eq!(body["script"], BASE64.encode("transaction {}"));

        let id = node_for(&server).send_transaction(&tx).await.unwrap();
        mock.assert_async().await;
        assert_eq!(id, fake_id(9));
    }

    #[tokio::test]
    async fn test_transaction_result() {
        let server = MockServer::start_async().await;
        let event = json!({"type": "Event", "value": {
            "id": "A.01.ArtWalk.Minted",
            "fields": [{"name": "id", "value": {"type": "UInt64", "value": "5"}}]
        }});
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(format!("/v1/transaction_results/{}", fake_id(9)));
                then.status(200).json_body(json!({
                    "block_id": fake_id(2).to_string(),
                    "status": "Sealed",
                    "status_code": 0,
                    "error_message": "",
                    "computation_used": "12",
                    "events": [{
                        "type": "A.01.ArtWalk.Minted",
                        "transaction_id": fake_id(9).to_string(),
                        "transaction_index": "0",
                        "event_index": "1",
                        "payload": b64(&event)
                    }]
                }));
            })
            .await;

        let result = node_for(&server).transaction_result(fake_id(9)).await.unwrap();
        assert_eq!(result.status, TransactionStatus::Sealed);
        assert_eq!(result.block_id, Some(fake_id(2)));
        assert_eq!(result.computation_used, 12);
        assert_eq!(result.events[0].payload, json!({"id": "5"}));
    }

    #[tokio::test]
    async fn test_unindexed_transaction_is_unknown() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(format!("/v1/transaction_results/{}", fake_id(9)));
                then.status(404).json_body(json!({"code": 404, "message": "not found"}));
            })
            .await;

        let result = node_for(&server).transaction_result(fake_id(9)).await.unwrap();
        assert_eq!(result.status, TransactionStatus::Unknown);
        assert_eq!(result.block_id, None);
    }

    #[tokio::test]
    async fn test_node_error_keeps_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/blocks");
                then.status(503).body("upstream unavailable");
            })
            .await;

        let err = node_for(&server).latest_block(false).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Node { status: 503, ref message } if message == "upstream unavailable"
        ));
    }
}

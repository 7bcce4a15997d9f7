use crate::args::AppConfig;
use async_trait::async_trait;
use flow_client::{
    Account, Address, ClientConfig, ClientError, Signable, Signature, Signer, WalletProvider,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use term_table::row::Row;
use term_table::table_cell::{Alignment as CellAlignment, TableCell};
use term_table::{Table, TableStyle};
use tracing::{debug, info};

/// Timeout for a single signing request; a human may have to approve it
const SIGNING_TIMEOUT: Duration = Duration::from_secs(120);

/// Wallet that logs in as the account given on the command line and signs through a remote
/// signing service.
pub struct ConfiguredWallet {
    account: Option<Address>,
    key_id: u32,
    signer_url: Option<String>,
    http: reqwest::Client,
}

impl ConfiguredWallet {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(SIGNING_TIMEOUT).build()?;
        Ok(Self {
            account: config.account,
            key_id: config.key_id,
            signer_url: config.signer_url.clone(),
            http,
        })
    }
}

#[async_trait]
impl WalletProvider for ConfiguredWallet {
    async fn authenticate(&self, config: &ClientConfig) -> flow_client::Result<Address> {
        let account = self.account.ok_or_else(|| {
            ClientError::Authentication(
                "no account configured, pass --account or set FLOW_ACCOUNT".to_string(),
            )
        })?;
        info!(address = %account, app = config.app_title(), "Using configured account");
        Ok(account)
    }

    fn signer(&self, addr: Address) -> Arc<dyn Signer> {
        Arc::new(RemoteSigner {
            address: addr,
            key_id: self.key_id,
            url: self.signer_url.clone(),
            http: self.http.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignerResponse {
    addr: Address,
    key_id: u32,
    /// Hex encoded
    signature: String,
}

/// Signs by POSTing the [`Signable`] to a signing service that answers with
/// `{"addr", "keyId", "signature"}`.
pub struct RemoteSigner {
    address: Address,
    key_id: u32,
    url: Option<String>,
    http: reqwest::Client,
}

impl RemoteSigner {
    async fn request(&self, url: &str, signable: &Signable) -> Result<SignerResponse, String> {
        let response = self
            .http
            .post(url)
            .json(signable)
            .send()
            .await
            .map_err(|e| format!("signing service unreachable: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("signing service returned {status}: {body}"));
        }
        response
            .json()
            .await
            .map_err(|e| format!("malformed signing response: {e}"))
    }
}

#[async_trait]
impl Signer for RemoteSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn key_id(&self) -> u32 {
        self.key_id
    }

    async fn sign(&self, signable: &Signable) -> flow_client::Result<Signature> {
        let url = self.url.as_deref().ok_or_else(|| {
            ClientError::Signing("no signer configured, pass --signer-url".to_string())
        })?;
        debug!(address = %self.address, key_id = self.key_id, role = ?signable.role, "Requesting remote signature");

        let response = self
            .request(url, signable)
            .await
            .map_err(ClientError::Signing)?;
        let signature = hex::decode(response.signature.trim_start_matches("0x"))
            .map_err(|e| ClientError::Signing(format!("signature is not hex: {e}")))?;
        Ok(Signature {
            address: response.addr,
            key_id: response.key_id,
            signature,
        })
    }
}

/// Account summary banner for the `account` command.
pub fn render_account_summary(account: &Account, access_node: &str) -> String {
    let mut table = Table::new();
    table.style = TableStyle::extended();

    table.add_row(Row::new(vec![
        TableCell::builder("Flow Account")
            .col_span(2)
            .alignment(CellAlignment::Center)
            .build(),
    ]));

    let mut field = |label: &str, value: String| {
        table.add_row(Row::new(vec![
            TableCell::builder(label)
                .alignment(CellAlignment::Right)
                .build(),
            TableCell::builder(value)
                .alignment(CellAlignment::Left)
                .build(),
        ]));
    };
    field("Address", account.address.to_string());
    field("Balance", format!("{} FLOW", account.formatted_balance()));
    for key in &account.keys {
        let state = if key.revoked { "revoked" } else { "active" };
        field(
            &format!("Key {}", key.index),
            format!(
                "weight {} | seq {} | {} | {}",
                key.weight, key.sequence_number, key.signing_algorithm, state
            ),
        );
    }
    field("Access Node", access_node.to_owned());

    table.render()
}

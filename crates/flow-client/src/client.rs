use crate::access::{AccessNode, Account, BlockHeader, RestAccessNode};
use crate::authz::Roles;
use crate::cadence::{self, Script};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::session::{CurrentUser, WalletProvider};
use crate::status::TransactionWatcher;
use crate::transaction::{SequenceLedger, TransactionRequest, TransactionSubmitter};
use crate::types::{Address, TxId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// High-level entry point bundling configuration, the access node and the current user.
///
/// Cloning is cheap and every clone shares the same session and transaction lock.
pub struct FlowClient<N: AccessNode + ?Sized = RestAccessNode> {
    config: Arc<ClientConfig>,
    node: Arc<N>,
    current_user: CurrentUser,
    submitter: TransactionSubmitter,
}

impl<N: AccessNode + ?Sized> Clone for FlowClient<N> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            node: self.node.clone(),
            current_user: self.current_user.clone(),
            submitter: self.submitter.clone(),
        }
    }
}

impl FlowClient<RestAccessNode> {
    /// Connect to the access node named by `accessNode.api`.
    pub fn connect(config: ClientConfig, wallet: Arc<dyn WalletProvider>) -> Result<Self> {
        let node = RestAccessNode::new(&config)?;
        Ok(Self::new(config, Arc::new(node), wallet))
    }
}

impl<N: AccessNode + ?Sized + 'static> FlowClient<N> {
    pub fn new(config: ClientConfig, node: Arc<N>, wallet: Arc<dyn WalletProvider>) -> Self {
        let config = Arc::new(config);
        let tx_lock = Arc::new(Mutex::new(SequenceLedger::new()));
        Self {
            current_user: CurrentUser::new(config.clone(), wallet),
            submitter: TransactionSubmitter::new(tx_lock),
            config,
            node,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn node(&self) -> &Arc<N> {
        &self.node
    }

    pub fn current_user(&self) -> &CurrentUser {
        &self.current_user
    }

    /// Run a read-only script against the latest sealed state.
    ///
    /// Returns `None` when the script produced no value (`nil` or `Void`). Script failures are
    /// returned as they come from the node.
    pub async fn query(&self, script: Script) -> Result<Option<Value>> {
        let cadence = self.config.resolve_imports(&script.cadence);
        debug!(arguments = script.arguments.len(), "Executing script");
        let raw = self.node.execute_script(&cadence, &script.arguments).await?;
        match cadence::decode(&raw)? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    /// [`FlowClient::query`] deserialized into `T`.
    pub async fn query_as<T: DeserializeOwned>(&self, script: Script) -> Result<Option<T>> {
        match self.query(script).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Sign and submit a transaction, returning its id once the node has accepted it.
    ///
    /// Roles not set on the request default to the current user, which then must be logged in.
    pub async fn mutate(&self, mut request: TransactionRequest) -> Result<TxId> {
        let roles = match request.take_roles() {
            Some(roles) => roles,
            None => Roles::single(self.current_user.authorization()?),
        };
        self.submitter
            .submit(self.node.as_ref(), &self.config, request, roles)
            .await
    }

    /// Observe a submitted transaction using the configured poll interval and deadline.
    pub fn tx(&self, id: TxId) -> Result<TransactionWatcher<N>> {
        Ok(TransactionWatcher::new(
            self.node.clone(),
            id,
            self.config.poll_interval()?,
            self.config.seal_timeout()?,
        ))
    }

    pub async fn latest_block(&self, sealed: bool) -> Result<BlockHeader> {
        self.node.latest_block(sealed).await
    }

    pub async fn account(&self, address: Address) -> Result<Account> {
        self.node.account(address).await
    }

    /// Account of the logged-in user.
    pub async fn current_account(&self) -> Result<Account> {
        let addr = self
            .current_user
            .snapshot()
            .addr()
            .ok_or(ClientError::NotAuthenticated)?;
        self.account(addr).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::Signer;
    use crate::status::{TransactionResult, TransactionStatus};
    use crate::testing::{
        FakeAccessNode, FakeSigner, FakeWallet, cadence_nil, cadence_string, cadence_struct,
        fake_address,
    };
    use std::time::Duration;
    use tokio::sync::mpsc;

    const PROFILE: &str = "0xba1132bc08f82fe2";

    fn setup(wallet: FakeWallet) -> (FlowClient<FakeAccessNode>, Arc<FakeAccessNode>) {
        let config = ClientConfig::testnet()
            .with("tx.pollIntervalMs", "5")
            .with("0xProfile", PROFILE);
        let node = Arc::new(FakeAccessNode::new());
        (FlowClient::new(config, node.clone(), Arc::new(wallet)), node)
    }

    async fn logged_in() -> (FlowClient<FakeAccessNode>, Arc<FakeAccessNode>) {
        let (client, node) = setup(FakeWallet::new(fake_address()));
        client.current_user().authenticate().await.unwrap();
        (client, node)
    }

    fn signer(addr: &str, key_id: u32) -> Arc<FakeSigner> {
        Arc::new(FakeSigner::new(addr.parse().unwrap(), key_id))
    }

    #[tokio::test]
    async fn test_query_nil_is_none() {
        let (client, node) = setup(FakeWallet::new(fake_address()));
        node.push_script_result(cadence_nil());

        let result = client
            .query(Script::new("pub fun main(): String? { return nil }"))
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_query_resolves_aliases_and_decodes() {
        let (client, node) = setup(FakeWallet::new(fake_address()));
        node.push_script_result(cadence_struct(
            "A.ba1132bc08f82fe2.Profile.ReadOnly",
            &[("name", cadence_string("Alice"))],
        ));

        #[derive(serde::Deserialize)]
        struct Profile {
            name: String,
        }

        let script = Script::new("import Profile from 0xProfile\npub fun main(a: Address) {}")
            .args(|t| vec![t.address(fake_address())]);
        let profile: Profile = client.query_as(script).await.unwrap().unwrap();
        assert_eq!(profile.name, "Alice");

        let calls = node.script_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].cadence.contains(&format!("import Profile from {PROFILE}")));
        assert!(!calls[0].cadence.contains("0xProfile"));
    }

    #[tokio::test]
    async fn test_script_failure_is_returned_unchanged() {
        let (client, node) = setup(FakeWallet::new(fake_address()));
        node.push_script_error(ClientError::ScriptFailed("cannot find declaration".into()));

        let err = client.query(Script::new("pub fun main() {}")).await.unwrap_err();
        assert!(matches!(err, ClientError::ScriptFailed(ref m) if m == "cannot find declaration"));
    }

    #[tokio::test]
    async fn test_mutate_requires_login() {
        let (client, node) = setup(FakeWallet::new(fake_address()));

        let err = client
            .mutate(TransactionRequest::new("transaction {}"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotAuthenticated));
        assert!(node.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_mutate_rejects_invalid_request() {
        let (client, node) = logged_in().await;

        let err = client.mutate(TransactionRequest::new("  ")).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
        let err = client
            .mutate(TransactionRequest::new("transaction {}").limit(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
        assert!(node.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_single_user_signs_envelope_only() {
        let (client, node) = logged_in().await;

        client
            .mutate(TransactionRequest::new("import Profile from 0xProfile\ntransaction {}").limit(50))
            .await
            .unwrap();
        client
            .mutate(TransactionRequest::new("transaction {}"))
            .await
            .unwrap();

        let submitted = node.submitted();
        assert_eq!(submitted.len(), 2);
        let first = &submitted[0];
        assert!(first.payload.script.contains(PROFILE));
        assert_eq!(first.payload.compute_limit, 50);
        assert_eq!(first.payload.payer, fake_address());
        assert_eq!(first.payload.authorizers, vec![fake_address()]);
        assert!(first.payload_signatures.is_empty());
        assert_eq!(first.envelope_signatures.len(), 1);
        assert_eq!(first.envelope_signatures[0].address, fake_address());

        // The second submission does not reuse the unsealed first one's number
        assert_eq!(first.payload.proposal_key.sequence_number, 0);
        assert_eq!(submitted[1].payload.proposal_key.sequence_number, 1);
    }

    #[tokio::test]
    async fn test_distinct_roles_collect_all_signatures() {
        let (client, node) = setup(FakeWallet::new(fake_address()));
        let proposer = signer("0x01", 0);
        let payer = signer("0x02", 0);
        let authorizer = signer("0x03", 1);

        let roles = Roles::single(proposer.clone())
            .with_payer(payer.clone())
            .with_authorizers(vec![proposer.clone() as Arc<dyn Signer>, authorizer.clone()]);
        client
            .mutate(TransactionRequest::new("transaction {}").roles(roles))
            .await
            .unwrap();

        let tx = &node.submitted()[0];
        let payload_signers: Vec<_> = tx
            .payload_signatures
            .iter()
            .map(|s| (s.address, s.key_id))
            .collect();
        assert_eq!(
            payload_signers,
            vec![(proposer.address(), 0), (authorizer.address(), 1)]
        );
        assert_eq!(tx.envelope_signatures.len(), 1);
        assert_eq!(tx.envelope_signatures[0].address, payer.address());

        let payer_request = &payer.requests()[0];
        assert_eq!(payer_request.role, crate::authz::SignableRole::Envelope);
        assert!(payer_request.roles.payer);
        assert!(!payer_request.roles.proposer);
        assert_eq!(
            tx.envelope_signatures[0].signature,
            payer.expected_signature(&payer_request.message)
        );

        // Signers are asked for the encoded payload and envelope, not a JSON rendering
        assert_eq!(
            authorizer.requests()[0].message,
            hex::encode(crate::encoding::payload_message(&tx.payload).unwrap())
        );
        assert_eq!(
            payer_request.message,
            hex::encode(
                crate::encoding::envelope_message(&tx.payload, &tx.payload_signatures).unwrap()
            )
        );
    }

    #[tokio::test]
    async fn test_unsealed_submissions_get_distinct_sequence_numbers() {
        let (client, node) = logged_in().await;
        let request = TransactionRequest::new("transaction {}");

        // Nothing sealed yet: the node keeps reporting 0 for both
        let first = client.mutate(request.clone()).await.unwrap();
        let second = client.mutate(request.clone()).await.unwrap();
        let account = client.current_account().await.unwrap();
        assert_eq!(account.key(0).unwrap().sequence_number, 0);

        for id in [first, second] {
            client
                .tx(id)
                .unwrap()
                .once_sealed(Duration::from_secs(5))
                .await
                .unwrap();
        }
        let account = client.current_account().await.unwrap();
        assert_eq!(account.key(0).unwrap().sequence_number, 2);
        client.mutate(request).await.unwrap();

        let seqs: Vec<u64> = node
            .submitted()
            .iter()
            .map(|tx| tx.payload.proposal_key.sequence_number)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_node_sequence_number_wins_when_ahead() {
        let (client, node) = logged_in().await;
        client
            .mutate(TransactionRequest::new("transaction {}"))
            .await
            .unwrap();

        let mut account = client.current_account().await.unwrap();
        account.keys[0].sequence_number = 10;
        node.set_account(account);
        client
            .mutate(TransactionRequest::new("transaction {}"))
            .await
            .unwrap();

        assert_eq!(node.submitted()[1].payload.proposal_key.sequence_number, 10);
    }

    #[tokio::test]
    async fn test_rejected_submission_does_not_consume_sequence_number() {
        let (client, node) = logged_in().await;
        node.reject_submissions("node overloaded");
        assert!(
            client
                .mutate(TransactionRequest::new("transaction {}"))
                .await
                .is_err()
        );

        node.accept_submissions();
        client
            .mutate(TransactionRequest::new("transaction {}"))
            .await
            .unwrap();
        assert_eq!(node.submitted()[0].payload.proposal_key.sequence_number, 0);
    }

    #[tokio::test]
    async fn test_signing_failure_prevents_submission() {
        let (client, node) = setup(FakeWallet::new(fake_address()));
        let refusing: Arc<dyn Signer> =
            Arc::new(FakeSigner::refusing(fake_address(), "user rejected"));

        let err = client
            .mutate(TransactionRequest::new("transaction {}").roles(Roles::single(refusing)))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Signing(ref m) if m == "user rejected"));
        assert!(node.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_submission_surfaces_node_error() {
        let (client, node) = logged_in().await;
        node.reject_submissions("invalid proposal key");

        let err = client
            .mutate(TransactionRequest::new("transaction {}"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Node { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_once_sealed_returns_sealed_result() {
        let (client, _node) = logged_in().await;
        let id = client
            .mutate(TransactionRequest::new("transaction {}"))
            .await
            .unwrap();

        let result = client
            .tx(id)
            .unwrap()
            .once_sealed(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.status, TransactionStatus::Sealed);
    }

    #[tokio::test]
    async fn test_once_sealed_reports_execution_failure() {
        let (client, node) = logged_in().await;
        let mut failed = TransactionResult::with_status(TransactionStatus::Executed);
        failed.status_code = 1;
        failed.error_message = "pre-condition failed".to_string();
        node.set_statuses(vec![
            TransactionResult::with_status(TransactionStatus::Pending),
            failed,
        ]);

        let id = client
            .mutate(TransactionRequest::new("transaction {}"))
            .await
            .unwrap();
        let err = client
            .tx(id)
            .unwrap()
            .once_sealed(Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::TransactionFailed { status_code: 1, .. }));
    }

    #[tokio::test]
    async fn test_once_sealed_reports_expiry() {
        let (client, node) = logged_in().await;
        node.set_statuses(vec![TransactionResult::with_status(TransactionStatus::Expired)]);

        let id = client
            .mutate(TransactionRequest::new("transaction {}"))
            .await
            .unwrap();
        let err = client
            .tx(id)
            .unwrap()
            .once_sealed(Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Expired(e) if e == id));
    }

    #[tokio::test]
    async fn test_once_sealed_times_out() {
        let (client, node) = logged_in().await;
        node.never_seal();

        let id = client
            .mutate(TransactionRequest::new("transaction {}"))
            .await
            .unwrap();
        let err = client
            .tx(id)
            .unwrap()
            .once_sealed(Duration::from_millis(60))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout { id: e, .. } if e == id));
        assert!(node.polls(id) > 1);
    }

    #[tokio::test]
    async fn test_subscribe_delivers_ordered_updates() {
        let (client, _node) = logged_in().await;
        let id = client
            .mutate(TransactionRequest::new("transaction {}"))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = client.tx(id).unwrap().subscribe(move |update| {
            let _ = tx.send(update.map(|r| r.status));
        });

        let mut seen = Vec::new();
        while let Some(update) = rx.recv().await {
            seen.push(update.unwrap());
        }
        assert_eq!(
            seen,
            vec![
                TransactionStatus::Pending,
                TransactionStatus::Executed,
                TransactionStatus::Sealed
            ]
        );
    }

    #[tokio::test]
    async fn test_updates_stream_respects_deadline() {
        use futures_util::StreamExt;

        let (client, node) = logged_in().await;
        node.never_seal();
        let id = client
            .mutate(TransactionRequest::new("transaction {}"))
            .await
            .unwrap();

        let watcher = TransactionWatcher::new(
            client.node().clone(),
            id,
            Duration::from_millis(5),
            Duration::from_millis(40),
        );
        let updates: Vec<_> = watcher.updates().collect().await;
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].as_ref().unwrap().status, TransactionStatus::Pending);
        assert!(matches!(updates[1], Err(ClientError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_current_account_needs_session() {
        let (client, _node) = setup(FakeWallet::new(fake_address()));
        assert!(matches!(
            client.current_account().await,
            Err(ClientError::NotAuthenticated)
        ));
        client.current_user().authenticate().await.unwrap();
        let account = client.current_account().await.unwrap();
        assert_eq!(account.address, fake_address());
    }
}

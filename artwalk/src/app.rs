//! View model of the terminal UI.
//!
//! Every flow starts from [`App::perform`] and runs on its own task, so the event loop never
//! waits on the wallet or the network. Results come back as [`AppEvent`]s through one channel,
//! whether they come from a flow or from the session subscription, and [`App::apply`] is the
//! only place view state changes.

use crate::templates::{INIT_ACCOUNT, INIT_ACCOUNT_LIMIT, MINT_ARTWALK, READ_PROFILE};
use flow_client::{
    AccessNode, ClientError, FlowClient, RestAccessNode, Script, Session, Subscription,
    TransactionRequest, TransactionStatus, TxId,
};
use futures_util::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Shown as the profile name before the first query
pub const NAME_PLACEHOLDER: &str = "--";
/// Shown when the query found no profile
pub const NO_PROFILE: &str = "No Profile";

/// A user-triggered flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    LogIn,
    SignUp,
    SendQuery,
    InitAccount,
    Mint,
    LogOut,
}

impl Action {
    /// Actions offered for a session. Anything but a confirmed login counts as logged out.
    pub fn available(session: &Session) -> &'static [Action] {
        if session.is_logged_in() {
            &[
                Action::SendQuery,
                Action::InitAccount,
                Action::Mint,
                Action::LogOut,
            ]
        } else {
            &[Action::LogIn, Action::SignUp]
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::LogIn => "Log In",
            Action::SignUp => "Sign Up",
            Action::SendQuery => "Send Query",
            Action::InitAccount => "Init Account",
            Action::Mint => "Mint",
            Action::LogOut => "Log Out",
        }
    }

    /// Shortcut key.
    pub fn key(&self) -> char {
        match self {
            Action::LogIn => 'l',
            Action::SignUp => 's',
            Action::SendQuery => 'p',
            Action::InitAccount => 'i',
            Action::Mint => 'm',
            Action::LogOut => 'o',
        }
    }
}

/// Outcome of a flow, applied to the view state in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Session(Session),
    Profile(Option<String>),
    Submitted { action: Action, id: TxId },
    Status { id: TxId, status: TransactionStatus },
    Failed { action: Action, message: String },
}

/// Parameters of the mint transaction.
#[derive(Debug, Clone)]
pub struct MintParams {
    pub template_id: u32,
    pub amount: String,
    pub compute_limit: u64,
}

impl Default for MintParams {
    fn default() -> Self {
        Self {
            template_id: 1,
            amount: "1.0".to_string(),
            compute_limit: flow_client::consts::DEFAULT_COMPUTE_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub mint: MintParams,
    pub seal_timeout: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            mint: MintParams::default(),
            seal_timeout: Duration::from_secs(flow_client::consts::DEFAULT_SEAL_TIMEOUT_SECS),
        }
    }
}

/// What the screen shows.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub session: Session,
    pub profile_name: String,
    pub last_tx: Option<TxId>,
    pub last_status: Option<TransactionStatus>,
    pub status_message: String,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            session: Session::unknown(),
            profile_name: NAME_PLACEHOLDER.to_string(),
            last_tx: None,
            last_status: None,
            status_message: "Connecting to wallet...".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Profile {
    name: String,
}

pub struct App<N: AccessNode + ?Sized + 'static = RestAccessNode> {
    client: FlowClient<N>,
    options: AppOptions,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
    session_sub: Option<Subscription>,
    flows: Vec<JoinHandle<()>>,
    state: ViewState,
}

impl<N: AccessNode + ?Sized + 'static> App<N> {
    pub fn new(client: FlowClient<N>, options: AppOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            client,
            options,
            events_tx,
            events_rx,
            session_sub: None,
            flows: Vec::new(),
            state: ViewState::default(),
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn client(&self) -> &FlowClient<N> {
        &self.client
    }

    pub fn actions(&self) -> &'static [Action] {
        Action::available(&self.state.session)
    }

    /// Follow the current user. Safe to call again; the previous subscription is released.
    pub fn start(&mut self) {
        let events = self.events_tx.clone();
        self.session_sub = Some(self.client.current_user().subscribe(move |session| {
            let _ = events.send(AppEvent::Session(session));
        }));
    }

    /// Release the session subscription and abort every flow still running.
    pub fn shutdown(&mut self) {
        if let Some(sub) = self.session_sub.take() {
            sub.unsubscribe();
        }
        for flow in self.flows.drain(..) {
            flow.abort();
        }
    }

    /// Start one flow in the background. Actions not offered in the current session are
    /// ignored. The outcome arrives later as [`AppEvent`]s.
    pub fn perform(&mut self, action: Action) {
        if !self.actions().contains(&action) {
            warn!(?action, "Action not available in current session");
            return;
        }
        self.state.status_message = format!("{}...", action.label());

        let client = self.client.clone();
        let options = self.options.clone();
        let events = self.events_tx.clone();
        let flow = tokio::spawn(async move {
            if let Err(e) = run_flow(&client, &options, action, &events).await {
                warn!(?action, error = %e, "Action failed");
                let _ = events.send(AppEvent::Failed {
                    action,
                    message: e.to_string(),
                });
            }
        });
        self.flows.retain(|f| !f.is_finished());
        self.flows.push(flow);
    }

    /// Flows that have not finished yet.
    #[cfg(test)]
    pub fn running(&self) -> usize {
        self.flows.iter().filter(|f| !f.is_finished()).count()
    }

    /// Apply every event that has already arrived. Returns true if anything changed.
    pub fn drain(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
            changed = true;
        }
        changed
    }

    /// Wait for the next event and apply it.
    #[cfg(test)]
    pub async fn next_event(&mut self) -> Option<AppEvent> {
        let event = self.events_rx.recv().await?;
        self.apply(event.clone());
        Some(event)
    }

    pub fn apply(&mut self, event: AppEvent) {
        let state = &mut self.state;
        match event {
            AppEvent::Session(session) => {
                state.status_message = match session.addr() {
                    Some(addr) => format!("Logged in as {addr}"),
                    None if session.logged_in().is_some() => "Logged out".to_string(),
                    None => state.status_message.clone(),
                };
                if !session.is_logged_in() {
                    state.profile_name = NAME_PLACEHOLDER.to_string();
                }
                state.session = session;
            }
            AppEvent::Profile(name) => {
                state.profile_name = name.unwrap_or_else(|| NO_PROFILE.to_string());
                state.status_message = "Profile loaded".to_string();
            }
            AppEvent::Submitted { action, id } => {
                info!(?action, tx_id = %id, "Transaction submitted");
                state.last_tx = Some(id);
                state.last_status = None;
                state.status_message = format!("{} submitted: {}", action.label(), id.short());
            }
            AppEvent::Status { id, status } => {
                if state.last_tx == Some(id) {
                    state.last_status = Some(status);
                }
                state.status_message = format!("Transaction {} is {status}", id.short());
            }
            AppEvent::Failed { action, message } => {
                state.status_message = format!("{} failed: {message}", action.label());
            }
        }
    }
}

async fn run_flow<N: AccessNode + ?Sized + 'static>(
    client: &FlowClient<N>,
    options: &AppOptions,
    action: Action,
    events: &mpsc::UnboundedSender<AppEvent>,
) -> flow_client::Result<()> {
    let emit = |event| {
        let _ = events.send(event);
    };
    let user = client.current_user();
    match action {
        Action::LogIn => {
            user.authenticate().await?;
        }
        Action::SignUp => {
            user.sign_up().await?;
        }
        Action::LogOut => {
            user.unauthenticate().await?;
        }
        Action::SendQuery => {
            let addr = user.snapshot().addr().ok_or(ClientError::NotAuthenticated)?;
            let script = Script::new(READ_PROFILE).args(|t| vec![t.address(addr)]);
            let profile: Option<Profile> = client.query_as(script).await?;
            emit(AppEvent::Profile(profile.map(|p| p.name)));
        }
        Action::InitAccount => {
            let request = TransactionRequest::new(INIT_ACCOUNT).limit(INIT_ACCOUNT_LIMIT);
            let id = client.mutate(request).await?;
            emit(AppEvent::Submitted { action, id });

            let result = client.tx(id)?.once_sealed(options.seal_timeout).await?;
            emit(AppEvent::Status {
                id,
                status: result.status,
            });
        }
        Action::Mint => {
            let mint = &options.mint;
            let template_id = mint.template_id;
            let amount = mint.amount.clone();
            let request = TransactionRequest::new(MINT_ARTWALK)
                .args(|t| vec![t.uint32(template_id), t.ufix64(amount)])
                .limit(mint.compute_limit);
            let id = client.mutate(request).await?;
            emit(AppEvent::Submitted { action, id });

            let mut updates = client.tx(id)?.updates();
            while let Some(update) = updates.next().await {
                let result = update?;
                if let Some(err) = result.failure(id) {
                    return Err(err);
                }
                emit(AppEvent::Status {
                    id,
                    status: result.status,
                });
            }
        }
    }
    Ok(())
}

impl<N: AccessNode + ?Sized + 'static> Drop for App<N> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flow_client::testing::{
        FakeAccessNode, FakeSigner, FakeWallet, cadence_nil, cadence_string, cadence_struct,
        fake_address,
    };
    use flow_client::{Address, ClientConfig, Signer, TransactionResult, WalletProvider};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn app(wallet: FakeWallet) -> (App<FakeAccessNode>, Arc<FakeAccessNode>) {
        let config = ClientConfig::testnet()
            .with("tx.pollIntervalMs", "5")
            .with("0xProfile", "0xba1132bc08f82fe2");
        let node = Arc::new(FakeAccessNode::new());
        let client = FlowClient::new(config, node.clone(), Arc::new(wallet));
        let options = AppOptions {
            seal_timeout: Duration::from_secs(5),
            ..AppOptions::default()
        };
        (App::new(client, options), node)
    }

    /// Apply events until `done` holds for the view state.
    async fn settle<N, F>(app: &mut App<N>, done: F)
    where
        N: AccessNode + ?Sized + 'static,
        F: Fn(&ViewState) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done(app.state()) {
                app.next_event().await;
            }
        })
        .await
        .expect("view state did not settle");
    }

    #[tokio::test]
    async fn test_end_to_end_flow() {
        let (mut app, node) = app(FakeWallet::new(fake_address()));
        app.start();
        settle(&mut app, |s| s.session == Session::unknown()).await;
        assert_eq!(app.actions(), &[Action::LogIn, Action::SignUp]);

        app.perform(Action::LogIn);
        settle(&mut app, |s| s.session.is_logged_in()).await;
        assert_eq!(app.state().session.addr(), Some(fake_address()));
        assert_eq!(
            app.actions(),
            &[
                Action::SendQuery,
                Action::InitAccount,
                Action::Mint,
                Action::LogOut
            ]
        );
        assert_eq!(app.state().profile_name, NAME_PLACEHOLDER);

        node.push_script_result(cadence_struct(
            "A.ba1132bc08f82fe2.Profile.ReadOnly",
            &[
                ("name", cadence_string("Alice")),
                ("color", cadence_string("#232323")),
            ],
        ));
        app.perform(Action::SendQuery);
        settle(&mut app, |s| s.profile_name == "Alice").await;

        app.perform(Action::Mint);
        settle(&mut app, |s| s.last_status == Some(TransactionStatus::Sealed)).await;
        assert_eq!(app.state().last_status.unwrap().to_string(), "SEALED");

        let minted = &node.submitted()[0];
        assert_eq!(minted.payload.arguments.len(), 2);
        assert_eq!(minted.payload.arguments[0]["type"], "UInt32");

        app.perform(Action::LogOut);
        settle(&mut app, |s| s.session == Session::anonymous()).await;
        assert_eq!(app.actions(), &[Action::LogIn, Action::SignUp]);
        assert_eq!(app.state().profile_name, NAME_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_missing_profile() {
        let (mut app, node) = app(FakeWallet::new(fake_address()));
        app.start();
        app.perform(Action::LogIn);
        settle(&mut app, |s| s.session.is_logged_in()).await;

        node.push_script_result(cadence_nil());
        app.perform(Action::SendQuery);
        settle(&mut app, |s| s.profile_name != NAME_PLACEHOLDER).await;
        assert_eq!(app.state().profile_name, NO_PROFILE);
    }

    #[tokio::test]
    async fn test_query_error_is_reported() {
        let (mut app, node) = app(FakeWallet::new(fake_address()));
        app.start();
        app.perform(Action::LogIn);
        settle(&mut app, |s| s.session.is_logged_in()).await;

        node.push_script_error(ClientError::ScriptFailed("cannot find declaration".into()));
        app.perform(Action::SendQuery);
        settle(&mut app, |s| s.status_message.contains("failed")).await;
        assert_eq!(app.state().profile_name, NAME_PLACEHOLDER);
        assert!(app.state().status_message.contains("cannot find declaration"));
    }

    #[tokio::test]
    async fn test_init_account_waits_for_seal() {
        let (mut app, node) = app(FakeWallet::new(fake_address()));
        app.start();
        app.perform(Action::LogIn);
        settle(&mut app, |s| s.session.is_logged_in()).await;

        app.perform(Action::InitAccount);
        settle(&mut app, |s| s.last_status == Some(TransactionStatus::Sealed)).await;
        assert_eq!(node.submitted()[0].payload.compute_limit, INIT_ACCOUNT_LIMIT);
    }

    #[tokio::test]
    async fn test_expired_mint_is_a_failure() {
        let (mut app, node) = app(FakeWallet::new(fake_address()));
        node.set_statuses(vec![
            TransactionResult::with_status(TransactionStatus::Pending),
            TransactionResult::with_status(TransactionStatus::Expired),
        ]);
        app.start();
        app.perform(Action::LogIn);
        settle(&mut app, |s| s.session.is_logged_in()).await;

        app.perform(Action::Mint);
        settle(&mut app, |s| s.status_message.starts_with("Mint failed")).await;
        assert_ne!(app.state().last_status, Some(TransactionStatus::Sealed));
    }

    #[tokio::test]
    async fn test_declined_login_stays_logged_out() {
        let (mut app, _node) = app(FakeWallet::declining("user cancelled"));
        app.start();
        app.perform(Action::LogIn);
        settle(&mut app, |s| s.status_message.contains("user cancelled")).await;
        assert!(!app.state().session.is_logged_in());
        assert_eq!(app.actions(), &[Action::LogIn, Action::SignUp]);
    }

    #[tokio::test]
    async fn test_unavailable_action_is_ignored() {
        let (mut app, node) = app(FakeWallet::new(fake_address()));
        app.start();
        app.perform(Action::Mint);
        assert_eq!(app.running(), 0);
        assert!(node.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_waiting_for_seal() {
        let (mut app, node) = app(FakeWallet::new(fake_address()));
        node.never_seal();
        app.start();
        app.perform(Action::LogIn);
        settle(&mut app, |s| s.session.is_logged_in()).await;

        app.perform(Action::InitAccount);
        settle(&mut app, |s| s.last_tx.is_some()).await;
        let id = app.state().last_tx.unwrap();
        assert_eq!(app.running(), 1);

        app.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let polls = node.polls(id);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(node.polls(id), polls);
    }

    /// Wallet whose handshake never completes, flagging when it is cancelled.
    struct StalledWallet {
        cancelled: Arc<AtomicBool>,
    }

    struct FlagOnDrop(Arc<AtomicBool>);

    impl Drop for FlagOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl WalletProvider for StalledWallet {
        async fn authenticate(&self, _config: &ClientConfig) -> flow_client::Result<Address> {
            let _flag = FlagOnDrop(self.cancelled.clone());
            std::future::pending().await
        }

        fn signer(&self, addr: Address) -> Arc<dyn Signer> {
            Arc::new(FakeSigner::new(addr, 0))
        }
    }

    #[tokio::test]
    async fn test_perform_does_not_wait_for_wallet() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let wallet = StalledWallet {
            cancelled: cancelled.clone(),
        };
        let client = FlowClient::new(
            ClientConfig::testnet(),
            Arc::new(FakeAccessNode::new()),
            Arc::new(wallet),
        );
        let mut app = App::new(client, AppOptions::default());
        app.start();
        settle(&mut app, |s| s.session == Session::unknown()).await;

        // Returns while the handshake is still pending
        app.perform(Action::LogIn);
        assert_eq!(app.state().status_message, "Log In...");
        tokio::time::sleep(Duration::from_millis(20)).await;
        app.drain();
        assert_eq!(app.running(), 1);
        assert!(!app.state().session.is_logged_in());

        app.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cancelled.load(Ordering::SeqCst));
    }
}

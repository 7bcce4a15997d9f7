//! Wallet authentication state.
//!
//! The wallet handshake itself is performed by a [`WalletProvider`]; this module only keeps
//! the resulting [`Session`] and publishes every change to subscribers.

use crate::authz::Signer;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::subscription::Subscription;
use crate::types::Address;
use async_trait::async_trait;
use futures_util::stream;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Snapshot of the authentication state.
///
/// The address is present exactly when `logged_in` is `Some(true)`; the constructors are the
/// only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    logged_in: Option<bool>,
    addr: Option<Address>,
}

impl Session {
    /// State before the wallet has reported anything.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn anonymous() -> Self {
        Self {
            logged_in: Some(false),
            addr: None,
        }
    }

    pub fn authenticated(addr: Address) -> Self {
        Self {
            logged_in: Some(true),
            addr: Some(addr),
        }
    }

    pub fn logged_in(&self) -> Option<bool> {
        self.logged_in
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in == Some(true)
    }

    pub fn addr(&self) -> Option<Address> {
        self.addr
    }
}

/// Performs the wallet handshake and hands out signing capabilities.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Authenticate a user, returning their account address.
    async fn authenticate(&self, config: &ClientConfig) -> Result<Address>;

    /// Create an account and authenticate with it.
    async fn sign_up(&self, config: &ClientConfig) -> Result<Address> {
        self.authenticate(config).await
    }

    /// End the wallet session.
    async fn unauthenticate(&self) -> Result<()> {
        Ok(())
    }

    /// Signer acting for the authenticated account.
    fn signer(&self, addr: Address) -> Arc<dyn Signer>;
}

struct Inner {
    state: watch::Sender<Session>,
    wallet: Arc<dyn WalletProvider>,
    config: Arc<ClientConfig>,
}

/// The authenticated user, shared by every clone.
#[derive(Clone)]
pub struct CurrentUser {
    inner: Arc<Inner>,
}

impl CurrentUser {
    pub fn new(config: Arc<ClientConfig>, wallet: Arc<dyn WalletProvider>) -> Self {
        let (state, _) = watch::channel(Session::unknown());
        Self {
            inner: Arc::new(Inner {
                state,
                wallet,
                config,
            }),
        }
    }

    /// Current session.
    pub fn snapshot(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// Invoke `callback` with the current session now and with every replacement after.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(Session) + Send + 'static,
    {
        let rx = self.inner.state.subscribe();
        let sessions = stream::unfold((rx, true), |(mut rx, first)| async move {
            if !first {
                rx.changed().await.ok()?;
            }
            let session = rx.borrow_and_update().clone();
            Some((session, (rx, false)))
        });
        Subscription::spawn("current_user", sessions, callback)
    }

    /// Log in through the wallet.
    pub async fn authenticate(&self) -> Result<Session> {
        let result = self.inner.wallet.authenticate(&self.inner.config).await;
        self.finish_handshake("authenticate", result)
    }

    /// Sign up through the wallet.
    pub async fn sign_up(&self) -> Result<Session> {
        let result = self.inner.wallet.sign_up(&self.inner.config).await;
        self.finish_handshake("sign_up", result)
    }

    /// Log out. The local session is cleared even if the wallet reports an error.
    pub async fn unauthenticate(&self) -> Result<()> {
        let result = self.inner.wallet.unauthenticate().await;
        self.replace(Session::anonymous());
        info!("Logged out");
        result
    }

    /// Signing capability of the logged-in user.
    pub fn authorization(&self) -> Result<Arc<dyn Signer>> {
        match self.snapshot().addr() {
            Some(addr) => Ok(self.inner.wallet.signer(addr)),
            None => Err(ClientError::NotAuthenticated),
        }
    }

    fn finish_handshake(&self, step: &str, result: Result<Address>) -> Result<Session> {
        match result {
            Ok(addr) => {
                let session = Session::authenticated(addr);
                self.replace(session.clone());
                info!(address = %addr, step, "Wallet authenticated");
                Ok(session)
            }
            Err(e) => {
                if !self.snapshot().is_logged_in() {
                    self.replace(Session::anonymous());
                }
                warn!(error = %e, step, "Wallet authentication failed");
                match e {
                    ClientError::Authentication(_) => Err(e),
                    other => Err(ClientError::Authentication(other.to_string())),
                }
            }
        }
    }

    fn replace(&self, session: Session) {
        self.inner.state.send_replace(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeWallet, fake_address};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn user(wallet: FakeWallet) -> CurrentUser {
        CurrentUser::new(Arc::new(ClientConfig::testnet()), Arc::new(wallet))
    }

    #[test]
    fn test_session_invariant() {
        assert_eq!(Session::unknown().logged_in(), None);
        assert_eq!(Session::unknown().addr(), None);
        assert_eq!(Session::anonymous().addr(), None);
        let addr = fake_address();
        assert_eq!(Session::authenticated(addr).addr(), Some(addr));
        assert!(Session::authenticated(addr).is_logged_in());
    }

    #[tokio::test]
    async fn test_subscribe_receives_snapshot_then_replacements() {
        let current = user(FakeWallet::new(fake_address()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = current.subscribe(move |s| {
            let _ = tx.send(s);
        });

        assert_eq!(rx.recv().await, Some(Session::unknown()));
        current.authenticate().await.unwrap();
        assert_eq!(rx.recv().await, Some(Session::authenticated(fake_address())));
        current.unauthenticate().await.unwrap();
        assert_eq!(rx.recv().await, Some(Session::anonymous()));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_callbacks() {
        let current = user(FakeWallet::new(fake_address()));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let sub = current.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        let after_unsubscribe = calls.load(Ordering::SeqCst);

        current.authenticate().await.unwrap();
        current.unauthenticate().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(calls.load(Ordering::SeqCst), after_unsubscribe);
    }

    #[tokio::test]
    async fn test_failed_authentication_never_logs_in() {
        let current = user(FakeWallet::declining("user cancelled"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = current.subscribe(move |s| sink.lock().unwrap().push(s));

        let err = current.authenticate().await.unwrap_err();
        assert!(matches!(err, ClientError::Authentication(ref m) if m == "user cancelled"));
        assert_eq!(current.snapshot(), Session::anonymous());
        assert!(matches!(current.authorization(), Err(ClientError::NotAuthenticated)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(seen.lock().unwrap().iter().all(|s| !s.is_logged_in()));
    }

    #[tokio::test]
    async fn test_authorization_uses_session_address() {
        let current = user(FakeWallet::new(fake_address()));
        current.sign_up().await.unwrap();
        let signer = current.authorization().unwrap();
        assert_eq!(signer.address(), fake_address());
    }
}

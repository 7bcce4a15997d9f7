//! Transaction status observation.
//!
//! [`TransactionWatcher::updates`] is the single source of status transitions. The blocking
//! waits (`once_*`) and the callback form ([`TransactionWatcher::subscribe`]) are both built on
//! top of it.

use crate::access::AccessNode;
use crate::error::{ClientError, Result};
use crate::subscription::Subscription;
use crate::types::{Identifier, TxId};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Status reported by the network for a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Unknown,
    Pending,
    Finalized,
    Executed,
    Sealed,
    Expired,
}

impl TransactionStatus {
    /// Position on the path to sealing. `Expired` is off the path.
    fn rank(&self) -> Option<u8> {
        match self {
            TransactionStatus::Unknown => Some(0),
            TransactionStatus::Pending => Some(1),
            TransactionStatus::Finalized => Some(2),
            TransactionStatus::Executed => Some(3),
            TransactionStatus::Sealed => Some(4),
            TransactionStatus::Expired => None,
        }
    }

    /// No further transitions will be reported.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Sealed | TransactionStatus::Expired)
    }

    /// True once this status is at or past `target`.
    pub fn reached(&self, target: TransactionStatus) -> bool {
        match (self.rank(), target.rank()) {
            (Some(current), Some(target)) => current >= target,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Unknown => "UNKNOWN",
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Finalized => "FINALIZED",
            TransactionStatus::Executed => "EXECUTED",
            TransactionStatus::Sealed => "SEALED",
            TransactionStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "unknown" | "" => Ok(TransactionStatus::Unknown),
            "pending" => Ok(TransactionStatus::Pending),
            "finalized" => Ok(TransactionStatus::Finalized),
            "executed" => Ok(TransactionStatus::Executed),
            "sealed" => Ok(TransactionStatus::Sealed),
            "expired" => Ok(TransactionStatus::Expired),
            other => Err(ClientError::Decode(format!("unknown transaction status `{other}`"))),
        }
    }
}

/// Event emitted by a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub transaction_id: TxId,
    pub transaction_index: u32,
    pub event_index: u32,
    /// Decoded event fields
    pub payload: serde_json::Value,
}

/// Execution result of a transaction at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub status: TransactionStatus,
    pub status_code: u32,
    pub error_message: String,
    pub block_id: Option<Identifier>,
    pub computation_used: u64,
    pub events: Vec<Event>,
}

impl TransactionResult {
    /// Result of a transaction the network has not indexed yet.
    pub fn unknown() -> Self {
        Self::with_status(TransactionStatus::Unknown)
    }

    pub fn with_status(status: TransactionStatus) -> Self {
        Self {
            status,
            status_code: 0,
            error_message: String::new(),
            block_id: None,
            computation_used: 0,
            events: Vec::new(),
        }
    }

    /// The transaction was rejected during execution.
    pub fn is_failed(&self) -> bool {
        self.status_code != 0 || !self.error_message.is_empty()
    }

    /// No further updates will follow this result.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal() || self.is_failed()
    }

    /// The error this result represents, if any.
    pub fn failure(&self, id: TxId) -> Option<ClientError> {
        if self.is_failed() {
            Some(ClientError::TransactionFailed {
                id,
                status_code: self.status_code,
                message: self.error_message.clone(),
            })
        } else if self.status == TransactionStatus::Expired {
            Some(ClientError::Expired(id))
        } else {
            None
        }
    }
}

/// Observes one submitted transaction.
pub struct TransactionWatcher<N: ?Sized> {
    node: Arc<N>,
    id: TxId,
    poll_interval: Duration,
    deadline: Duration,
}

impl<N: ?Sized> Clone for TransactionWatcher<N> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            id: self.id,
            poll_interval: self.poll_interval,
            deadline: self.deadline,
        }
    }
}

struct PollState<N: ?Sized> {
    node: Arc<N>,
    id: TxId,
    poll_interval: Duration,
    started: Instant,
    deadline: Duration,
    last: Option<(TransactionStatus, u32)>,
    first: bool,
    done: bool,
}

impl<N: AccessNode + ?Sized + 'static> TransactionWatcher<N> {
    /// `deadline` bounds how long [`TransactionWatcher::updates`] keeps polling.
    pub fn new(node: Arc<N>, id: TxId, poll_interval: Duration, deadline: Duration) -> Self {
        Self {
            node,
            id,
            poll_interval,
            deadline,
        }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    /// Fetch the current result once.
    pub async fn snapshot(&self) -> Result<TransactionResult> {
        self.node.transaction_result(self.id).await
    }

    /// Stream of results, one per observed change of status or status code, in the order
    /// the network reports them.
    ///
    /// The stream ends after a terminal result, after the first error, or with
    /// [`ClientError::Timeout`] once the watcher's deadline has passed.
    pub fn updates(&self) -> BoxStream<'static, Result<TransactionResult>> {
        let state = PollState {
            node: self.node.clone(),
            id: self.id,
            poll_interval: self.poll_interval,
            started: Instant::now(),
            deadline: self.deadline,
            last: None,
            first: true,
            done: false,
        };

        stream::unfold(state, |mut st| async move {
            if st.done {
                return None;
            }
            loop {
                if !st.first {
                    let elapsed = st.started.elapsed();
                    if elapsed >= st.deadline {
                        st.done = true;
                        let err = ClientError::Timeout {
                            id: st.id,
                            after: st.deadline,
                        };
                        return Some((Err(err), st));
                    }
                    tokio::time::sleep(st.poll_interval.min(st.deadline - elapsed)).await;
                }
                st.first = false;

                let result = match st.node.transaction_result(st.id).await {
                    Ok(result) => result,
                    Err(e) => {
                        st.done = true;
                        return Some((Err(e), st));
                    }
                };

                if result.is_terminal() {
                    st.done = true;
                }
                let key = (result.status, result.status_code);
                if st.last != Some(key) {
                    st.last = Some(key);
                    debug!(tx_id = %st.id, status = %result.status, "Transaction status changed");
                    return Some((Ok(result), st));
                }
                if st.done {
                    return None;
                }
            }
        })
        .boxed()
    }

    /// Wait until the transaction reaches `target`, failing on execution errors, expiry or
    /// when `timeout` elapses.
    pub async fn once(
        &self,
        target: TransactionStatus,
        timeout: Duration,
    ) -> Result<TransactionResult> {
        let id = self.id;
        let wait = async {
            let mut updates = self.updates();
            while let Some(update) = updates.next().await {
                let result = update?;
                if let Some(err) = result.failure(id) {
                    return Err(err);
                }
                if result.status.reached(target) {
                    return Ok(result);
                }
            }
            Err(ClientError::StreamClosed(id))
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ClientError::Timeout { id, after: timeout })?
    }

    pub async fn once_finalized(&self, timeout: Duration) -> Result<TransactionResult> {
        self.once(TransactionStatus::Finalized, timeout).await
    }

    pub async fn once_executed(&self, timeout: Duration) -> Result<TransactionResult> {
        self.once(TransactionStatus::Executed, timeout).await
    }

    /// Wait for sealing. Only a sealed result without an execution error is returned as `Ok`.
    pub async fn once_sealed(&self, timeout: Duration) -> Result<TransactionResult> {
        self.once(TransactionStatus::Sealed, timeout).await
    }

    /// Invoke `callback` for every update without blocking. The subscription releases itself
    /// after the terminal update.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(Result<TransactionResult>) + Send + 'static,
    {
        Subscription::spawn("transaction_status", self.updates(), callback)
    }
}

//! Scoped subscription handles.
//!
//! A [`Subscription`] drives a stream on a background task and hands every item to a callback.
//! Dropping the handle (or calling [`Subscription::unsubscribe`]) releases the callback. Once
//! `unsubscribe` has returned the callback is never invoked again: it is dropped under the same
//! lock that guards its invocation.
//!
//! A callback must not drop its own subscription handle.

use futures_util::{Stream, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Callback<T> = Box<dyn FnMut(T) + Send>;

struct CallbackSlot<T> {
    callback: Mutex<Option<Callback<T>>>,
}

impl<T> CallbackSlot<T> {
    fn new(callback: Callback<T>) -> Self {
        Self {
            callback: Mutex::new(Some(callback)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Callback<T>>> {
        // A panicking callback must not wedge release
        self.callback.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Invoke the callback if it is still held. Returns false once released.
    fn deliver(&self, value: T) -> bool {
        match self.lock().as_mut() {
            Some(callback) => {
                callback(value);
                true
            }
            None => false,
        }
    }
}

trait Release: Send + Sync {
    fn release(&self);
    fn is_held(&self) -> bool;
}

impl<T> Release for CallbackSlot<T> {
    fn release(&self) {
        self.lock().take();
    }

    fn is_held(&self) -> bool {
        self.lock().is_some()
    }
}

/// Handle to a running subscription.
pub struct Subscription {
    name: &'static str,
    token: CancellationToken,
    slot: Arc<dyn Release>,
}

impl Subscription {
    /// Forward every item of `stream` to `callback` until the stream ends or the handle is
    /// released. Must be called from within a Tokio runtime.
    pub fn spawn<S, T, F>(name: &'static str, stream: S, callback: F) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
        T: Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let token = CancellationToken::new();
        let slot = Arc::new(CallbackSlot::new(Box::new(callback)));

        let task_token = token.clone();
        let task_slot = slot.clone();
        tokio::spawn(async move {
            let mut stream = std::pin::pin!(stream);
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    item = stream.next() => match item {
                        Some(value) => {
                            if !task_slot.deliver(value) {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            // Stream finished or cancelled: release the callback either way
            task_slot.release();
            debug!(subscription = name, "Subscription finished");
        });

        Self { name, token, slot }
    }

    /// True while the callback can still be invoked.
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.slot.is_held()
    }

    /// Release the subscription. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
        self.slot.release();
        debug!(subscription = self.name, "Unsubscribed");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}

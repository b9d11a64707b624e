//! Listeners - passive observers of every authenticated reply.
//!
//! A raw `IobcListener` sees every verified envelope. An `ExtendedListener`
//! sees only `Response` payloads, already split into success and failure;
//! wrap it in `Extended` to register it, or call `route_response` from a raw
//! listener.

use crate::domain::error::ListenerError;
use parking_lot::RwLock;
use shared_types::{AuthenticatedMessage, ErrorDetails, InReplyTo, MessageContent};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// Receives every authenticated envelope from the reply topic.
pub trait IobcListener: Send + Sync {
    /// Handle a verified envelope. Errors are logged and do not affect other
    /// listeners or correlation.
    fn accept(&self, message: &AuthenticatedMessage) -> Result<(), ListenerError>;
}

/// Receives `Response` payloads split by outcome.
pub trait ExtendedListener: Send + Sync {
    /// Return true to skip this message.
    fn should_ignore(&self, _message: &AuthenticatedMessage) -> bool {
        false
    }

    /// A passing response. `result` is `None` for operations with nothing to return.
    fn accept_success(
        &self,
        in_reply_to: &InReplyTo,
        message_type: &str,
        result: Option<&MessageContent>,
    ) -> Result<(), ListenerError>;

    /// A failing response. Missing details arrive as the placeholder.
    fn accept_failure(
        &self,
        in_reply_to: &InReplyTo,
        message_type: &str,
        details: &ErrorDetails,
    ) -> Result<(), ListenerError>;
}

/// Route `message` to the success or failure handler of `listener`.
///
/// Non-`Response` payloads and messages the listener ignores are skipped.
pub fn route_response<L: ExtendedListener + ?Sized>(
    listener: &L,
    message: &AuthenticatedMessage,
) -> Result<(), ListenerError> {
    let Some(response) = message.content().as_response() else {
        return Ok(());
    };
    if listener.should_ignore(message) {
        return Ok(());
    }

    if response.pass {
        listener.accept_success(&response.in_reply_to, message.message_type(), response.result())
    } else {
        let details = response.error_details_or_placeholder();
        listener.accept_failure(&response.in_reply_to, message.message_type(), &details)
    }
}

/// Adapter registering an `ExtendedListener` as a raw listener.
pub struct Extended<L>(pub L);

impl<L: ExtendedListener> IobcListener for Extended<L> {
    fn accept(&self, message: &AuthenticatedMessage) -> Result<(), ListenerError> {
        route_response(&self.0, message)
    }
}

/// Outcome of one `notify_all`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Listeners that handled the message.
    pub delivered: usize,
    /// Listeners that returned an error or panicked.
    pub failed: usize,
}

/// The set of registered listeners.
///
/// Copy-on-write: `notify_all` iterates a snapshot taken under a brief read
/// lock, so listeners added or removed during a fan-out take effect from the
/// next message. Identity is the `Arc` allocation.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Arc<Vec<Arc<dyn IobcListener>>>>,
}

fn same_listener(a: &Arc<dyn IobcListener>, b: &Arc<dyn IobcListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener. Returns false if it is already registered.
    pub fn add_listener(&self, listener: Arc<dyn IobcListener>) -> bool {
        let mut guard = self.listeners.write();
        if guard.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(listener);
        *guard = Arc::new(next);
        true
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn IobcListener>) -> bool {
        let mut guard = self.listeners.write();
        let Some(index) = guard.iter().position(|l| same_listener(l, listener)) else {
            return false;
        };
        let mut next: Vec<_> = guard.iter().cloned().collect();
        next.remove(index);
        *guard = Arc::new(next);
        true
    }

    /// The current listener set.
    pub fn snapshot(&self) -> Arc<Vec<Arc<dyn IobcListener>>> {
        Arc::clone(&self.listeners.read())
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// True when no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `message` to every listener.
    ///
    /// A listener that errors or panics is logged and skipped; the rest still
    /// receive the message.
    pub fn notify_all(&self, message: &AuthenticatedMessage) -> NotifyReport {
        let snapshot = self.snapshot();
        let mut report = NotifyReport::default();

        for listener in snapshot.iter() {
            match catch_unwind(AssertUnwindSafe(|| listener.accept(message))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    error!(
                        user_id = %message.user_id(),
                        message_id = %message.message_id(),
                        error = %e,
                        "Listener failed"
                    );
                    report.failed += 1;
                }
                Err(_) => {
                    error!(
                        user_id = %message.user_id(),
                        message_id = %message.message_id(),
                        "Listener panicked"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}

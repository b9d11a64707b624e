//! Correlation registry - turns a broadcast reply stream into per-request
//! futures.
//!
//! Flow:
//! 1. Producer builds the request and derives its `InReplyTo`
//! 2. Producer calls `register()` with the request's completion slot
//! 3. Producer publishes the request
//! 4. Dispatcher sees the reply and calls `resolve_success()` / `resolve_failure()`
//! 5. Caller's `PendingReply` resolves, or times out via `remove_expired()`
//!
//! Every resolution removes the entry in the same step it takes it, so at most
//! one of them can take effect per key.

use crate::domain::error::RequestError;
use crate::domain::pending::{Completion, PendingSlot, TypedFuture};
use dashmap::DashMap;
use shared_types::{ErrorDetails, InReplyTo, MessageContent, ReplyShape};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// A registered request waiting for its reply
struct Registration {
    slot: Box<dyn PendingSlot>,
    /// When the request was registered
    registered_at: Instant,
    /// Time-to-live for this registration
    ttl: Duration,
    /// Message type (for logging)
    message_type: String,
}

impl Registration {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.registered_at) > self.ttl
    }
}

/// Statistics for the correlation registry
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Total requests registered
    pub total_registered: AtomicU64,
    /// Total requests resolved by a passing reply of the expected shape
    pub total_completed: AtomicU64,
    /// Total requests failed because a passing reply had the wrong shape
    pub total_mismatched: AtomicU64,
    /// Total requests resolved by a failing reply
    pub total_failed: AtomicU64,
    /// Total requests resolved by a local processing fault
    pub total_faulted: AtomicU64,
    /// Total requests that timed out
    pub total_timeouts: AtomicU64,
    /// Total registrations withdrawn
    pub total_cancelled: AtomicU64,
    /// Total resolutions for keys that were not registered
    pub total_unrouted: AtomicU64,
}

impl RegistryStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Process-wide map from correlation key to outstanding request.
///
/// Sharded, so resolving one key never blocks registering or resolving
/// another. Shared by `Arc` between the producer and the dispatcher.
pub struct CorrelationRegistry {
    pending: DashMap<InReplyTo, Registration>,
    /// Time-to-live used when `register` is given none
    default_ttl: Duration,
    stats: Arc<RegistryStats>,
}

impl CorrelationRegistry {
    /// Create a registry whose registrations expire after `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            default_ttl,
            stats: Arc::new(RegistryStats::default()),
        }
    }

    /// Register a pending request under `key`.
    ///
    /// Must happen before the request is published. Inserts unconditionally:
    /// a previous registration under the same key is dropped, and its caller
    /// sees `RequestError::Abandoned`.
    pub fn register<T: ReplyShape>(
        &self,
        key: InReplyTo,
        pending: TypedFuture<T>,
        message_type: &str,
        ttl: Option<Duration>,
    ) {
        let registration = Registration {
            slot: Box::new(pending),
            registered_at: Instant::now(),
            ttl: ttl.unwrap_or(self.default_ttl),
            message_type: message_type.to_string(),
        };

        debug!(
            in_reply_to = %key,
            message_type = message_type,
            expected = T::SHAPE,
            "Registered pending request"
        );

        if self.pending.insert(key.clone(), registration).is_some() {
            warn!(in_reply_to = %key, "Replaced an existing registration");
        }
        RegistryStats::bump(&self.stats.total_registered);
    }

    /// Complete the request registered under `key` with a reply result.
    ///
    /// Returns false when nothing is registered, which is normal on a bus
    /// carrying everyone's replies.
    pub fn resolve_success(&self, key: &InReplyTo, value: Option<MessageContent>) -> bool {
        let Some((_, registration)) = self.pending.remove(key) else {
            trace!(in_reply_to = %key, "Success for unregistered request");
            RegistryStats::bump(&self.stats.total_unrouted);
            return false;
        };

        debug!(
            in_reply_to = %key,
            message_type = %registration.message_type,
            expected = registration.slot.shape(),
            response_time_ms = registration.registered_at.elapsed().as_millis(),
            "Completing pending request"
        );
        match registration.slot.complete(value) {
            Completion::Completed => RegistryStats::bump(&self.stats.total_completed),
            Completion::Mismatched => {
                warn!(
                    in_reply_to = %key,
                    expected = registration.slot.shape(),
                    "Reply result has the wrong shape"
                );
                RegistryStats::bump(&self.stats.total_mismatched);
            }
            // Removed from the map above, so no other resolution can have
            // reached this slot.
            Completion::AlreadyResolved => {}
        }
        true
    }

    /// Fail the request registered under `key` with the remote error details.
    pub fn resolve_failure(&self, key: &InReplyTo, details: ErrorDetails) -> bool {
        let Some((_, registration)) = self.pending.remove(key) else {
            debug!(in_reply_to = %key, code = %details.code, "Failure for unregistered request");
            RegistryStats::bump(&self.stats.total_unrouted);
            return false;
        };

        debug!(
            in_reply_to = %key,
            message_type = %registration.message_type,
            code = %details.code,
            "Failing pending request"
        );
        registration.slot.fail(RequestError::Remote(details));
        RegistryStats::bump(&self.stats.total_failed);
        true
    }

    /// Fail the request registered under `key` with a local processing fault.
    pub fn resolve_fault(&self, key: &InReplyTo, cause: impl Into<String>) -> bool {
        let cause = cause.into();
        let Some((_, registration)) = self.pending.remove(key) else {
            warn!(in_reply_to = %key, cause = %cause, "Fault for unregistered request");
            RegistryStats::bump(&self.stats.total_unrouted);
            return false;
        };

        warn!(
            in_reply_to = %key,
            message_type = %registration.message_type,
            cause = %cause,
            "Faulting pending request"
        );
        registration.slot.fail(RequestError::Processing(cause));
        RegistryStats::bump(&self.stats.total_faulted);
        true
    }

    /// Withdraw a registration without resolving it.
    ///
    /// The caller's `PendingReply`, if still held, sees `RequestError::Abandoned`.
    pub fn cancel(&self, key: &InReplyTo) -> bool {
        if self.pending.remove(key).is_some() {
            debug!(in_reply_to = %key, "Cancelled pending request");
            RegistryStats::bump(&self.stats.total_cancelled);
            true
        } else {
            false
        }
    }

    /// Remove expired registrations, failing each with `RequestError::Timeout`.
    ///
    /// Returns the number of requests removed.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<InReplyTo> = self
            .pending
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            // A reply may have resolved the entry since the scan.
            let Some((_, registration)) = self.pending.remove_if(&key, |_, r| r.is_expired(now))
            else {
                continue;
            };

            let elapsed = now.duration_since(registration.registered_at);
            warn!(
                in_reply_to = %key,
                message_type = %registration.message_type,
                elapsed_ms = elapsed.as_millis(),
                timeout_ms = registration.ttl.as_millis(),
                "Removing expired pending request"
            );
            registration.slot.fail(RequestError::Timeout { elapsed });
            RegistryStats::bump(&self.stats.total_timeouts);
            removed += 1;
        }

        removed
    }

    /// Get number of currently pending requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a key is pending
    pub fn is_pending(&self, key: &InReplyTo) -> bool {
        self.pending.contains_key(key)
    }

    /// Get statistics
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    /// The time-to-live applied when none is given.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

/// Background task to clean up expired registrations
pub async fn cleanup_task(registry: Arc<CorrelationRegistry>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let removed = registry.remove_expired();
        if removed > 0 {
            debug!(removed = removed, "Cleaned up expired pending requests");
        }
    }
}

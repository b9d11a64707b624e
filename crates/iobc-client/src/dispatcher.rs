//! Outbound processor - verifies replies, fans them out to listeners and
//! resolves the matching pending request.
//!
//! Per message, in order, stopping at the first rejection:
//! 1. **Verify** the signature with the claimed sender's verifying key
//! 2. **Dedup** redelivered copies of an already processed reply
//! 3. **Shape-check** that the payload is a `Response`
//! 4. **Fan out** to every listener (failures isolated per listener)
//! 5. **Correlate** against the registry

use crate::domain::correlation::CorrelationRegistry;
use crate::domain::error::DispatchError;
use crate::listeners::ListenerRegistry;
use shared_bus::RedeliveryFilter;
use shared_types::{AuthenticatedMessage, InReplyTo, KeyProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// What happened to one consumed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Dropped: no verifying key for the claimed sender.
    NoVerifyingKey,
    /// Dropped: the signature did not verify.
    InvalidSignature,
    /// Dropped: already processed within the redelivery window.
    Redelivered,
    /// Dropped: the payload is not a `Response`.
    NotAResponse,
    /// Delivered to listeners and resolved a pending request.
    Resolved,
    /// Delivered to listeners; no pending request matched.
    Unrouted,
}

/// Dispatcher for the reply topic.
pub struct OutboundProcessor {
    keys: Arc<dyn KeyProvider>,
    registry: Arc<CorrelationRegistry>,
    listeners: Arc<ListenerRegistry>,
    processed: RedeliveryFilter<InReplyTo>,
}

impl OutboundProcessor {
    /// Create a dispatcher remembering processed replies for `redelivery_window`.
    pub fn new(
        keys: Arc<dyn KeyProvider>,
        registry: Arc<CorrelationRegistry>,
        listeners: Arc<ListenerRegistry>,
        redelivery_window: Duration,
    ) -> Self {
        Self {
            keys,
            registry,
            listeners,
            processed: RedeliveryFilter::with_window(redelivery_window),
        }
    }

    /// Decode a bus payload and process it.
    pub fn process_bytes(&self, payload: &[u8]) -> Result<Disposition, DispatchError> {
        let message = AuthenticatedMessage::from_bytes(payload)?;
        Ok(self.process(&message))
    }

    /// Process one decoded message.
    pub fn process(&self, message: &AuthenticatedMessage) -> Disposition {
        let user_id = message.user_id();
        let message_id = message.message_id();

        // 1. Verify
        let Some(key) = self.keys.verifying_key(user_id) else {
            error!(
                user_id = %user_id,
                message_id = %message_id,
                "No verifying key, dropping message"
            );
            return Disposition::NoVerifyingKey;
        };
        if !message.is_valid_signature(&key) {
            error!(
                user_id = %user_id,
                message_id = %message_id,
                "Invalid signature, dropping message"
            );
            return Disposition::InvalidSignature;
        }

        // 2. Dedup
        if !self.processed.check_and_insert(message.build_in_reply_to()) {
            debug!(user_id = %user_id, message_id = %message_id, "Redelivered message dropped");
            return Disposition::Redelivered;
        }

        // 3. Shape-check
        let Some(response) = message.content().as_response() else {
            error!(
                user_id = %user_id,
                message_id = %message_id,
                kind = message.content().kind(),
                "Not a response, dropping message"
            );
            return Disposition::NotAResponse;
        };

        // 4. Fan out
        let report = self.listeners.notify_all(message);
        trace!(
            message_id = %message_id,
            delivered = report.delivered,
            failed = report.failed,
            "Listeners notified"
        );

        // 5. Correlate, on the pass flag alone
        let key = &response.in_reply_to;
        if !response.is_well_formed() {
            warn!(
                in_reply_to = %key,
                pass = response.pass,
                "Reply fields disagree with its pass flag"
            );
        }
        let resolved = if response.pass {
            self.registry
                .resolve_success(key, response.result().cloned())
        } else {
            self.registry
                .resolve_failure(key, response.error_details_or_placeholder())
        };

        if resolved {
            Disposition::Resolved
        } else {
            Disposition::Unrouted
        }
    }
}

//! Inbound producer - builds, signs, registers and publishes requests.

use crate::domain::correlation::CorrelationRegistry;
use crate::domain::error::SendError;
use crate::domain::pending::{PendingReply, TypedFuture};
use shared_bus::{BusPublisher, OutboundRecord};
use shared_types::{AuthenticatedMessage, InReplyTo, KeyProvider, MessageContent, ReplyShape};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Publishes signed requests to the request topic.
///
/// Signing happens before registration, so a misconfigured key never leaves
/// a registration behind. Registration happens before publishing, so a reply
/// can never outrun its registration.
pub struct InboundProducer {
    publisher: Arc<dyn BusPublisher>,
    keys: Arc<dyn KeyProvider>,
    registry: Arc<CorrelationRegistry>,
    topic: String,
    request_timeout: Option<Duration>,
}

impl InboundProducer {
    /// Create a producer publishing to `topic`.
    pub fn new(
        publisher: Arc<dyn BusPublisher>,
        keys: Arc<dyn KeyProvider>,
        registry: Arc<CorrelationRegistry>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            keys,
            registry,
            topic: topic.into(),
            request_timeout: None,
        }
    }

    /// Override the registry's default time-to-live for requests sent here.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// The registry requests are registered in.
    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    /// Build and sign a request envelope as `user_id`.
    fn build_signed(
        &self,
        user_id: &str,
        message_type: &str,
        content: MessageContent,
    ) -> Result<AuthenticatedMessage, SendError> {
        let key = self.keys.signing_key(user_id).ok_or_else(|| {
            error!(user_id = %user_id, "No signing key configured");
            SendError::NoSigningKey {
                user_id: user_id.to_string(),
            }
        })?;

        let mut message = AuthenticatedMessage::new(user_id, message_type, content);
        message.sign(&key).map_err(|e| {
            error!(user_id = %user_id, error = %e, "Cannot sign request");
            e
        })?;
        Ok(message)
    }

    async fn publish(
        &self,
        message: &AuthenticatedMessage,
        payload: Vec<u8>,
    ) -> Result<(), SendError> {
        let record = OutboundRecord::new(self.topic.clone(), message.user_id(), payload);
        let receivers = self.publisher.publish(record).await?;
        debug!(
            user_id = %message.user_id(),
            message_id = %message.message_id(),
            message_type = %message.message_type(),
            receivers,
            "Request published"
        );
        Ok(())
    }

    /// Send a request and return a future for its typed reply.
    ///
    /// # Errors
    ///
    /// - `NoSigningKey`, `Signing`, `Codec` before anything is registered
    /// - `Publish` if the bus rejects the request; the registration is withdrawn
    pub async fn send_and_await<T: ReplyShape>(
        &self,
        user_id: &str,
        message_type: &str,
        content: MessageContent,
    ) -> Result<PendingReply<T>, SendError> {
        let message = self.build_signed(user_id, message_type, content)?;
        let payload = message.to_bytes()?;
        let in_reply_to = message.build_in_reply_to();

        let (slot, reply) = TypedFuture::<T>::channel(in_reply_to.clone());
        self.registry
            .register(in_reply_to.clone(), slot, message_type, self.request_timeout);

        if let Err(e) = self.publish(&message, payload).await {
            self.registry.cancel(&in_reply_to);
            return Err(e);
        }

        Ok(reply)
    }

    /// Send a request without registering for its reply.
    ///
    /// Returns the correlation key so the caller can match the reply through
    /// a listener.
    pub async fn send_fire_and_forget(
        &self,
        user_id: &str,
        message_type: &str,
        content: MessageContent,
    ) -> Result<InReplyTo, SendError> {
        let message = self.build_signed(user_id, message_type, content)?;
        let payload = message.to_bytes()?;
        self.publish(&message, payload).await?;
        Ok(message.build_in_reply_to())
    }
}

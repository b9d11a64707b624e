//! Inbound processor - verifies requests, runs delegates and publishes
//! signed replies.
//!
//! Per request, in order:
//! 1. **Verify** the signature with the sender's verifying key. A request
//!    that fails is still answered, with `iobc:invalid-message-signature`
//! 2. **Dedup** redelivered copies of an already answered request
//! 3. **Dispatch** to the delegate registered for the message type
//! 4. **Reply** with a `Response` signed as the server identity, published
//!    transactionally to the reply topic

use crate::domain::config::ServerConfig;
use crate::domain::error::{ServerError, INVALID_SIGNATURE_CODE};
use crate::ports::delegate::DelegateMatcher;
use shared_bus::{BusPublisher, OutboundRecord, RedeliveryFilter};
use shared_types::{
    AuthenticatedMessage, CodecError, ErrorDetails, InReplyTo, KeyProvider, MessageContent,
    Response,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What happened to one consumed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A reply was published.
    Replied { in_reply_to: InReplyTo, pass: bool },
    /// Already answered within the redelivery window; nothing published.
    Redelivered,
}

/// Server side of the protocol.
pub struct InboundProcessor {
    config: ServerConfig,
    keys: Arc<dyn KeyProvider>,
    delegates: Arc<DelegateMatcher>,
    publisher: Arc<dyn BusPublisher>,
    answered: RedeliveryFilter<InReplyTo>,
}

impl InboundProcessor {
    /// Create a processor.
    pub fn new(
        config: ServerConfig,
        keys: Arc<dyn KeyProvider>,
        delegates: Arc<DelegateMatcher>,
        publisher: Arc<dyn BusPublisher>,
    ) -> Self {
        let answered = RedeliveryFilter::with_window(config.redelivery_window);
        Self {
            config,
            keys,
            delegates,
            publisher,
            answered,
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Registered delegates.
    pub fn delegates(&self) -> &Arc<DelegateMatcher> {
        &self.delegates
    }

    /// Decode a bus payload and process it.
    pub async fn process_bytes(&self, payload: &[u8]) -> Result<Outcome, ServerError> {
        let request = AuthenticatedMessage::from_bytes(payload).map_err(|e: CodecError| {
            warn!(error = %e, "Undecodable request");
            e
        })?;
        self.process(&request).await
    }

    /// Answer one request.
    pub async fn process(&self, request: &AuthenticatedMessage) -> Result<Outcome, ServerError> {
        let in_reply_to = request.build_in_reply_to();

        // 1. Verify
        if !self.is_authentic(request) {
            let details =
                ErrorDetails::new(INVALID_SIGNATURE_CODE, "request signature did not verify")
                    .with_parameter("userId", request.user_id());
            let response = Response::failure(in_reply_to.clone(), details);
            self.reply(request, response).await?;
            return Ok(Outcome::Replied {
                in_reply_to,
                pass: false,
            });
        }

        // 2. Dedup
        if !self.answered.check_and_insert(in_reply_to.clone()) {
            debug!(request = %in_reply_to, "Redelivered request dropped");
            return Ok(Outcome::Redelivered);
        }

        // 3. Dispatch
        let response = match self
            .delegates
            .apply(request.message_type(), request.content())
            .await
        {
            Ok(result) => Response::success(in_reply_to.clone(), result),
            Err(e) => {
                warn!(
                    request = %in_reply_to,
                    message_type = %request.message_type(),
                    error = %e,
                    "Delegate failed"
                );
                Response::failure(in_reply_to.clone(), e.to_error_details())
            }
        };
        let pass = response.pass;

        // 4. Reply
        if let Err(e) = self.reply(request, response).await {
            // Let a redelivery retry the request.
            self.answered.forget(&in_reply_to);
            return Err(e);
        }

        Ok(Outcome::Replied { in_reply_to, pass })
    }

    fn is_authentic(&self, request: &AuthenticatedMessage) -> bool {
        let Some(key) = self.keys.verifying_key(request.user_id()) else {
            error!(
                user_id = %request.user_id(),
                message_id = %request.message_id(),
                "No verifying key for request sender"
            );
            return false;
        };
        if !request.is_valid_signature(&key) {
            error!(
                user_id = %request.user_id(),
                message_id = %request.message_id(),
                "Invalid request signature"
            );
            return false;
        }
        true
    }

    async fn reply(
        &self,
        request: &AuthenticatedMessage,
        response: Response,
    ) -> Result<(), ServerError> {
        let server_id = self.config.server_id.as_str();
        let key = self.keys.signing_key(server_id).ok_or_else(|| {
            error!(server_id = %server_id, "No signing key for server identity");
            ServerError::NoServerKey {
                server_id: server_id.to_string(),
            }
        })?;

        let pass = response.pass;
        let mut reply = AuthenticatedMessage::new(
            server_id,
            request.message_type(),
            MessageContent::Response(response),
        );
        reply.sign(&key)?;

        let record = OutboundRecord::new(
            self.config.outbound_topic.clone(),
            server_id,
            reply.to_bytes()?,
        );
        let receivers = self.publisher.publish_transaction(vec![record]).await?;
        debug!(
            request = %request.build_in_reply_to(),
            reply_id = %reply.message_id(),
            pass,
            receivers,
            "Reply published"
        );
        Ok(())
    }
}

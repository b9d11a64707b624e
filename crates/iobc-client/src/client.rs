//! Managed client API.
//!
//! Wires producer, registry, dispatcher and listeners together and offers
//! typed calls for the built-in operations.

use crate::adapters::ReplyConsumer;
use crate::dispatcher::OutboundProcessor;
use crate::domain::config::ClientConfig;
use crate::domain::correlation::{cleanup_task, CorrelationRegistry};
use crate::domain::error::{ClientError, SendError};
use crate::listeners::ListenerRegistry;
use crate::producer::InboundProducer;
use shared_bus::{BusPublisher, BusSubscriber, SubscriptionError};
use shared_types::{
    BlockNumber, GetBlockNumber, InReplyTo, KeyProvider, MessageContent, PingInput, PingOutput,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// The caller side of the protocol.
pub struct IobcClient {
    config: ClientConfig,
    registry: Arc<CorrelationRegistry>,
    listeners: Arc<ListenerRegistry>,
    producer: InboundProducer,
    processor: Arc<OutboundProcessor>,
}

impl IobcClient {
    /// Create a client. Nothing runs until `start`.
    pub fn new(
        config: ClientConfig,
        publisher: Arc<dyn BusPublisher>,
        keys: Arc<dyn KeyProvider>,
    ) -> Self {
        let registry = Arc::new(CorrelationRegistry::new(config.request_timeout));
        let listeners = Arc::new(ListenerRegistry::new());
        let producer = InboundProducer::new(
            publisher,
            Arc::clone(&keys),
            Arc::clone(&registry),
            config.inbound_topic.clone(),
        );
        let processor = Arc::new(OutboundProcessor::new(
            keys,
            Arc::clone(&registry),
            Arc::clone(&listeners),
            config.redelivery_window,
        ));

        Self {
            config,
            registry,
            listeners,
            producer,
            processor,
        }
    }

    /// Start the reply consumers and the expiry sweep.
    ///
    /// Every task stops when `shutdown` flips to `true`.
    pub fn start(
        &self,
        subscriber: &dyn BusSubscriber,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>, SubscriptionError> {
        let consumer = ReplyConsumer::new(
            Arc::clone(&self.processor),
            self.config.outbound_topic.clone(),
        );
        let mut handles = consumer.start(subscriber, shutdown.clone())?;

        let registry = Arc::clone(&self.registry);
        let interval = self.config.sweep_interval;
        let mut sweep_shutdown = shutdown;
        handles.push(tokio::spawn(async move {
            tokio::select! {
                _ = cleanup_task(registry, interval) => {}
                _ = async {
                    while !*sweep_shutdown.borrow() {
                        if sweep_shutdown.changed().await.is_err() {
                            break;
                        }
                    }
                } => {
                    info!("Expiry sweep stopped");
                }
            }
        }));

        Ok(handles)
    }

    /// The listener registry.
    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// The correlation registry.
    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    /// The request producer.
    pub fn producer(&self) -> &InboundProducer {
        &self.producer
    }

    /// The reply dispatcher.
    pub fn processor(&self) -> &Arc<OutboundProcessor> {
        &self.processor
    }

    /// Ping through the gateway and wait for the echo.
    pub async fn ping(&self, user_id: &str, message: &str) -> Result<PingOutput, ClientError> {
        let content = MessageContent::Ping(PingInput {
            message: message.to_string(),
        });
        let reply = self
            .producer
            .send_and_await::<PingOutput>(user_id, content.kind(), content)
            .await?;
        Ok(reply.await?)
    }

    /// Ask a connector for its current block height.
    pub async fn block_number(&self, user_id: &str, chain_id: &str) -> Result<u64, ClientError> {
        let content = MessageContent::GetBlockNumber(GetBlockNumber {
            chain_id: chain_id.to_string(),
        });
        let reply = self
            .producer
            .send_and_await::<BlockNumber>(user_id, content.kind(), content)
            .await?;
        Ok(reply.await?.number)
    }

    /// Ping without waiting. The reply reaches registered listeners under the
    /// returned key.
    pub async fn ping_managed(&self, user_id: &str, message: &str) -> Result<InReplyTo, SendError> {
        let content = MessageContent::Ping(PingInput {
            message: message.to_string(),
        });
        self.producer
            .send_fire_and_forget(user_id, content.kind(), content)
            .await
    }
}

//! Bus adapter for the request topic.

use crate::service::InboundProcessor;
use async_trait::async_trait;
use shared_bus::{
    spawn_partition_consumers, BusRecord, BusSubscriber, RecordHandler, SubscriptionError,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, trace};

/// Consumption loops feeding the inbound processor.
pub struct RequestConsumer {
    processor: Arc<InboundProcessor>,
}

impl RequestConsumer {
    /// Create a consumer for the processor's configured request topic.
    pub fn new(processor: Arc<InboundProcessor>) -> Self {
        Self { processor }
    }

    /// Subscribe to every partition and start one loop each.
    pub fn start(
        self,
        subscriber: &dyn BusSubscriber,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>, SubscriptionError> {
        let topic = self.processor.config().inbound_topic.clone();
        let handles = spawn_partition_consumers(subscriber, &topic, Arc::new(self), shutdown)?;
        info!(topic = %topic, partitions = handles.len(), "Request consumer started");
        Ok(handles)
    }
}

#[async_trait]
impl RecordHandler for RequestConsumer {
    async fn handle(&self, record: BusRecord) {
        match self.processor.process_bytes(&record.payload).await {
            Ok(outcome) => trace!(
                partition = record.partition,
                key = %record.key,
                ?outcome,
                "Request processed"
            ),
            Err(e) => error!(
                partition = record.partition,
                key = %record.key,
                error = %e,
                "Request not answered"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegates::PingDelegate;
    use crate::domain::config::ServerConfig;
    use crate::ports::delegate::DelegateMatcher;
    use shared_bus::{BusPublisher, InMemoryBus, OutboundRecord, INBOUND_TOPIC, OUTBOUND_TOPIC};
    use shared_types::{
        AuthenticatedMessage, KeySpecification, MessageContent, PingInput, SimpleKeyProvider,
    };
    use std::time::Duration;

    #[tokio::test]
    async fn test_request_on_bus_gets_reply() {
        let bus = Arc::new(InMemoryBus::new());
        let keys = Arc::new(SimpleKeyProvider::new());
        keys.set_symmetric_shared_secret("alice", b"a");
        keys.set_symmetric_shared_secret("iobc-server", b"s");
        let processor = Arc::new(InboundProcessor::new(
            ServerConfig::default(),
            keys,
            Arc::new(DelegateMatcher::new().with(Arc::new(PingDelegate))),
            bus.clone(),
        ));

        let (tx, rx) = watch::channel(false);
        let handles = RequestConsumer::new(processor).start(bus.as_ref(), rx).unwrap();

        let mut request = AuthenticatedMessage::new(
            "alice",
            "PING",
            MessageContent::Ping(PingInput {
                message: "hi".into(),
            }),
        );
        request.sign(&KeySpecification::hmac_sha256("alice", b"a")).unwrap();

        // Replies are keyed by server id, so they land on one partition.
        let partition = shared_bus::partition_for("iobc-server", bus.partitions());
        let mut replies = bus.subscribe(OUTBOUND_TOPIC, partition).unwrap();

        bus.publish(OutboundRecord::new(INBOUND_TOPIC, "alice", request.to_bytes().unwrap()))
            .await
            .unwrap();

        let record = tokio::time::timeout(Duration::from_secs(2), replies.recv())
            .await
            .unwrap()
            .unwrap();
        let reply = AuthenticatedMessage::from_bytes(&record.payload).unwrap();
        assert_eq!(
            reply.content().as_response().unwrap().in_reply_to,
            request.build_in_reply_to()
        );

        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}

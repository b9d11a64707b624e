//! Bus adapter for the reply topic.
//!
//! Pulls records off every partition of the reply topic and hands them to
//! the `OutboundProcessor`.

use crate::dispatcher::OutboundProcessor;
use async_trait::async_trait;
use shared_bus::{
    spawn_partition_consumers, BusRecord, BusSubscriber, RecordHandler, SubscriptionError,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

/// Consumption loops feeding the reply dispatcher.
pub struct ReplyConsumer {
    processor: Arc<OutboundProcessor>,
    topic: String,
}

impl ReplyConsumer {
    /// Create a consumer for `topic`.
    pub fn new(processor: Arc<OutboundProcessor>, topic: impl Into<String>) -> Self {
        Self {
            processor,
            topic: topic.into(),
        }
    }

    /// Subscribe to every partition and start one loop each.
    ///
    /// Loops stop when `shutdown` flips or the bus closes.
    pub fn start(
        self,
        subscriber: &dyn BusSubscriber,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>, SubscriptionError> {
        let topic = self.topic.clone();
        let handles = spawn_partition_consumers(subscriber, &topic, Arc::new(self), shutdown)?;
        info!(topic = %topic, partitions = handles.len(), "Reply consumer started");
        Ok(handles)
    }
}

#[async_trait]
impl RecordHandler for ReplyConsumer {
    async fn handle(&self, record: BusRecord) {
        match self.processor.process_bytes(&record.payload) {
            Ok(disposition) => trace!(
                partition = record.partition,
                key = %record.key,
                ?disposition,
                "Reply processed"
            ),
            Err(e) => warn!(
                partition = record.partition,
                key = %record.key,
                error = %e,
                "Skipping reply record"
            ),
        }
    }
}

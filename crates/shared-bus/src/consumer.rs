//! # Partition Consumers
//!
//! One consumption loop per partition of a topic. Records within a partition
//! are handled strictly in order; partitions run in parallel.

use crate::record::BusRecord;
use crate::subscriber::{BusSubscriber, SubscriptionError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Something that handles records pulled off a partition.
///
/// Handlers own their error reporting: a failing record must not stop the loop.
#[async_trait]
pub trait RecordHandler: Send + Sync + 'static {
    /// Handle one record.
    async fn handle(&self, record: BusRecord);
}

/// Subscribe to every partition of `topic` and spawn a loop per partition.
///
/// Subscriptions are taken before this returns, so anything published
/// afterwards is observed. Each loop ends when `shutdown` flips to `true`
/// (or its sender is dropped) or when the bus closes.
pub fn spawn_partition_consumers(
    subscriber: &dyn BusSubscriber,
    topic: &str,
    handler: Arc<dyn RecordHandler>,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>, SubscriptionError> {
    let subscriptions = (0..subscriber.partitions())
        .map(|partition| subscriber.subscribe(topic, partition))
        .collect::<Result<Vec<_>, _>>()?;

    let handles = subscriptions
        .into_iter()
        .map(|mut subscription| {
            let handler = Arc::clone(&handler);
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let topic = subscription.topic().to_string();
                let partition = subscription.partition();
                debug!(topic = %topic, partition, "Partition consumer started");

                loop {
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                info!(topic = %topic, partition, "Shutdown signal received");
                                break;
                            }
                        }
                        record = subscription.recv() => match record {
                            Some(record) => handler.handle(record).await,
                            None => {
                                info!(topic = %topic, partition, "Bus closed, consumer stopping");
                                break;
                            }
                        },
                    }
                }
            })
        })
        .collect();

    Ok(handles)
}

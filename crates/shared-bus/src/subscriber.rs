//! # Bus Subscriber
//!
//! The consuming side of the bus: one subscription per topic partition.

use crate::record::BusRecord;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The bus was closed.
    #[error("Bus closed")]
    Closed,

    /// The requested partition does not exist.
    #[error("Partition {partition} out of range (topic has {partitions})")]
    NoSuchPartition { partition: u32, partitions: u32 },
}

/// Trait for subscribing to topic partitions.
pub trait BusSubscriber: Send + Sync {
    /// Number of partitions per topic.
    fn partitions(&self) -> u32;

    /// Subscribe to one partition of a topic. Only records published after
    /// this call are observed.
    fn subscribe(&self, topic: &str, partition: u32) -> Result<Subscription, SubscriptionError>;
}

/// A subscription handle for receiving records from one partition.
///
/// Backed by a bounded queue: when it is full, publishers to this partition
/// wait until the subscription catches up. Every committed record is
/// observed, in publish order.
pub struct Subscription {
    receiver: mpsc::Receiver<BusRecord>,
    topic: String,
    partition: u32,
}

impl Subscription {
    pub(crate) fn new(receiver: mpsc::Receiver<BusRecord>, topic: String, partition: u32) -> Self {
        Self {
            receiver,
            topic,
            partition,
        }
    }

    /// Receive the next record.
    ///
    /// # Returns
    ///
    /// - `Some(record)` - The next record on this partition
    /// - `None` - The bus was closed and everything queued has been read
    pub async fn recv(&mut self) -> Option<BusRecord> {
        self.receiver.recv().await
    }

    /// Try to receive the next record without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))` - A record was available
    /// - `Ok(None)` - No record available (would block)
    /// - `Err(SubscriptionError::Closed)` - The bus was closed and drained
    pub fn try_recv(&mut self) -> Result<Option<BusRecord>, SubscriptionError> {
        match self.receiver.try_recv() {
            Ok(record) => Ok(Some(record)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(SubscriptionError::Closed),
        }
    }

    /// Topic of this subscription.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Partition of this subscription.
    #[must_use]
    pub fn partition(&self) -> u32 {
        self.partition
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!(topic = %self.topic, partition = self.partition, "Subscription dropped");
    }
}

//! # Bus Publisher
//!
//! The publishing side of the bus and the in-memory implementation.

use crate::record::{partition_for, BusRecord, OutboundRecord};
use crate::subscriber::{BusSubscriber, Subscription, SubscriptionError};
use crate::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_PARTITIONS};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};

/// Errors from publishing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The bus was shut down.
    #[error("Bus closed")]
    Closed,

    /// A record named no topic.
    #[error("Record has an empty topic")]
    EmptyTopic,

    /// A record exceeded the configured payload limit.
    #[error("Payload of {size} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// The transaction contained no records.
    #[error("Empty transaction")]
    EmptyTransaction,

    /// More records for one partition than a subscriber can buffer.
    #[error("Transaction puts {records} records on one partition (capacity {capacity})")]
    TransactionTooLarge { records: usize, capacity: usize },
}

/// Trait for publishing records to the bus.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Publish a batch of records atomically.
    ///
    /// Either every record becomes visible to subscribers or none does.
    ///
    /// # Returns
    ///
    /// The total number of subscriber deliveries across the batch.
    async fn publish_transaction(
        &self,
        records: Vec<OutboundRecord>,
    ) -> Result<usize, PublishError>;

    /// Publish a single record as its own transaction.
    async fn publish(&self, record: OutboundRecord) -> Result<usize, PublishError> {
        self.publish_transaction(vec![record]).await
    }
}

/// Bus sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Partitions per topic.
    pub partitions: u32,
    /// Records buffered per partition subscriber.
    pub capacity: usize,
    /// Maximum payload size in bytes.
    pub max_payload_bytes: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            partitions: DEFAULT_PARTITIONS,
            capacity: DEFAULT_CHANNEL_CAPACITY,
            max_payload_bytes: 1024 * 1024,
        }
    }
}

struct Topic {
    /// Serializes commits on this topic so transactions do not interleave.
    commit: Arc<Mutex<()>>,
    /// Per partition, one sender per live subscription.
    partitions: Vec<Vec<mpsc::Sender<BusRecord>>>,
}

impl Topic {
    fn new(partitions: u32) -> Self {
        Self {
            commit: Arc::new(Mutex::new(())),
            partitions: (0..partitions).map(|_| Vec::new()).collect(),
        }
    }
}

/// In-memory implementation of the bus.
///
/// Every subscription owns a bounded queue of `capacity` records. A publish
/// waits until each target subscriber has room, so a slow consumer applies
/// backpressure instead of losing records. Topics are created on first use.
/// Suitable for single-process deployments and tests; a distributed
/// deployment would put Kafka or similar behind the same traits.
pub struct InMemoryBus {
    config: BusConfig,

    /// Topic name -> partition subscribers.
    topics: RwLock<HashMap<String, Topic>>,

    /// Flips to `true` on `close`; wakes publishers waiting for room.
    closed: watch::Sender<bool>,

    /// Total records published.
    records_published: AtomicU64,
}

impl InMemoryBus {
    /// Create a bus with default sizing.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with the given sizing. Zero partitions or capacity is
    /// raised to one.
    #[must_use]
    pub fn with_config(mut config: BusConfig) -> Self {
        config.partitions = config.partitions.max(1);
        config.capacity = config.capacity.max(1);
        Self {
            config,
            topics: RwLock::new(HashMap::new()),
            closed: watch::channel(false).0,
            records_published: AtomicU64::new(0),
        }
    }

    /// The bus sizing.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Total records delivered by committed transactions.
    #[must_use]
    pub fn records_published(&self) -> u64 {
        self.records_published.load(Ordering::Relaxed)
    }

    /// Number of live subscriptions on a topic, across all partitions.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, |t| {
            t.partitions
                .iter()
                .flatten()
                .filter(|sender| !sender.is_closed())
                .count()
        })
    }

    /// Shut the bus down.
    ///
    /// Further publishes fail with `PublishError::Closed`, and so does a
    /// publish still waiting for room. Existing subscriptions drain what
    /// they have and then end.
    pub fn close(&self) {
        self.closed.send_replace(true);
        self.topics.write().clear();
        debug!("Bus closed");
    }

    /// True once `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn validate(&self, record: &OutboundRecord) -> Result<(), PublishError> {
        if record.topic.is_empty() {
            return Err(PublishError::EmptyTopic);
        }
        if record.payload.len() > self.config.max_payload_bytes {
            return Err(PublishError::PayloadTooLarge {
                size: record.payload.len(),
                max: self.config.max_payload_bytes,
            });
        }
        Ok(())
    }

    /// A transaction reserves one slot per record in each target queue, so
    /// no partition may receive more records than a queue holds.
    fn check_fits(&self, records: &[OutboundRecord]) -> Result<(), PublishError> {
        let mut per_partition: HashMap<(&str, u32), usize> = HashMap::new();
        for record in records {
            let partition = partition_for(&record.key, self.config.partitions);
            *per_partition
                .entry((record.topic.as_str(), partition))
                .or_default() += 1;
        }
        match per_partition.into_values().max() {
            Some(most) if most > self.config.capacity => Err(PublishError::TransactionTooLarge {
                records: most,
                capacity: self.config.capacity,
            }),
            _ => Ok(()),
        }
    }

    fn commit_locks(&self, records: &[OutboundRecord]) -> Vec<Arc<Mutex<()>>> {
        let names: BTreeSet<&str> = records.iter().map(|r| r.topic.as_str()).collect();
        let mut topics = self.topics.write();
        names
            .into_iter()
            .map(|name| {
                let topic = topics
                    .entry(name.to_string())
                    .or_insert_with(|| Topic::new(self.config.partitions));
                Arc::clone(&topic.commit)
            })
            .collect()
    }

    /// Snapshot the live subscribers of a record's partition.
    fn targets(&self, topic: &str, partition: u32) -> Vec<mpsc::Sender<BusRecord>> {
        self.topics
            .read()
            .get(topic)
            .and_then(|t| t.partitions.get(partition as usize))
            .map(|senders| {
                senders
                    .iter()
                    .filter(|sender| !sender.is_closed())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Resolves once the bus is closed.
async fn closed_signal(mut closed: watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusPublisher for InMemoryBus {
    async fn publish_transaction(
        &self,
        records: Vec<OutboundRecord>,
    ) -> Result<usize, PublishError> {
        if records.is_empty() {
            return Err(PublishError::EmptyTransaction);
        }

        // Validate the whole batch before anything becomes visible.
        for record in &records {
            self.validate(record)?;
        }
        self.check_fits(&records)?;

        if self.is_closed() {
            return Err(PublishError::Closed);
        }
        let closing = closed_signal(self.closed.subscribe());
        tokio::pin!(closing);

        // Topic locks in name order, so concurrent transactions cannot
        // deadlock on each other.
        let mut _commit_guards = Vec::new();
        for lock in self.commit_locks(&records) {
            _commit_guards.push(lock.lock_owned().await);
        }

        let batch: Vec<(BusRecord, Vec<mpsc::Sender<BusRecord>>)> = records
            .into_iter()
            .map(|record| {
                let partition = partition_for(&record.key, self.config.partitions);
                let targets = self.targets(&record.topic, partition);
                let bus_record = BusRecord {
                    topic: record.topic,
                    key: record.key,
                    partition,
                    payload: record.payload,
                };
                (bus_record, targets)
            })
            .collect();

        // Phase 1: a slot in every target queue, or nothing is sent.
        let mut permits = Vec::new();
        for (record, targets) in &batch {
            if targets.is_empty() {
                warn!(
                    topic = %record.topic,
                    partition = record.partition,
                    "Record dropped (no receivers)"
                );
            }
            for sender in targets {
                tokio::select! {
                    permit = sender.reserve() => match permit {
                        Ok(permit) => permits.push((permit, record)),
                        // Subscription dropped since the snapshot.
                        Err(_) => {}
                    },
                    () = &mut closing => return Err(PublishError::Closed),
                }
            }
        }

        // Phase 2: commit.
        let delivered = permits.len();
        for (permit, record) in permits {
            permit.send(record.clone());
        }
        for (record, targets) in &batch {
            self.records_published.fetch_add(1, Ordering::Relaxed);
            debug!(
                topic = %record.topic,
                partition = record.partition,
                receivers = targets.len(),
                "Record published"
            );
        }

        Ok(delivered)
    }
}

impl BusSubscriber for InMemoryBus {
    fn partitions(&self) -> u32 {
        self.config.partitions
    }

    fn subscribe(&self, topic: &str, partition: u32) -> Result<Subscription, SubscriptionError> {
        if self.is_closed() {
            return Err(SubscriptionError::Closed);
        }
        if partition >= self.config.partitions {
            return Err(SubscriptionError::NoSuchPartition {
                partition,
                partitions: self.config.partitions,
            });
        }

        let (sender, receiver) = mpsc::channel(self.config.capacity);
        {
            let mut topics = self.topics.write();
            if self.is_closed() {
                return Err(SubscriptionError::Closed);
            }
            let senders = topics
                .entry(topic.to_string())
                .or_insert_with(|| Topic::new(self.config.partitions))
                .partitions
                .get_mut(partition as usize)
                .ok_or(SubscriptionError::Closed)?;
            senders.retain(|s| !s.is_closed());
            senders.push(sender);
        }

        debug!(topic, partition, "New subscription created");
        Ok(Subscription::new(receiver, topic.to_string(), partition))
    }
}

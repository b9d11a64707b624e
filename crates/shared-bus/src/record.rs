//! # Bus Records

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A record as handed to the bus by a publisher. The bus picks the partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    /// Destination topic.
    pub topic: String,
    /// Partitioning key, the sender's user id for envelopes.
    pub key: String,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

impl OutboundRecord {
    /// Create a record.
    pub fn new(topic: impl Into<String>, key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            payload,
        }
    }
}

/// A record as observed by subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRecord {
    /// Topic the record was published to.
    pub topic: String,
    /// Partitioning key.
    pub key: String,
    /// Partition the record was delivered on.
    pub partition: u32,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

/// Partition for `key` on a topic with `partitions` partitions.
///
/// Stable for the lifetime of the process, which is all an in-memory bus
/// needs. Zero partitions maps everything to partition 0.
#[must_use]
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    if partitions == 0 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % u64::from(partitions)) as u32
}

//! # Shared Bus - Partitioned Broadcast Transport
//!
//! Every participant observes every record on a topic. Topics are split into
//! partitions; records with the same key always land on the same partition, so
//! ordering holds per key.
//!
//! ```text
//! ┌──────────────┐   publish_transaction()   ┌────────────────────────┐
//! │  Producer    │ ────────────────────────► │  iobc.inbound          │
//! └──────────────┘                           │   p0 │ p1 │ p2 │ p3    │ ──► every subscriber
//!                                            └────────────────────────┘     of each partition
//! ```
//!
//! ## Delivery
//!
//! - **Transactional publish:** a batch of records is validated up front and
//!   then delivered together; a rejected batch delivers nothing.
//! - **Backpressure:** each subscription buffers a bounded number of records;
//!   a publisher waits for room rather than dropping a committed record.
//! - **At-least-once:** consumers must tolerate redelivery. `RedeliveryFilter`
//!   drops keys already seen within a time window.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod consumer;
pub mod publisher;
pub mod record;
pub mod redelivery;
pub mod subscriber;

// Re-export main types
pub use consumer::{spawn_partition_consumers, RecordHandler};
pub use publisher::{BusConfig, BusPublisher, InMemoryBus, PublishError};
pub use record::{partition_for, BusRecord, OutboundRecord};
pub use redelivery::RedeliveryFilter;
pub use subscriber::{BusSubscriber, Subscription, SubscriptionError};

/// Topic carrying signed requests towards connectors.
pub const INBOUND_TOPIC: &str = "iobc.inbound";

/// Topic carrying signed replies back to callers.
pub const OUTBOUND_TOPIC: &str = "iobc.outbound";

/// Records to buffer per partition subscriber before publishers wait.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Default number of partitions per topic.
pub const DEFAULT_PARTITIONS: u32 = 4;

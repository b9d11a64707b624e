//! IOBC Client - the caller side of the authenticated request/reply protocol.
//!
//! # Architecture
//!
//! ```text
//! caller ──► InboundProducer ──sign──► register ──► publish ──► iobc.inbound
//!                                          │
//!                                 CorrelationRegistry ◄── remove_expired (sweep)
//!                                          ▲
//! iobc.outbound ──► ReplyConsumer ──► OutboundProcessor
//!  (per partition)                     verify → dedup → shape → listeners → correlate
//! ```
//!
//! Replies on the bus are visible to every participant, including replies
//! to other callers. The dispatcher verifies each one, shows it to every
//! listener, and resolves a pending request only when the correlation key is
//! registered here.
//!
//! # Usage
//!
//! ```ignore
//! let client = IobcClient::new(ClientConfig::default(), bus.clone(), keys);
//! let _tasks = client.start(bus.as_ref(), shutdown_rx)?;
//! let pong = client.ping("alice", "hi").await?;
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod client;
pub mod dispatcher;
pub mod domain;
pub mod listeners;
pub mod producer;

pub use adapters::ReplyConsumer;
pub use client::IobcClient;
pub use dispatcher::{Disposition, OutboundProcessor};
pub use domain::{
    cleanup_task, ClientConfig, ClientError, Completion, ConfigError, CorrelationRegistry,
    DispatchError, ListenerError, PendingReply, RegistryStats, RequestError, SendError,
    TypedFuture,
};
pub use listeners::{
    route_response, Extended, ExtendedListener, IobcListener, ListenerRegistry, NotifyReport,
};
pub use producer::InboundProducer;

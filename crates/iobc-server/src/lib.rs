//! IOBC Server - the gateway side of the authenticated request/reply protocol.
//!
//! # Architecture
//!
//! ```text
//! iobc.inbound ──► RequestConsumer ──► InboundProcessor ──► iobc.outbound
//!  (per partition)                      verify → dedup → DelegateMatcher → sign → publish
//! ```
//!
//! Every request is answered: a request that fails verification gets a
//! failed `Response` with code `iobc:invalid-message-signature`, a request
//! whose delegate fails gets the delegate's error details.

#![allow(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod delegates;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::RequestConsumer;
pub use delegates::{BlockNumberDelegate, PingDelegate, UNKNOWN_CHAIN_CODE};
pub use domain::{
    ConfigError, DelegateError, ServerConfig, ServerError, DEFAULT_SERVER_ID,
    INVALID_SIGNATURE_CODE, UNEXPECTED_INPUT_CODE, UNKNOWN_TYPE_CODE,
};
pub use ports::{DelegateMatcher, IobcDelegate};
pub use service::{InboundProcessor, Outcome};

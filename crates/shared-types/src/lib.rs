//! # Shared Types Crate
//!
//! This crate contains the `AuthenticatedMessage` envelope, the closed
//! `MessageContent` payload union, the `InReplyTo` correlation key and the
//! key material used to sign and verify envelopes.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Every participant on the bus decodes the same types.
//! - **Envelope Integrity**: The signature covers sender, type, message id,
//!   timestamp and payload; mutating any of them invalidates it.
//! - **Envelope Authority**: The envelope's `user_id` is the sole identity used
//!   to look up verification keys and to build correlation keys.

pub mod content;
pub mod envelope;
pub mod errors;
pub mod keys;
pub mod response;
pub mod security;

pub use content::{BlockNumber, GetBlockNumber, MessageContent, PingInput, PingOutput, ReplyShape};
pub use envelope::{AuthenticatedMessage, MessageId, Signature};
pub use errors::*;
pub use keys::{
    DerivedKeyProvider, KeyProvider, KeySpecification, SignatureAlgorithm, SimpleKeyProvider,
};
pub use response::{ErrorDetails, InReplyTo, Response};

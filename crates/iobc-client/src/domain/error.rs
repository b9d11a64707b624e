//! Client error types.
//!
//! `SendError` is returned synchronously from a send and means nothing was
//! registered. `RequestError` is what an awaited request resolves to when it
//! does not succeed.

use shared_bus::PublishError;
use shared_types::{CodecError, ErrorDetails, ShapeMismatch, SigningError};
use std::time::Duration;
use thiserror::Error;

/// Why an awaited request did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The remote party replied with `pass = false`.
    #[error("Remote failure {0}")]
    Remote(ErrorDetails),

    /// The reply succeeded but its result did not have the expected shape.
    #[error("Reply type mismatch: {0}")]
    TypeMismatch(#[from] ShapeMismatch),

    /// Processing the reply failed locally.
    #[error("Reply processing failed: {0}")]
    Processing(String),

    /// No reply arrived before the registration expired.
    #[error("No reply after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// The registration was dropped without being resolved.
    #[error("Request abandoned before a reply arrived")]
    Abandoned,
}

impl RequestError {
    /// The remote error details, if this is a remote failure.
    #[must_use]
    pub fn remote_details(&self) -> Option<&ErrorDetails> {
        match self {
            Self::Remote(details) => Some(details),
            _ => None,
        }
    }

    /// True for `Timeout`.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Why a request could not be sent. These are configuration or transport
/// errors; no registration survives them.
#[derive(Debug, Error)]
pub enum SendError {
    /// The key provider has no signing key for the user.
    #[error("No signing key for user '{user_id}'")]
    NoSigningKey { user_id: String },

    /// The signing key could not sign.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The envelope could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The bus rejected the publish.
    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),
}

/// Errors surfaced by the reply dispatcher to its consumption loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The record did not decode into an envelope.
    #[error("Undecodable record: {0}")]
    Decode(#[from] CodecError),
}

/// A listener failed to handle a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Listener failed: {0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    /// Create a listener error.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Error from the managed client API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    Request(#[from] RequestError),
}

//! # Error Types
//!
//! Errors raised while signing or (de)serializing envelopes.

use thiserror::Error;

/// Errors that can occur while signing an envelope.
///
/// Both variants indicate a misconfigured key provider and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    /// The key names an algorithm this system cannot sign with.
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The key material cannot produce a signature under its algorithm.
    #[error("Invalid {algorithm} key: {reason}")]
    InvalidKey { algorithm: String, reason: String },

    /// The canonical signing bytes could not be produced.
    #[error("Cannot encode message for signing: {0}")]
    Encoding(String),
}

/// Errors raised by the envelope wire codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON encoding or decoding failed (including unknown content kinds).
    #[error("Envelope codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A reply payload did not have the shape the caller declared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Expected {expected}, found {found}")]
pub struct ShapeMismatch {
    /// The shape the caller asked for.
    pub expected: &'static str,
    /// The content kind that arrived, or "no result".
    pub found: String,
}

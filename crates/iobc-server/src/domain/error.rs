//! Server error types.

use serde_json::{Map, Value};
use shared_bus::PublishError;
use shared_types::{CodecError, ErrorDetails, SigningError};
use thiserror::Error;

/// Error code sent back when a request fails verification.
pub const INVALID_SIGNATURE_CODE: &str = "iobc:invalid-message-signature";

/// Error code sent back when no delegate handles the request type.
pub const UNKNOWN_TYPE_CODE: &str = "iobc:unknown-message-type";

/// Error code sent back when a delegate receives content it does not handle.
pub const UNEXPECTED_INPUT_CODE: &str = "iobc:unexpected-input";

/// Failure of a single delegate invocation. Travels back to the caller as
/// `ErrorDetails`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DelegateError {
    /// No delegate registered for the request type.
    #[error("No delegate for message type '{type_name}'")]
    UnknownType { type_name: String },

    /// The request content does not match what the delegate accepts.
    #[error("Delegate '{type_name}' cannot handle {found} content")]
    UnexpectedInput {
        type_name: &'static str,
        found: &'static str,
    },

    /// The delegate ran and reported an error.
    #[error("{code}: {message}")]
    Failed {
        code: String,
        message: String,
        parameters: Map<String, Value>,
    },
}

impl DelegateError {
    /// A delegate-reported failure without parameters.
    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            code: code.into(),
            message: message.into(),
            parameters: Map::new(),
        }
    }

    /// Attach a parameter. No effect on the built-in variants.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Self::Failed { parameters, .. } = &mut self {
            parameters.insert(name.into(), value.into());
        }
        self
    }

    /// The wire code of this error.
    pub fn code(&self) -> &str {
        match self {
            Self::UnknownType { .. } => UNKNOWN_TYPE_CODE,
            Self::UnexpectedInput { .. } => UNEXPECTED_INPUT_CODE,
            Self::Failed { code, .. } => code,
        }
    }

    /// Convert into the details carried by a failed `Response`.
    pub fn to_error_details(&self) -> ErrorDetails {
        match self {
            Self::UnknownType { type_name } => ErrorDetails::new(self.code(), self.to_string())
                .with_parameter("type", type_name.as_str()),
            Self::UnexpectedInput { found, .. } => {
                ErrorDetails::new(self.code(), self.to_string()).with_parameter("kind", *found)
            }
            Self::Failed {
                code,
                message,
                parameters,
            } => {
                let mut details = ErrorDetails::new(code.as_str(), message.as_str());
                details.parameters = parameters.clone();
                details
            }
        }
    }
}

/// Errors that stop a reply from being published.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("No signing key for server identity '{server_id}'")]
    NoServerKey { server_id: String },

    #[error("Signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("Encoding failed: {0}")]
    Codec(#[from] CodecError),

    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),
}

//! # Responses
//!
//! The pass/fail reply published on the reply topic, the `InReplyTo`
//! correlation key it carries, and the structured error details of a failure.

use crate::content::MessageContent;
use crate::envelope::MessageId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Record of which request a reply answers.
///
/// Built from the *request* envelope (`AuthenticatedMessage::build_in_reply_to`)
/// and copied verbatim into the reply by the replying party. Compared
/// structurally, so it is used directly as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InReplyTo {
    /// The user that sent the request.
    pub user_id: String,
    /// The request's message id.
    pub message_id: MessageId,
}

impl InReplyTo {
    /// Create a correlation key.
    pub fn new(user_id: impl Into<String>, message_id: MessageId) -> Self {
        Self {
            user_id: user_id.into(),
            message_id,
        }
    }
}

impl fmt::Display for InReplyTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "< {} | {} >", self.user_id, self.message_id)
    }
}

/// Error details for an unsuccessful processing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// An error code that indicates the kind of failure.
    pub code: String,
    /// A human-readable error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Parameters associated with the error.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ErrorDetails {
    /// Code used when a failed reply carries no details.
    pub const UNKNOWN_CODE: &'static str = "unknown";

    /// Create error details with no parameters.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: Some(message.into()),
            parameters: Map::new(),
        }
    }

    /// Add a structured parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Placeholder substituted when a reply fails without saying why.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::new(Self::UNKNOWN_CODE, "N/A")
    }

    /// The message if present, otherwise the code.
    #[must_use]
    pub fn describe(&self) -> &str {
        self.message.as_deref().unwrap_or(&self.code)
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.describe())
    }
}

/// A pass or fail response.
///
/// Well-formed responses carry `error_details` only when `pass` is false and
/// `result` only when `pass` is true. A passing response may carry no result
/// when the operation has nothing to return. Deserialized responses are not
/// trusted to be well-formed; consumers must tolerate a failing response with
/// no details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// The request this is in reply to.
    pub in_reply_to: InReplyTo,
    /// If true the operation was handled successfully.
    pub pass: bool,
    /// The operation result if it was a success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<MessageContent>>,
    /// The error details if the operation was not a success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
}

impl Response {
    /// A passing response carrying a result.
    pub fn success(in_reply_to: InReplyTo, result: MessageContent) -> Self {
        Self {
            in_reply_to,
            pass: true,
            result: Some(Box::new(result)),
            error_details: None,
        }
    }

    /// A passing response for an operation with nothing to return.
    pub fn success_empty(in_reply_to: InReplyTo) -> Self {
        Self {
            in_reply_to,
            pass: true,
            result: None,
            error_details: None,
        }
    }

    /// A failing response.
    pub fn failure(in_reply_to: InReplyTo, details: ErrorDetails) -> Self {
        Self {
            in_reply_to,
            pass: false,
            result: None,
            error_details: Some(details),
        }
    }

    /// The failure details, or the placeholder if a failing reply omitted them.
    #[must_use]
    pub fn error_details_or_placeholder(&self) -> ErrorDetails {
        self.error_details
            .clone()
            .unwrap_or_else(ErrorDetails::placeholder)
    }

    /// Borrow the result content, if any.
    #[must_use]
    pub fn result(&self) -> Option<&MessageContent> {
        self.result.as_deref()
    }

    /// True when the populated fields agree with the pass flag.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        if self.pass {
            self.error_details.is_none()
        } else {
            self.result.is_none() && self.error_details.is_some()
        }
    }
}

//! # Message Content
//!
//! The closed set of payloads an envelope can carry. The `kind` tag selects
//! the decoder; an unknown tag fails deserialization instead of producing an
//! opaque value.

use crate::errors::ShapeMismatch;
use crate::response::Response;
use serde::{Deserialize, Serialize};

/// Payload of an `AuthenticatedMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageContent {
    /// Connectivity check, echoed back by the server.
    Ping(PingInput),
    /// Reply to `Ping`.
    PingReply(PingOutput),
    /// Ask a connector for its current block height.
    GetBlockNumber(GetBlockNumber),
    /// Reply to `GetBlockNumber`.
    BlockNumber(BlockNumber),
    /// Pass/fail reply to any request. The only content on the reply topic.
    Response(Response),
}

impl MessageContent {
    /// The wire tag of this content.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping(_) => "PING",
            Self::PingReply(_) => "PING_REPLY",
            Self::GetBlockNumber(_) => "GET_BLOCK_NUMBER",
            Self::BlockNumber(_) => "BLOCK_NUMBER",
            Self::Response(_) => "RESPONSE",
        }
    }

    /// Borrow the `Response` if this content is one.
    #[must_use]
    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Self::Response(response) => Some(response),
            _ => None,
        }
    }
}

/// Input to the `PING` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingInput {
    /// The message to echo back.
    pub message: String,
}

/// Output of the `PING` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingOutput {
    /// The message copied from the input.
    pub message: String,
    /// When the ping was processed (ms since epoch).
    pub time: u64,
}

/// Input to the `GET_BLOCK_NUMBER` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBlockNumber {
    /// Which configured chain to ask.
    pub chain_id: String,
}

/// Output of the `GET_BLOCK_NUMBER` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockNumber {
    /// The chain that was asked.
    pub chain_id: String,
    /// Current block height.
    pub number: u64,
}

/// The shape a caller expects a reply result to have.
///
/// `()` means "no result": a reply carrying any content is a mismatch.
/// `MessageContent` accepts any content but still requires one.
pub trait ReplyShape: Sized + Send + 'static {
    /// Human-readable name of the shape, used in mismatch reports.
    const SHAPE: &'static str;

    /// Convert a reply result into this shape.
    fn from_reply(result: Option<MessageContent>) -> Result<Self, ShapeMismatch>;
}

const NO_RESULT: &str = "no result";

fn found(result: &Option<MessageContent>) -> String {
    result
        .as_ref()
        .map_or_else(|| NO_RESULT.to_string(), |c| c.kind().to_string())
}

impl ReplyShape for () {
    const SHAPE: &'static str = NO_RESULT;

    fn from_reply(result: Option<MessageContent>) -> Result<Self, ShapeMismatch> {
        match result {
            None => Ok(()),
            Some(_) => Err(ShapeMismatch {
                expected: Self::SHAPE,
                found: found(&result),
            }),
        }
    }
}

impl ReplyShape for MessageContent {
    const SHAPE: &'static str = "any content";

    fn from_reply(result: Option<MessageContent>) -> Result<Self, ShapeMismatch> {
        result.ok_or(ShapeMismatch {
            expected: Self::SHAPE,
            found: NO_RESULT.to_string(),
        })
    }
}

macro_rules! reply_shape {
    ($ty:ty, $variant:ident, $tag:literal) => {
        impl ReplyShape for $ty {
            const SHAPE: &'static str = $tag;

            fn from_reply(result: Option<MessageContent>) -> Result<Self, ShapeMismatch> {
                match result {
                    Some(MessageContent::$variant(value)) => Ok(value),
                    other => Err(ShapeMismatch {
                        expected: Self::SHAPE,
                        found: found(&other),
                    }),
                }
            }
        }
    };
}

reply_shape!(PingInput, Ping, "PING");
reply_shape!(PingOutput, PingReply, "PING_REPLY");
reply_shape!(GetBlockNumber, GetBlockNumber, "GET_BLOCK_NUMBER");
reply_shape!(BlockNumber, BlockNumber, "BLOCK_NUMBER");
reply_shape!(Response, Response, "RESPONSE");

//! Built-in delegates.
//!
//! `PING` answers connectivity checks. `GET_BLOCK_NUMBER` is served by a
//! stand-in connector that keeps one counter per chain.

use crate::domain::error::DelegateError;
use crate::ports::delegate::IobcDelegate;
use async_trait::async_trait;
use dashmap::DashMap;
use shared_types::security::current_timestamp_millis;
use shared_types::{BlockNumber, MessageContent, PingOutput};
use std::sync::atomic::{AtomicU64, Ordering};

/// Error code for a chain the connector does not serve.
pub const UNKNOWN_CHAIN_CODE: &str = "connector:unknown-chain";

/// Echoes the ping message with the time it was processed.
#[derive(Debug, Default, Clone, Copy)]
pub struct PingDelegate;

#[async_trait]
impl IobcDelegate for PingDelegate {
    fn type_name(&self) -> &'static str {
        "PING"
    }

    async fn apply(&self, input: &MessageContent) -> Result<MessageContent, DelegateError> {
        match input {
            MessageContent::Ping(ping) => Ok(MessageContent::PingReply(PingOutput {
                message: ping.message.clone(),
                time: current_timestamp_millis(),
            })),
            other => Err(DelegateError::UnexpectedInput {
                type_name: self.type_name(),
                found: other.kind(),
            }),
        }
    }
}

/// Reports a block height per chain. Each query advances the chain by one
/// block so consecutive answers are distinguishable.
#[derive(Debug, Default)]
pub struct BlockNumberDelegate {
    heights: DashMap<String, AtomicU64>,
}

impl BlockNumberDelegate {
    /// A connector serving no chains.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `chain_id` starting at `height`.
    #[must_use]
    pub fn with_chain(self, chain_id: impl Into<String>, height: u64) -> Self {
        self.set_height(chain_id, height);
        self
    }

    /// Set the next height reported for `chain_id`.
    pub fn set_height(&self, chain_id: impl Into<String>, height: u64) {
        self.heights.insert(chain_id.into(), AtomicU64::new(height));
    }

    /// The next height `chain_id` would report, if served.
    pub fn height(&self, chain_id: &str) -> Option<u64> {
        self.heights
            .get(chain_id)
            .map(|h| h.value().load(Ordering::SeqCst))
    }
}

#[async_trait]
impl IobcDelegate for BlockNumberDelegate {
    fn type_name(&self) -> &'static str {
        "GET_BLOCK_NUMBER"
    }

    async fn apply(&self, input: &MessageContent) -> Result<MessageContent, DelegateError> {
        let MessageContent::GetBlockNumber(query) = input else {
            return Err(DelegateError::UnexpectedInput {
                type_name: self.type_name(),
                found: input.kind(),
            });
        };

        let number = self
            .heights
            .get(&query.chain_id)
            .map(|h| h.value().fetch_add(1, Ordering::SeqCst))
            .ok_or_else(|| {
                DelegateError::failed(UNKNOWN_CHAIN_CODE, "chain is not served by this connector")
                    .with_parameter("chainId", query.chain_id.as_str())
            })?;

        Ok(MessageContent::BlockNumber(BlockNumber {
            chain_id: query.chain_id.clone(),
            number,
        }))
    }
}

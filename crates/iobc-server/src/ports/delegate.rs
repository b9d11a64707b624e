//! # Delegate Port
//!
//! A delegate turns one request payload into one reply payload. The server
//! selects the delegate by the envelope's message type.

use crate::domain::error::DelegateError;
use async_trait::async_trait;
use dashmap::DashMap;
use shared_types::MessageContent;
use std::sync::Arc;
use tracing::debug;

/// Handler for one message type.
///
/// Implementations must be thread-safe (`Send + Sync`); one instance serves
/// every partition concurrently.
#[async_trait]
pub trait IobcDelegate: Send + Sync {
    /// The message type this delegate answers, e.g. `"PING"`.
    fn type_name(&self) -> &'static str;

    /// Produce the reply payload for `input`.
    async fn apply(&self, input: &MessageContent) -> Result<MessageContent, DelegateError>;
}

/// Message type → delegate lookup.
#[derive(Default)]
pub struct DelegateMatcher {
    delegates: DashMap<String, Arc<dyn IobcDelegate>>,
}

impl DelegateMatcher {
    /// An empty matcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a delegate under its type name, returning any delegate it
    /// replaced.
    pub fn register(&self, delegate: Arc<dyn IobcDelegate>) -> Option<Arc<dyn IobcDelegate>> {
        let type_name = delegate.type_name();
        debug!(type_name, "Delegate registered");
        self.delegates.insert(type_name.to_string(), delegate)
    }

    /// Builder form of `register`.
    #[must_use]
    pub fn with(self, delegate: Arc<dyn IobcDelegate>) -> Self {
        self.register(delegate);
        self
    }

    /// Look up the delegate for `type_name`.
    pub fn get(&self, type_name: &str) -> Option<Arc<dyn IobcDelegate>> {
        self.delegates
            .get(type_name)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.delegates.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Dispatch `input` to the delegate for `type_name`.
    pub async fn apply(
        &self,
        type_name: &str,
        input: &MessageContent,
    ) -> Result<MessageContent, DelegateError> {
        // Clone the Arc out so no map guard is held across the await.
        let delegate = self
            .get(type_name)
            .ok_or_else(|| DelegateError::UnknownType {
                type_name: type_name.to_string(),
            })?;
        delegate.apply(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{PingInput, PingOutput};

    struct Echo;

    #[async_trait]
    impl IobcDelegate for Echo {
        fn type_name(&self) -> &'static str {
            "ECHO"
        }

        async fn apply(&self, input: &MessageContent) -> Result<MessageContent, DelegateError> {
            Ok(input.clone())
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_type_name() {
        let matcher = DelegateMatcher::new().with(Arc::new(Echo));
        let input = MessageContent::Ping(PingInput {
            message: "x".into(),
        });

        assert_eq!(matcher.apply("ECHO", &input).await.unwrap(), input);
        assert_eq!(matcher.type_names(), vec!["ECHO".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_type() {
        let matcher = DelegateMatcher::new();
        let input = MessageContent::PingReply(PingOutput {
            message: "x".into(),
            time: 0,
        });

        let err = matcher.apply("NOPE", &input).await.unwrap_err();
        assert_eq!(
            err,
            DelegateError::UnknownType {
                type_name: "NOPE".into()
            }
        );
    }

    #[test]
    fn test_register_replaces() {
        let matcher = DelegateMatcher::new();
        assert!(matcher.register(Arc::new(Echo)).is_none());
        assert!(matcher.register(Arc::new(Echo)).is_some());
        assert_eq!(matcher.type_names().len(), 1);
    }
}

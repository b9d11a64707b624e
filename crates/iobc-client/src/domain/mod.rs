//! Domain types for the IOBC client.
//!
//! Configuration, errors, pending requests and the correlation registry.

pub mod config;
pub mod correlation;
pub mod error;
pub mod pending;

// Re-exports for convenience
pub use config::{ClientConfig, ConfigError};
pub use correlation::{cleanup_task, CorrelationRegistry, RegistryStats};
pub use error::{ClientError, DispatchError, ListenerError, RequestError, SendError};
pub use pending::{Completion, PendingReply, TypedFuture};

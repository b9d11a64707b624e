//! Domain layer: configuration and errors.

pub mod config;
pub mod error;

pub use config::{ConfigError, ServerConfig, DEFAULT_SERVER_ID};
pub use error::{
    DelegateError, ServerError, INVALID_SIGNATURE_CODE, UNEXPECTED_INPUT_CODE, UNKNOWN_TYPE_CODE,
};

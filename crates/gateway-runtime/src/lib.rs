//! # Gateway Runtime Library
//!
//! Configuration loading and process wiring for the gateway binary,
//! exposed for tests. The main entry point is the `main.rs` binary.

#![allow(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod runtime;

pub use config::{ConfigError, GatewayConfig, KeyEntry};
pub use runtime::{GatewayRuntime, RuntimeError};

//! Ports: the delegate contract the server dispatches through.

pub mod delegate;

pub use delegate::{DelegateMatcher, IobcDelegate};

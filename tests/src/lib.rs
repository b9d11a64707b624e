//! # IOBC Test Suite
//!
//! Cross-crate flows over the in-memory bus.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── support.rs    # Harness: bus, keys, client, server
//!     ├── flows.rs      # Request/reply round trips, failures, timeouts
//!     └── listeners.rs  # Fan-out, fault isolation, shared visibility
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p iobc-tests
//! cargo test -p iobc-tests integration::flows::
//! ```

#![allow(dead_code)]

pub mod integration;

//! # Shared Crypto - Envelope Signature Primitives
//!
//! Asymmetric signature schemes used to sign and verify IOBC envelopes.
//! Symmetric HMAC signing lives next to the envelope in `shared-types`,
//! since it needs nothing beyond a shared secret.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `signatures` | Ed25519 | Envelope signing for service identities |
//! | `ecdsa` | secp256k1 | Envelope signing with ledger-compatible keys |
//!
//! ## Security Properties
//!
//! - **Ed25519**: Deterministic nonces, no RNG dependency
//! - **secp256k1**: RFC 6979 deterministic, low-S normalization

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod signatures;

// Re-exports
pub use ecdsa::{Secp256k1KeyPair, Secp256k1PublicKey, Secp256k1Signature};
pub use errors::CryptoError;
pub use signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

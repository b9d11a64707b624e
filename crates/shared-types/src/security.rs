//! # Envelope Signing
//!
//! The single implementation of signature creation and verification for
//! envelopes. Callers hand over the canonical signing bytes and a
//! `KeySpecification`; the key's algorithm selects the scheme.
//!
//! ## Key Material Per Algorithm
//!
//! | Algorithm | Signing key | Verifying key |
//! |-----------|-------------|---------------|
//! | `HmacSHA256` | shared secret | same shared secret |
//! | `Ed25519` | 32-byte seed | 32-byte public key |
//! | `ES256K` | 32-byte secret scalar | 33-byte compressed public key |

use crate::envelope::Signature;
use crate::errors::SigningError;
use crate::keys::{KeySpecification, SignatureAlgorithm};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use shared_crypto::{
    Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, Secp256k1KeyPair, Secp256k1PublicKey,
    Secp256k1Signature,
};
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// HMAC
// =============================================================================

/// Signs bytes with HMAC-SHA256.
///
/// Returns `None` only if the secret is rejected by the MAC, which HMAC
/// never does for any length; callers treat `None` as an invalid key.
pub fn sign_hmac(message_bytes: &[u8], shared_secret: &[u8]) -> Option<[u8; 32]> {
    let mut mac = HmacSha256::new_from_slice(shared_secret).ok()?;
    mac.update(message_bytes);
    Some(mac.finalize().into_bytes().into())
}

/// Validates an HMAC-SHA256 tag.
///
/// # Security
///
/// Uses constant-time comparison to prevent timing attacks.
pub fn validate_hmac_signature(message_bytes: &[u8], tag: &[u8], shared_secret: &[u8]) -> bool {
    let mut mac = match HmacSha256::new_from_slice(shared_secret) {
        Ok(m) => m,
        Err(_) => return false,
    };

    mac.update(message_bytes);

    mac.verify_slice(tag).is_ok()
}

// =============================================================================
// ALGORITHM DISPATCH
// =============================================================================

fn invalid_key(algorithm: SignatureAlgorithm, reason: impl ToString) -> SigningError {
    SigningError::InvalidKey {
        algorithm: algorithm.name().to_string(),
        reason: reason.to_string(),
    }
}

/// Signs `message_bytes` with `key`.
///
/// # Errors
///
/// - `UnsupportedAlgorithm` if the key names an unknown algorithm
/// - `InvalidKey` if the material is empty or the wrong size
pub fn sign_payload(
    key: &KeySpecification,
    message_bytes: &[u8],
) -> Result<Signature, SigningError> {
    let algorithm = key.algorithm()?;
    let material = key.material();

    let value = match algorithm {
        SignatureAlgorithm::HmacSha256 => {
            if material.is_empty() {
                return Err(invalid_key(algorithm, "empty shared secret"));
            }
            sign_hmac(message_bytes, material)
                .ok_or_else(|| invalid_key(algorithm, "secret rejected"))?
                .to_vec()
        }
        SignatureAlgorithm::Ed25519 => {
            let keypair = Ed25519KeyPair::from_seed_slice(material)
                .map_err(|e| invalid_key(algorithm, e))?;
            keypair.sign(message_bytes).as_bytes().to_vec()
        }
        SignatureAlgorithm::Es256k => {
            let keypair =
                Secp256k1KeyPair::from_slice(material).map_err(|e| invalid_key(algorithm, e))?;
            keypair.sign(message_bytes).as_bytes().to_vec()
        }
    };

    Ok(Signature::new(algorithm.name(), value))
}

/// Checks `signature` over `message_bytes` against `key`.
///
/// Any failure, including an algorithm mismatch between the signature and the
/// key, an unknown algorithm, or malformed key material, is `false`.
pub fn verify_payload(key: &KeySpecification, message_bytes: &[u8], signature: &Signature) -> bool {
    let Ok(algorithm) = key.algorithm() else {
        return false;
    };
    if signature.algorithm != algorithm.name() {
        return false;
    }
    let material = key.material();

    match algorithm {
        SignatureAlgorithm::HmacSha256 => {
            !material.is_empty()
                && validate_hmac_signature(message_bytes, &signature.value, material)
        }
        SignatureAlgorithm::Ed25519 => {
            let (Ok(public), Ok(sig)) = (
                Ed25519PublicKey::from_slice(material),
                Ed25519Signature::from_slice(&signature.value),
            ) else {
                return false;
            };
            public.verify(message_bytes, &sig).is_ok()
        }
        SignatureAlgorithm::Es256k => {
            let (Ok(public), Ok(sig)) = (
                Secp256k1PublicKey::from_slice(material),
                Secp256k1Signature::from_slice(&signature.value),
            ) else {
                return false;
            };
            public.verify(message_bytes, &sig).is_ok()
        }
    }
}

// =============================================================================
// TIME
// =============================================================================

/// Returns the current Unix time in milliseconds.
///
/// If the system clock is before `UNIX_EPOCH` this returns 0 rather than
/// panicking.
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

//! # Key Material
//!
//! Key specifications and the `KeyProvider` lookup used to sign outgoing
//! envelopes and verify incoming ones.

use crate::errors::SigningError;
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use sha2::Sha256;
use shared_crypto::{CryptoError, Ed25519KeyPair, Secp256k1KeyPair};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Signature algorithms this system can sign and verify with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// HMAC-SHA256 over a shared secret.
    HmacSha256,
    /// Ed25519. Signing keys are 32-byte seeds, verifying keys 32-byte points.
    Ed25519,
    /// ECDSA over secp256k1 with SHA-256. Signing keys are 32-byte scalars,
    /// verifying keys 33-byte compressed points.
    Es256k,
}

impl SignatureAlgorithm {
    /// The algorithm's identifier as written on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::HmacSha256 => "HmacSHA256",
            Self::Ed25519 => "Ed25519",
            Self::Es256k => "ES256K",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = SigningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HmacSHA256" => Ok(Self::HmacSha256),
            "Ed25519" => Ok(Self::Ed25519),
            "ES256K" => Ok(Self::Es256k),
            other => Err(SigningError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// A key plus the algorithm it is meant for.
///
/// The algorithm is kept as a name and only parsed when the key is used, so a
/// provider configured with an unknown algorithm surfaces as
/// `SigningError::UnsupportedAlgorithm` at signing time.
#[derive(Clone)]
pub struct KeySpecification {
    key_id: String,
    algorithm: String,
    material: Zeroizing<Vec<u8>>,
}

impl KeySpecification {
    /// Create a key specification.
    pub fn new(key_id: impl Into<String>, algorithm: impl Into<String>, material: Vec<u8>) -> Self {
        Self {
            key_id: key_id.into(),
            algorithm: algorithm.into(),
            material: Zeroizing::new(material),
        }
    }

    /// An HMAC-SHA256 shared secret (used for both signing and verifying).
    pub fn hmac_sha256(key_id: impl Into<String>, secret: impl AsRef<[u8]>) -> Self {
        Self::new(key_id, SignatureAlgorithm::HmacSha256.name(), secret.as_ref().to_vec())
    }

    /// An Ed25519 signing seed or verifying key.
    pub fn ed25519(key_id: impl Into<String>, material: impl AsRef<[u8]>) -> Self {
        Self::new(key_id, SignatureAlgorithm::Ed25519.name(), material.as_ref().to_vec())
    }

    /// A secp256k1 signing scalar or compressed verifying key.
    pub fn es256k(key_id: impl Into<String>, material: impl AsRef<[u8]>) -> Self {
        Self::new(key_id, SignatureAlgorithm::Es256k.name(), material.as_ref().to_vec())
    }

    /// The key identifier.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// The algorithm name as configured.
    #[must_use]
    pub fn algorithm_name(&self) -> &str {
        &self.algorithm
    }

    /// The parsed algorithm.
    pub fn algorithm(&self) -> Result<SignatureAlgorithm, SigningError> {
        self.algorithm.parse()
    }

    /// Raw key material.
    #[must_use]
    pub fn material(&self) -> &[u8] {
        &self.material
    }

    /// The key that verifies signatures made with this signing key.
    ///
    /// HMAC keys are symmetric and verify themselves. Ed25519 seeds and
    /// secp256k1 scalars map to their public keys.
    pub fn to_verifying_key(&self) -> Result<KeySpecification, SigningError> {
        let algorithm = self.algorithm()?;
        let invalid = |reason: CryptoError| SigningError::InvalidKey {
            algorithm: algorithm.name().to_string(),
            reason: reason.to_string(),
        };

        let material = match algorithm {
            SignatureAlgorithm::HmacSha256 => self.material.to_vec(),
            SignatureAlgorithm::Ed25519 => Ed25519KeyPair::from_seed_slice(&self.material)
                .map_err(invalid)?
                .public_key()
                .as_bytes()
                .to_vec(),
            SignatureAlgorithm::Es256k => Secp256k1KeyPair::from_slice(&self.material)
                .map_err(invalid)?
                .public_key()
                .as_bytes()
                .to_vec(),
        };
        Ok(Self::new(self.key_id.clone(), algorithm.name(), material))
    }
}

impl fmt::Debug for KeySpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySpecification")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("material", &"<redacted>")
            .finish()
    }
}

/// Lookup of signing and verification keys per user identity.
///
/// Implementations might:
/// - Hold keys loaded from configuration
/// - Derive keys from a master secret
/// - Query a key management service
pub trait KeyProvider: Send + Sync {
    /// Key used to sign messages sent as `user_id`. `None` is fatal for a send.
    fn signing_key(&self, user_id: &str) -> Option<KeySpecification>;

    /// Key used to verify messages claiming to come from `user_id`.
    /// `None` means such messages are dropped.
    fn verifying_key(&self, user_id: &str) -> Option<KeySpecification>;
}

impl<K: KeyProvider + ?Sized> KeyProvider for Arc<K> {
    fn signing_key(&self, user_id: &str) -> Option<KeySpecification> {
        (**self).signing_key(user_id)
    }

    fn verifying_key(&self, user_id: &str) -> Option<KeySpecification> {
        (**self).verifying_key(user_id)
    }
}

/// Provider which stores keys in maps and must be explicitly loaded.
#[derive(Default)]
pub struct SimpleKeyProvider {
    signing_keys: RwLock<HashMap<String, KeySpecification>>,
    verifying_keys: RwLock<HashMap<String, KeySpecification>>,
}

impl SimpleKeyProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the signing key for a user.
    pub fn set_signing_key(&self, user_id: impl Into<String>, key: Option<KeySpecification>) {
        let user_id = user_id.into();
        let mut keys = self.signing_keys.write();
        match key {
            Some(key) => keys.insert(user_id, key),
            None => keys.remove(&user_id),
        };
    }

    /// Set or clear the verifying key for a user.
    pub fn set_verifying_key(&self, user_id: impl Into<String>, key: Option<KeySpecification>) {
        let user_id = user_id.into();
        let mut keys = self.verifying_keys.write();
        match key {
            Some(key) => keys.insert(user_id, key),
            None => keys.remove(&user_id),
        };
    }

    /// Use one HMAC-SHA256 shared secret for both signing and verifying.
    pub fn set_symmetric_shared_secret(&self, user_id: &str, secret: impl AsRef<[u8]>) {
        let key = KeySpecification::hmac_sha256(user_id, secret);
        self.set_signing_key(user_id, Some(key.clone()));
        self.set_verifying_key(user_id, Some(key));
    }
}

impl KeyProvider for SimpleKeyProvider {
    fn signing_key(&self, user_id: &str) -> Option<KeySpecification> {
        self.signing_keys.read().get(user_id).cloned()
    }

    fn verifying_key(&self, user_id: &str) -> Option<KeySpecification> {
        self.verifying_keys.read().get(user_id).cloned()
    }
}

/// A provider that derives a per-user HMAC secret from a master secret.
///
/// Every user shares the master; suitable for single-trust-domain deployments
/// and tests. For production, load real keys into a `SimpleKeyProvider`.
#[derive(Clone)]
pub struct DerivedKeyProvider {
    master_secret: Zeroizing<Vec<u8>>,
}

impl DerivedKeyProvider {
    /// Creates a new key provider with the given master secret.
    pub fn new(master_secret: Vec<u8>) -> Self {
        Self {
            master_secret: Zeroizing::new(master_secret),
        }
    }

    /// Derives a user-specific key from the master secret.
    fn derive_key(&self, user_id: &str) -> Option<KeySpecification> {
        let mut mac = HmacSha256::new_from_slice(&self.master_secret).ok()?;
        mac.update(user_id.as_bytes());
        let secret = mac.finalize().into_bytes();
        Some(KeySpecification::hmac_sha256(user_id, secret))
    }
}

impl KeyProvider for DerivedKeyProvider {
    fn signing_key(&self, user_id: &str) -> Option<KeySpecification> {
        self.derive_key(user_id)
    }

    fn verifying_key(&self, user_id: &str) -> Option<KeySpecification> {
        self.derive_key(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_names_roundtrip() {
        for alg in [
            SignatureAlgorithm::HmacSha256,
            SignatureAlgorithm::Ed25519,
            SignatureAlgorithm::Es256k,
        ] {
            assert_eq!(alg.name().parse::<SignatureAlgorithm>().unwrap(), alg);
        }
    }

    #[test]
    fn test_unknown_algorithm() {
        let key = KeySpecification::new("k", "RSA-PSS", vec![1, 2, 3]);
        assert_eq!(
            key.algorithm(),
            Err(SigningError::UnsupportedAlgorithm("RSA-PSS".into()))
        );
    }

    #[test]
    fn test_verifying_key_checks_own_signatures() {
        use crate::security::{sign_payload, verify_payload};

        for signing in [
            KeySpecification::hmac_sha256("k", b"secret"),
            KeySpecification::ed25519("k", [7u8; 32]),
            KeySpecification::es256k("k", [9u8; 32]),
        ] {
            let verifying = signing.to_verifying_key().unwrap();
            let signature = sign_payload(&signing, b"payload").unwrap();
            assert!(verify_payload(&verifying, b"payload", &signature));
        }
    }

    #[test]
    fn test_verifying_key_rejects_bad_material() {
        let key = KeySpecification::ed25519("k", [1u8; 5]);
        assert!(matches!(
            key.to_verifying_key(),
            Err(SigningError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_material() {
        let key = KeySpecification::hmac_sha256("k", b"super-secret");
        let debug = format!("{key:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("super"));
    }

    #[test]
    fn test_simple_provider_set_and_clear() {
        let provider = SimpleKeyProvider::new();
        provider.set_symmetric_shared_secret("alice", b"s3cret");

        assert!(provider.signing_key("alice").is_some());
        assert!(provider.verifying_key("alice").is_some());
        assert!(provider.signing_key("bob").is_none());

        provider.set_signing_key("alice", None);
        assert!(provider.signing_key("alice").is_none());
        assert!(provider.verifying_key("alice").is_some());
    }

    #[test]
    fn test_derived_key_provider() {
        let provider = DerivedKeyProvider::new(b"master_secret".to_vec());

        let alice = provider.signing_key("alice").unwrap();
        let bob = provider.signing_key("bob").unwrap();

        // Keys should be different for different users
        assert_ne!(alice.material(), bob.material());

        // Same user should get same key, for both directions
        let alice_again = provider.verifying_key("alice").unwrap();
        assert_eq!(alice.material(), alice_again.material());
    }

    #[test]
    fn test_arc_provider_delegates() {
        let provider = Arc::new(SimpleKeyProvider::new());
        provider.set_symmetric_shared_secret("alice", b"x");
        let shared: Arc<dyn KeyProvider> = provider;
        assert!(shared.signing_key("alice").is_some());
    }
}

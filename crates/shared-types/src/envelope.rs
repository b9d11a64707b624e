//! # `AuthenticatedMessage` Envelope
//!
//! The signed unit of transport for every message on the bus.
//!
//! ## Security Properties
//!
//! - **Canonical Signing Bytes**: The signature covers `{userId, type,
//!   messageId, timestamp, content}` serialized in that fixed order.
//! - **Envelope Authority**: `user_id` is the sole identity used to look up
//!   the verification key and to build the correlation key.
//! - **Immutable After Signing**: Fields are private; the only mutation is
//!   `sign`, which replaces timestamp and signature together.

use crate::content::MessageContent;
use crate::errors::{CodecError, SigningError};
use crate::keys::KeySpecification;
use crate::response::InReplyTo;
use crate::security::{current_timestamp_millis, sign_payload, verify_payload};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Identifier of a message, unique per sender.
///
/// Generated ids are time-ordered UUID v7 values without hyphens. Ids received
/// from the wire are taken as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    /// Borrow the id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A signature plus the algorithm that produced it.
///
/// The algorithm is kept as received so an envelope signed with an algorithm
/// this system does not know still decodes; it simply never verifies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    /// Algorithm identifier, e.g. `HmacSHA256`.
    pub algorithm: String,
    /// Raw signature bytes, hex on the wire.
    #[serde(with = "hex")]
    pub value: Vec<u8>,
}

impl Signature {
    /// Create a signature.
    pub fn new(algorithm: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            algorithm: algorithm.into(),
            value,
        }
    }
}

/// Borrowed view of the signed fields, in canonical order.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SigningView<'a> {
    user_id: &'a str,
    #[serde(rename = "type")]
    message_type: &'a str,
    message_id: &'a MessageId,
    timestamp: u64,
    content: &'a MessageContent,
}

/// The message envelope for all bus traffic.
///
/// Equality covers every field including the signature, so two independently
/// decoded copies of the same signed message compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedMessage {
    user_id: String,
    #[serde(rename = "type")]
    message_type: String,
    message_id: MessageId,
    timestamp: u64,
    content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<Signature>,
}

impl AuthenticatedMessage {
    /// Build an unsigned envelope with a freshly generated message id.
    pub fn new(
        user_id: impl Into<String>,
        message_type: impl Into<String>,
        content: MessageContent,
    ) -> Self {
        Self::with_id(user_id, message_type, MessageId::generate(), content)
    }

    /// Build an unsigned envelope with an explicit message id.
    pub fn with_id(
        user_id: impl Into<String>,
        message_type: impl Into<String>,
        message_id: MessageId,
        content: MessageContent,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            message_type: message_type.into(),
            message_id,
            timestamp: current_timestamp_millis(),
            content,
            signature: None,
        }
    }

    /// The sender identity.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The command or response discriminator.
    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// The message id.
    #[must_use]
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Creation or signing time, ms since epoch.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The payload.
    #[must_use]
    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    /// The signature, if signed.
    #[must_use]
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// True once `sign` has succeeded (or a signed envelope was decoded).
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    fn signing_bytes_at(&self, timestamp: u64) -> Result<Vec<u8>, SigningError> {
        let view = SigningView {
            user_id: &self.user_id,
            message_type: &self.message_type,
            message_id: &self.message_id,
            timestamp,
            content: &self.content,
        };
        serde_json::to_vec(&view).map_err(|e| SigningError::Encoding(e.to_string()))
    }

    /// Canonical bytes covered by the signature.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, SigningError> {
        self.signing_bytes_at(self.timestamp)
    }

    /// Sign with `key`, stamping the signing time.
    ///
    /// On error the envelope is left untouched. Signing an already signed
    /// envelope replaces the previous signature and timestamp.
    ///
    /// # Errors
    ///
    /// `UnsupportedAlgorithm` or `InvalidKey` when the key cannot sign; both are
    /// configuration errors and retrying will not help.
    pub fn sign(&mut self, key: &KeySpecification) -> Result<(), SigningError> {
        let timestamp = current_timestamp_millis();
        let bytes = self.signing_bytes_at(timestamp)?;
        let signature = sign_payload(key, &bytes)?;

        self.timestamp = timestamp;
        self.signature = Some(signature);
        Ok(())
    }

    /// Check the stored signature against `key`.
    ///
    /// Returns false when unsigned, on any algorithm mismatch, or when the
    /// signature or key material is corrupt.
    #[must_use]
    pub fn is_valid_signature(&self, key: &KeySpecification) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        match self.signing_bytes() {
            Ok(bytes) => verify_payload(key, &bytes, signature),
            Err(_) => false,
        }
    }

    /// The correlation key a reply to this message must carry.
    #[must_use]
    pub fn build_in_reply_to(&self) -> InReplyTo {
        InReplyTo::new(self.user_id.clone(), self.message_id.clone())
    }

    /// Encode for the bus.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from the bus. Unknown content kinds are an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// serde_json::Value inside payloads has no Hash impl, so the hash covers the
// identifying fields only. Equal envelopes still hash equal.
impl Hash for AuthenticatedMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.user_id.hash(state);
        self.message_type.hash(state);
        self.message_id.hash(state);
        self.timestamp.hash(state);
        self.signature.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{PingInput, PingOutput};
    use crate::response::{ErrorDetails, Response};
    use proptest::prelude::*;
    use shared_crypto::{Ed25519KeyPair, Secp256k1KeyPair};

    fn ping(message: &str) -> MessageContent {
        MessageContent::Ping(PingInput {
            message: message.into(),
        })
    }

    fn hmac_key() -> KeySpecification {
        KeySpecification::hmac_sha256("alice", b"alice-secret")
    }

    fn signed_ping() -> AuthenticatedMessage {
        let mut msg = AuthenticatedMessage::new("alice", "PING", ping("hi"));
        msg.sign(&hmac_key()).unwrap();
        msg
    }

    #[test]
    fn test_message_id_format() {
        let id = MessageId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(!id.as_str().contains('-'));
        assert_ne!(id, MessageId::generate());
    }

    #[test]
    fn test_unsigned_never_verifies() {
        let msg = AuthenticatedMessage::new("alice", "PING", ping("hi"));
        assert!(!msg.is_signed());
        assert!(!msg.is_valid_signature(&hmac_key()));
    }

    #[test]
    fn test_sign_and_verify_hmac() {
        let msg = signed_ping();
        assert!(msg.is_valid_signature(&hmac_key()));
        assert_eq!(msg.signature().unwrap().algorithm, "HmacSHA256");

        let wrong = KeySpecification::hmac_sha256("alice", b"not-the-secret");
        assert!(!msg.is_valid_signature(&wrong));
    }

    #[test]
    fn test_sign_and_verify_asymmetric() {
        let ed = Ed25519KeyPair::generate();
        let mut msg = AuthenticatedMessage::new("svc", "PING", ping("hi"));
        msg.sign(&KeySpecification::ed25519("svc", ed.to_seed())).unwrap();
        let public = KeySpecification::ed25519("svc", ed.public_key().as_bytes());
        assert!(msg.is_valid_signature(&public));

        let k = Secp256k1KeyPair::generate();
        let mut msg = AuthenticatedMessage::new("svc", "PING", ping("hi"));
        msg.sign(&KeySpecification::es256k("svc", k.to_bytes())).unwrap();
        let public = KeySpecification::es256k("svc", k.public_key().as_bytes());
        assert!(msg.is_valid_signature(&public));
    }

    #[test]
    fn test_failed_sign_leaves_envelope_untouched() {
        let mut msg = AuthenticatedMessage::new("alice", "PING", ping("hi"));
        let before = msg.clone();
        let err = msg
            .sign(&KeySpecification::new("alice", "RSA", vec![1, 2, 3]))
            .unwrap_err();
        assert_eq!(err, SigningError::UnsupportedAlgorithm("RSA".into()));
        assert_eq!(msg, before);
    }

    #[test]
    fn test_resign_replaces_signature() {
        let mut msg = signed_ping();
        let other = KeySpecification::hmac_sha256("alice", b"rotated");
        msg.sign(&other).unwrap();
        assert!(msg.is_valid_signature(&other));
        assert!(!msg.is_valid_signature(&hmac_key()));
    }

    #[test]
    fn test_wire_roundtrip_preserves_signature() {
        let msg = signed_ping();
        let decoded = AuthenticatedMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.is_valid_signature(&hmac_key()));
    }

    #[test]
    fn test_wire_field_names() {
        let bytes = signed_ping().to_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["type"], "PING");
        assert_eq!(json["content"]["kind"], "PING");
        assert_eq!(json["signature"]["algorithm"], "HmacSHA256");
        assert!(json["signature"]["value"].is_string());
        assert!(json["timestamp"].is_u64());
    }

    #[test]
    fn test_unknown_content_kind_fails_decode() {
        let raw =
            br#"{"userId":"a","type":"X","messageId":"1","timestamp":1,"content":{"kind":"NOPE"}}"#;
        assert!(AuthenticatedMessage::from_bytes(raw).is_err());
    }

    #[test]
    fn test_unknown_algorithm_decodes_but_fails_verification() {
        let bytes = signed_ping().to_bytes().unwrap();
        let mut json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        json["signature"]["algorithm"] = "Dilithium3".into();
        let decoded: AuthenticatedMessage = serde_json::from_value(json).unwrap();
        assert!(!decoded.is_valid_signature(&hmac_key()));
    }

    #[test]
    fn test_build_in_reply_to() {
        let msg = signed_ping();
        let key = msg.build_in_reply_to();
        assert_eq!(key.user_id, "alice");
        assert_eq!(&key.message_id, msg.message_id());
    }

    #[test]
    fn test_equal_envelopes_hash_equal() {
        use std::collections::hash_map::DefaultHasher;

        let msg = signed_ping();
        let copy = AuthenticatedMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        let hash = |m: &AuthenticatedMessage| {
            let mut h = DefaultHasher::new();
            m.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&msg), hash(&copy));
    }

    #[test]
    fn test_response_envelope_roundtrip() {
        let request = signed_ping();
        let reply = Response::failure(
            request.build_in_reply_to(),
            ErrorDetails::new("iobc:boom", "boom").with_parameter("attempt", 2),
        );
        let mut msg = AuthenticatedMessage::new("server", "PING", MessageContent::Response(reply));
        let key = KeySpecification::hmac_sha256("server", b"server-secret");
        msg.sign(&key).unwrap();

        let decoded = AuthenticatedMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert!(decoded.is_valid_signature(&key));
        let response = decoded.content().as_response().unwrap();
        assert_eq!(response.in_reply_to, request.build_in_reply_to());
        assert!(!response.pass);
    }

    fn tamper(msg: &AuthenticatedMessage, field: u8, text: &str) -> AuthenticatedMessage {
        let mut json = serde_json::to_value(msg).unwrap();
        match field {
            0 => json["userId"] = format!("{}{text}", msg.user_id()).into(),
            1 => json["type"] = format!("{}{text}", msg.message_type()).into(),
            2 => json["messageId"] = format!("{}{text}", msg.message_id()).into(),
            3 => json["timestamp"] = (msg.timestamp() + 1).into(),
            _ => {
                json["content"] = serde_json::to_value(MessageContent::PingReply(PingOutput {
                    message: text.into(),
                    time: 0,
                }))
                .unwrap()
            }
        }
        serde_json::from_value(json).unwrap()
    }

    proptest! {
        #[test]
        fn prop_any_mutation_invalidates_signature(
            message in ".{0,32}",
            field in 0u8..5,
            suffix in "[a-z0-9]{1,8}",
        ) {
            let mut msg = AuthenticatedMessage::new("alice", "PING", ping(&message));
            msg.sign(&hmac_key()).unwrap();
            prop_assert!(msg.is_valid_signature(&hmac_key()));

            let tampered = tamper(&msg, field, &suffix);
            prop_assert!(!tampered.is_valid_signature(&hmac_key()));
        }

        #[test]
        fn prop_roundtrip_keeps_signature_valid(message in ".{0,64}") {
            let mut msg = AuthenticatedMessage::new("alice", "PING", ping(&message));
            msg.sign(&hmac_key()).unwrap();
            let decoded = AuthenticatedMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
            prop_assert_eq!(&decoded, &msg);
            prop_assert!(decoded.is_valid_signature(&hmac_key()));
        }
    }
}

// crates/flockmesh-core/src/core/signing.rs
// ============================================================================
// Module: Flockmesh Export Signer
// Description: HMAC-SHA256 signatures over canonical export envelopes.
// Purpose: Make incident, replay, and policy-history exports verifiable offline.
// Dependencies: hmac, serde, sha2, subtle
// ============================================================================

//! ## Overview
//! Export envelopes are signed over their canonical payload hash:
//! `payload_hash = "sha256:" + hex(SHA-256(canonical(payload)))` and
//! `signature = hex(HMAC-SHA256(secret, payload_hash))`. Verification
//! re-derives both values and compares in constant time, so a verifier needs
//! only the payload, the signature block, and the key ring.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use hmac::Hmac;
use hmac::Mac;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::hashing::hex_encode;
use crate::core::identifiers::SigningKeyId;
use crate::core::identifiers::validate_signing_key_id;

// ============================================================================
// SECTION: Signature Envelope
// ============================================================================

/// Signature algorithm label for export envelopes.
pub const EXPORT_SIGNATURE_ALGORITHM: &str = "HMAC-SHA256";

/// Signature block appended to signed export envelopes.
///
/// # Invariants
/// - `algorithm` is always `HMAC-SHA256`.
/// - `payload_hash` is the canonical hash of the envelope payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSignature {
    /// Signature algorithm label.
    pub algorithm: String,
    /// Key identifier used to sign.
    pub key_id: SigningKeyId,
    /// Canonical payload hash in `sha256:<hex>` form.
    pub payload_hash: HashDigest,
    /// Lowercase hex HMAC over the payload hash.
    pub signature: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when signing or verifying exports.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Canonicalization of the payload failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Key identifier is unknown to the key ring.
    #[error("unknown signing key id: {0}")]
    UnknownKey(String),
    /// Key identifier or secret fails the key ring contract.
    #[error("invalid signing key '{key_id}': {reason}")]
    InvalidKey {
        /// Offending key identifier.
        key_id: String,
        /// Reason the key was rejected.
        reason: String,
    },
    /// Signature block does not verify against the payload.
    #[error("signature verification failed: {0}")]
    Verification(String),
}

// ============================================================================
// SECTION: Key Ring
// ============================================================================

/// Key ring holding export signing secrets.
///
/// # Invariants
/// - Every key id matches `exp_[A-Za-z0-9_-]{4,64}` and has a non-empty secret.
#[derive(Debug, Clone)]
pub struct SigningKeyRing {
    /// Active key id used for new signatures.
    active_key_id: SigningKeyId,
    /// Secrets by key id.
    secrets: BTreeMap<SigningKeyId, String>,
}

impl SigningKeyRing {
    /// Builds a key ring from secrets and an active key id.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidKey`] for malformed ids or empty
    /// secrets, and [`SigningError::UnknownKey`] when the active id is not
    /// present.
    pub fn new(
        secrets: BTreeMap<SigningKeyId, String>,
        active_key_id: SigningKeyId,
    ) -> Result<Self, SigningError> {
        for (key_id, secret) in &secrets {
            validate_signing_key_id(key_id.as_str()).map_err(|err| SigningError::InvalidKey {
                key_id: key_id.as_str().to_string(),
                reason: err.to_string(),
            })?;
            if secret.is_empty() {
                return Err(SigningError::InvalidKey {
                    key_id: key_id.as_str().to_string(),
                    reason: "secret must be non-empty".to_string(),
                });
            }
        }
        if !secrets.contains_key(&active_key_id) {
            return Err(SigningError::UnknownKey(active_key_id.as_str().to_string()));
        }
        Ok(Self { active_key_id, secrets })
    }

    /// Returns the active key id.
    #[must_use]
    pub const fn active_key_id(&self) -> &SigningKeyId {
        &self.active_key_id
    }

    /// Signs a payload with the active key.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError`] when canonicalization fails.
    pub fn sign<T: Serialize + ?Sized>(&self, payload: &T) -> Result<ExportSignature, SigningError> {
        self.sign_with(payload, &self.active_key_id)
    }

    /// Signs a payload with an explicit key id.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::UnknownKey`] for unknown ids and
    /// [`SigningError::Hash`] when canonicalization fails.
    pub fn sign_with<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        key_id: &SigningKeyId,
    ) -> Result<ExportSignature, SigningError> {
        let secret = self
            .secrets
            .get(key_id)
            .ok_or_else(|| SigningError::UnknownKey(key_id.as_str().to_string()))?;
        let payload_hash = hash_canonical_json(payload)?;
        let signature = hmac_hex(secret.as_bytes(), payload_hash.as_str().as_bytes());
        Ok(ExportSignature {
            algorithm: EXPORT_SIGNATURE_ALGORITHM.to_string(),
            key_id: key_id.clone(),
            payload_hash,
            signature,
        })
    }

    /// Verifies a signature block against a payload.
    ///
    /// Re-derives the canonical payload hash and the HMAC, then compares both
    /// in constant time.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Verification`] when any component mismatches
    /// and [`SigningError::UnknownKey`] when the key id is not in the ring.
    pub fn verify<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        signature: &ExportSignature,
    ) -> Result<(), SigningError> {
        if signature.algorithm != EXPORT_SIGNATURE_ALGORITHM {
            return Err(SigningError::Verification(format!(
                "unsupported algorithm: {}",
                signature.algorithm
            )));
        }
        let secret = self
            .secrets
            .get(&signature.key_id)
            .ok_or_else(|| SigningError::UnknownKey(signature.key_id.as_str().to_string()))?;
        let payload_hash = hash_canonical_json(payload)?;
        let hash_ok: bool = payload_hash
            .as_str()
            .as_bytes()
            .ct_eq(signature.payload_hash.as_str().as_bytes())
            .into();
        let expected = hmac_hex(secret.as_bytes(), payload_hash.as_str().as_bytes());
        let signature_ok: bool =
            expected.as_bytes().ct_eq(signature.signature.as_bytes()).into();
        if hash_ok && signature_ok {
            Ok(())
        } else {
            Err(SigningError::Verification("payload hash or hmac mismatch".to_string()))
        }
    }
}

/// Computes a lowercase hex HMAC-SHA256 over a message.
///
/// HMAC accepts keys of any length; the empty-string fallback keeps the
/// signer total and fails verification rather than panicking.
fn hmac_hex(secret: &[u8], message: &[u8]) -> String {
    let Ok(mut mac) = <Hmac<Sha256> as Mac>::new_from_slice(secret) else {
        return String::new();
    };
    mac.update(message);
    hex_encode(&mac.finalize().into_bytes())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use serde_json::json;

    use super::*;

    /// Builds a two-key ring for tests.
    fn test_ring() -> SigningKeyRing {
        let mut secrets = BTreeMap::new();
        secrets.insert(SigningKeyId::new("exp_primary"), "super-secret".to_string());
        secrets.insert(SigningKeyId::new("exp_backup_1"), "other-secret".to_string());
        SigningKeyRing::new(secrets, SigningKeyId::new("exp_primary")).unwrap()
    }

    /// Tests sign/verify round-trips for every configured key.
    #[test]
    fn test_sign_verify_round_trip() {
        let ring = test_ring();
        let payload = json!({"run_id": "run_a", "issues": ["replay.partial_evidence"]});
        let signature = ring.sign(&payload).unwrap();
        assert_eq!(signature.algorithm, EXPORT_SIGNATURE_ALGORITHM);
        ring.verify(&payload, &signature).unwrap();

        let backup = ring.sign_with(&payload, &SigningKeyId::new("exp_backup_1")).unwrap();
        ring.verify(&payload, &backup).unwrap();
        assert_ne!(signature.signature, backup.signature);
    }

    /// Tests that tampering with the payload fails verification.
    #[test]
    fn test_tampered_payload_fails() {
        let ring = test_ring();
        let payload = json!({"run_id": "run_a", "count": 2});
        let signature = ring.sign(&payload).unwrap();
        let tampered = json!({"run_id": "run_a", "count": 3});
        assert!(ring.verify(&tampered, &signature).is_err());
    }

    /// Tests key ring construction contracts.
    #[test]
    fn test_key_ring_validation() {
        let mut secrets = BTreeMap::new();
        secrets.insert(SigningKeyId::new("bad_key"), "secret".to_string());
        assert!(SigningKeyRing::new(secrets, SigningKeyId::new("bad_key")).is_err());

        let mut secrets = BTreeMap::new();
        secrets.insert(SigningKeyId::new("exp_empty"), String::new());
        assert!(SigningKeyRing::new(secrets, SigningKeyId::new("exp_empty")).is_err());

        let mut secrets = BTreeMap::new();
        secrets.insert(SigningKeyId::new("exp_okkey"), "secret".to_string());
        assert!(SigningKeyRing::new(secrets, SigningKeyId::new("exp_other")).is_err());
    }
}

// crates/flockmesh-core/src/core/hashing.rs
// ============================================================================
// Module: Flockmesh Canonical Hashing
// Description: RFC 8785 JSON canonicalization and content hashing utilities.
// Purpose: Provide deterministic hashes for policy documents, audit payloads, and exports.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Flockmesh hashes all canonical JSON using RFC 8785 (JCS) to guarantee
//! stable, replayable digests. Object keys sort lexicographically, arrays
//! preserve order, and absent optional fields are dropped before hashing.
//! The wire form is `sha256:<lowercase hex>`; document hashes computed here
//! are the concurrency tokens for policy catalog writes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// Wire prefix for SHA-256 digests.
const SHA256_PREFIX: &str = "sha256:";

/// Deterministic content hash in the `sha256:<hex>` wire form.
///
/// # Invariants
/// - `hex` is lowercase hex of exactly 32 digest bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashDigest(String);

impl HashDigest {
    /// Creates a digest from raw SHA-256 bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(format!("{SHA256_PREFIX}{}", hex_encode(bytes)))
    }

    /// Returns the full `sha256:<hex>` wire form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses a digest from its wire form.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::InvalidDigest`] when the prefix or hex body is
    /// malformed.
    pub fn parse(value: &str) -> Result<Self, HashError> {
        let Some(hex) = value.strip_prefix(SHA256_PREFIX) else {
            return Err(HashError::InvalidDigest(value.to_string()));
        };
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        {
            return Err(HashError::InvalidDigest(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
    /// Digest wire form is malformed.
    #[error("invalid sha256 digest: {0}")]
    InvalidDigest(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes a serializable value over its canonical JSON form.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(&bytes))
}

/// Hashes raw bytes with SHA-256.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> HashDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    HashDigest::from_bytes(&hasher.finalize())
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
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

    /// Tests that key order does not affect the canonical hash.
    #[test]
    fn test_canonical_hash_ignores_key_order() {
        let left = json!({"b": 1, "a": {"y": true, "x": null}});
        let right = json!({"a": {"x": null, "y": true}, "b": 1});
        assert_eq!(hash_canonical_json(&left).unwrap(), hash_canonical_json(&right).unwrap());
    }

    /// Tests the digest wire form and parser.
    #[test]
    fn test_digest_wire_form() {
        let digest = hash_bytes(b"flockmesh");
        assert!(digest.as_str().starts_with("sha256:"));
        assert_eq!(digest.as_str().len(), 7 + 64);
        assert_eq!(HashDigest::parse(digest.as_str()).unwrap(), digest);
        assert!(HashDigest::parse("sha256:zzzz").is_err());
        assert!(HashDigest::parse("md5:abcd").is_err());
    }
}

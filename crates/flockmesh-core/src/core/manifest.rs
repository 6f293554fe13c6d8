// crates/flockmesh-core/src/core/manifest.rs
// ============================================================================
// Module: Connector Manifests
// Description: Attested read-only catalog entries for connectors.
// Purpose: Declare connector protocol, trust level, and capability surface.
// Dependencies: hmac, serde, sha2
// ============================================================================

//! ## Overview
//! Connector manifests are compiled into an in-memory catalog at startup.
//! Each manifest carries an attestation (payload hash + HMAC) that must
//! verify against the attestation key ring before the manifest is admitted;
//! a manifest that fails attestation never enters the catalog.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

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
use crate::core::identifiers::CapabilityName;
use crate::core::identifiers::ConnectorId;

// ============================================================================
// SECTION: Manifest Types
// ============================================================================

/// Connector protocol families understood by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorProtocol {
    /// Model Context Protocol gateway.
    Mcp,
    /// Agent-to-agent messaging.
    A2a,
    /// Office chat surface (IM, channels).
    OfficeChat,
    /// Calendar surface.
    Calendar,
}

/// Trust level asserted for a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Unreviewed third-party connector.
    Unverified,
    /// Reviewed partner connector.
    Partner,
    /// First-party connector.
    Official,
}

/// Attestation block carried by every manifest.
///
/// # Invariants
/// - `payload_hash` is the canonical hash of the manifest body (attestation
///   block excluded).
/// - `signature` is hex HMAC-SHA256 over the payload hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestAttestation {
    /// Attestation key identifier (`att_`).
    pub key_id: String,
    /// Canonical hash of the manifest body.
    pub payload_hash: HashDigest,
    /// Lowercase hex HMAC over the payload hash.
    pub signature: String,
}

/// Connector manifest record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorManifest {
    /// Connector identifier (`con_`).
    pub connector_id: ConnectorId,
    /// Human-readable connector name.
    pub name: String,
    /// Catalog category (for example `messaging`).
    pub category: String,
    /// Protocol family.
    pub protocol: ConnectorProtocol,
    /// Trust level asserted at publication.
    pub trust_level: TrustLevel,
    /// Capabilities the connector implements.
    pub capabilities: BTreeSet<CapabilityName>,
    /// Attestation over the manifest body.
    pub attestation: ManifestAttestation,
}

/// Manifest body used for attestation hashing (attestation block excluded).
#[derive(Debug, Serialize)]
struct ManifestBody<'a> {
    /// Connector identifier.
    connector_id: &'a ConnectorId,
    /// Connector name.
    name: &'a str,
    /// Catalog category.
    category: &'a str,
    /// Protocol family.
    protocol: ConnectorProtocol,
    /// Trust level.
    trust_level: TrustLevel,
    /// Capability set.
    capabilities: &'a BTreeSet<CapabilityName>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when verifying manifest attestations.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Canonicalization of the manifest body failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Attestation key id is unknown.
    #[error("unknown attestation key id: {0}")]
    UnknownKey(String),
    /// Attestation hash or signature mismatch.
    #[error("manifest attestation failed for connector '{0}'")]
    AttestationFailed(String),
}

// ============================================================================
// SECTION: Attestation Verification
// ============================================================================

impl ConnectorManifest {
    /// Verifies the manifest attestation against the attestation key ring.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::UnknownKey`] when the key id is not in the
    /// ring and [`ManifestError::AttestationFailed`] when the payload hash or
    /// HMAC mismatches.
    pub fn verify_attestation(
        &self,
        attestation_keys: &BTreeMap<String, String>,
    ) -> Result<(), ManifestError> {
        let secret = attestation_keys
            .get(&self.attestation.key_id)
            .ok_or_else(|| ManifestError::UnknownKey(self.attestation.key_id.clone()))?;
        let body = ManifestBody {
            connector_id: &self.connector_id,
            name: &self.name,
            category: &self.category,
            protocol: self.protocol,
            trust_level: self.trust_level,
            capabilities: &self.capabilities,
        };
        let payload_hash = hash_canonical_json(&body)?;
        let hash_ok: bool = payload_hash
            .as_str()
            .as_bytes()
            .ct_eq(self.attestation.payload_hash.as_str().as_bytes())
            .into();
        let expected = attestation_hmac(secret.as_bytes(), payload_hash.as_str().as_bytes());
        let signature_ok: bool =
            expected.as_bytes().ct_eq(self.attestation.signature.as_bytes()).into();
        if hash_ok && signature_ok {
            Ok(())
        } else {
            Err(ManifestError::AttestationFailed(self.connector_id.as_str().to_string()))
        }
    }

    /// Signs the manifest body, producing a fresh attestation block.
    ///
    /// Intended for catalog tooling and tests; the server only verifies.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Hash`] when canonicalization fails.
    pub fn attest(
        &mut self,
        key_id: impl Into<String>,
        secret: &str,
    ) -> Result<(), ManifestError> {
        let body = ManifestBody {
            connector_id: &self.connector_id,
            name: &self.name,
            category: &self.category,
            protocol: self.protocol,
            trust_level: self.trust_level,
            capabilities: &self.capabilities,
        };
        let payload_hash = hash_canonical_json(&body)?;
        let signature = attestation_hmac(secret.as_bytes(), payload_hash.as_str().as_bytes());
        self.attestation = ManifestAttestation {
            key_id: key_id.into(),
            payload_hash,
            signature,
        };
        Ok(())
    }
}

/// Computes a lowercase hex HMAC-SHA256 for attestation blocks.
fn attestation_hmac(secret: &[u8], message: &[u8]) -> String {
    let Ok(mut mac) = <Hmac<Sha256> as Mac>::new_from_slice(secret) else {
        return String::new();
    };
    mac.update(message);
    hex_encode(&mac.finalize().into_bytes())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

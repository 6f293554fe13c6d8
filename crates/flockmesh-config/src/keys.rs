// crates/flockmesh-config/src/keys.rs
// ============================================================================
// Module: Signing Key Resolution
// Description: Assemble the export signing key ring from config and defaults.
// Purpose: Give every deployment a verifiable signing identity at startup.
// Dependencies: flockmesh-core
// ============================================================================

//! ## Overview
//! The export key ring resolves in layers: a development default, then the
//! configuration file, then the environment overrides already merged into
//! [`crate::config::SigningConfig`]. Later layers replace earlier secrets of
//! the same key id; the active key id must name a configured secret.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use flockmesh_core::SigningError;
use flockmesh_core::SigningKeyId;
use flockmesh_core::SigningKeyRing;

use crate::config::SigningConfig;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Development default signing key id.
const DEFAULT_EXPORT_KEY_ID: &str = "exp_dev_default";
/// Development default signing secret; replace in production.
const DEFAULT_EXPORT_SECRET: &str = "flockmesh-dev-export-secret";

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves the export signing key ring from the signing configuration.
///
/// # Errors
///
/// Returns [`SigningError`] when a key id is malformed, a secret is empty, or
/// the active key id has no secret.
pub fn resolve_export_key_ring(signing: &SigningConfig) -> Result<SigningKeyRing, SigningError> {
    let mut secrets: BTreeMap<SigningKeyId, String> = BTreeMap::new();
    secrets.insert(
        SigningKeyId::new(DEFAULT_EXPORT_KEY_ID),
        DEFAULT_EXPORT_SECRET.to_string(),
    );
    for (key_id, secret) in &signing.export_keys {
        secrets.insert(SigningKeyId::new(key_id.clone()), secret.clone());
    }
    let active = signing
        .export_key_id
        .clone()
        .map_or_else(|| SigningKeyId::new(DEFAULT_EXPORT_KEY_ID), SigningKeyId::new);
    SigningKeyRing::new(secrets, active)
}

/// Returns the attestation key map used by the manifest loader.
#[must_use]
pub fn resolve_attestation_keys(signing: &SigningConfig) -> BTreeMap<String, String> {
    signing.attestation_keys.clone()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

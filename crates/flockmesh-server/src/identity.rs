// crates/flockmesh-server/src/identity.rs
// ============================================================================
// Module: Identity Gate
// Description: Actor extraction and claim matching at the boundary.
// Purpose: Hand every handler an authenticated actor id, or fail the request.
// Dependencies: axum, flockmesh-core
// ============================================================================

//! ## Overview
//! The gate reads `x-flockmesh-actor-id`, falling back to the configured
//! trusted default only when one is set. Malformed or missing actors are 401;
//! body fields that claim an actor (`trigger.actor_id`, `approved_by`,
//! `cancelled_by`, `initiated_by`, patch `actor_id`) must equal the
//! authenticated actor or the request is 403 with
//! `auth.actor_claim_mismatch`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::HeaderMap;
use flockmesh_core::ActorId;
use flockmesh_core::identifiers::validate_actor_id;
use flockmesh_core::reason;

use crate::error::ApiError;

// ============================================================================
// SECTION: Identity Gate
// ============================================================================

/// Actor header required on every `/v0` request.
pub const ACTOR_HEADER: &str = "x-flockmesh-actor-id";

/// Identity gate configuration.
#[derive(Debug, Clone, Default)]
pub struct IdentityGate {
    /// Trusted fallback actor for internal callers, when configured.
    trusted_default_actor_id: Option<ActorId>,
}

impl IdentityGate {
    /// Creates a gate with an optional trusted fallback actor.
    #[must_use]
    pub fn new(trusted_default_actor_id: Option<ActorId>) -> Self {
        Self {
            trusted_default_actor_id,
        }
    }

    /// Extracts the authenticated actor from request headers.
    ///
    /// # Errors
    ///
    /// Returns a 401 [`ApiError`] when the header is missing (and no trusted
    /// default is configured) or the actor id is malformed.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<ActorId, ApiError> {
        let header = headers
            .get(ACTOR_HEADER)
            .map(|value| value.to_str().map(str::to_string))
            .transpose()
            .map_err(|_| ApiError::unauthorized("actor header is not valid UTF-8"))?;
        let actor = match header {
            Some(value) => value,
            None => match &self.trusted_default_actor_id {
                Some(trusted) => trusted.as_str().to_string(),
                None => {
                    return Err(ApiError::unauthorized(format!(
                        "missing required header {ACTOR_HEADER}"
                    )));
                }
            },
        };
        validate_actor_id(&actor)
            .map_err(|err| ApiError::unauthorized(err.to_string()))?;
        Ok(ActorId::new(actor))
    }
}

/// Enforces that a claimed body actor equals the authenticated actor.
///
/// # Errors
///
/// Returns a 403 [`ApiError`] with `auth.actor_claim_mismatch` otherwise.
pub fn require_claim_match(
    authenticated: &ActorId,
    claimed: &ActorId,
    field: &str,
) -> Result<(), ApiError> {
    if authenticated == claimed {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            format!("{field} does not match the authenticated actor"),
            reason::AUTH_ACTOR_CLAIM_MISMATCH,
        ))
    }
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

    use axum::http::HeaderValue;

    use super::*;

    /// Builds headers carrying the actor id.
    fn headers_with(actor: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_str(actor).unwrap());
        headers
    }

    /// Tests header extraction and format enforcement.
    #[test]
    fn test_authenticate() {
        let gate = IdentityGate::default();
        assert_eq!(
            gate.authenticate(&headers_with("usr_alice_01")).unwrap().as_str(),
            "usr_alice_01"
        );
        assert_eq!(
            gate.authenticate(&headers_with("bot_alice")).unwrap_err().status,
            axum::http::StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            gate.authenticate(&HeaderMap::new()).unwrap_err().status,
            axum::http::StatusCode::UNAUTHORIZED
        );
    }

    /// Tests the trusted default fallback.
    #[test]
    fn test_trusted_default() {
        let gate = IdentityGate::new(Some(ActorId::new("svc_internal_gateway")));
        assert_eq!(
            gate.authenticate(&HeaderMap::new()).unwrap().as_str(),
            "svc_internal_gateway"
        );
        // An explicit header still wins over the fallback.
        assert_eq!(
            gate.authenticate(&headers_with("usr_alice_01")).unwrap().as_str(),
            "usr_alice_01"
        );
    }

    /// Tests claim matching.
    #[test]
    fn test_claim_match() {
        let actor = ActorId::new("usr_alice_01");
        assert!(require_claim_match(&actor, &actor, "approved_by").is_ok());
        let error =
            require_claim_match(&actor, &ActorId::new("usr_mallory_01"), "approved_by").unwrap_err();
        assert_eq!(error.status, axum::http::StatusCode::FORBIDDEN);
    }
}

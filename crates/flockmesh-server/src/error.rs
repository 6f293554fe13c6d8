// crates/flockmesh-server/src/error.rs
// ============================================================================
// Module: API Error Mapping
// Description: Translate core errors into HTTP status codes and JSON bodies.
// Purpose: Keep the boundary's error taxonomy in one place.
// Dependencies: axum, flockmesh-core, serde_json
// ============================================================================

//! ## Overview
//! Every error response is a `{message, ...}` JSON object. Conflicts echo
//! both the expected and current values so callers can reload and retry;
//! rate limits carry `retry_after_ms`; guard refusals embed the synthesized
//! `policy_decision` so tooling sees a uniform shape on the unhappy path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use flockmesh_core::IdentifierError;
use flockmesh_core::StoreError;
use flockmesh_core::reason;
use flockmesh_core::runtime::EngineError;
use flockmesh_core::runtime::GuardError;
use flockmesh_core::runtime::IntegrityError;
use flockmesh_core::runtime::PatchError;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: ApiError
// ============================================================================

/// Boundary error carrying the HTTP status and response body fields.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status for the response.
    pub status: StatusCode,
    /// Human-readable message.
    pub message: String,
    /// Extra body fields merged next to `message`.
    pub extra: Map<String, Value>,
}

impl ApiError {
    /// Builds an error with no extra fields.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            extra: Map::new(),
        }
    }

    /// Adds an extra body field.
    #[must_use]
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    /// 400 validation failure.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 401 missing or malformed actor header.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// 403 with a dotted reason code.
    #[must_use]
    pub fn forbidden(message: impl Into<String>, code: &str) -> Self {
        Self::new(StatusCode::FORBIDDEN, message).with("reason_code", json!(code))
    }

    /// 404 unknown resource.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 409 conflict.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// 500 internal fault.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = Map::new();
        body.insert("message".to_string(), json!(self.message));
        for (key, value) in self.extra {
            body.insert(key, value);
        }
        (self.status, Json(Value::Object(body))).into_response()
    }
}

// ============================================================================
// SECTION: Core Error Mappings
// ============================================================================

impl From<IdentifierError> for ApiError {
    fn from(error: IdentifierError) -> Self {
        Self::validation(error.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::RevisionConflict { expected, current } => {
                Self::conflict("run revision conflict")
                    .with("expected_revision", json!(expected))
                    .with("current_revision", json!(current))
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::AgentNotFound(_)
            | EngineError::RunNotFound(_)
            | EngineError::IntentNotFound(_) => Self::not_found(error.to_string()),
            EngineError::NotEscalated(_)
            | EngineError::WorkspaceMismatch { .. }
            | EngineError::NotWaitingApproval(_)
            | EngineError::TerminalRun(_) => Self::conflict(error.to_string()),
            EngineError::ActorClaimMismatch => Self::forbidden(
                "actor claim does not match the authenticated actor",
                reason::AUTH_ACTOR_CLAIM_MISMATCH,
            ),
            EngineError::RevisionConflict { expected, current } => {
                Self::conflict("run revision conflict")
                    .with("expected_revision", json!(expected))
                    .with("current_revision", json!(current))
            }
            EngineError::Store(inner) => inner.into(),
            EngineError::Ledger(inner) => Self::internal(inner.to_string()),
        }
    }
}

impl From<GuardError> for ApiError {
    fn from(error: GuardError) -> Self {
        match error {
            GuardError::ManifestNotFound(_)
            | GuardError::RunNotFound(_)
            | GuardError::BindingNotFound(_) => Self::not_found(error.to_string()),
            GuardError::AdapterNotRegistered(_) => {
                Self::new(StatusCode::NOT_IMPLEMENTED, error.to_string())
            }
            GuardError::RunScopeMismatch(message)
            | GuardError::BindingScopeMismatch(message) => Self::conflict(message),
            GuardError::BindingRefused(message) => {
                Self::new(StatusCode::FORBIDDEN, message)
            }
            GuardError::AllowlistBlocked { decision } | GuardError::PolicyDenied { decision } => {
                Self::new(StatusCode::FORBIDDEN, "connector invoke denied")
                    .with("policy_decision", decision_value(&decision))
            }
            GuardError::PolicyEscalated { decision } => {
                Self::conflict("connector invoke requires approval; no approval path exists")
                    .with("policy_decision", decision_value(&decision))
            }
            GuardError::RateLimited {
                retry_after_ms,
                decision,
            } => Self::new(StatusCode::TOO_MANY_REQUESTS, "connector invoke rate limited")
                .with("retry_after_ms", json!(retry_after_ms))
                .with("policy_decision", decision_value(&decision)),
            GuardError::AdapterFailed { fault, decision } => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, fault.code())
                    .with("policy_decision", decision_value(&decision))
            }
            GuardError::SimulateCapability(message) => Self::conflict(message),
            GuardError::SimulateTimeout => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                reason::CONNECTOR_TIMEOUT,
            ),
            GuardError::SimulateFailed(message) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
            }
            GuardError::Store(inner) => inner.into(),
            GuardError::Ledger(inner) => Self::internal(inner.to_string()),
        }
    }
}

impl From<PatchError> for ApiError {
    fn from(error: PatchError) -> Self {
        match error {
            PatchError::ProfileNotFound(_)
            | PatchError::HistoryEntryNotFound(_)
            | PatchError::NoHistoryForProfile(_) => Self::not_found(error.to_string()),
            PatchError::InvalidRule(_)
            | PatchError::DuplicateCapability(_)
            | PatchError::MissingExpectedHash
            | PatchError::MissingActor
            | PatchError::Compile(_) => Self::validation(error.to_string()),
            PatchError::HashConflict { expected, current } => {
                Self::conflict("policy profile hash conflict")
                    .with("expected_profile_hash", json!(expected.as_str()))
                    .with("current_profile_hash", json!(current.as_str()))
            }
            PatchError::NotAuthorized => Self::forbidden(
                "actor is not authorized to change policy",
                reason::POLICY_ADMIN_NOT_AUTHORIZED,
            ),
            PatchError::Hash(inner) => Self::internal(inner.to_string()),
            PatchError::Catalog(inner) => Self::internal(inner.to_string()),
            PatchError::History(inner) => Self::internal(inner.to_string()),
            PatchError::Ledger(inner) => Self::internal(inner.to_string()),
        }
    }
}

impl From<IntegrityError> for ApiError {
    fn from(error: IntegrityError) -> Self {
        match error {
            IntegrityError::RunNotFound(_) | IntegrityError::NoComparableBase(_) => {
                Self::not_found(error.to_string())
            }
            IntegrityError::BaseScopeMismatch(message) => Self::conflict(message),
            IntegrityError::Store(inner) => inner.into(),
            IntegrityError::Ledger(inner) => Self::internal(inner.to_string()),
            IntegrityError::History(inner) => Self::internal(inner.to_string()),
            IntegrityError::Signing(inner) => Self::internal(inner.to_string()),
        }
    }
}

/// Serializes a policy decision for embedding in error bodies.
fn decision_value(decision: &flockmesh_core::PolicyDecisionRecord) -> Value {
    serde_json::to_value(decision).unwrap_or(Value::Null)
}

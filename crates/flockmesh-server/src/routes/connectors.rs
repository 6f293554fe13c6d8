// crates/flockmesh-server/src/routes/connectors.rs
// ============================================================================
// Module: Connector Endpoints
// Description: Adapter invoke and simulate over the guard pipeline.
// Purpose: Boundary for connector invocations with claim enforcement.
// Dependencies: axum, flockmesh-core
// ============================================================================

//! ## Overview
//! Both endpoints build the guard request from the body, enforce that
//! `initiated_by` matches the authenticated actor, and translate guard
//! refusals through the shared error mapping (deny 403, escalate 409, rate
//! limit 429 with `retry_after_ms`, adapter faults 503 with the synthesized
//! decision).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use flockmesh_core::ActorId;
use flockmesh_core::AgentId;
use flockmesh_core::BindingId;
use flockmesh_core::CapabilityName;
use flockmesh_core::ConnectorId;
use flockmesh_core::IdempotencyKey;
use flockmesh_core::IntentTarget;
use flockmesh_core::RunId;
use flockmesh_core::Timestamp;
use flockmesh_core::WorkspaceId;
use flockmesh_core::identifiers::validate_actor_id;
use flockmesh_core::identifiers::validate_capability;
use flockmesh_core::identifiers::validate_prefixed;
use flockmesh_core::runtime::InvokeRequest;
use serde_json::Value;
use serde_json::json;

use crate::dto::InvokeBody;
use crate::error::ApiError;
use crate::identity::require_claim_match;
use crate::state::AppState;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates the body and builds the guard request.
fn build_request(
    connector_id: &str,
    body: InvokeBody,
    authenticated: &ActorId,
) -> Result<InvokeRequest, ApiError> {
    validate_prefixed(connector_id, "con_")?;
    validate_prefixed(&body.run_id, "run_")?;
    validate_prefixed(&body.workspace_id, "wsp_")?;
    validate_prefixed(&body.agent_id, "agt_")?;
    validate_prefixed(&body.binding_id, "cnb_")?;
    validate_capability(&body.capability, false)?;
    validate_actor_id(&body.initiated_by)?;
    if let Some(key) = &body.idempotency_key {
        validate_prefixed(key, "idem_")?;
    }
    let initiated_by = ActorId::new(body.initiated_by);
    require_claim_match(authenticated, &initiated_by, "initiated_by")?;

    Ok(InvokeRequest {
        connector_id: ConnectorId::new(connector_id),
        run_id: RunId::new(body.run_id),
        workspace_id: WorkspaceId::new(body.workspace_id),
        agent_id: AgentId::new(body.agent_id),
        binding_id: BindingId::new(body.binding_id),
        capability: CapabilityName::new(body.capability),
        side_effect: body.side_effect,
        risk_hint: body.risk_hint,
        parameters: body.parameters,
        target: IntentTarget {
            surface: body.surface,
            connector_hints: None,
        },
        idempotency_key: body.idempotency_key.map(IdempotencyKey::new),
        initiated_by,
    })
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `POST /v0/connectors/adapters/{connector_id}/invoke`
pub async fn invoke(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(connector_id): Path<String>,
    Json(body): Json<InvokeBody>,
) -> Result<Json<Value>, ApiError> {
    let actor = state.identity.authenticate(&headers)?;
    let request = build_request(&connector_id, body, &actor)?;
    let success = state.guard.invoke(&request, Timestamp::now_utc()).await?;
    Ok(Json(json!({
        "payload": success.payload,
        "deduped": success.deduped,
        "policy_decision": success.decision,
    })))
}

/// `POST /v0/connectors/adapters/{connector_id}/simulate`
pub async fn simulate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(connector_id): Path<String>,
    Json(body): Json<InvokeBody>,
) -> Result<Json<Value>, ApiError> {
    let actor = state.identity.authenticate(&headers)?;
    let request = build_request(&connector_id, body, &actor)?;
    let success = state.guard.simulate(&request, Timestamp::now_utc()).await?;
    Ok(Json(json!({
        "payload": success.payload,
        "simulated": true,
    })))
}

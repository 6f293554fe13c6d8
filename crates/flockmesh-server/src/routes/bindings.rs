// crates/flockmesh-server/src/routes/bindings.rs
// ============================================================================
// Module: Binding Endpoints
// Description: Create and list connector bindings.
// Purpose: Boundary for bindings with cross-workspace enforcement.
// Dependencies: axum, flockmesh-core
// ============================================================================

//! ## Overview
//! A binding that names an agent must live in that agent's workspace; a
//! cross-workspace binding is rejected with 409 before anything persists.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use flockmesh_core::AgentId;
use flockmesh_core::BindingId;
use flockmesh_core::BindingStatus;
use flockmesh_core::CapabilityName;
use flockmesh_core::ConnectorBinding;
use flockmesh_core::ConnectorId;
use flockmesh_core::WorkspaceId;
use flockmesh_core::identifiers::validate_capability;
use flockmesh_core::identifiers::validate_prefixed;
use flockmesh_core::runtime::mint_id;
use serde::Deserialize;

use crate::dto::CreateBindingBody;
use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `POST /v0/connectors/bindings`
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBindingBody>,
) -> Result<(StatusCode, Json<ConnectorBinding>), ApiError> {
    state.identity.authenticate(&headers)?;

    let id = body.id.unwrap_or_else(|| mint_id("cnb_"));
    validate_prefixed(&id, "cnb_")?;
    validate_prefixed(&body.workspace_id, "wsp_")?;
    validate_prefixed(&body.connector_id, "con_")?;
    validate_prefixed(&body.auth_ref, "sec_")?;
    for capability in &body.scopes {
        validate_capability(capability, false)?;
    }

    let agent_id = match &body.agent_id {
        Some(agent_id) => {
            validate_prefixed(agent_id, "agt_")?;
            let agent = state
                .store
                .load_agent(&AgentId::new(agent_id.clone()))?
                .ok_or_else(|| ApiError::not_found(format!("agent not found: {agent_id}")))?;
            if agent.workspace_id.as_str() != body.workspace_id {
                return Err(ApiError::conflict(format!(
                    "binding workspace '{}' does not match agent workspace '{}'",
                    body.workspace_id,
                    agent.workspace_id.as_str()
                )));
            }
            Some(agent.id)
        }
        None => None,
    };

    let binding = ConnectorBinding {
        id: BindingId::new(id),
        workspace_id: WorkspaceId::new(body.workspace_id),
        agent_id,
        connector_id: ConnectorId::new(body.connector_id),
        scopes: body.scopes.into_iter().map(CapabilityName::new).collect(),
        auth_ref: body.auth_ref,
        risk_profile: body.risk_profile,
        status: BindingStatus::Active,
    };
    state.store.save_binding(&binding)?;
    Ok((StatusCode::CREATED, Json(binding)))
}

/// Query for binding listings.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Restrict to one workspace.
    #[serde(default)]
    pub workspace_id: Option<String>,
}

/// `GET /v0/connectors/bindings`
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ConnectorBinding>>, ApiError> {
    state.identity.authenticate(&headers)?;
    let workspace = query.workspace_id.map(WorkspaceId::new);
    let bindings = state.store.list_bindings(workspace.as_ref())?;
    Ok(Json(bindings))
}

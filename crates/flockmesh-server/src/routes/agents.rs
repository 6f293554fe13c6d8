// crates/flockmesh-server/src/routes/agents.rs
// ============================================================================
// Module: Agent Endpoints
// Description: Create and list agent profiles.
// Purpose: Boundary for the agents table with id-format enforcement.
// Dependencies: axum, flockmesh-core
// ============================================================================

//! ## Overview
//! Agent creation mints the `agt_` id when absent, validates every id
//! against its prefix contract, and persists through the state store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use flockmesh_core::ActorId;
use flockmesh_core::AgentId;
use flockmesh_core::AgentProfile;
use flockmesh_core::AgentStatus;
use flockmesh_core::ProfileName;
use flockmesh_core::Timestamp;
use flockmesh_core::WorkspaceId;
use flockmesh_core::identifiers::validate_actor_id;
use flockmesh_core::identifiers::validate_prefixed;
use flockmesh_core::identifiers::validate_profile_name;
use flockmesh_core::runtime::mint_id;
use serde::Deserialize;

use crate::dto::CreateAgentBody;
use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `POST /v0/agents`
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateAgentBody>,
) -> Result<(StatusCode, Json<AgentProfile>), ApiError> {
    state.identity.authenticate(&headers)?;

    let id = body.id.unwrap_or_else(|| mint_id("agt_"));
    validate_prefixed(&id, "agt_")?;
    validate_prefixed(&body.workspace_id, "wsp_")?;
    for owner in &body.owners {
        validate_actor_id(owner)?;
    }
    let default_policy_profile = body
        .default_policy_profile
        .unwrap_or_else(|| "agent_ops_assistant".to_string());
    validate_profile_name(&default_policy_profile)?;

    let now = Timestamp::now_utc();
    let agent = AgentProfile {
        id: AgentId::new(id),
        workspace_id: WorkspaceId::new(body.workspace_id),
        role: body.role,
        owners: body.owners.into_iter().map(ActorId::new).collect(),
        name: body.name,
        model_policy: body.model_policy,
        default_policy_profile: ProfileName::new(default_policy_profile),
        status: AgentStatus::Active,
        metadata: body.metadata,
        created_at: now,
        updated_at: now,
    };
    state.store.save_agent(&agent)?;
    Ok((StatusCode::CREATED, Json(agent)))
}

/// Query for agent listings.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Restrict to one workspace.
    #[serde(default)]
    pub workspace_id: Option<String>,
}

/// `GET /v0/agents`
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<AgentProfile>>, ApiError> {
    state.identity.authenticate(&headers)?;
    let workspace = query.workspace_id.map(WorkspaceId::new);
    let agents = state.store.list_agents(workspace.as_ref())?;
    Ok(Json(agents))
}

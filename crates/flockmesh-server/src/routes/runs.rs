// crates/flockmesh-server/src/routes/runs.rs
// ============================================================================
// Module: Run Endpoints
// Description: Run creation, retrieval, approvals, cancel, and ledger reads.
// Purpose: Boundary for the run lifecycle with claim and revision checks.
// Dependencies: axum, flockmesh-core
// ============================================================================

//! ## Overview
//! Run creation returns 202 with the full record. Approvals and cancel carry
//! `expected_revision`; a stale revision is a 409 echoing both revisions.
//! Ledger reads are paginated with `limit` in `1..=500`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use flockmesh_core::ActionIntentId;
use flockmesh_core::ActorId;
use flockmesh_core::AgentId;
use flockmesh_core::AuditRecord;
use flockmesh_core::EventRecord;
use flockmesh_core::LedgerPage;
use flockmesh_core::PageRequest;
use flockmesh_core::PlaybookId;
use flockmesh_core::ProfileName;
use flockmesh_core::RunId;
use flockmesh_core::RunRecord;
use flockmesh_core::RunTrigger;
use flockmesh_core::Timestamp;
use flockmesh_core::WorkspaceId;
use flockmesh_core::identifiers::validate_actor_id;
use flockmesh_core::identifiers::validate_prefixed;
use flockmesh_core::ledger::LEDGER_PAGE_MAX;
use flockmesh_core::ledger::LEDGER_PAGE_MIN;
use flockmesh_core::runtime::ApprovalRequest;
use flockmesh_core::runtime::CancelRequest;
use flockmesh_core::runtime::CreateRunRequest;
use flockmesh_core::runtime::RequestedProfiles;
use flockmesh_core::runtime::ResolutionState;
use serde_json::json;

use crate::dto::ApprovalBody;
use crate::dto::CancelBody;
use crate::dto::CreateRunBody;
use crate::dto::PageQuery;
use crate::dto::RequestedProfilesBody;
use crate::error::ApiError;
use crate::identity::require_claim_match;
use crate::state::AppState;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Translates the requested-profiles body into the core shape.
pub(crate) fn requested_profiles(body: &RequestedProfilesBody) -> RequestedProfiles {
    RequestedProfiles {
        org: body.org.clone().map(ProfileName::new),
        workspace: body.workspace.clone().map(ProfileName::new),
        agent: body.agent.clone().map(ProfileName::new),
        run_override: body.run_override.clone().map(ProfileName::new),
    }
}

/// Validates and converts a ledger page query.
fn page_request(query: &PageQuery) -> Result<PageRequest, ApiError> {
    if !(LEDGER_PAGE_MIN..=LEDGER_PAGE_MAX).contains(&query.limit) {
        return Err(ApiError::validation(format!(
            "limit must be in {LEDGER_PAGE_MIN}..={LEDGER_PAGE_MAX}"
        )));
    }
    Ok(PageRequest {
        limit: query.limit,
        offset: query.offset,
    })
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `POST /v0/runs`
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateRunBody>,
) -> Result<(StatusCode, Json<RunRecord>), ApiError> {
    let actor = state.identity.authenticate(&headers)?;
    validate_prefixed(&body.workspace_id, "wsp_")?;
    validate_prefixed(&body.agent_id, "agt_")?;
    validate_prefixed(&body.playbook_id, "pbk_")?;
    validate_actor_id(&body.trigger.actor_id)?;
    let trigger_actor = ActorId::new(body.trigger.actor_id.clone());
    require_claim_match(&actor, &trigger_actor, "trigger.actor_id")?;

    let now = Timestamp::now_utc();
    let request = CreateRunRequest {
        workspace_id: WorkspaceId::new(body.workspace_id),
        agent_id: AgentId::new(body.agent_id),
        playbook_id: PlaybookId::new(body.playbook_id),
        trigger: RunTrigger {
            kind: body.trigger.kind,
            source: body.trigger.source,
            actor_id: trigger_actor,
            at: body.trigger.at.unwrap_or(now),
        },
        profiles: requested_profiles(&body.policy),
    };
    let run = state.engine.create_run(&request, &actor, now)?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// `GET /v0/runs/{run_id}`
pub async fn fetch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
) -> Result<Json<RunRecord>, ApiError> {
    state.identity.authenticate(&headers)?;
    validate_prefixed(&run_id, "run_")?;
    let run = state.engine.get_run(&RunId::new(run_id))?;
    Ok(Json(run))
}

/// `POST /v0/runs/{run_id}/approvals`
pub async fn approvals(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
    Json(body): Json<ApprovalBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = state.identity.authenticate(&headers)?;
    validate_prefixed(&run_id, "run_")?;
    validate_prefixed(&body.action_intent_id, "act_")?;
    validate_actor_id(&body.approved_by)?;
    let approved_by = ActorId::new(body.approved_by);
    require_claim_match(&actor, &approved_by, "approved_by")?;

    let outcome = state.engine.resolve_approval(
        &RunId::new(run_id),
        &ApprovalRequest {
            action_intent_id: ActionIntentId::new(body.action_intent_id),
            approve: body.approve,
            approved_by,
            expected_revision: body.expected_revision,
        },
        &actor,
        Timestamp::now_utc(),
    )?;
    let state_label = match outcome.state {
        ResolutionState::WaitingMoreApprovals => "waiting_more_approvals",
        ResolutionState::Approved => "approved",
        ResolutionState::Rejected => "rejected",
    };
    Ok(Json(json!({
        "state": state_label,
        "run": outcome.run,
    })))
}

/// `POST /v0/runs/{run_id}/cancel`
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
    Json(body): Json<CancelBody>,
) -> Result<Json<RunRecord>, ApiError> {
    let actor = state.identity.authenticate(&headers)?;
    validate_prefixed(&run_id, "run_")?;
    validate_actor_id(&body.cancelled_by)?;
    let cancelled_by = ActorId::new(body.cancelled_by);
    require_claim_match(&actor, &cancelled_by, "cancelled_by")?;

    let run = state.engine.cancel_run(
        &RunId::new(run_id),
        &CancelRequest {
            cancelled_by,
            expected_revision: body.expected_revision,
        },
        &actor,
        Timestamp::now_utc(),
    )?;
    Ok(Json(run))
}

/// `GET /v0/runs/{run_id}/events`
pub async fn events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<LedgerPage<EventRecord>>, ApiError> {
    state.identity.authenticate(&headers)?;
    validate_prefixed(&run_id, "run_")?;
    let page = page_request(&query)?;
    let run_id = RunId::new(run_id);
    state.engine.get_run(&run_id)?;
    let page = state
        .ledger
        .read_events(&run_id, page)
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(page))
}

/// `GET /v0/runs/{run_id}/audit`
pub async fn audit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<LedgerPage<AuditRecord>>, ApiError> {
    state.identity.authenticate(&headers)?;
    validate_prefixed(&run_id, "run_")?;
    let page = page_request(&query)?;
    let run_id = RunId::new(run_id);
    state.engine.get_run(&run_id)?;
    let page = state
        .ledger
        .read_audit(&run_id, page)
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(page))
}

// crates/flockmesh-server/src/routes/policy.rs
// ============================================================================
// Module: Policy Endpoints
// Description: Evaluation, batch simulation, catalog reads, patch, rollback.
// Purpose: Boundary for the policy engine and the patch pipeline.
// Dependencies: axum, flockmesh-core
// ============================================================================

//! ## Overview
//! Evaluation endpoints return decisions as values (a deny is a 200 with a
//! deny decision, not an error). Patch and rollback enforce the actor claim
//! before handing the request to the pipeline; conflicts echo both document
//! hashes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use flockmesh_core::ActionIntent;
use flockmesh_core::ActionIntentId;
use flockmesh_core::ActorId;
use flockmesh_core::CapabilityName;
use flockmesh_core::DecisionId;
use flockmesh_core::HashDigest;
use flockmesh_core::IdempotencyKey;
use flockmesh_core::IntentTarget;
use flockmesh_core::PageRequest;
use flockmesh_core::PatchId;
use flockmesh_core::PolicyDecisionRecord;
use flockmesh_core::ProfileName;
use flockmesh_core::RunId;
use flockmesh_core::StepId;
use flockmesh_core::Timestamp;
use flockmesh_core::identifiers::validate_actor_id;
use flockmesh_core::identifiers::validate_capability;
use flockmesh_core::identifiers::validate_prefixed;
use flockmesh_core::identifiers::validate_profile_name;
use flockmesh_core::ledger::LEDGER_PAGE_MAX;
use flockmesh_core::ledger::LEDGER_PAGE_MIN;
use flockmesh_core::policy::PolicyContext;
use flockmesh_core::policy::ProfileLookup;
use flockmesh_core::policy::evaluate_intent;
use flockmesh_core::runtime::PatchMode;
use flockmesh_core::runtime::PatchRequest;
use flockmesh_core::runtime::PatchResponse;
use flockmesh_core::runtime::RollbackRequest;
use flockmesh_core::runtime::RollbackTarget;
use flockmesh_core::runtime::mint_id;
use serde_json::Value;
use serde_json::json;

use crate::dto::DerivedStatus;
use crate::dto::EvaluateBody;
use crate::dto::HistoryQuery;
use crate::dto::IntentBody;
use crate::dto::PatchBody;
use crate::dto::PatchModeBody;
use crate::dto::RequestedProfilesBody;
use crate::dto::RollbackBody;
use crate::dto::RollbackTargetBody;
use crate::dto::SimulateBatchBody;
use crate::error::ApiError;
use crate::identity::require_claim_match;
use crate::state::AppState;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the evaluation context from requested profile names.
///
/// Absent layers fall back to the default lattice names; a requested name
/// that is missing from the library flows through so the engine denies
/// fail-closed with `policy.profile_missing.<source>`.
fn evaluation_context(body: &RequestedProfilesBody) -> Result<PolicyContext, ApiError> {
    for name in [&body.org, &body.workspace, &body.agent, &body.run_override]
        .into_iter()
        .flatten()
    {
        validate_profile_name(name)?;
    }
    Ok(PolicyContext {
        org: ProfileName::new(body.org.clone().unwrap_or_else(|| "org_default_safe".to_string())),
        workspace: ProfileName::new(
            body.workspace.clone().unwrap_or_else(|| "workspace_ops_cn".to_string()),
        ),
        agent: ProfileName::new(
            body.agent.clone().unwrap_or_else(|| "agent_ops_assistant".to_string()),
        ),
        run_override: body.run_override.clone().map(ProfileName::new),
    })
}

/// Builds a transient intent from an intent body.
fn build_intent(run_id: &RunId, body: &IntentBody) -> Result<ActionIntent, ApiError> {
    validate_capability(&body.capability, false)?;
    if let Some(key) = &body.idempotency_key {
        validate_prefixed(key, "idem_")?;
    }
    Ok(ActionIntent {
        id: ActionIntentId::new(mint_id("act_")),
        run_id: run_id.clone(),
        step_id: StepId::new("policy_evaluation"),
        connector_binding_id: None,
        capability: CapabilityName::new(body.capability.clone()),
        side_effect: body.side_effect,
        risk_hint: body.risk_hint.clone(),
        parameters: body.parameters.clone(),
        target: IntentTarget {
            surface: body.surface.clone(),
            connector_hints: None,
        },
        idempotency_key: body.idempotency_key.clone().map(IdempotencyKey::new),
    })
}

/// Validates and converts a history page query.
fn history_page(query: &HistoryQuery) -> Result<PageRequest, ApiError> {
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

/// Parses an optional expected profile hash.
fn parse_expected_hash(value: Option<&String>) -> Result<Option<HashDigest>, ApiError> {
    value
        .map(|raw| HashDigest::parse(raw).map_err(|err| ApiError::validation(err.to_string())))
        .transpose()
}

// ============================================================================
// SECTION: Evaluation Handlers
// ============================================================================

/// `POST /v0/policy/evaluate`
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<EvaluateBody>,
) -> Result<Json<PolicyDecisionRecord>, ApiError> {
    state.identity.authenticate(&headers)?;
    let run_id = match &body.run_id {
        Some(run_id) => {
            validate_prefixed(run_id, "run_")?;
            RunId::new(run_id.clone())
        }
        None => RunId::new(mint_id("run_")),
    };
    let intent = build_intent(&run_id, &body.intent)?;
    let context = evaluation_context(&body.context)?;
    let decision = evaluate_intent(
        DecisionId::new(mint_id("pol_")),
        &intent,
        &context,
        state.library.as_ref(),
        Timestamp::now_utc(),
    );
    Ok(Json(decision))
}

/// `POST /v0/policy/simulate`
pub async fn simulate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SimulateBatchBody>,
) -> Result<Json<Value>, ApiError> {
    state.identity.authenticate(&headers)?;
    let run_id = RunId::new(mint_id("run_"));
    let context = evaluation_context(&body.context)?;
    let now = Timestamp::now_utc();
    let mut decisions = Vec::with_capacity(body.intents.len());
    for intent_body in &body.intents {
        let intent = build_intent(&run_id, intent_body)?;
        decisions.push(evaluate_intent(
            DecisionId::new(mint_id("pol_")),
            &intent,
            &context,
            state.library.as_ref(),
            now,
        ));
    }
    let derived_status = DerivedStatus::from_decisions(&decisions);
    Ok(Json(json!({
        "derived_status": derived_status,
        "decisions": decisions,
    })))
}

// ============================================================================
// SECTION: Catalog Handlers
// ============================================================================

/// `GET /v0/policy/profiles`
pub async fn profiles(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.identity.authenticate(&headers)?;
    let mut entries = Vec::new();
    for name in state.library.names() {
        let Some(profile) = state.library.profile(&name) else {
            continue;
        };
        let document = profile.to_document();
        let hash = document
            .document_hash()
            .map_err(|err| ApiError::internal(err.to_string()))?;
        entries.push(json!({
            "name": name.as_str(),
            "document_hash": hash.as_str(),
            "rule_count": document.rules.len(),
        }));
    }
    Ok(Json(json!({"profiles": entries})))
}

/// `GET /v0/policy/profiles/{name}/version`
pub async fn profile_version(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.identity.authenticate(&headers)?;
    validate_profile_name(&name)?;
    let profile_name = ProfileName::new(name);
    let profile = state
        .library
        .profile(&profile_name)
        .ok_or_else(|| {
            ApiError::not_found(format!("policy profile not found: {}", profile_name.as_str()))
        })?;
    let hash = profile
        .to_document()
        .document_hash()
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(json!({
        "name": profile_name.as_str(),
        "document_hash": hash.as_str(),
    })))
}

// ============================================================================
// SECTION: Patch Handlers
// ============================================================================

/// `POST /v0/policy/patch`
pub async fn patch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PatchBody>,
) -> Result<Json<PatchResponse>, ApiError> {
    let actor = state.identity.authenticate(&headers)?;
    validate_profile_name(&body.profile_name)?;
    let claimed = match &body.actor_id {
        Some(claimed) => {
            validate_actor_id(claimed)?;
            let claimed = ActorId::new(claimed.clone());
            require_claim_match(&actor, &claimed, "actor_id")?;
            Some(claimed)
        }
        None => None,
    };
    let request = PatchRequest {
        profile_name: ProfileName::new(body.profile_name),
        mode: match body.mode {
            PatchModeBody::DryRun => PatchMode::DryRun,
            PatchModeBody::Apply => PatchMode::Apply,
        },
        patch_rules: body.patch_rules,
        reason: body.reason,
        actor_id: claimed,
        expected_profile_hash: parse_expected_hash(body.expected_profile_hash.as_ref())?,
    };
    let response = state.patches.patch(&request, &actor, Timestamp::now_utc())?;
    Ok(Json(response))
}

/// `POST /v0/policy/rollback`
pub async fn rollback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RollbackBody>,
) -> Result<Json<PatchResponse>, ApiError> {
    let actor = state.identity.authenticate(&headers)?;
    validate_profile_name(&body.profile_name)?;
    if let Some(patch_id) = &body.target_patch_id {
        validate_prefixed(patch_id, "pph_")?;
    }
    let claimed = match &body.actor_id {
        Some(claimed) => {
            validate_actor_id(claimed)?;
            let claimed = ActorId::new(claimed.clone());
            require_claim_match(&actor, &claimed, "actor_id")?;
            Some(claimed)
        }
        None => None,
    };
    let request = RollbackRequest {
        profile_name: ProfileName::new(body.profile_name),
        mode: match body.mode {
            PatchModeBody::DryRun => PatchMode::DryRun,
            PatchModeBody::Apply => PatchMode::Apply,
        },
        target_patch_id: body.target_patch_id.map(PatchId::new),
        target_state: match body.target_state {
            RollbackTargetBody::Before => RollbackTarget::Before,
            RollbackTargetBody::After => RollbackTarget::After,
        },
        reason: body.reason,
        actor_id: claimed,
        expected_profile_hash: parse_expected_hash(body.expected_profile_hash.as_ref())?,
    };
    let response = state.patches.rollback(&request, &actor, Timestamp::now_utc())?;
    Ok(Json(response))
}

/// `GET /v0/policy/patches`
pub async fn history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    state.identity.authenticate(&headers)?;
    let profile = match &query.profile_name {
        Some(name) => {
            validate_profile_name(name)?;
            Some(ProfileName::new(name.clone()))
        }
        None => None,
    };
    let page = history_page(&query)?;
    let entries = state
        .patches
        .history()
        .list(profile.as_ref(), page)
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(json!({
        "entries": entries.items,
        "total": entries.total,
        "offset": entries.offset,
    })))
}

/// `GET /v0/policy/patches/export`
pub async fn history_export(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    state.identity.authenticate(&headers)?;
    let profile = match &query.profile_name {
        Some(name) => {
            validate_profile_name(name)?;
            Some(ProfileName::new(name.clone()))
        }
        None => None,
    };
    let page = history_page(&query)?;
    let export =
        state
            .views
            .patch_history_export(profile.as_ref(), page, Timestamp::now_utc())?;
    Ok(Json(serde_json::to_value(export).unwrap_or(Value::Null)))
}

// crates/flockmesh-server/src/routes/integrity.rs
// ============================================================================
// Module: Integrity Endpoints
// Description: Replay integrity, timeline diff, drift, and signed exports.
// Purpose: Boundary for the ledger-derived views.
// Dependencies: axum, flockmesh-core
// ============================================================================

//! ## Overview
//! Read-only views over the store and ledger. Timeline diff returns 404 when
//! no comparable base exists and 409 when an explicit base is out of scope;
//! exports return the envelope with its signature block.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use flockmesh_core::RunId;
use flockmesh_core::Timestamp;
use flockmesh_core::identifiers::validate_prefixed;
use flockmesh_core::runtime::DriftQuery;
use flockmesh_core::runtime::DriftSummary;
use flockmesh_core::runtime::IncidentEnvelope;
use flockmesh_core::runtime::ReplayEnvelope;
use flockmesh_core::runtime::ReplayIntegrity;
use flockmesh_core::runtime::SignedExport;
use flockmesh_core::runtime::TimelineDiff;

use crate::dto::DriftQueryBody;
use crate::dto::TimelineDiffQuery;
use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /v0/runs/{run_id}/replay-integrity`
pub async fn replay_integrity(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
) -> Result<Json<ReplayIntegrity>, ApiError> {
    state.identity.authenticate(&headers)?;
    validate_prefixed(&run_id, "run_")?;
    let report = state.views.replay_integrity(&RunId::new(run_id))?;
    Ok(Json(report))
}

/// `GET /v0/runs/{run_id}/timeline-diff`
pub async fn timeline_diff(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
    Query(query): Query<TimelineDiffQuery>,
) -> Result<Json<TimelineDiff>, ApiError> {
    state.identity.authenticate(&headers)?;
    validate_prefixed(&run_id, "run_")?;
    let base = match &query.base_run_id {
        Some(base) => {
            validate_prefixed(base, "run_")?;
            Some(RunId::new(base.clone()))
        }
        None => None,
    };
    let diff = state.views.timeline_diff(
        &RunId::new(run_id),
        base.as_ref(),
        query.sample_limit,
    )?;
    Ok(Json(diff))
}

/// `GET /v0/monitoring/replay-drift`
pub async fn replay_drift(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<DriftQueryBody>,
) -> Result<Json<DriftSummary>, ApiError> {
    state.identity.authenticate(&headers)?;
    let summary = state.views.replay_drift(&DriftQuery {
        limit: query.limit,
        include_pending: query.include_pending,
        alert_on_inconclusive: query.alert_on_inconclusive,
    })?;
    Ok(Json(summary))
}

/// `GET /v0/runs/{run_id}/replay-export`
pub async fn replay_export(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
) -> Result<Json<SignedExport<ReplayEnvelope>>, ApiError> {
    state.identity.authenticate(&headers)?;
    validate_prefixed(&run_id, "run_")?;
    let export = state
        .views
        .replay_export(&RunId::new(run_id), Timestamp::now_utc())?;
    Ok(Json(export))
}

/// `GET /v0/runs/{run_id}/incident-export`
pub async fn incident_export(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
) -> Result<Json<SignedExport<IncidentEnvelope>>, ApiError> {
    state.identity.authenticate(&headers)?;
    validate_prefixed(&run_id, "run_")?;
    let export = state
        .views
        .incident_export(&RunId::new(run_id), Timestamp::now_utc())?;
    Ok(Json(export))
}

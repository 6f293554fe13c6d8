// crates/flockmesh-server/src/routes/mod.rs
// ============================================================================
// Module: Route Table
// Description: Router assembly for the /v0 surface.
// Purpose: Bind every endpoint to its handler over the shared state.
// Dependencies: axum, crate::state
// ============================================================================

//! ## Overview
//! One router over one shared [`crate::state::AppState`]. Handlers live in
//! per-surface submodules; every `/v0` handler authenticates through the
//! identity gate before touching the core.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use axum::routing::post;

use crate::state::AppState;

/// Agent endpoints.
pub mod agents;
/// Binding endpoints.
pub mod bindings;
/// Connector invoke and simulate endpoints.
pub mod connectors;
/// Integrity view endpoints.
pub mod integrity;
/// Policy evaluation and patch endpoints.
pub mod policy;
/// Run lifecycle endpoints.
pub mod runs;

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the full application router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v0/agents", post(agents::create).get(agents::list))
        .route(
            "/v0/connectors/bindings",
            post(bindings::create).get(bindings::list),
        )
        .route("/v0/runs", post(runs::create))
        .route("/v0/runs/{run_id}", get(runs::fetch))
        .route("/v0/runs/{run_id}/approvals", post(runs::approvals))
        .route("/v0/runs/{run_id}/cancel", post(runs::cancel))
        .route("/v0/runs/{run_id}/events", get(runs::events))
        .route("/v0/runs/{run_id}/audit", get(runs::audit))
        .route("/v0/runs/{run_id}/timeline-diff", get(integrity::timeline_diff))
        .route(
            "/v0/runs/{run_id}/replay-integrity",
            get(integrity::replay_integrity),
        )
        .route("/v0/runs/{run_id}/replay-export", get(integrity::replay_export))
        .route(
            "/v0/runs/{run_id}/incident-export",
            get(integrity::incident_export),
        )
        .route("/v0/monitoring/replay-drift", get(integrity::replay_drift))
        .route(
            "/v0/connectors/adapters/{connector_id}/simulate",
            post(connectors::simulate),
        )
        .route(
            "/v0/connectors/adapters/{connector_id}/invoke",
            post(connectors::invoke),
        )
        .route("/v0/policy/evaluate", post(policy::evaluate))
        .route("/v0/policy/simulate", post(policy::simulate))
        .route("/v0/policy/profiles", get(policy::profiles))
        .route(
            "/v0/policy/profiles/{name}/version",
            get(policy::profile_version),
        )
        .route("/v0/policy/patch", post(policy::patch))
        .route("/v0/policy/rollback", post(policy::rollback))
        .route("/v0/policy/patches", get(policy::history))
        .route("/v0/policy/patches/export", get(policy::history_export))
        .with_state(state)
}

/// Liveness probe.
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({"status": "ok"}))
}

// crates/flockmesh-server/tests/api.rs
// ============================================================================
// Module: API Boundary Tests
// Description: Handler-level tests over a fully built application state.
// ============================================================================
//! ## Overview
//! Builds the real state (SQLite, file ledger, catalogs, echo adapter) in a
//! temp directory and drives the handlers directly: identity gate, the
//! weekly-ops approval flow, ad-hoc policy evaluation, and patch conflicts.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use flockmesh_config::FlockmeshConfig;
use flockmesh_core::ConnectorAdapter;
use flockmesh_core::DecisionKind;
use flockmesh_core::RunStatus;
use flockmesh_server::ACTOR_HEADER;
use flockmesh_server::AppState;
use flockmesh_server::EchoAdapter;
use flockmesh_server::routes;
use serde_json::json;

/// Actor used across boundary tests.
const ACTOR: &str = "usr_ops_lead_01";

/// Builds a state over a temp directory, keeping the directory alive.
fn test_state() -> (Arc<AppState>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = FlockmeshConfig::default();
    config.store.path = dir.path().join("state.db");
    config.ledger.data_dir = dir.path().join("data");
    config.policy.profiles_dir = dir.path().join("policies");
    config.policy.global_admins = [ACTOR.to_string()].into_iter().collect();
    let mut adapters: BTreeMap<String, Arc<dyn ConnectorAdapter>> = BTreeMap::new();
    adapters.insert("con_feishu_official".to_string(), Arc::new(EchoAdapter));
    let state = AppState::build(&config, adapters).unwrap();
    (Arc::new(state), dir)
}

/// Builds headers for the default actor.
fn actor_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACTOR_HEADER, HeaderValue::from_static(ACTOR));
    headers
}

/// Parses a body into a DTO through serde_json.
fn body<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> T {
    serde_json::from_value(value).unwrap()
}

/// Tests that requests without the actor header are rejected with 401.
#[tokio::test]
async fn test_missing_actor_header_is_401() {
    let (state, _dir) = test_state();
    let error = routes::agents::list(
        State(state),
        HeaderMap::new(),
        Query(body(json!({}))),
    )
    .await
    .unwrap_err();
    assert_eq!(error.status, StatusCode::UNAUTHORIZED);
}

/// Tests S1 through the boundary: agent, binding, run, approval, audit.
#[tokio::test]
async fn test_weekly_ops_flow() {
    let (state, _dir) = test_state();

    let (status, Json(agent)) = routes::agents::create(
        State(Arc::clone(&state)),
        actor_headers(),
        Json(body(json!({
            "workspace_id": "wsp_mindverse_cn",
            "role": "ops_assistant",
            "owners": [ACTOR],
            "name": "Ops Assistant",
        }))),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let (status, Json(_binding)) = routes::bindings::create(
        State(Arc::clone(&state)),
        actor_headers(),
        Json(body(json!({
            "workspace_id": "wsp_mindverse_cn",
            "agent_id": agent.id.as_str(),
            "connector_id": "con_feishu_official",
            "scopes": ["message.send"],
            "auth_ref": "sec_feishu_bot_token",
        }))),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let (status, Json(run)) = routes::runs::create(
        State(Arc::clone(&state)),
        actor_headers(),
        Json(body(json!({
            "workspace_id": "wsp_mindverse_cn",
            "agent_id": agent.id.as_str(),
            "playbook_id": "pbk_weekly_ops_sync",
            "trigger": {
                "type": "manual",
                "source": "ops.console",
                "actor_id": ACTOR,
            },
        }))),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(run.status, RunStatus::WaitingApproval);
    let escalation = run
        .policy_decisions
        .iter()
        .find(|decision| decision.decision == DecisionKind::Escalate)
        .unwrap();
    assert_eq!(escalation.risk_tier.as_str(), "R2");
    assert_eq!(escalation.required_approvals, 1);

    let Json(resolution) = routes::runs::approvals(
        State(Arc::clone(&state)),
        actor_headers(),
        Path(run.id.as_str().to_string()),
        Json(body(json!({
            "action_intent_id": escalation.action_intent_id.as_str(),
            "approve": true,
            "approved_by": ACTOR,
            "expected_revision": run.revision,
        }))),
    )
    .await
    .unwrap();
    assert_eq!(resolution["state"], "approved");
    assert_eq!(resolution["run"]["status"], "completed");

    let Json(audit) = routes::runs::audit(
        State(Arc::clone(&state)),
        actor_headers(),
        Path(run.id.as_str().to_string()),
        Query(body(json!({"limit": 500, "offset": 0}))),
    )
    .await
    .unwrap();
    let types: Vec<String> = audit
        .items
        .iter()
        .map(|entry| entry.event_type.clone())
        .collect();
    for expected in [
        "run.created",
        "action.planned",
        "policy.evaluated",
        "approval.requested",
        "approval.resolved",
        "action.executed",
        "run.completed",
    ] {
        assert!(types.iter().any(|t| t == expected), "missing {expected}: {types:?}");
    }

    // Replay integrity over the completed run is consistent.
    let Json(report) = routes::integrity::replay_integrity(
        State(Arc::clone(&state)),
        actor_headers(),
        Path(run.id.as_str().to_string()),
    )
    .await
    .unwrap();
    assert_eq!(
        report.replay_state,
        flockmesh_core::runtime::ReplayState::Consistent
    );
}

/// Tests that an approval claim mismatch is 403.
#[tokio::test]
async fn test_claim_mismatch_is_403() {
    let (state, _dir) = test_state();
    let error = routes::runs::create(
        State(state),
        actor_headers(),
        Json(body(json!({
            "workspace_id": "wsp_mindverse_cn",
            "agent_id": "agt_ops_assistant_01",
            "playbook_id": "pbk_weekly_ops_sync",
            "trigger": {
                "type": "manual",
                "source": "ops.console",
                "actor_id": "usr_someone_else",
            },
        }))),
    )
    .await
    .unwrap_err();
    assert_eq!(error.status, StatusCode::FORBIDDEN);
}

/// Tests S2 through `/v0/policy/evaluate`.
#[tokio::test]
async fn test_policy_evaluate_mutation_without_key() {
    let (state, _dir) = test_state();
    let Json(decision) = routes::policy::evaluate(
        State(state),
        actor_headers(),
        Json(body(json!({
            "intent": {
                "capability": "message.send",
                "side_effect": "mutation",
                "risk_hint": "R2",
            },
        }))),
    )
    .await
    .unwrap();
    assert_eq!(decision.decision, DecisionKind::Deny);
    assert!(decision.reason_codes.iter().any(|c| c == "policy.idempotency_required"));
    assert!(decision.reason_codes.iter().any(|c| c == "safety.fail_closed"));
}

/// Tests batch simulation's derived status.
#[tokio::test]
async fn test_policy_simulate_derived_status() {
    let (state, _dir) = test_state();
    let Json(response) = routes::policy::simulate(
        State(state),
        actor_headers(),
        Json(body(json!({
            "intents": [
                {"capability": "metrics.read", "side_effect": "none", "risk_hint": "R0"},
                {
                    "capability": "message.send",
                    "side_effect": "mutation",
                    "risk_hint": "R2",
                    "idempotency_key": "idem_sim_batch_1",
                },
            ],
        }))),
    )
    .await
    .unwrap();
    assert_eq!(response["derived_status"], "waiting_approval");
    assert_eq!(response["decisions"].as_array().unwrap().len(), 2);
}

/// Tests S3 through the patch endpoint: stale hash is 409 with both hashes.
#[tokio::test]
async fn test_patch_hash_conflict() {
    let (state, _dir) = test_state();

    // Fetch the live hash first.
    let Json(version) = routes::policy::profile_version(
        State(Arc::clone(&state)),
        actor_headers(),
        Path("workspace_ops_cn".to_string()),
    )
    .await
    .unwrap();
    let live_hash = version["document_hash"].as_str().unwrap().to_string();

    let stale = format!("sha256:{}", "0".repeat(64));
    let error = routes::policy::patch(
        State(Arc::clone(&state)),
        actor_headers(),
        Json(body(json!({
            "profile_name": "workspace_ops_cn",
            "mode": "apply",
            "patch_rules": [
                {"capability": "message.send", "decision": "deny"},
            ],
            "actor_id": ACTOR,
            "expected_profile_hash": stale,
        }))),
    )
    .await
    .unwrap_err();
    assert_eq!(error.status, StatusCode::CONFLICT);
    assert_eq!(error.extra["expected_profile_hash"], stale);
    assert_eq!(error.extra["current_profile_hash"], live_hash);

    // A matching hash applies and bumps the profile version.
    let Json(response) = routes::policy::patch(
        State(Arc::clone(&state)),
        actor_headers(),
        Json(body(json!({
            "profile_name": "workspace_ops_cn",
            "mode": "apply",
            "patch_rules": [
                {"capability": "message.send", "decision": "deny"},
            ],
            "actor_id": ACTOR,
            "expected_profile_hash": live_hash,
        }))),
    )
    .await
    .unwrap();
    assert!(response.applied);
    let Json(version) = routes::policy::profile_version(
        State(state),
        actor_headers(),
        Path("workspace_ops_cn".to_string()),
    )
    .await
    .unwrap();
    assert_eq!(
        version["document_hash"].as_str().unwrap(),
        response.after_profile_hash.as_str()
    );
}

/// Tests ledger pagination bounds at the boundary.
#[tokio::test]
async fn test_ledger_page_bounds() {
    let (state, _dir) = test_state();
    let error = routes::runs::events(
        State(state),
        actor_headers(),
        Path("run_missing".to_string()),
        Query(body(json!({"limit": 0, "offset": 0}))),
    )
    .await
    .unwrap_err();
    // Limit bounds are enforced before the run lookup resolves.
    assert_eq!(error.status, StatusCode::BAD_REQUEST);
}

// crates/flockmesh-core/tests/integrity.rs
// ============================================================================
// Module: Integrity View Tests
// Description: Tests for replay integrity, timeline diff, and drift summary.
// ============================================================================
//! ## Overview
//! Validates the ledger-derived integrity verdicts, including the forged-
//! event scenario, base-run scope enforcement, and drift ordering.

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

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use flockmesh_core::ActorId;
use flockmesh_core::AgentId;
use flockmesh_core::EventId;
use flockmesh_core::EventRecord;
use flockmesh_core::LedgerStore;
use flockmesh_core::PageRequest;
use flockmesh_core::PatchHistoryStore;
use flockmesh_core::PlaybookId;
use flockmesh_core::RunId;
use flockmesh_core::RunTrigger;
use flockmesh_core::SigningKeyId;
use flockmesh_core::SigningKeyRing;
use flockmesh_core::StateStore;
use flockmesh_core::TriggerKind;
use flockmesh_core::WorkspaceId;
use flockmesh_core::runtime::CreateRunRequest;
use flockmesh_core::runtime::DriftQuery;
use flockmesh_core::runtime::InMemoryHistoryStore;
use flockmesh_core::runtime::IntegrityError;
use flockmesh_core::runtime::IntegrityViews;
use flockmesh_core::runtime::ReplayState;
use flockmesh_core::runtime::RequestedProfiles;
use serde_json::json;

use common::ACTOR;
use common::AGENT;
use common::WORKSPACE;
use common::engine_fixture;
use common::t0;

/// Builds integrity views over an engine fixture.
fn views(fixture: &common::EngineFixture) -> IntegrityViews {
    let mut secrets = BTreeMap::new();
    secrets.insert(SigningKeyId::new("exp_default_key"), "export-secret".to_string());
    let ring = SigningKeyRing::new(secrets, SigningKeyId::new("exp_default_key")).unwrap();
    IntegrityViews::new(
        Arc::clone(&fixture.store) as Arc<dyn StateStore>,
        Arc::clone(&fixture.ledger) as Arc<dyn LedgerStore>,
        Arc::new(InMemoryHistoryStore::new()) as Arc<dyn PatchHistoryStore>,
        Arc::new(ring),
        2_000,
    )
}

/// Creates a completed read-only run.
fn completed_run(fixture: &common::EngineFixture, playbook: &str, at_millis: i64) -> RunId {
    let actor = ActorId::new(ACTOR);
    fixture
        .engine
        .create_run(
            &CreateRunRequest {
                workspace_id: WorkspaceId::new(WORKSPACE),
                agent_id: AgentId::new(AGENT),
                playbook_id: PlaybookId::new(playbook),
                trigger: RunTrigger {
                    kind: TriggerKind::Schedule,
                    source: "scheduler".to_string(),
                    actor_id: actor.clone(),
                    at: t0().plus_millis(at_millis),
                },
                profiles: RequestedProfiles::default(),
            },
            &actor,
            t0().plus_millis(at_millis),
        )
        .unwrap()
        .id
}

/// Tests that an untouched completed run is consistent.
#[test]
fn test_completed_run_is_consistent() {
    let fixture = engine_fixture();
    let run_id = completed_run(&fixture, "pbk_probe_one", 0);
    let report = views(&fixture).replay_integrity(&run_id).unwrap();
    assert_eq!(report.replay_state, ReplayState::Consistent);
    assert!(report.issues.is_empty());
}

/// Tests S6: a forged execution event flips the verdict to inconsistent.
#[test]
fn test_forged_event_is_inconsistent() {
    let fixture = engine_fixture();
    let run_id = completed_run(&fixture, "pbk_probe_one", 0);

    // Forge an execution event naming an intent the run does not contain.
    let forged = EventRecord {
        id: EventId::new("evt_forged_1"),
        run_id: run_id.clone(),
        name: "action.executed".to_string(),
        payload: json!({"action_intent_id": "act_not_in_this_run"}),
        at: t0().plus_millis(5_000),
        persisted_at: t0().plus_millis(5_000),
    };
    fixture.ledger.append_event(&forged).unwrap();

    let report = views(&fixture).replay_integrity(&run_id).unwrap();
    assert_eq!(report.replay_state, ReplayState::Inconsistent);
    assert!(
        report.issues.iter().any(|code| code == "replay.unexpected_action_execution"),
        "issues: {:?}",
        report.issues
    );
    assert!(
        report.issues.iter().any(|code| code == "replay.audit_event_count_mismatch"),
        "issues: {:?}",
        report.issues
    );
    assert!(report.issues.iter().any(|code| code == "replay.unknown_event_action_id"));
}

/// Tests that a waiting run reports pending.
#[test]
fn test_waiting_run_is_pending() {
    let fixture = engine_fixture();
    let run_id = completed_run(&fixture, "pbk_weekly_ops_sync", 0);
    let report = views(&fixture).replay_integrity(&run_id).unwrap();
    assert_eq!(report.replay_state, ReplayState::Pending);
}

/// Tests S5: an explicit base with a different playbook is rejected,
/// mentioning the playbook.
#[test]
fn test_timeline_diff_playbook_mismatch() {
    let fixture = engine_fixture();
    let current = completed_run(&fixture, "pbk_weekly_ops_sync", 10_000);
    let base = completed_run(&fixture, "pbk_monthly_ops_review", 0);

    let error = views(&fixture).timeline_diff(&current, Some(&base), 50).unwrap_err();
    match error {
        IntegrityError::BaseScopeMismatch(message) => {
            assert!(message.contains("playbook"), "message: {message}");
        }
        other => panic!("expected BaseScopeMismatch, got {other}"),
    }
}

/// Tests auto-selection of the latest earlier base and diff row shape.
#[test]
fn test_timeline_diff_auto_base() {
    let fixture = engine_fixture();
    let base = completed_run(&fixture, "pbk_probe_one", 0);
    let current = completed_run(&fixture, "pbk_probe_one", 60_000);

    let diff = views(&fixture).timeline_diff(&current, None, 100).unwrap();
    assert_eq!(diff.base_run_id, base);
    assert!(!diff.rows.is_empty());
    // Identical playbooks on the default lattice produce an all-zero delta.
    assert!(diff.rows.iter().all(|row| row.delta == 0));

    // Rows honor the sample limit.
    let truncated = views(&fixture).timeline_diff(&current, None, 2).unwrap();
    assert_eq!(truncated.rows.len(), 2);
    assert!(truncated.truncated);
}

/// Tests the 404-shaped error when no comparable base exists.
#[test]
fn test_timeline_diff_no_base() {
    let fixture = engine_fixture();
    let current = completed_run(&fixture, "pbk_probe_one", 0);
    let error = views(&fixture).timeline_diff(&current, None, 50).unwrap_err();
    assert!(matches!(error, IntegrityError::NoComparableBase(_)));
}

/// Tests drift ordering and the alerting count.
#[test]
fn test_drift_summary_orders_by_severity() {
    let fixture = engine_fixture();
    let clean = completed_run(&fixture, "pbk_probe_one", 0);
    let tampered = completed_run(&fixture, "pbk_probe_two", 10_000);
    fixture
        .ledger
        .append_event(&EventRecord {
            id: EventId::new("evt_forged_2"),
            run_id: tampered.clone(),
            name: "action.executed".to_string(),
            payload: json!({"action_intent_id": "act_bogus"}),
            at: t0().plus_millis(20_000),
            persisted_at: t0().plus_millis(20_000),
        })
        .unwrap();

    let summary = views(&fixture)
        .replay_drift(&DriftQuery {
            limit: 10,
            include_pending: false,
            alert_on_inconclusive: false,
        })
        .unwrap();
    assert_eq!(summary.runs[0].run_id, tampered);
    assert_eq!(summary.runs[0].replay_state, ReplayState::Inconsistent);
    assert_eq!(summary.totals.get("inconsistent"), Some(&1));
    assert_eq!(summary.totals.get("consistent"), Some(&1));
    assert_eq!(summary.alerting, 1);
    assert!(summary.runs.iter().any(|row| row.run_id == clean));
}

/// Tests that exports verify against the signing key ring.
#[test]
fn test_incident_export_round_trip() {
    let fixture = engine_fixture();
    let run_id = completed_run(&fixture, "pbk_probe_one", 0);
    let view = views(&fixture);

    let export = view.incident_export(&run_id, t0().plus_millis(120_000)).unwrap();
    assert_eq!(export.envelope.export_type, "incident");
    assert_eq!(export.signature.algorithm, "HMAC-SHA256");

    let mut secrets = BTreeMap::new();
    secrets.insert(SigningKeyId::new("exp_default_key"), "export-secret".to_string());
    let ring = SigningKeyRing::new(secrets, SigningKeyId::new("exp_default_key")).unwrap();
    ring.verify(&export.envelope, &export.signature).unwrap();

    let replay = view.replay_export(&run_id, t0().plus_millis(120_000)).unwrap();
    assert_eq!(replay.envelope.export_type, "replay");
    ring.verify(&replay.envelope, &replay.signature).unwrap();

    let history = view
        .patch_history_export(None, PageRequest { limit: 50, offset: 0 }, t0())
        .unwrap();
    assert_eq!(history.envelope.export_type, "policy_patch_history");
    ring.verify(&history.envelope, &history.signature).unwrap();
}

// crates/flockmesh-core/tests/run_lifecycle.rs
// ============================================================================
// Module: Run Lifecycle Tests
// Description: Tests for run acceptance, approvals, rejection, and cancel.
// ============================================================================
//! ## Overview
//! Walks the weekly-ops scenario end to end and checks the revision-CAS and
//! terminal-state invariants.

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

use flockmesh_core::ActorId;
use flockmesh_core::AgentId;
use flockmesh_core::DecisionKind;
use flockmesh_core::LedgerStore;
use flockmesh_core::PageRequest;
use flockmesh_core::PlaybookId;
use flockmesh_core::RunStatus;
use flockmesh_core::RunTrigger;
use flockmesh_core::TriggerKind;
use flockmesh_core::WorkspaceId;
use flockmesh_core::runtime::ApprovalRequest;
use flockmesh_core::runtime::CancelRequest;
use flockmesh_core::runtime::CreateRunRequest;
use flockmesh_core::runtime::EngineError;
use flockmesh_core::runtime::RequestedProfiles;
use flockmesh_core::runtime::ResolutionState;

use common::ACTOR;
use common::AGENT;
use common::WORKSPACE;
use common::engine_fixture;
use common::t0;

/// Builds the weekly-ops create request.
fn weekly_request() -> CreateRunRequest {
    CreateRunRequest {
        workspace_id: WorkspaceId::new(WORKSPACE),
        agent_id: AgentId::new(AGENT),
        playbook_id: PlaybookId::new("pbk_weekly_ops_sync"),
        trigger: RunTrigger {
            kind: TriggerKind::Manual,
            source: "ops.console".to_string(),
            actor_id: ActorId::new(ACTOR),
            at: t0(),
        },
        profiles: RequestedProfiles::default(),
    }
}

/// Tests S1: weekly-ops run escalates once, then completes on approval.
#[test]
fn test_weekly_ops_escalation_to_completion() {
    let fixture = engine_fixture();
    let actor = ActorId::new(ACTOR);
    let run = fixture.engine.create_run(&weekly_request(), &actor, t0()).unwrap();

    assert_eq!(run.status, RunStatus::WaitingApproval);
    assert_eq!(run.revision, 1);
    let escalations: Vec<_> =
        run.policy_decisions.iter().filter(|decision| decision.is_escalate()).collect();
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].risk_tier.as_str(), "R2");
    assert_eq!(escalations[0].required_approvals, 1);
    assert_eq!(run.approval_state.len(), 1);

    let intent_id = escalations[0].action_intent_id.clone();
    let outcome = fixture
        .engine
        .resolve_approval(
            &run.id,
            &ApprovalRequest {
                action_intent_id: intent_id,
                approve: true,
                approved_by: actor.clone(),
                expected_revision: run.revision,
            },
            &actor,
            t0().plus_millis(60_000),
        )
        .unwrap();

    assert_eq!(outcome.state, ResolutionState::Approved);
    assert_eq!(outcome.run.status, RunStatus::Completed);
    assert!(outcome.run.approval_state.is_empty());
    assert_eq!(outcome.run.revision, 2);

    // Audit stream carries the full scenario sequence in order.
    let audit = fixture
        .ledger
        .read_audit(&run.id, PageRequest { limit: 500, offset: 0 })
        .unwrap();
    let types: Vec<&str> = audit.items.iter().map(|entry| entry.event_type.as_str()).collect();
    for expected in [
        "run.created",
        "action.planned",
        "policy.evaluated",
        "approval.requested",
        "approval.resolved",
        "action.executed",
        "run.completed",
    ] {
        assert!(types.contains(&expected), "missing audit type {expected}: {types:?}");
    }
    let position = |name: &str| types.iter().position(|t| *t == name).unwrap();
    assert!(position("run.created") < position("action.planned"));
    assert!(position("action.planned") < position("policy.evaluated"));
    assert!(position("policy.evaluated") < position("approval.requested"));
    assert!(position("approval.requested") < position("approval.resolved"));
    assert!(position("approval.resolved") < position("action.executed"));
    assert!(position("action.executed") < position("run.completed"));
}

/// Tests that a stale expected revision is rejected with both revisions.
#[test]
fn test_approval_revision_conflict() {
    let fixture = engine_fixture();
    let actor = ActorId::new(ACTOR);
    let run = fixture.engine.create_run(&weekly_request(), &actor, t0()).unwrap();
    let intent_id = run.action_intents[0].id.clone();

    let error = fixture
        .engine
        .resolve_approval(
            &run.id,
            &ApprovalRequest {
                action_intent_id: intent_id,
                approve: true,
                approved_by: actor.clone(),
                expected_revision: 41,
            },
            &actor,
            t0(),
        )
        .unwrap_err();
    match error {
        EngineError::RevisionConflict { expected, current } => {
            assert_eq!(expected, 41);
            assert_eq!(current, 1);
        }
        other => panic!("expected RevisionConflict, got {other}"),
    }
}

/// Tests that a rejection fails the run immediately and clears approvals.
#[test]
fn test_rejection_fails_run() {
    let fixture = engine_fixture();
    let actor = ActorId::new(ACTOR);
    let run = fixture.engine.create_run(&weekly_request(), &actor, t0()).unwrap();
    let intent_id = run.action_intents[0].id.clone();

    let outcome = fixture
        .engine
        .resolve_approval(
            &run.id,
            &ApprovalRequest {
                action_intent_id: intent_id.clone(),
                approve: false,
                approved_by: actor.clone(),
                expected_revision: run.revision,
            },
            &actor,
            t0(),
        )
        .unwrap();
    assert_eq!(outcome.state, ResolutionState::Rejected);
    assert_eq!(outcome.run.status, RunStatus::Failed);
    assert!(outcome.run.approval_state.is_empty());
    let decision = outcome.run.latest_decision(&intent_id).unwrap();
    assert_eq!(decision.decision, DecisionKind::Deny);
    assert!(decision.reason_codes.iter().any(|code| code == "approval.resolved.deny"));

    // Terminal runs refuse further mutation.
    let error = fixture
        .engine
        .cancel_run(
            &run.id,
            &CancelRequest {
                cancelled_by: actor.clone(),
                expected_revision: outcome.run.revision,
            },
            &actor,
            t0(),
        )
        .unwrap_err();
    assert!(matches!(error, EngineError::TerminalRun(RunStatus::Failed)));
}

/// Tests that the approver claim must match the authenticated actor.
#[test]
fn test_approver_claim_mismatch() {
    let fixture = engine_fixture();
    let actor = ActorId::new(ACTOR);
    let run = fixture.engine.create_run(&weekly_request(), &actor, t0()).unwrap();
    let intent_id = run.action_intents[0].id.clone();

    let error = fixture
        .engine
        .resolve_approval(
            &run.id,
            &ApprovalRequest {
                action_intent_id: intent_id,
                approve: true,
                approved_by: ActorId::new("usr_someone_else"),
                expected_revision: run.revision,
            },
            &actor,
            t0(),
        )
        .unwrap_err();
    assert!(matches!(error, EngineError::ActorClaimMismatch));
}

/// Tests cancellation of a waiting run.
#[test]
fn test_cancel_clears_approvals() {
    let fixture = engine_fixture();
    let actor = ActorId::new(ACTOR);
    let run = fixture.engine.create_run(&weekly_request(), &actor, t0()).unwrap();

    let cancelled = fixture
        .engine
        .cancel_run(
            &run.id,
            &CancelRequest {
                cancelled_by: actor.clone(),
                expected_revision: run.revision,
            },
            &actor,
            t0().plus_millis(1_000),
        )
        .unwrap();
    assert_eq!(cancelled.status, RunStatus::Cancelled);
    assert!(cancelled.approval_state.is_empty());
    assert!(cancelled.ended_at.is_some());
    assert_eq!(cancelled.revision, 2);
}

/// Tests that a read-only playbook completes without approvals.
#[test]
fn test_unknown_playbook_falls_back_and_completes() {
    let fixture = engine_fixture();
    let actor = ActorId::new(ACTOR);
    let mut request = weekly_request();
    request.playbook_id = PlaybookId::new("pbk_does_not_exist");
    let run = fixture.engine.create_run(&request, &actor, t0()).unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.approval_state.is_empty());
    assert!(run.policy_decisions.iter().all(|decision| decision.is_allow()));

    // Invariant 10: executions cover every allow decision.
    let events = fixture
        .ledger
        .read_events(&run.id, PageRequest { limit: 500, offset: 0 })
        .unwrap();
    let executed = events
        .items
        .iter()
        .filter(|event| {
            event.name == "action.executed" || event.name == "action.executed.deduped"
        })
        .count();
    assert!(executed >= run.policy_decisions.iter().filter(|d| d.is_allow()).count());
}

/// Tests workspace mismatch refusal at acceptance.
#[test]
fn test_workspace_mismatch_rejected() {
    let fixture = engine_fixture();
    let actor = ActorId::new(ACTOR);
    let mut request = weekly_request();
    request.workspace_id = WorkspaceId::new("wsp_other_tenant");
    let error = fixture.engine.create_run(&request, &actor, t0()).unwrap_err();
    assert!(matches!(error, EngineError::WorkspaceMismatch { .. }));
}

// crates/flockmesh-core/tests/patch.rs
// ============================================================================
// Module: Policy Patch Pipeline Tests
// Description: Tests for dry-run, apply, hash CAS, rollback, and authz.
// ============================================================================
//! ## Overview
//! Exercises the patch pipeline over an in-memory library, writer, and
//! history journal, including the stale-hash conflict scenario.

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

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use flockmesh_core::ActorId;
use flockmesh_core::CapabilityName;
use flockmesh_core::CatalogError;
use flockmesh_core::DecisionId;
use flockmesh_core::DecisionKind;
use flockmesh_core::HashDigest;
use flockmesh_core::LedgerStore;
use flockmesh_core::PatchHistoryStore;
use flockmesh_core::PatchOperation;
use flockmesh_core::PatchRule;
use flockmesh_core::ProfileDocument;
use flockmesh_core::ProfileName;
use flockmesh_core::ProfileWriter;
use flockmesh_core::PageRequest;
use flockmesh_core::policy::PolicyLibrary;
use flockmesh_core::policy::ProfileLookup;
use flockmesh_core::policy::evaluate_intent;
use flockmesh_core::policy::PolicyContext;
use flockmesh_core::runtime::InMemoryHistoryStore;
use flockmesh_core::runtime::InMemoryLedgerStore;
use flockmesh_core::runtime::LatticeFallbacks;
use flockmesh_core::runtime::PatchError;
use flockmesh_core::runtime::PatchMode;
use flockmesh_core::runtime::PatchPipeline;
use flockmesh_core::runtime::PatchRequest;
use flockmesh_core::runtime::PolicyAdminConfig;
use flockmesh_core::runtime::Recorder;
use flockmesh_core::runtime::RollbackRequest;
use flockmesh_core::runtime::RollbackTarget;

use common::ACTOR;
use common::default_library;
use common::t0;

/// Profile writer capturing documents in memory.
#[derive(Default)]
struct MemoryWriter {
    /// Documents written, newest last.
    written: Mutex<Vec<ProfileDocument>>,
}

impl ProfileWriter for MemoryWriter {
    fn write_profile(&self, document: &ProfileDocument) -> Result<String, CatalogError> {
        self.written
            .lock()
            .map_err(|_| CatalogError::Io("writer mutex poisoned".to_string()))?
            .push(document.clone());
        Ok(format!("policies/{}.policy.json", document.name))
    }
}

/// Pipeline fixture.
struct PatchFixture {
    /// Library under change.
    library: Arc<PolicyLibrary>,
    /// Captured file writes.
    writer: Arc<MemoryWriter>,
    /// History journal.
    history: Arc<InMemoryHistoryStore>,
    /// Pipeline under test.
    pipeline: PatchPipeline,
}

/// Builds the pipeline fixture with the ops lead as a global admin.
fn fixture() -> PatchFixture {
    let library = default_library();
    let writer = Arc::new(MemoryWriter::default());
    let history = Arc::new(InMemoryHistoryStore::new());
    let pipeline = PatchPipeline::new(
        Arc::clone(&library),
        Arc::clone(&writer) as Arc<dyn ProfileWriter>,
        Arc::clone(&history) as Arc<dyn PatchHistoryStore>,
        Recorder::new(Arc::new(InMemoryLedgerStore::new()) as Arc<dyn LedgerStore>),
        PolicyAdminConfig {
            global_admins: [ACTOR.to_string()].into_iter().collect(),
            profile_admins: std::collections::BTreeMap::new(),
        },
        LatticeFallbacks::default(),
    );
    PatchFixture {
        library,
        writer,
        history,
        pipeline,
    }
}

/// Returns the current document hash for a profile.
fn current_hash(library: &PolicyLibrary, name: &str) -> HashDigest {
    library
        .profile(&ProfileName::new(name))
        .unwrap()
        .to_document()
        .document_hash()
        .unwrap()
}

/// Builds a deny patch for `message.send`.
fn deny_message_send() -> Vec<PatchRule> {
    vec![PatchRule {
        capability: "message.send".to_string(),
        decision: DecisionKind::Deny,
        required_approvals: None,
    }]
}

/// Tests that dry-run computes the diff and preview without writing.
#[test]
fn test_dry_run_writes_nothing() {
    let fixture = fixture();
    let before_hash = current_hash(&fixture.library, "workspace_ops_cn");

    let response = fixture
        .pipeline
        .patch(
            &PatchRequest {
                profile_name: ProfileName::new("workspace_ops_cn"),
                mode: PatchMode::DryRun,
                patch_rules: deny_message_send(),
                reason: None,
                actor_id: None,
                expected_profile_hash: None,
            },
            &ActorId::new(ACTOR),
            t0(),
        )
        .unwrap();

    assert!(!response.applied);
    assert!(response.patch_id.is_none());
    assert_eq!(response.summary.added, 1);
    assert_eq!(response.summary.unchanged, 1);
    assert_ne!(response.before_profile_hash, response.after_profile_hash);
    // The preview shows message.send degrading from escalate to deny.
    let simulated = response
        .simulation_preview
        .decisions
        .iter()
        .find(|decision| decision.capability == "message.send")
        .unwrap();
    assert_eq!(simulated.after, DecisionKind::Deny);

    // Nothing changed on disk, in history, or in the library.
    assert!(fixture.writer.written.lock().unwrap().is_empty());
    assert_eq!(
        fixture.history.list(None, PageRequest::default()).unwrap().total,
        0
    );
    assert_eq!(current_hash(&fixture.library, "workspace_ops_cn"), before_hash);
}

/// Tests S3: a stale expected hash is rejected and nothing changes.
#[test]
fn test_apply_hash_conflict() {
    let fixture = fixture();
    let before_hash = current_hash(&fixture.library, "workspace_ops_cn");
    let stale = HashDigest::from_bytes(&[0u8; 32]);

    let error = fixture
        .pipeline
        .patch(
            &PatchRequest {
                profile_name: ProfileName::new("workspace_ops_cn"),
                mode: PatchMode::Apply,
                patch_rules: deny_message_send(),
                reason: Some("tighten messaging".to_string()),
                actor_id: Some(ActorId::new(ACTOR)),
                expected_profile_hash: Some(stale.clone()),
            },
            &ActorId::new(ACTOR),
            t0(),
        )
        .unwrap_err();
    match error {
        PatchError::HashConflict { expected, current } => {
            assert_eq!(expected, stale);
            assert_eq!(current, before_hash);
        }
        other => panic!("expected HashConflict, got {other}"),
    }
    assert!(fixture.writer.written.lock().unwrap().is_empty());

    // Evaluations against the profile are unchanged.
    let decision = evaluate_intent(
        DecisionId::new("pol_t"),
        &flockmesh_core::ActionIntent {
            id: flockmesh_core::ActionIntentId::new("act_t"),
            run_id: flockmesh_core::RunId::new("run_t"),
            step_id: flockmesh_core::StepId::new("step_t"),
            connector_binding_id: None,
            capability: CapabilityName::new("message.send"),
            side_effect: flockmesh_core::SideEffect::None,
            risk_hint: flockmesh_core::RiskHint::new("R0"),
            parameters: serde_json::json!({}),
            target: flockmesh_core::IntentTarget {
                surface: "chat.channel".to_string(),
                connector_hints: None,
            },
            idempotency_key: None,
        },
        &PolicyContext {
            org: ProfileName::new("org_default_safe"),
            workspace: ProfileName::new("workspace_ops_cn"),
            agent: ProfileName::new("agent_ops_assistant"),
            run_override: None,
        },
        fixture.library.as_ref(),
        t0(),
    );
    assert_eq!(decision.decision, DecisionKind::Allow);
}

/// Tests a full apply: file write, library swap, history entry.
#[test]
fn test_apply_updates_library_and_history() {
    let fixture = fixture();
    let before_hash = current_hash(&fixture.library, "workspace_ops_cn");

    let response = fixture
        .pipeline
        .patch(
            &PatchRequest {
                profile_name: ProfileName::new("workspace_ops_cn"),
                mode: PatchMode::Apply,
                patch_rules: deny_message_send(),
                reason: Some("tighten messaging".to_string()),
                actor_id: Some(ActorId::new(ACTOR)),
                expected_profile_hash: Some(before_hash.clone()),
            },
            &ActorId::new(ACTOR),
            t0(),
        )
        .unwrap();

    assert!(response.applied);
    let patch_id = response.patch_id.clone().unwrap();
    assert!(patch_id.as_str().starts_with("pph_"));

    // Library now denies message.send in the workspace layer.
    let profile = fixture.library.profile(&ProfileName::new("workspace_ops_cn")).unwrap();
    let rule = profile.rule_for(&CapabilityName::new("message.send")).unwrap();
    assert_eq!(rule.decision, DecisionKind::Deny);

    // Invariant 6: the written document hashes to the after hash.
    let written = fixture.writer.written.lock().unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(
        written[0].document_hash().unwrap(),
        response.after_profile_hash
    );
    drop(written);

    // The history entry carries both documents and both hashes.
    let entry = fixture.history.find(&patch_id).unwrap().unwrap();
    assert_eq!(entry.operation, PatchOperation::Patch);
    assert_eq!(entry.before_profile_hash, before_hash);
    assert_eq!(entry.after_profile_hash, response.after_profile_hash);
    assert_eq!(entry.actor_id.as_str(), ACTOR);
}

/// Tests rollback to the before-snapshot of the last patch.
#[test]
fn test_rollback_restores_snapshot() {
    let fixture = fixture();
    let before_hash = current_hash(&fixture.library, "workspace_ops_cn");
    fixture
        .pipeline
        .patch(
            &PatchRequest {
                profile_name: ProfileName::new("workspace_ops_cn"),
                mode: PatchMode::Apply,
                patch_rules: deny_message_send(),
                reason: Some("tighten messaging".to_string()),
                actor_id: Some(ActorId::new(ACTOR)),
                expected_profile_hash: Some(before_hash.clone()),
            },
            &ActorId::new(ACTOR),
            t0(),
        )
        .unwrap();

    let patched_hash = current_hash(&fixture.library, "workspace_ops_cn");
    let response = fixture
        .pipeline
        .rollback(
            &RollbackRequest {
                profile_name: ProfileName::new("workspace_ops_cn"),
                mode: PatchMode::Apply,
                target_patch_id: None,
                target_state: RollbackTarget::Before,
                reason: Some("messaging block was too broad".to_string()),
                actor_id: Some(ActorId::new(ACTOR)),
                expected_profile_hash: Some(patched_hash),
            },
            &ActorId::new(ACTOR),
            t0().plus_millis(1_000),
        )
        .unwrap();

    assert!(response.applied);
    assert_eq!(response.operation, PatchOperation::Rollback);
    assert_eq!(response.after_profile_hash, before_hash);
    assert_eq!(current_hash(&fixture.library, "workspace_ops_cn"), before_hash);

    // The rollback entry points at the patch it undid.
    let entry = fixture
        .history
        .find(&response.patch_id.unwrap())
        .unwrap()
        .unwrap();
    assert!(entry.rollback_of.is_some());
}

/// Tests admin authorization on apply.
#[test]
fn test_apply_requires_admin() {
    let fixture = fixture();
    let before_hash = current_hash(&fixture.library, "workspace_ops_cn");
    let outsider = ActorId::new("usr_not_an_admin");

    let error = fixture
        .pipeline
        .patch(
            &PatchRequest {
                profile_name: ProfileName::new("workspace_ops_cn"),
                mode: PatchMode::Apply,
                patch_rules: deny_message_send(),
                reason: None,
                actor_id: Some(outsider.clone()),
                expected_profile_hash: Some(before_hash),
            },
            &outsider,
            t0(),
        )
        .unwrap_err();
    assert!(matches!(error, PatchError::NotAuthorized));
}

/// Tests patch rule normalization failures.
#[test]
fn test_rule_normalization() {
    let fixture = fixture();
    let request = |rules: Vec<PatchRule>| PatchRequest {
        profile_name: ProfileName::new("workspace_ops_cn"),
        mode: PatchMode::DryRun,
        patch_rules: rules,
        reason: None,
        actor_id: None,
        expected_profile_hash: None,
    };

    let error = fixture
        .pipeline
        .patch(
            &request(vec![PatchRule {
                capability: "NotACapability".to_string(),
                decision: DecisionKind::Allow,
                required_approvals: None,
            }]),
            &ActorId::new(ACTOR),
            t0(),
        )
        .unwrap_err();
    assert!(matches!(error, PatchError::InvalidRule(_)));

    let error = fixture
        .pipeline
        .patch(
            &request(vec![PatchRule {
                capability: "message.send".to_string(),
                decision: DecisionKind::Escalate,
                required_approvals: Some(9),
            }]),
            &ActorId::new(ACTOR),
            t0(),
        )
        .unwrap_err();
    assert!(matches!(error, PatchError::InvalidRule(_)));

    let duplicate = PatchRule {
        capability: "message.send".to_string(),
        decision: DecisionKind::Allow,
        required_approvals: None,
    };
    let error = fixture
        .pipeline
        .patch(
            &request(vec![duplicate.clone(), duplicate]),
            &ActorId::new(ACTOR),
            t0(),
        )
        .unwrap_err();
    assert!(matches!(error, PatchError::DuplicateCapability(_)));

    // A BTreeSet keeps this honest: capability ordering in responses is
    // lexicographic regardless of request order.
    let response = fixture
        .pipeline
        .patch(
            &request(vec![
                PatchRule {
                    capability: "message.send".to_string(),
                    decision: DecisionKind::Deny,
                    required_approvals: None,
                },
                PatchRule {
                    capability: "calendar.event.create".to_string(),
                    decision: DecisionKind::Escalate,
                    required_approvals: Some(2),
                },
            ]),
            &ActorId::new(ACTOR),
            t0(),
        )
        .unwrap();
    let keys: BTreeSet<String> = response
        .simulation_preview
        .decisions
        .iter()
        .map(|decision| decision.capability.clone())
        .collect();
    assert!(keys.contains("calendar.event.create"));
    assert!(keys.contains("message.send"));
}

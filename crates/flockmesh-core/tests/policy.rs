// crates/flockmesh-core/tests/policy.rs
// ============================================================================
// Module: Policy Engine Tests
// Description: Tests for lattice evaluation and fail-closed semantics.
// ============================================================================
//! ## Overview
//! Validates the risk baseline, the strictest-wins merge, effective-source
//! selection, and every fail-closed precondition.

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

use flockmesh_core::ActionIntent;
use flockmesh_core::ActionIntentId;
use flockmesh_core::CapabilityName;
use flockmesh_core::DecisionId;
use flockmesh_core::DecisionKind;
use flockmesh_core::IdempotencyKey;
use flockmesh_core::IntentTarget;
use flockmesh_core::PolicySource;
use flockmesh_core::ProfileName;
use flockmesh_core::ProfileRule;
use flockmesh_core::RiskHint;
use flockmesh_core::RunId;
use flockmesh_core::SideEffect;
use flockmesh_core::StepId;
use flockmesh_core::policy::PolicyContext;
use flockmesh_core::policy::PolicyLibrary;
use flockmesh_core::policy::evaluate_intent;
use proptest::prelude::*;

use common::default_library;
use common::t0;
use common::wildcard_profile;

/// Builds an intent for the given capability and risk.
fn intent(capability: &str, side_effect: SideEffect, risk: &str, key: Option<&str>) -> ActionIntent {
    ActionIntent {
        id: ActionIntentId::new("act_test_1"),
        run_id: RunId::new("run_test_1"),
        step_id: StepId::new("step_1"),
        connector_binding_id: None,
        capability: CapabilityName::new(capability),
        side_effect,
        risk_hint: RiskHint::new(risk),
        parameters: serde_json::json!({}),
        target: IntentTarget {
            surface: "chat.channel".to_string(),
            connector_hints: None,
        },
        idempotency_key: key.map(IdempotencyKey::new),
    }
}

/// Builds the standard lattice context.
fn context() -> PolicyContext {
    PolicyContext {
        org: ProfileName::new("org_default_safe"),
        workspace: ProfileName::new("workspace_ops_cn"),
        agent: ProfileName::new("agent_ops_assistant"),
        run_override: None,
    }
}

/// Tests the risk baseline table.
#[test]
fn test_baseline_decisions_by_tier() {
    let library = default_library();
    let cases = [
        ("R0", DecisionKind::Allow, 0, "risk.r0.read_only"),
        ("R1", DecisionKind::Allow, 0, "risk.r1.low_impact"),
        ("R2", DecisionKind::Escalate, 1, "risk.r2.requires_approval"),
        ("R3", DecisionKind::Escalate, 2, "risk.r3.dual_approval"),
    ];
    for (tier, expected, approvals, reason) in cases {
        let decision = evaluate_intent(
            DecisionId::new("pol_t"),
            &intent("metrics.read", SideEffect::None, tier, None),
            &context(),
            library.as_ref(),
            t0(),
        );
        assert_eq!(decision.decision, expected, "tier {tier}");
        assert_eq!(decision.required_approvals, approvals, "tier {tier}");
        assert_eq!(decision.reason_codes[0], reason, "tier {tier}");
    }
}

/// Tests S2: a mutation without an idempotency key is denied fail-closed.
#[test]
fn test_mutation_without_key_denied() {
    let library = default_library();
    let decision = evaluate_intent(
        DecisionId::new("pol_t"),
        &intent("message.send", SideEffect::Mutation, "R2", None),
        &context(),
        library.as_ref(),
        t0(),
    );
    assert_eq!(decision.decision, DecisionKind::Deny);
    assert!(decision.reason_codes.iter().any(|code| code == "policy.idempotency_required"));
    assert!(decision.reason_codes.iter().any(|code| code == "safety.fail_closed"));
    assert_eq!(decision.policy_trace.effective_source, PolicySource::Org);
}

/// Tests the unknown-risk-tier fail-closed deny.
#[test]
fn test_unknown_risk_tier_denied() {
    let library = default_library();
    let decision = evaluate_intent(
        DecisionId::new("pol_t"),
        &intent("metrics.read", SideEffect::None, "R7", None),
        &context(),
        library.as_ref(),
        t0(),
    );
    assert_eq!(decision.decision, DecisionKind::Deny);
    assert!(decision.reason_codes.iter().any(|code| code == "policy.unknown_risk_tier"));
}

/// Tests the missing-profile fail-closed deny, naming the layer.
#[test]
fn test_missing_profile_denied_per_source() {
    let library = PolicyLibrary::new();
    library.install(wildcard_profile("org_default_safe", DecisionKind::Allow, None));
    library.install(wildcard_profile("agent_ops_assistant", DecisionKind::Allow, None));
    let decision = evaluate_intent(
        DecisionId::new("pol_t"),
        &intent("metrics.read", SideEffect::None, "R0", None),
        &context(),
        &library,
        t0(),
    );
    assert_eq!(decision.decision, DecisionKind::Deny);
    assert!(decision.reason_codes.iter().any(|code| code == "policy.profile_missing.workspace"));
    assert!(decision.reason_codes.iter().any(|code| code == "safety.fail_closed"));

    let missing_override = PolicyContext {
        run_override: Some(ProfileName::new("run_override_missing")),
        ..context()
    };
    let library = default_library();
    let decision = evaluate_intent(
        DecisionId::new("pol_t"),
        &intent("metrics.read", SideEffect::None, "R0", None),
        &missing_override,
        library.as_ref(),
        t0(),
    );
    assert!(
        decision.reason_codes.iter().any(|code| code == "policy.profile_missing.run_override")
    );
}

/// Tests that a deny anywhere in the lattice wins over allow and escalate.
#[test]
fn test_strictest_wins_merge() {
    let library = default_library();
    let mut rules = BTreeMap::new();
    rules.insert(
        CapabilityName::new("message.send"),
        ProfileRule {
            decision: DecisionKind::Deny,
            required_approvals: None,
        },
    );
    library.install(flockmesh_core::PolicyProfile {
        name: ProfileName::new("workspace_ops_cn"),
        rules,
    });

    let decision = evaluate_intent(
        DecisionId::new("pol_t"),
        &intent("message.send", SideEffect::Mutation, "R2", Some("idem_test_key_1")),
        &context(),
        library.as_ref(),
        t0(),
    );
    assert_eq!(decision.decision, DecisionKind::Deny);
    assert_eq!(decision.policy_trace.effective_source, PolicySource::Workspace);
    assert!(decision.reason_codes.iter().any(|code| code == "policy.rule.workspace"));
    // Baseline reason still leads the list.
    assert_eq!(decision.reason_codes[0], "risk.r2.requires_approval");
}

/// Tests escalate approval maxing across winning contributors and baseline.
#[test]
fn test_escalate_approvals_max() {
    let library = default_library();
    library.install(wildcard_profile("agent_ops_assistant", DecisionKind::Escalate, Some(3)));
    let decision = evaluate_intent(
        DecisionId::new("pol_t"),
        &intent("message.send", SideEffect::Mutation, "R2", Some("idem_test_key_1")),
        &context(),
        library.as_ref(),
        t0(),
    );
    assert_eq!(decision.decision, DecisionKind::Escalate);
    assert_eq!(decision.required_approvals, 3);
    assert_eq!(decision.policy_trace.effective_source, PolicySource::Agent);
}

/// Tests that exact rules beat the wildcard within a profile.
#[test]
fn test_exact_rule_beats_wildcard() {
    let library = default_library();
    let mut rules = BTreeMap::new();
    rules.insert(
        CapabilityName::new("*"),
        ProfileRule {
            decision: DecisionKind::Deny,
            required_approvals: None,
        },
    );
    rules.insert(
        CapabilityName::new("metrics.read"),
        ProfileRule {
            decision: DecisionKind::Allow,
            required_approvals: None,
        },
    );
    library.install(flockmesh_core::PolicyProfile {
        name: ProfileName::new("org_default_safe"),
        rules,
    });
    let decision = evaluate_intent(
        DecisionId::new("pol_t"),
        &intent("metrics.read", SideEffect::None, "R0", None),
        &context(),
        library.as_ref(),
        t0(),
    );
    assert_eq!(decision.decision, DecisionKind::Allow);
}

proptest! {
    /// Property: the merged decision weight equals the max over the baseline
    /// and all contributing profile rules.
    #[test]
    fn prop_merge_is_strictest(
        org in 0_u8..3,
        workspace in 0_u8..3,
        agent in 0_u8..3,
        tier in 0_u8..4,
    ) {
        let to_kind = |value: u8| match value {
            0 => DecisionKind::Allow,
            1 => DecisionKind::Escalate,
            _ => DecisionKind::Deny,
        };
        let library = PolicyLibrary::new();
        library.install(wildcard_profile(
            "org_default_safe",
            to_kind(org),
            (to_kind(org) == DecisionKind::Escalate).then_some(1),
        ));
        library.install(wildcard_profile(
            "workspace_ops_cn",
            to_kind(workspace),
            (to_kind(workspace) == DecisionKind::Escalate).then_some(1),
        ));
        library.install(wildcard_profile(
            "agent_ops_assistant",
            to_kind(agent),
            (to_kind(agent) == DecisionKind::Escalate).then_some(1),
        ));
        let tier_label = ["R0", "R1", "R2", "R3"][tier as usize];
        let baseline_weight: u8 = if tier >= 2 { 2 } else { 1 };

        let decision = evaluate_intent(
            DecisionId::new("pol_t"),
            &intent("metrics.read", SideEffect::None, tier_label, None),
            &context(),
            &library,
            t0(),
        );
        let expected = baseline_weight
            .max(to_kind(org).weight())
            .max(to_kind(workspace).weight())
            .max(to_kind(agent).weight());
        prop_assert_eq!(decision.decision.weight(), expected);
    }
}

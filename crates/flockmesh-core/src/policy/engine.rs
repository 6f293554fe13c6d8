// crates/flockmesh-core/src/policy/engine.rs
// ============================================================================
// Module: Policy Evaluation Engine
// Description: Layered lattice evaluation with strictest-wins merge.
// Purpose: Produce one decision record per intent, failing closed on ambiguity.
// Dependencies: crate::core, crate::policy::library
// ============================================================================

//! ## Overview
//! Evaluation merges a risk-tier baseline with the org, workspace, agent, and
//! optional run-override profiles. The strictest decision wins under weights
//! `allow=1 < escalate=2 < deny=3`. Every precondition failure (malformed
//! intent, unknown tier, missing idempotency key, missing profile) is a deny
//! carrying `safety.fail_closed` rather than an error, so the audit stream
//! observes the unhappy path too.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::ActionIntent;
use crate::core::DecisionId;
use crate::core::DecisionKind;
use crate::core::PolicyDecisionRecord;
use crate::core::PolicySource;
use crate::core::PolicyTrace;
use crate::core::ProfileName;
use crate::core::RiskTier;
use crate::core::Timestamp;
use crate::core::TraceContribution;
use crate::core::push_reason;
use crate::core::reason;
use crate::policy::library::ProfileLookup;

// ============================================================================
// SECTION: Policy Context
// ============================================================================

/// Resolved policy lattice for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyContext {
    /// Org profile name.
    pub org: ProfileName,
    /// Workspace profile name.
    pub workspace: ProfileName,
    /// Agent profile name.
    pub agent: ProfileName,
    /// Optional run-override profile name.
    pub run_override: Option<ProfileName>,
}

impl PolicyContext {
    /// Returns the lattice layers in evaluation order.
    fn layers(&self) -> Vec<(PolicySource, &ProfileName)> {
        let mut layers = vec![
            (PolicySource::Org, &self.org),
            (PolicySource::Workspace, &self.workspace),
            (PolicySource::Agent, &self.agent),
        ];
        if let Some(run_override) = &self.run_override {
            layers.push((PolicySource::RunOverride, run_override));
        }
        layers
    }

    /// Builds the trace skeleton for this context.
    fn trace(&self, effective_source: PolicySource) -> PolicyTrace {
        PolicyTrace {
            org_profile: self.org.clone(),
            workspace_profile: self.workspace.clone(),
            agent_profile: self.agent.clone(),
            run_override_profile: self.run_override.clone(),
            effective_source,
            contributions: Vec::new(),
        }
    }
}

// ============================================================================
// SECTION: Baseline
// ============================================================================

/// Baseline contribution derived from the risk tier.
struct Baseline {
    /// Baseline decision.
    decision: DecisionKind,
    /// Baseline approvals when escalating.
    required_approvals: u32,
    /// Baseline reason code.
    reason: &'static str,
}

/// Returns the baseline contribution for a recognized risk tier.
const fn baseline_for(tier: RiskTier) -> Baseline {
    match tier {
        RiskTier::R0 => Baseline {
            decision: DecisionKind::Allow,
            required_approvals: 0,
            reason: reason::RISK_R0_READ_ONLY,
        },
        RiskTier::R1 => Baseline {
            decision: DecisionKind::Allow,
            required_approvals: 0,
            reason: reason::RISK_R1_LOW_IMPACT,
        },
        RiskTier::R2 => Baseline {
            decision: DecisionKind::Escalate,
            required_approvals: 1,
            reason: reason::RISK_R2_REQUIRES_APPROVAL,
        },
        RiskTier::R3 => Baseline {
            decision: DecisionKind::Escalate,
            required_approvals: 2,
            reason: reason::RISK_R3_DUAL_APPROVAL,
        },
    }
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates one action intent against the policy lattice.
///
/// Never fails: every precondition violation produces a fail-closed deny
/// decision instead of an error.
#[must_use]
pub fn evaluate_intent(
    decision_id: DecisionId,
    intent: &ActionIntent,
    context: &PolicyContext,
    library: &dyn ProfileLookup,
    evaluated_at: Timestamp,
) -> PolicyDecisionRecord {
    if !intent.is_structurally_valid() {
        return fail_closed(
            decision_id,
            intent,
            context,
            reason::POLICY_INVALID_INTENT,
            evaluated_at,
        );
    }
    let Some(tier) = intent.risk_hint.tier() else {
        return fail_closed(
            decision_id,
            intent,
            context,
            reason::POLICY_UNKNOWN_RISK_TIER,
            evaluated_at,
        );
    };
    if intent.side_effect.is_mutation() && intent.idempotency_key.is_none() {
        return fail_closed(
            decision_id,
            intent,
            context,
            reason::POLICY_IDEMPOTENCY_REQUIRED,
            evaluated_at,
        );
    }

    // Resolve every layer before merging; a missing profile anywhere in the
    // lattice is a fail-closed deny naming the layer.
    let mut contributions: Vec<TraceContribution> = Vec::new();
    for (source, profile_name) in context.layers() {
        let Some(profile) = library.profile(profile_name) else {
            let code = format!("{}{}", reason::POLICY_PROFILE_MISSING_PREFIX, source.label());
            return fail_closed(decision_id, intent, context, &code, evaluated_at);
        };
        if let Some(rule) = profile.rule_for(&intent.capability) {
            contributions.push(TraceContribution {
                source,
                decision: rule.decision,
                required_approvals: rule.required_approvals,
                reason: format!("{}{}", reason::POLICY_RULE_PREFIX, source.label()),
            });
        }
    }

    let baseline = baseline_for(tier);
    let winning_weight = contributions
        .iter()
        .map(|contribution| contribution.decision.weight())
        .fold(baseline.decision.weight(), u8::max);
    let decision = match winning_weight {
        3 => DecisionKind::Deny,
        2 => DecisionKind::Escalate,
        _ => DecisionKind::Allow,
    };

    // Effective source: the earliest layer carrying the winning decision, or
    // org when the baseline decided alone.
    let effective_source = contributions
        .iter()
        .filter(|contribution| contribution.decision == decision)
        .map(|contribution| contribution.source)
        .min()
        .unwrap_or(PolicySource::Org);

    let required_approvals = if decision == DecisionKind::Escalate {
        let contributor_max = contributions
            .iter()
            .filter(|contribution| contribution.decision == DecisionKind::Escalate)
            .filter_map(|contribution| contribution.required_approvals)
            .max()
            .unwrap_or(0);
        let baseline_escalation = if baseline.decision == DecisionKind::Escalate {
            baseline.required_approvals
        } else {
            0
        };
        contributor_max.max(baseline_escalation).max(1)
    } else {
        0
    };

    let mut reason_codes = Vec::new();
    push_reason(&mut reason_codes, baseline.reason);
    for contribution in &contributions {
        push_reason(&mut reason_codes, contribution.reason.clone());
    }

    let mut trace = context.trace(effective_source);
    trace.contributions = contributions;

    PolicyDecisionRecord {
        id: decision_id,
        run_id: intent.run_id.clone(),
        action_intent_id: intent.id.clone(),
        decision,
        risk_tier: intent.risk_hint.clone(),
        reason_codes,
        required_approvals,
        policy_trace: trace,
        evaluated_at,
    }
}

/// Builds a fail-closed deny decision for a precondition violation.
#[must_use]
pub fn fail_closed(
    decision_id: DecisionId,
    intent: &ActionIntent,
    context: &PolicyContext,
    code: &str,
    evaluated_at: Timestamp,
) -> PolicyDecisionRecord {
    let mut reason_codes = Vec::new();
    push_reason(&mut reason_codes, code);
    push_reason(&mut reason_codes, reason::SAFETY_FAIL_CLOSED);
    PolicyDecisionRecord {
        id: decision_id,
        run_id: intent.run_id.clone(),
        action_intent_id: intent.id.clone(),
        decision: DecisionKind::Deny,
        risk_tier: intent.risk_hint.clone(),
        reason_codes,
        required_approvals: 0,
        policy_trace: context.trace(PolicySource::Org),
        evaluated_at,
    }
}

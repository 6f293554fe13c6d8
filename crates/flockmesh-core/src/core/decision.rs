// crates/flockmesh-core/src/core/decision.rs
// ============================================================================
// Module: Policy Decisions
// Description: Decision records produced by the policy engine.
// Purpose: Capture the outcome, reasons, and resolved lattice for every intent.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Policy decisions are values, not exceptions: denies, rate limits, and
//! adapter faults all surface as decision records so the audit stream sees
//! them on the unhappy path too. The trace embeds the resolved lattice and
//! the layer that decided the winning outcome.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ActionIntentId;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::ProfileName;
use crate::core::identifiers::RunId;
use crate::core::intent::RiskHint;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Reason Codes
// ============================================================================

/// Dotted reason codes attached to policy decisions.
pub mod reason {
    /// Baseline reason for R0 intents.
    pub const RISK_R0_READ_ONLY: &str = "risk.r0.read_only";
    /// Baseline reason for R1 intents.
    pub const RISK_R1_LOW_IMPACT: &str = "risk.r1.low_impact";
    /// Baseline reason for R2 intents.
    pub const RISK_R2_REQUIRES_APPROVAL: &str = "risk.r2.requires_approval";
    /// Baseline reason for R3 intents.
    pub const RISK_R3_DUAL_APPROVAL: &str = "risk.r3.dual_approval";
    /// Universal marker for fail-closed denies.
    pub const SAFETY_FAIL_CLOSED: &str = "safety.fail_closed";
    /// Intent failed structural validation.
    pub const POLICY_INVALID_INTENT: &str = "policy.invalid_intent";
    /// Risk hint is outside the recognized tiers.
    pub const POLICY_UNKNOWN_RISK_TIER: &str = "policy.unknown_risk_tier";
    /// Mutation without an idempotency key.
    pub const POLICY_IDEMPOTENCY_REQUIRED: &str = "policy.idempotency_required";
    /// Prefix for missing-profile denies; the lattice source is appended.
    pub const POLICY_PROFILE_MISSING_PREFIX: &str = "policy.profile_missing.";
    /// Prefix for profile rule contributions; the lattice source is appended.
    pub const POLICY_RULE_PREFIX: &str = "policy.rule.";
    /// Approval resolution produced an allow.
    pub const APPROVAL_RESOLVED_ALLOW: &str = "approval.resolved.allow";
    /// Approval resolution produced a deny.
    pub const APPROVAL_RESOLVED_DENY: &str = "approval.resolved.deny";
    /// Policy patch authorization failure.
    pub const POLICY_ADMIN_NOT_AUTHORIZED: &str = "policy.admin.not_authorized";
    /// Actor claim in the body did not match the authenticated actor.
    pub const AUTH_ACTOR_CLAIM_MISMATCH: &str = "auth.actor_claim_mismatch";
    /// Connector invoke was rate limited.
    pub const CONNECTOR_RATE_LIMITED: &str = "connector.invoke.rate_limited";
    /// Connector adapter timed out after retries.
    pub const CONNECTOR_TIMEOUT: &str = "connector.invoke.timeout";
    /// Connector adapter failed after retries.
    pub const CONNECTOR_ERROR: &str = "connector.invoke.error";
    /// MCP allowlist had no matching rule.
    pub const MCP_NO_MATCHING_RULE: &str = "mcp.allowlist.no_matching_rule";
    /// MCP invoke omitted the tool name.
    pub const MCP_TOOL_NAME_REQUIRED: &str = "mcp.allowlist.tool_name_required";
    /// MCP tool is not allowed by the matched rule.
    pub const MCP_TOOL_NOT_ALLOWED: &str = "mcp.allowlist.tool_not_allowed";
    /// MCP mutation is not allowed by the matched rule.
    pub const MCP_MUTATION_NOT_ALLOWED: &str = "mcp.allowlist.mutation_not_allowed";
    /// MCP risk tier exceeds the matched rule ceiling.
    pub const MCP_RISK_TIER_EXCEEDED: &str = "mcp.allowlist.risk_tier_exceeded";
}

// ============================================================================
// SECTION: Decision Kind
// ============================================================================

/// Decision outcome with strictest-wins ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Permit the intent.
    Allow,
    /// Hold the intent for human approval.
    Escalate,
    /// Refuse the intent.
    Deny,
}

impl DecisionKind {
    /// Returns the merge weight (`allow=1 < escalate=2 < deny=3`).
    #[must_use]
    pub const fn weight(self) -> u8 {
        match self {
            Self::Allow => 1,
            Self::Escalate => 2,
            Self::Deny => 3,
        }
    }

    /// Returns the wire label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Escalate => "escalate",
            Self::Deny => "deny",
        }
    }
}

// ============================================================================
// SECTION: Policy Source
// ============================================================================

/// Lattice layer that contributed or decided an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySource {
    /// Organization-wide profile.
    Org,
    /// Workspace profile.
    Workspace,
    /// Agent profile.
    Agent,
    /// Run-level override profile.
    RunOverride,
}

impl PolicySource {
    /// Returns the wire label used in dotted reason codes.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Org => "org",
            Self::Workspace => "workspace",
            Self::Agent => "agent",
            Self::RunOverride => "run_override",
        }
    }
}

// ============================================================================
// SECTION: Policy Trace
// ============================================================================

/// One profile contribution recorded in the trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContribution {
    /// Lattice layer that contributed.
    pub source: PolicySource,
    /// Decision contributed by the layer.
    pub decision: DecisionKind,
    /// Approvals requested by the layer, when escalating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_approvals: Option<u32>,
    /// Dotted reason code for the contribution.
    pub reason: String,
}

/// Resolved lattice plus the layer that decided the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTrace {
    /// Org profile name used for evaluation.
    pub org_profile: ProfileName,
    /// Workspace profile name used for evaluation.
    pub workspace_profile: ProfileName,
    /// Agent profile name used for evaluation.
    pub agent_profile: ProfileName,
    /// Run override profile name, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_override_profile: Option<ProfileName>,
    /// Layer that decided the winning outcome.
    pub effective_source: PolicySource,
    /// Ordered profile contributions considered by the merge.
    pub contributions: Vec<TraceContribution>,
}

// ============================================================================
// SECTION: Decision Record
// ============================================================================

/// Policy decision record for one action intent.
///
/// # Invariants
/// - `required_approvals >= 1` exactly when `decision = escalate`.
/// - `reason_codes` preserves first-seen order with duplicates removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecisionRecord {
    /// Decision identifier (`pol_`).
    pub id: DecisionId,
    /// Owning run identifier.
    pub run_id: RunId,
    /// Evaluated intent identifier.
    pub action_intent_id: ActionIntentId,
    /// Decision outcome.
    pub decision: DecisionKind,
    /// Risk tier echoed from the request hint.
    pub risk_tier: RiskHint,
    /// Ordered, deduplicated dotted reason codes.
    pub reason_codes: Vec<String>,
    /// Approvals required to unblock an escalation (zero otherwise).
    pub required_approvals: u32,
    /// Resolved lattice and effective source.
    pub policy_trace: PolicyTrace,
    /// Evaluation timestamp.
    pub evaluated_at: Timestamp,
}

impl PolicyDecisionRecord {
    /// Returns true when the decision permits execution.
    #[must_use]
    pub const fn is_allow(&self) -> bool {
        matches!(self.decision, DecisionKind::Allow)
    }

    /// Returns true when the decision awaits approvals.
    #[must_use]
    pub const fn is_escalate(&self) -> bool {
        matches!(self.decision, DecisionKind::Escalate)
    }
}

/// Appends a reason code, preserving first-seen order and dropping duplicates.
pub fn push_reason(codes: &mut Vec<String>, code: impl Into<String>) {
    let code = code.into();
    if !codes.iter().any(|existing| existing == &code) {
        codes.push(code);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::*;

    /// Tests merge weights order allow < escalate < deny.
    #[test]
    fn test_decision_weights() {
        assert!(DecisionKind::Allow.weight() < DecisionKind::Escalate.weight());
        assert!(DecisionKind::Escalate.weight() < DecisionKind::Deny.weight());
    }

    /// Tests insertion-ordered reason deduplication.
    #[test]
    fn test_push_reason_dedups_in_order() {
        let mut codes = Vec::new();
        push_reason(&mut codes, reason::RISK_R2_REQUIRES_APPROVAL);
        push_reason(&mut codes, "policy.rule.org");
        push_reason(&mut codes, reason::RISK_R2_REQUIRES_APPROVAL);
        push_reason(&mut codes, "policy.rule.workspace");
        assert_eq!(
            codes,
            vec![
                reason::RISK_R2_REQUIRES_APPROVAL.to_string(),
                "policy.rule.org".to_string(),
                "policy.rule.workspace".to_string(),
            ]
        );
    }
}

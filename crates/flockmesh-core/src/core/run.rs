// crates/flockmesh-core/src/core/run.rs
// ============================================================================
// Module: Run Records
// Description: Run lifecycle state with revision-guarded mutation.
// Purpose: Capture one playbook execution for one agent in one workspace.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A run is the unit of lifecycle management: it owns its action intents,
//! their policy decisions, and the approval ledger for open escalations.
//! Every external mutation is compare-and-set on `revision`; terminal states
//! forbid further mutation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::decision::PolicyDecisionRecord;
use crate::core::identifiers::ActionIntentId;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::PlaybookId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::WorkspaceId;
use crate::core::intent::ActionIntent;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Run Status
// ============================================================================

/// Run lifecycle status.
///
/// # Invariants
/// - `completed`, `failed`, and `cancelled` are terminal.
/// - `waiting_approval` holds exactly when at least one escalate decision has
///   unmet approvals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run accepted; intents not yet evaluated.
    Accepted,
    /// All decisions allowed; intents executing.
    Running,
    /// At least one escalation awaits approvals.
    WaitingApproval,
    /// Run finished successfully.
    Completed,
    /// Run failed (deny, rejection, or execution fault).
    Failed,
    /// Run cancelled by an operator.
    Cancelled,
}

impl RunStatus {
    /// Returns true for terminal states that forbid further mutation.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

// ============================================================================
// SECTION: Trigger
// ============================================================================

/// Trigger kinds that start runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Manual trigger by an operator or agent.
    Manual,
    /// Scheduled trigger.
    Schedule,
    /// External webhook or event trigger.
    Event,
}

/// Trigger metadata captured on the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTrigger {
    /// Trigger kind.
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    /// Source label (scheduler name, webhook, caller surface).
    pub source: String,
    /// Actor that initiated the trigger.
    pub actor_id: ActorId,
    /// Trigger timestamp.
    pub at: Timestamp,
}

// ============================================================================
// SECTION: Approval State
// ============================================================================

/// Progress of one escalation awaiting approvals.
///
/// # Invariants
/// - Present in `approval_state` exactly while `approved_by` has fewer
///   entries than `required_approvals`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalProgress {
    /// Escalating decision identifier.
    pub decision_id: DecisionId,
    /// Approvals required to unblock the intent.
    pub required_approvals: u32,
    /// Actors that have approved so far.
    pub approved_by: Vec<ActorId>,
}

impl ApprovalProgress {
    /// Returns the number of approvals still outstanding.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        let granted = u32::try_from(self.approved_by.len()).unwrap_or(u32::MAX);
        self.required_approvals.saturating_sub(granted)
    }
}

// ============================================================================
// SECTION: Run Record
// ============================================================================

/// Run record owned by the state store.
///
/// # Invariants
/// - `revision` starts at 1 and increments by exactly 1 per successful write.
/// - Terminal states carry an empty `approval_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run identifier (`run_`).
    pub id: RunId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Executing agent.
    pub agent_id: AgentId,
    /// Playbook driving the run.
    pub playbook_id: PlaybookId,
    /// Trigger that started the run.
    pub trigger: RunTrigger,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Optimistic-concurrency revision counter.
    pub revision: u64,
    /// Planned action intents.
    pub action_intents: Vec<ActionIntent>,
    /// Policy decisions, one or more per intent.
    pub policy_decisions: Vec<PolicyDecisionRecord>,
    /// Open escalations keyed by intent id.
    pub approval_state: BTreeMap<ActionIntentId, ApprovalProgress>,
    /// Run start timestamp.
    pub started_at: Timestamp,
    /// Run end timestamp, set on terminal transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
}

impl RunRecord {
    /// Returns the intent with the given id, when present.
    #[must_use]
    pub fn intent(&self, intent_id: &ActionIntentId) -> Option<&ActionIntent> {
        self.action_intents.iter().find(|intent| &intent.id == intent_id)
    }

    /// Returns the latest decision for the given intent, when any.
    #[must_use]
    pub fn latest_decision(&self, intent_id: &ActionIntentId) -> Option<&PolicyDecisionRecord> {
        self.policy_decisions.iter().rev().find(|decision| &decision.action_intent_id == intent_id)
    }

    /// Returns the intent ids whose latest decision allows execution.
    #[must_use]
    pub fn allowed_intent_ids(&self) -> Vec<ActionIntentId> {
        self.action_intents
            .iter()
            .filter(|intent| {
                self.latest_decision(&intent.id).is_some_and(PolicyDecisionRecord::is_allow)
            })
            .map(|intent| intent.id.clone())
            .collect()
    }

    /// Returns true when any open escalation remains.
    #[must_use]
    pub fn has_open_escalations(&self) -> bool {
        !self.approval_state.is_empty()
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

    /// Tests terminal status classification.
    #[test]
    fn test_terminal_states() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Accepted.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::WaitingApproval.is_terminal());
    }

    /// Tests remaining-approval arithmetic.
    #[test]
    fn test_approval_remaining() {
        let progress = ApprovalProgress {
            decision_id: DecisionId::new("pol_1"),
            required_approvals: 2,
            approved_by: vec![ActorId::new("usr_alice_01")],
        };
        assert_eq!(progress.remaining(), 1);
    }
}

// crates/flockmesh-server/src/dto.rs
// ============================================================================
// Module: Request and Response Shapes
// Description: JSON DTOs for the /v0 surface.
// Purpose: Keep wire shapes separate from the core records they build.
// Dependencies: flockmesh-core, serde
// ============================================================================

//! ## Overview
//! Requests deserialize into these shapes, get validated against the id
//! contracts, and are translated into core requests. Responses mostly reuse
//! the core records directly; the few boundary-specific wrappers live here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use flockmesh_core::DecisionKind;
use flockmesh_core::PatchRule;
use flockmesh_core::RiskHint;
use flockmesh_core::SideEffect;
use flockmesh_core::Timestamp;
use flockmesh_core::TriggerKind;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Agents
// ============================================================================

/// Request body for `POST /v0/agents`.
#[derive(Debug, Deserialize)]
pub struct CreateAgentBody {
    /// Agent id (`agt_`); minted when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Owning workspace (`wsp_`).
    pub workspace_id: String,
    /// Role label.
    pub role: String,
    /// Owning actor ids.
    #[serde(default)]
    pub owners: Vec<String>,
    /// Display name.
    pub name: String,
    /// Opaque model policy.
    #[serde(default)]
    pub model_policy: Value,
    /// Default policy profile name.
    #[serde(default)]
    pub default_policy_profile: Option<String>,
    /// Opaque metadata.
    #[serde(default)]
    pub metadata: Value,
}

// ============================================================================
// SECTION: Bindings
// ============================================================================

/// Request body for `POST /v0/connectors/bindings`.
#[derive(Debug, Deserialize)]
pub struct CreateBindingBody {
    /// Binding id (`cnb_`); minted when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Owning workspace.
    pub workspace_id: String,
    /// Optional agent restriction.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Connector id (`con_`).
    pub connector_id: String,
    /// Granted capability names.
    pub scopes: Vec<String>,
    /// Opaque secret handle (`sec_`).
    pub auth_ref: String,
    /// Risk posture label.
    #[serde(default = "default_risk_profile")]
    pub risk_profile: flockmesh_core::BindingRiskProfile,
}

/// Returns the default binding risk posture.
const fn default_risk_profile() -> flockmesh_core::BindingRiskProfile {
    flockmesh_core::BindingRiskProfile::Standard
}

// ============================================================================
// SECTION: Runs
// ============================================================================

/// Trigger block on `POST /v0/runs`.
#[derive(Debug, Deserialize)]
pub struct TriggerBody {
    /// Trigger kind.
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    /// Source label.
    pub source: String,
    /// Claimed triggering actor.
    pub actor_id: String,
    /// Trigger time; defaults to now.
    #[serde(default)]
    pub at: Option<Timestamp>,
}

/// Requested lattice profile names on `POST /v0/runs`.
#[derive(Debug, Default, Deserialize)]
pub struct RequestedProfilesBody {
    /// Requested org profile.
    #[serde(default)]
    pub org: Option<String>,
    /// Requested workspace profile.
    #[serde(default)]
    pub workspace: Option<String>,
    /// Requested agent profile.
    #[serde(default)]
    pub agent: Option<String>,
    /// Requested run override profile.
    #[serde(default)]
    pub run_override: Option<String>,
}

/// Request body for `POST /v0/runs`.
#[derive(Debug, Deserialize)]
pub struct CreateRunBody {
    /// Workspace the run executes in.
    pub workspace_id: String,
    /// Agent executing the run.
    pub agent_id: String,
    /// Playbook to expand.
    pub playbook_id: String,
    /// Trigger block.
    pub trigger: TriggerBody,
    /// Requested lattice profiles.
    #[serde(default)]
    pub policy: RequestedProfilesBody,
}

/// Request body for `POST /v0/runs/{id}/approvals`.
#[derive(Debug, Deserialize)]
pub struct ApprovalBody {
    /// Intent whose escalation is being resolved.
    pub action_intent_id: String,
    /// True to approve, false to reject.
    pub approve: bool,
    /// Claimed approving actor.
    pub approved_by: String,
    /// Revision the caller observed.
    pub expected_revision: u64,
}

/// Request body for `POST /v0/runs/{id}/cancel`.
#[derive(Debug, Deserialize)]
pub struct CancelBody {
    /// Claimed cancelling actor.
    pub cancelled_by: String,
    /// Revision the caller observed.
    pub expected_revision: u64,
}

/// Pagination query for ledger reads.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Maximum entries to return (`1..=500`).
    #[serde(default = "default_page_limit")]
    pub limit: u32,
    /// Entries to skip.
    #[serde(default)]
    pub offset: u64,
}

/// Returns the default page limit.
const fn default_page_limit() -> u32 {
    100
}

// ============================================================================
// SECTION: Connectors
// ============================================================================

/// Request body for adapter invoke and simulate.
#[derive(Debug, Deserialize)]
pub struct InvokeBody {
    /// Run the invoke belongs to.
    pub run_id: String,
    /// Workspace claimed by the caller.
    pub workspace_id: String,
    /// Agent claimed by the caller.
    pub agent_id: String,
    /// Binding exercised.
    pub binding_id: String,
    /// Capability being exercised.
    pub capability: String,
    /// Side-effect class.
    pub side_effect: SideEffect,
    /// Declared risk hint.
    pub risk_hint: RiskHint,
    /// Capability parameters.
    #[serde(default)]
    pub parameters: Value,
    /// Target surface label.
    #[serde(default = "default_surface")]
    pub surface: String,
    /// Idempotency key for mutations.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Claimed initiating actor.
    pub initiated_by: String,
}

/// Returns the default invoke surface label.
fn default_surface() -> String {
    "connector.invoke".to_string()
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Intent block for policy evaluation endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentBody {
    /// Capability being evaluated.
    pub capability: String,
    /// Side-effect class.
    pub side_effect: SideEffect,
    /// Declared risk hint.
    pub risk_hint: RiskHint,
    /// Capability parameters.
    #[serde(default)]
    pub parameters: Value,
    /// Target surface label.
    #[serde(default = "default_surface")]
    pub surface: String,
    /// Idempotency key for mutations.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Request body for `POST /v0/policy/evaluate`.
#[derive(Debug, Deserialize)]
pub struct EvaluateBody {
    /// Run the intent nominally belongs to; synthetic when absent.
    #[serde(default)]
    pub run_id: Option<String>,
    /// Intent under evaluation.
    pub intent: IntentBody,
    /// Requested lattice profiles.
    #[serde(default)]
    pub context: RequestedProfilesBody,
}

/// Request body for `POST /v0/policy/simulate`.
#[derive(Debug, Deserialize)]
pub struct SimulateBatchBody {
    /// Intents under evaluation.
    pub intents: Vec<IntentBody>,
    /// Requested lattice profiles.
    #[serde(default)]
    pub context: RequestedProfilesBody,
}

/// Derived run status returned by batch simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedStatus {
    /// At least one decision denies.
    Failed,
    /// At least one decision escalates.
    WaitingApproval,
    /// Every decision allows.
    Completed,
}

impl DerivedStatus {
    /// Derives the status from a decision set.
    #[must_use]
    pub fn from_decisions(decisions: &[flockmesh_core::PolicyDecisionRecord]) -> Self {
        if decisions.iter().any(|decision| decision.decision == DecisionKind::Deny) {
            Self::Failed
        } else if decisions.iter().any(|decision| decision.decision == DecisionKind::Escalate) {
            Self::WaitingApproval
        } else {
            Self::Completed
        }
    }
}

/// Patch mode on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchModeBody {
    /// Compute everything, write nothing.
    DryRun,
    /// Authorize, write, and journal.
    Apply,
}

/// Request body for `POST /v0/policy/patch`.
#[derive(Debug, Deserialize)]
pub struct PatchBody {
    /// Profile to patch.
    pub profile_name: String,
    /// Application mode.
    pub mode: PatchModeBody,
    /// Patch rules.
    pub patch_rules: Vec<PatchRule>,
    /// Operator-supplied reason.
    #[serde(default)]
    pub reason: Option<String>,
    /// Claimed acting actor; required for apply.
    #[serde(default)]
    pub actor_id: Option<String>,
    /// Expected document hash; required for apply.
    #[serde(default)]
    pub expected_profile_hash: Option<String>,
}

/// Rollback target selector on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackTargetBody {
    /// Restore the before-snapshot of the target entry.
    Before,
    /// Restore the after-snapshot of the target entry.
    After,
}

/// Request body for `POST /v0/policy/rollback`.
#[derive(Debug, Deserialize)]
pub struct RollbackBody {
    /// Profile to roll back.
    pub profile_name: String,
    /// Application mode.
    pub mode: PatchModeBody,
    /// Target history entry; absent selects the most recent.
    #[serde(default)]
    pub target_patch_id: Option<String>,
    /// Snapshot selector.
    pub target_state: RollbackTargetBody,
    /// Operator-supplied reason.
    #[serde(default)]
    pub reason: Option<String>,
    /// Claimed acting actor; required for apply.
    #[serde(default)]
    pub actor_id: Option<String>,
    /// Expected document hash; required for apply.
    #[serde(default)]
    pub expected_profile_hash: Option<String>,
}

/// Query for timeline diffs.
#[derive(Debug, Deserialize)]
pub struct TimelineDiffQuery {
    /// Explicit base run; auto-selected when absent.
    #[serde(default)]
    pub base_run_id: Option<String>,
    /// Maximum diff rows.
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
}

/// Returns the default diff sample limit.
const fn default_sample_limit() -> usize {
    50
}

/// Query for the replay drift summary.
#[derive(Debug, Deserialize)]
pub struct DriftQueryBody {
    /// Number of most recent runs to inspect.
    #[serde(default = "default_drift_limit")]
    pub limit: u32,
    /// Include runs still in flight.
    #[serde(default)]
    pub include_pending: bool,
    /// Count inconclusive runs toward alerting.
    #[serde(default)]
    pub alert_on_inconclusive: bool,
}

/// Returns the default drift window.
const fn default_drift_limit() -> u32 {
    20
}

/// Query for patch history listing and export.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Restrict to one profile.
    #[serde(default)]
    pub profile_name: Option<String>,
    /// Maximum entries to return (`1..=500`).
    #[serde(default = "default_page_limit")]
    pub limit: u32,
    /// Entries to skip.
    #[serde(default)]
    pub offset: u64,
}

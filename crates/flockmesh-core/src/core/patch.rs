// crates/flockmesh-core/src/core/patch.rs
// ============================================================================
// Module: Policy Patch Records
// Description: Patch rules, diffs, previews, and history journal entries.
// Purpose: Capture policy catalog changes with full before/after snapshots.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every applied patch or rollback appends a history entry carrying the full
//! before and after documents, their hashes, a diff summary, and the
//! simulation preview shown to the operator. Rollbacks point at the patch
//! entry whose snapshot they restore.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::decision::DecisionKind;
use crate::core::hashing::HashDigest;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::PatchId;
use crate::core::identifiers::ProfileName;
use crate::core::profile::ProfileDocument;
use crate::core::profile::ProfileRule;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Patch Rules
// ============================================================================

/// Operation recorded on a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOperation {
    /// Forward patch.
    Patch,
    /// Rollback to a stored snapshot.
    Rollback,
}

/// One normalized patch rule.
///
/// # Invariants
/// - `capability` is a valid policy capability or `*`.
/// - `required_approvals` is in `1..=5` exactly when `decision = escalate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRule {
    /// Capability the rule targets.
    pub capability: String,
    /// Decision the rule installs.
    pub decision: DecisionKind,
    /// Approvals requested by the rule when escalating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_approvals: Option<u32>,
}

impl PatchRule {
    /// Converts the patch rule into a profile rule.
    #[must_use]
    pub fn to_profile_rule(&self) -> ProfileRule {
        ProfileRule {
            decision: self.decision,
            required_approvals: self.required_approvals,
        }
    }
}

// ============================================================================
// SECTION: Diff Shapes
// ============================================================================

/// Classification of one capability in the patch diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Rule added by the patch.
    Added,
    /// Rule changed by the patch.
    Updated,
    /// Rule removed by the patch (rollback only).
    Removed,
    /// Rule untouched by the patch.
    Unchanged,
}

/// One diff row in a patch history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchChange {
    /// Capability the row describes.
    pub capability: String,
    /// Diff classification.
    pub kind: ChangeKind,
    /// Rule before the patch, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<ProfileRule>,
    /// Rule after the patch, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<ProfileRule>,
}

/// Aggregate diff counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSummary {
    /// Rules added.
    pub added: u32,
    /// Rules updated.
    pub updated: u32,
    /// Rules removed.
    pub removed: u32,
    /// Rules unchanged.
    pub unchanged: u32,
}

// ============================================================================
// SECTION: Simulation Preview
// ============================================================================

/// One simulated decision pair in the preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedDecision {
    /// Capability the synthetic intent exercised.
    pub capability: String,
    /// Decision under the current library.
    pub before: DecisionKind,
    /// Decision under the patched library.
    pub after: DecisionKind,
}

/// Simulation preview included in patch responses and history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationPreview {
    /// Per-capability before/after decisions.
    pub decisions: Vec<SimulatedDecision>,
    /// Decision counts under the current library.
    pub before_counts: BTreeMap<String, u32>,
    /// Decision counts under the patched library.
    pub after_counts: BTreeMap<String, u32>,
    /// Capabilities whose decision strictly improved (lower weight).
    pub improved: Vec<String>,
}

// ============================================================================
// SECTION: History Entries
// ============================================================================

/// Policy patch history journal entry.
///
/// # Invariants
/// - `after_profile_hash` equals the hash of the document written to
///   `file_path` when the entry was appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchHistoryEntry {
    /// Patch identifier (`pph_`).
    pub patch_id: PatchId,
    /// Operation kind.
    pub operation: PatchOperation,
    /// Profile the operation targeted.
    pub profile_name: ProfileName,
    /// Actor that applied the operation.
    pub actor_id: ActorId,
    /// Operator-supplied reason.
    pub reason: String,
    /// Application timestamp.
    pub applied_at: Timestamp,
    /// Profile file path written by the operation.
    pub file_path: String,
    /// Document hash before the operation.
    pub before_profile_hash: HashDigest,
    /// Document hash after the operation.
    pub after_profile_hash: HashDigest,
    /// Aggregate diff counts.
    pub summary: PatchSummary,
    /// Per-capability diff rows.
    pub changes: Vec<PatchChange>,
    /// Simulation preview computed before applying.
    pub simulation_preview: SimulationPreview,
    /// Full document before the operation.
    pub before_document: ProfileDocument,
    /// Full document after the operation.
    pub after_document: ProfileDocument,
    /// Patch entry a rollback restored, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_of: Option<PatchId>,
}

// crates/flockmesh-core/src/runtime/patch.rs
// ============================================================================
// Module: Policy Patch Pipeline
// Description: Dry-run and apply for profile patches and rollbacks.
// Purpose: Change the policy catalog under document-hash CAS with full history.
// Dependencies: crate::core, crate::interfaces, crate::policy, crate::runtime
// ============================================================================

//! ## Overview
//! The pipeline normalizes patch rules, computes the before/after documents
//! and their canonical hashes, simulates the decision delta, and (on apply)
//! authorizes the actor, replaces the profile file atomically, swaps the
//! in-memory library entry, and journals a full history record. The document
//! hash is the concurrency token: an apply whose expected hash is stale is
//! rejected with both hashes so the operator can reload and retry. Dry-run
//! never writes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::ActionIntent;
use crate::core::ActionIntentId;
use crate::core::ActorId;
use crate::core::CapabilityName;
use crate::core::ChangeKind;
use crate::core::DecisionId;
use crate::core::DecisionKind;
use crate::core::HashDigest;
use crate::core::HashError;
use crate::core::IdempotencyKey;
use crate::core::IntentTarget;
use crate::core::PatchChange;
use crate::core::PatchHistoryEntry;
use crate::core::PatchId;
use crate::core::PatchOperation;
use crate::core::PatchRule;
use crate::core::PatchSummary;
use crate::core::PolicyProfile;
use crate::core::ProfileDocument;
use crate::core::ProfileError;
use crate::core::ProfileName;
use crate::core::RiskHint;
use crate::core::RiskTier;
use crate::core::RunId;
use crate::core::SideEffect;
use crate::core::SimulatedDecision;
use crate::core::SimulationPreview;
use crate::core::StepId;
use crate::core::Timestamp;
use crate::core::audit_event;
use crate::core::compile_profile;
use crate::core::identifiers::validate_capability;
use crate::core::reason;
use crate::interfaces::CatalogError;
use crate::interfaces::HistoryError;
use crate::interfaces::LedgerError;
use crate::interfaces::PatchHistoryStore;
use crate::interfaces::ProfileWriter;
use crate::policy::LibraryOverlay;
use crate::policy::PolicyContext;
use crate::policy::PolicyLibrary;
use crate::policy::ProfileLookup;
use crate::policy::evaluate_intent;
use crate::runtime::engine::LatticeFallbacks;
use crate::runtime::ids::mint_id;
use crate::runtime::recorder::Recorder;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Ledger stream that records policy catalog changes.
const POLICY_AUDIT_STREAM: &str = "run_policy_catalog";
/// Capability suffixes treated as read-only in simulation.
const READ_ONLY_SUFFIXES: &[&str] = &[".read", ".list", ".status", ".search", ".get"];
/// Capability tokens that raise the simulated risk to R3.
const HIGH_RISK_TOKENS: &[&str] =
    &["delete", "drop", "destroy", "pay", "transfer", "grant", "revoke", "admin"];

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Patch application mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    /// Compute everything, write nothing.
    DryRun,
    /// Authorize, write, and journal.
    Apply,
}

/// Request to patch a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRequest {
    /// Profile to patch.
    pub profile_name: ProfileName,
    /// Application mode.
    pub mode: PatchMode,
    /// Raw patch rules; normalized by the pipeline.
    pub patch_rules: Vec<PatchRule>,
    /// Operator-supplied reason.
    pub reason: Option<String>,
    /// Claimed acting actor (must match the authenticated actor).
    pub actor_id: Option<ActorId>,
    /// Expected document hash; required for apply.
    pub expected_profile_hash: Option<HashDigest>,
}

/// Rollback target state selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTarget {
    /// Restore the document as it was before the target patch.
    Before,
    /// Restore the document as it was after the target patch.
    After,
}

/// Request to roll a profile back to a journaled snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackRequest {
    /// Profile to roll back.
    pub profile_name: ProfileName,
    /// Application mode.
    pub mode: PatchMode,
    /// Target history entry; absent selects the most recent for the profile.
    pub target_patch_id: Option<PatchId>,
    /// Which snapshot of the target entry to restore.
    pub target_state: RollbackTarget,
    /// Operator-supplied reason.
    pub reason: Option<String>,
    /// Claimed acting actor (must match the authenticated actor).
    pub actor_id: Option<ActorId>,
    /// Expected document hash; required for apply.
    pub expected_profile_hash: Option<HashDigest>,
}

/// Pipeline response for patch and rollback.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PatchResponse {
    /// History id assigned on apply.
    pub patch_id: Option<PatchId>,
    /// Operation performed.
    pub operation: PatchOperation,
    /// Profile targeted.
    pub profile_name: ProfileName,
    /// True when the catalog was written.
    pub applied: bool,
    /// Document hash before the operation.
    pub before_profile_hash: HashDigest,
    /// Document hash after the operation.
    pub after_profile_hash: HashDigest,
    /// Aggregate diff counts.
    pub summary: PatchSummary,
    /// Per-capability diff rows.
    pub changes: Vec<PatchChange>,
    /// Simulated decision delta.
    pub simulation_preview: SimulationPreview,
}

// ============================================================================
// SECTION: Authorization
// ============================================================================

/// Policy-admin authorization configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyAdminConfig {
    /// Actors allowed to change any profile.
    pub global_admins: BTreeSet<String>,
    /// Actors allowed to change specific profiles.
    pub profile_admins: BTreeMap<String, BTreeSet<String>>,
}

impl PolicyAdminConfig {
    /// Returns true when the actor may change the profile.
    #[must_use]
    pub fn authorizes(&self, actor: &ActorId, profile: &ProfileName) -> bool {
        self.global_admins.contains(actor.as_str())
            || self
                .profile_admins
                .get(profile.as_str())
                .is_some_and(|admins| admins.contains(actor.as_str()))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Patch pipeline errors.
#[derive(Debug, Error)]
pub enum PatchError {
    /// Target profile is not in the library.
    #[error("policy profile not found: {0}")]
    ProfileNotFound(String),
    /// A patch rule failed normalization.
    #[error("invalid patch rule: {0}")]
    InvalidRule(String),
    /// The same capability appears twice in the patch.
    #[error("duplicate capability in patch: {0}")]
    DuplicateCapability(String),
    /// Apply requested without an expected hash.
    #[error("apply requires expected_profile_hash")]
    MissingExpectedHash,
    /// Expected hash does not match the current document.
    #[error("profile hash conflict: expected {expected}, current {current}")]
    HashConflict {
        /// Hash the caller expected.
        expected: HashDigest,
        /// Hash of the current document.
        current: HashDigest,
    },
    /// Actor is not a policy admin for the profile.
    #[error("actor is not authorized to change policy ({})", reason::POLICY_ADMIN_NOT_AUTHORIZED)]
    NotAuthorized,
    /// Apply requested without an actor claim.
    #[error("apply requires actor_id")]
    MissingActor,
    /// Rollback target entry not found.
    #[error("patch history entry not found: {0}")]
    HistoryEntryNotFound(String),
    /// No history exists for the profile.
    #[error("no patch history for profile: {0}")]
    NoHistoryForProfile(String),
    /// After-document failed to compile.
    #[error(transparent)]
    Compile(#[from] ProfileError),
    /// Canonicalization failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Catalog write failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// History journal failed.
    #[error(transparent)]
    History(#[from] HistoryError),
    /// Audit append failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Policy patch/rollback pipeline.
pub struct PatchPipeline {
    /// Live policy library.
    library: Arc<PolicyLibrary>,
    /// Profile document writer.
    writer: Arc<dyn ProfileWriter>,
    /// History journal.
    history: Arc<dyn PatchHistoryStore>,
    /// Ledger recorder for patch audit entries.
    recorder: Recorder,
    /// Admin authorization configuration.
    admins: PolicyAdminConfig,
    /// Lattice fallbacks used by simulation contexts.
    fallbacks: LatticeFallbacks,
}

impl PatchPipeline {
    /// Creates a pipeline over the given seams.
    #[must_use]
    pub fn new(
        library: Arc<PolicyLibrary>,
        writer: Arc<dyn ProfileWriter>,
        history: Arc<dyn PatchHistoryStore>,
        recorder: Recorder,
        admins: PolicyAdminConfig,
        fallbacks: LatticeFallbacks,
    ) -> Self {
        Self {
            library,
            writer,
            history,
            recorder,
            admins,
            fallbacks,
        }
    }

    /// Returns the history journal backing this pipeline.
    #[must_use]
    pub fn history(&self) -> Arc<dyn PatchHistoryStore> {
        Arc::clone(&self.history)
    }

    /// Runs a patch in dry-run or apply mode.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError`] for normalization failures, hash conflicts,
    /// authorization failures, and write faults.
    pub fn patch(
        &self,
        request: &PatchRequest,
        authenticated_actor: &ActorId,
        now: Timestamp,
    ) -> Result<PatchResponse, PatchError> {
        let before_profile = self
            .library
            .profile(&request.profile_name)
            .ok_or_else(|| PatchError::ProfileNotFound(request.profile_name.as_str().to_string()))?;
        let rules = normalize_rules(&request.patch_rules)?;

        let before_document = before_profile.to_document();
        let before_hash = before_document.document_hash()?;
        if request.mode == PatchMode::Apply {
            self.check_cas(&before_hash, request.expected_profile_hash.as_ref())?;
        }

        // After = before with per-capability overwrites, recompiled through
        // the same compiler the catalog loader uses.
        let mut after_document = before_document.clone();
        for rule in &rules {
            after_document.rules.insert(rule.capability.clone(), rule.to_profile_rule());
        }
        let after_profile = compile_profile(&after_document)?;
        let after_hash = after_document.document_hash()?;

        let (summary, changes) = diff_documents(&before_document, &after_document);
        let preview_capabilities: Vec<String> =
            rules.iter().map(|rule| rule.capability.clone()).collect();
        let simulation_preview = self.simulate(
            &request.profile_name,
            &after_profile,
            &preview_capabilities,
            now,
        );

        if request.mode == PatchMode::DryRun {
            return Ok(PatchResponse {
                patch_id: None,
                operation: PatchOperation::Patch,
                profile_name: request.profile_name.clone(),
                applied: false,
                before_profile_hash: before_hash,
                after_profile_hash: after_hash,
                summary,
                changes,
                simulation_preview,
            });
        }

        let actor = self.authorize(request.actor_id.as_ref(), authenticated_actor, &request.profile_name)?;
        let entry = self.apply(
            PatchOperation::Patch,
            &request.profile_name,
            actor,
            request.reason.clone().unwrap_or_default(),
            before_document,
            after_document,
            after_profile,
            before_hash,
            after_hash,
            summary,
            changes,
            simulation_preview,
            None,
            now,
        )?;

        Ok(PatchResponse {
            patch_id: Some(entry.patch_id.clone()),
            operation: PatchOperation::Patch,
            profile_name: request.profile_name.clone(),
            applied: true,
            before_profile_hash: entry.before_profile_hash.clone(),
            after_profile_hash: entry.after_profile_hash.clone(),
            summary: entry.summary,
            changes: entry.changes.clone(),
            simulation_preview: entry.simulation_preview.clone(),
        })
    }

    /// Runs a rollback in dry-run or apply mode.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError`] for missing history, hash conflicts,
    /// authorization failures, and write faults.
    pub fn rollback(
        &self,
        request: &RollbackRequest,
        authenticated_actor: &ActorId,
        now: Timestamp,
    ) -> Result<PatchResponse, PatchError> {
        let target = match &request.target_patch_id {
            Some(patch_id) => self
                .history
                .find(patch_id)?
                .filter(|entry| entry.profile_name == request.profile_name)
                .ok_or_else(|| PatchError::HistoryEntryNotFound(patch_id.as_str().to_string()))?,
            None => {
                let page = self.history.list(
                    Some(&request.profile_name),
                    crate::core::PageRequest {
                        limit: 1,
                        offset: 0,
                    },
                )?;
                page.items.into_iter().next().ok_or_else(|| {
                    PatchError::NoHistoryForProfile(request.profile_name.as_str().to_string())
                })?
            }
        };
        let snapshot = match request.target_state {
            RollbackTarget::Before => target.before_document.clone(),
            RollbackTarget::After => target.after_document.clone(),
        };

        let before_profile = self
            .library
            .profile(&request.profile_name)
            .ok_or_else(|| PatchError::ProfileNotFound(request.profile_name.as_str().to_string()))?;
        let before_document = before_profile.to_document();
        let before_hash = before_document.document_hash()?;
        if request.mode == PatchMode::Apply {
            self.check_cas(&before_hash, request.expected_profile_hash.as_ref())?;
        }

        let after_document = snapshot;
        let after_profile = compile_profile(&after_document)?;
        let after_hash = after_document.document_hash()?;
        let (summary, changes) = diff_documents(&before_document, &after_document);
        let preview_capabilities: Vec<String> = changes
            .iter()
            .filter(|change| change.kind != ChangeKind::Unchanged)
            .map(|change| change.capability.clone())
            .collect();
        let simulation_preview = self.simulate(
            &request.profile_name,
            &after_profile,
            &preview_capabilities,
            now,
        );

        if request.mode == PatchMode::DryRun {
            return Ok(PatchResponse {
                patch_id: None,
                operation: PatchOperation::Rollback,
                profile_name: request.profile_name.clone(),
                applied: false,
                before_profile_hash: before_hash,
                after_profile_hash: after_hash,
                summary,
                changes,
                simulation_preview,
            });
        }

        let actor = self.authorize(request.actor_id.as_ref(), authenticated_actor, &request.profile_name)?;
        let entry = self.apply(
            PatchOperation::Rollback,
            &request.profile_name,
            actor,
            request.reason.clone().unwrap_or_default(),
            before_document,
            after_document,
            after_profile,
            before_hash,
            after_hash,
            summary,
            changes,
            simulation_preview,
            Some(target.patch_id.clone()),
            now,
        )?;

        Ok(PatchResponse {
            patch_id: Some(entry.patch_id.clone()),
            operation: PatchOperation::Rollback,
            profile_name: request.profile_name.clone(),
            applied: true,
            before_profile_hash: entry.before_profile_hash.clone(),
            after_profile_hash: entry.after_profile_hash.clone(),
            summary: entry.summary,
            changes: entry.changes.clone(),
            simulation_preview: entry.simulation_preview.clone(),
        })
    }

    /// Enforces the document-hash CAS for apply mode.
    fn check_cas(
        &self,
        current: &HashDigest,
        expected: Option<&HashDigest>,
    ) -> Result<(), PatchError> {
        let expected = expected.ok_or(PatchError::MissingExpectedHash)?;
        if expected != current {
            return Err(PatchError::HashConflict {
                expected: expected.clone(),
                current: current.clone(),
            });
        }
        Ok(())
    }

    /// Enforces the actor claim and admin authorization for apply mode.
    fn authorize<'a>(
        &self,
        claimed: Option<&'a ActorId>,
        authenticated: &'a ActorId,
        profile: &ProfileName,
    ) -> Result<&'a ActorId, PatchError> {
        let actor = claimed.ok_or(PatchError::MissingActor)?;
        if actor != authenticated {
            return Err(PatchError::NotAuthorized);
        }
        if !self.admins.authorizes(actor, profile) {
            return Err(PatchError::NotAuthorized);
        }
        Ok(actor)
    }

    /// Applies a prepared operation: file write, library swap, audit, history.
    #[allow(clippy::too_many_arguments, reason = "One call site assembling the full history entry.")]
    fn apply(
        &self,
        operation: PatchOperation,
        profile_name: &ProfileName,
        actor: &ActorId,
        reason_text: String,
        before_document: ProfileDocument,
        after_document: ProfileDocument,
        after_profile: PolicyProfile,
        before_hash: HashDigest,
        after_hash: HashDigest,
        summary: PatchSummary,
        changes: Vec<PatchChange>,
        simulation_preview: SimulationPreview,
        rollback_of: Option<PatchId>,
        now: Timestamp,
    ) -> Result<PatchHistoryEntry, PatchError> {
        // File first, then the in-memory swap: a reader never observes a
        // library entry whose document is not on disk.
        let file_path = self.writer.write_profile(&after_document)?;
        self.library.install(after_profile);

        let entry = PatchHistoryEntry {
            patch_id: PatchId::new(mint_id("pph_")),
            operation,
            profile_name: profile_name.clone(),
            actor_id: actor.clone(),
            reason: reason_text,
            applied_at: now,
            file_path,
            before_profile_hash: before_hash,
            after_profile_hash: after_hash,
            summary,
            changes,
            simulation_preview,
            before_document,
            after_document,
            rollback_of,
        };
        self.recorder.audit(
            &RunId::new(POLICY_AUDIT_STREAM),
            audit_event::POLICY_PROFILE_PATCHED,
            actor.clone(),
            &serde_json::to_value(&entry).unwrap_or(Value::Null),
            None,
            json!({"operation": match operation {
                PatchOperation::Patch => "patch",
                PatchOperation::Rollback => "rollback",
            }}),
            now,
        )?;
        self.history.append(&entry)?;
        Ok(entry)
    }

    /// Simulates the decision delta for the given capabilities.
    fn simulate(
        &self,
        profile_name: &ProfileName,
        after_profile: &PolicyProfile,
        capabilities: &[String],
        now: Timestamp,
    ) -> SimulationPreview {
        let context = PolicyContext {
            org: self.fallbacks.org.clone(),
            workspace: self.fallbacks.workspace.clone(),
            agent: self.fallbacks.agent.clone(),
            run_override: Some(profile_name.clone()),
        };
        let overlay = LibraryOverlay::new(self.library.as_ref(), after_profile.clone());

        let mut decisions = Vec::new();
        let mut before_counts: BTreeMap<String, u32> = BTreeMap::new();
        let mut after_counts: BTreeMap<String, u32> = BTreeMap::new();
        let mut improved = Vec::new();
        for capability in capabilities {
            // Wildcard rules have no concrete intent to synthesize.
            if capability == "*" {
                continue;
            }
            let intent = simulation_intent(capability);
            let before = evaluate_intent(
                DecisionId::new(mint_id("pol_")),
                &intent,
                &context,
                self.library.as_ref(),
                now,
            );
            let after = evaluate_intent(
                DecisionId::new(mint_id("pol_")),
                &intent,
                &context,
                &overlay,
                now,
            );
            *before_counts.entry(before.decision.label().to_string()).or_default() += 1;
            *after_counts.entry(after.decision.label().to_string()).or_default() += 1;
            if after.decision.weight() < before.decision.weight() {
                improved.push(capability.clone());
            }
            decisions.push(SimulatedDecision {
                capability: capability.clone(),
                before: before.decision,
                after: after.decision,
            });
        }
        SimulationPreview {
            decisions,
            before_counts,
            after_counts,
            improved,
        }
    }
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Validates, deduplicates, and lexicographically sorts patch rules.
///
/// # Errors
///
/// Returns [`PatchError`] for invalid capabilities, out-of-range approvals,
/// and duplicated capabilities.
pub fn normalize_rules(rules: &[PatchRule]) -> Result<Vec<PatchRule>, PatchError> {
    let mut seen = BTreeSet::new();
    let mut normalized = Vec::with_capacity(rules.len());
    for rule in rules {
        validate_capability(&rule.capability, true)
            .map_err(|err| PatchError::InvalidRule(err.to_string()))?;
        match rule.decision {
            DecisionKind::Escalate => {
                let approvals = rule.required_approvals.unwrap_or(0);
                if !(1..=5).contains(&approvals) {
                    return Err(PatchError::InvalidRule(format!(
                        "escalate rule for '{}' requires approvals in 1..=5",
                        rule.capability
                    )));
                }
            }
            DecisionKind::Allow | DecisionKind::Deny => {
                if rule.required_approvals.is_some() {
                    return Err(PatchError::InvalidRule(format!(
                        "rule for '{}' carries approvals without escalate",
                        rule.capability
                    )));
                }
            }
        }
        if !seen.insert(rule.capability.clone()) {
            return Err(PatchError::DuplicateCapability(rule.capability.clone()));
        }
        normalized.push(rule.clone());
    }
    normalized.sort_by(|left, right| left.capability.cmp(&right.capability));
    Ok(normalized)
}

// ============================================================================
// SECTION: Diff
// ============================================================================

/// Computes diff rows and counts between two documents.
fn diff_documents(
    before: &ProfileDocument,
    after: &ProfileDocument,
) -> (PatchSummary, Vec<PatchChange>) {
    let mut summary = PatchSummary::default();
    let mut changes = Vec::new();
    let capabilities: BTreeSet<&String> =
        before.rules.keys().chain(after.rules.keys()).collect();
    for capability in capabilities {
        let before_rule = before.rules.get(capability).cloned();
        let after_rule = after.rules.get(capability).cloned();
        let kind = match (&before_rule, &after_rule) {
            (None, Some(_)) => {
                summary.added += 1;
                ChangeKind::Added
            }
            (Some(_), None) => {
                summary.removed += 1;
                ChangeKind::Removed
            }
            (Some(left), Some(right)) if left != right => {
                summary.updated += 1;
                ChangeKind::Updated
            }
            _ => {
                summary.unchanged += 1;
                ChangeKind::Unchanged
            }
        };
        changes.push(PatchChange {
            capability: capability.clone(),
            kind,
            before: before_rule,
            after: after_rule,
        });
    }
    (summary, changes)
}

// ============================================================================
// SECTION: Simulation Intents
// ============================================================================

/// Synthesizes the simulation intent for a capability.
fn simulation_intent(capability: &str) -> ActionIntent {
    let read_only = READ_ONLY_SUFFIXES.iter().any(|suffix| capability.ends_with(suffix));
    let high_risk = HIGH_RISK_TOKENS
        .iter()
        .any(|token| capability.split('.').any(|segment| segment.contains(token)));
    let (risk, side_effect) = if read_only {
        (RiskTier::R0, SideEffect::None)
    } else if high_risk {
        (RiskTier::R3, SideEffect::Mutation)
    } else {
        (RiskTier::R2, SideEffect::Mutation)
    };
    let run_id = RunId::new("run_policy_simulation");
    let key = side_effect
        .is_mutation()
        .then(|| IdempotencyKey::new(format!("idem_sim_{}", capability.replace('.', "_"))));
    ActionIntent {
        id: ActionIntentId::new(mint_id("act_")),
        run_id,
        step_id: StepId::new("policy_simulation"),
        connector_binding_id: None,
        capability: CapabilityName::new(capability),
        side_effect,
        risk_hint: RiskHint::from(risk),
        parameters: json!({}),
        target: IntentTarget {
            surface: "policy.simulation".to_string(),
            connector_hints: None,
        },
        idempotency_key: key,
    }
}

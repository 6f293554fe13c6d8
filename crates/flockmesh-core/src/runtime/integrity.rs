// crates/flockmesh-core/src/runtime/integrity.rs
// ============================================================================
// Module: Integrity Views
// Description: Replay checks, timeline diffs, drift summaries, signed exports.
// Purpose: Re-derive run behavior from the ledger instead of trusting the run row.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Replay integrity deliberately re-checks the ledger against the run's
//! decisions rather than reading an execution flag off the run record, so the
//! verdict stays honest even when the run row is tampered with. Exports wrap
//! their payload in a signed envelope verifiable offline from the key ring.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::ActionIntentId;
use crate::core::AuditRecord;
use crate::core::EventRecord;
use crate::core::ExportSignature;
use crate::core::LedgerPage;
use crate::core::PageRequest;
use crate::core::PatchHistoryEntry;
use crate::core::ProfileName;
use crate::core::RunId;
use crate::core::RunRecord;
use crate::core::RunStatus;
use crate::core::SigningError;
use crate::core::SigningKeyRing;
use crate::core::Timestamp;
use crate::core::event_name;
use crate::interfaces::HistoryError;
use crate::interfaces::LedgerError;
use crate::interfaces::LedgerStore;
use crate::interfaces::PatchHistoryStore;
use crate::interfaces::RunFilter;
use crate::interfaces::StateStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Issue Codes
// ============================================================================

/// Dotted issue codes reported by replay integrity.
pub mod replay_issue {
    /// A stream was truncated before the item cap.
    pub const PARTIAL_EVIDENCE: &str = "replay.partial_evidence";
    /// An allowed intent has no execution event.
    pub const MISSING_EXPECTED: &str = "replay.missing_expected_action_execution";
    /// A non-allowed intent has an execution event.
    pub const UNEXPECTED: &str = "replay.unexpected_action_execution";
    /// An intent executed more than once.
    pub const DUPLICATE: &str = "replay.duplicate_action_execution";
    /// An execution event names an intent the run does not contain.
    pub const UNKNOWN_ACTION_ID: &str = "replay.unknown_event_action_id";
    /// Audit and event streams disagree on execution counts.
    pub const AUDIT_COUNT_MISMATCH: &str = "replay.audit_event_count_mismatch";
}

// ============================================================================
// SECTION: Replay Integrity
// ============================================================================

/// Integrity verdict for a run against its ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayState {
    /// Run still in flight; no verdict yet.
    Pending,
    /// Ledger matches the decisions.
    Consistent,
    /// Only partial evidence was available.
    Inconclusive,
    /// Ledger contradicts the decisions.
    Inconsistent,
}

impl ReplayState {
    /// Severity for drift ordering (higher is worse).
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::Inconsistent => 3,
            Self::Inconclusive => 2,
            Self::Pending => 1,
            Self::Consistent => 0,
        }
    }
}

/// Replay integrity report for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayIntegrity {
    /// Run the report covers.
    pub run_id: RunId,
    /// Run status at evaluation time.
    pub run_status: RunStatus,
    /// Integrity verdict.
    pub replay_state: ReplayState,
    /// Dotted issue codes, insertion-ordered.
    pub issues: Vec<String>,
    /// Intent ids whose decision allows execution.
    pub expected: Vec<ActionIntentId>,
    /// Execution event counts by intent id.
    pub observed: BTreeMap<String, u64>,
    /// Execution count on the event stream.
    pub event_execution_count: u64,
    /// Execution count on the audit stream.
    pub audit_execution_count: u64,
}

// ============================================================================
// SECTION: Timeline Diff
// ============================================================================

/// One diff row across the compared dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineDiffRow {
    /// Dimension the key belongs to.
    pub dimension: String,
    /// Compared key (event name, audit type, capability, decision, reason).
    pub key: String,
    /// Count on the current run.
    pub current: u64,
    /// Count on the base run.
    pub base: u64,
    /// Signed difference `current - base`.
    pub delta: i64,
}

/// Timeline diff between a run and its base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineDiff {
    /// Current run.
    pub run_id: RunId,
    /// Base run compared against.
    pub base_run_id: RunId,
    /// Diff rows sorted by |delta| desc, current desc, key asc.
    pub rows: Vec<TimelineDiffRow>,
    /// True when rows were truncated to the sample limit.
    pub truncated: bool,
}

// ============================================================================
// SECTION: Drift Summary
// ============================================================================

/// Query shaping the drift summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftQuery {
    /// Number of most recent runs to inspect.
    pub limit: u32,
    /// Include runs still in flight.
    pub include_pending: bool,
    /// Count inconclusive runs toward the alerting total.
    pub alert_on_inconclusive: bool,
}

impl Default for DriftQuery {
    fn default() -> Self {
        Self {
            limit: 20,
            include_pending: false,
            alert_on_inconclusive: false,
        }
    }
}

/// Per-run row in the drift summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftRunSummary {
    /// Run the row covers.
    pub run_id: RunId,
    /// Run status at evaluation time.
    pub run_status: RunStatus,
    /// Integrity verdict.
    pub replay_state: ReplayState,
    /// Issue codes found.
    pub issues: Vec<String>,
}

/// Drift summary over recent runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftSummary {
    /// Rows ordered by severity, then issue count descending.
    pub runs: Vec<DriftRunSummary>,
    /// Run counts per replay state label.
    pub totals: BTreeMap<String, u64>,
    /// Number of runs that should alert.
    pub alerting: u64,
}

// ============================================================================
// SECTION: Signed Exports
// ============================================================================

/// Signed export package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedExport<T> {
    /// Envelope payload the signature covers.
    pub envelope: T,
    /// Signature block.
    pub signature: ExportSignature,
}

/// Incident export envelope: the full forensic package for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentEnvelope {
    /// Export type label.
    pub export_type: String,
    /// Generation timestamp.
    pub generated_at: Timestamp,
    /// Run record at export time.
    pub run: RunRecord,
    /// Event stream (up to the collection cap).
    pub events: Vec<EventRecord>,
    /// Audit stream (up to the collection cap).
    pub audit: Vec<AuditRecord>,
    /// Replay integrity verdict.
    pub replay_integrity: ReplayIntegrity,
}

/// Replay export envelope: what a replayer needs to re-derive the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayEnvelope {
    /// Export type label.
    pub export_type: String,
    /// Generation timestamp.
    pub generated_at: Timestamp,
    /// Run record at export time.
    pub run: RunRecord,
    /// Event stream (up to the collection cap).
    pub events: Vec<EventRecord>,
    /// Replay integrity verdict.
    pub replay_integrity: ReplayIntegrity,
}

/// Policy patch history export envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchHistoryEnvelope {
    /// Export type label.
    pub export_type: String,
    /// Generation timestamp.
    pub generated_at: Timestamp,
    /// History entries, `applied_at` descending.
    pub entries: Vec<PatchHistoryEntry>,
    /// Total entries in the journal (before pagination).
    pub total: u64,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Integrity view errors.
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// Run does not exist.
    #[error("run not found: {0}")]
    RunNotFound(String),
    /// No base run shares the workspace, agent, and playbook.
    #[error("no comparable base run for: {0}")]
    NoComparableBase(String),
    /// Explicit base run does not match the required scope.
    #[error("base run scope mismatch: {0}")]
    BaseScopeMismatch(String),
    /// State store fault.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Ledger fault.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// History journal fault.
    #[error(transparent)]
    History(#[from] HistoryError),
    /// Export signing fault.
    #[error(transparent)]
    Signing(#[from] SigningError),
}

// ============================================================================
// SECTION: Views
// ============================================================================

/// Ledger page size used for internal collection.
const COLLECT_PAGE: u32 = 500;

/// Integrity views over the store, ledger, history, and signer.
pub struct IntegrityViews {
    /// Authoritative state store.
    store: Arc<dyn StateStore>,
    /// Ledger store.
    ledger: Arc<dyn LedgerStore>,
    /// Patch history journal.
    history: Arc<dyn PatchHistoryStore>,
    /// Export signing key ring.
    key_ring: Arc<SigningKeyRing>,
    /// Per-stream collection cap.
    max_items_per_stream: u64,
}

impl IntegrityViews {
    /// Creates the views over the given seams.
    #[must_use]
    pub fn new(
        store: Arc<dyn StateStore>,
        ledger: Arc<dyn LedgerStore>,
        history: Arc<dyn PatchHistoryStore>,
        key_ring: Arc<SigningKeyRing>,
        max_items_per_stream: u64,
    ) -> Self {
        Self {
            store,
            ledger,
            history,
            key_ring,
            max_items_per_stream,
        }
    }

    /// Computes replay integrity for one run.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::RunNotFound`] plus store and ledger faults.
    pub fn replay_integrity(&self, run_id: &RunId) -> Result<ReplayIntegrity, IntegrityError> {
        let run = self
            .store
            .load_run(run_id)?
            .ok_or_else(|| IntegrityError::RunNotFound(run_id.as_str().to_string()))?;
        let (events, events_truncated) = self.collect_events(run_id)?;
        let (audit, audit_truncated) = self.collect_audit(run_id)?;
        Ok(derive_replay_integrity(
            &run,
            &events,
            &audit,
            events_truncated || audit_truncated,
        ))
    }

    /// Computes a timeline diff between a run and a base run.
    ///
    /// With no explicit base, selects the latest earlier run sharing the
    /// workspace, agent, and playbook, falling back to the latest such run.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::BaseScopeMismatch`] for explicit bases
    /// outside the scope and [`IntegrityError::NoComparableBase`] when no
    /// candidate exists.
    pub fn timeline_diff(
        &self,
        run_id: &RunId,
        base_run_id: Option<&RunId>,
        sample_limit: usize,
    ) -> Result<TimelineDiff, IntegrityError> {
        let run = self
            .store
            .load_run(run_id)?
            .ok_or_else(|| IntegrityError::RunNotFound(run_id.as_str().to_string()))?;
        let base = self.resolve_base(&run, base_run_id)?;

        let current_counts = self.count_maps(&run)?;
        let base_counts = self.count_maps(&base)?;

        let keys: BTreeSet<(String, String)> = current_counts
            .keys()
            .chain(base_counts.keys())
            .cloned()
            .collect();
        let mut rows: Vec<TimelineDiffRow> = keys
            .into_iter()
            .map(|key| {
                let current = current_counts.get(&key).copied().unwrap_or(0);
                let base_count = base_counts.get(&key).copied().unwrap_or(0);
                let delta = i64::try_from(current).unwrap_or(i64::MAX)
                    - i64::try_from(base_count).unwrap_or(i64::MAX);
                TimelineDiffRow {
                    dimension: key.0,
                    key: key.1,
                    current,
                    base: base_count,
                    delta,
                }
            })
            .collect();
        rows.sort_by(|left, right| {
            right
                .delta
                .abs()
                .cmp(&left.delta.abs())
                .then(right.current.cmp(&left.current))
                .then(left.key.cmp(&right.key))
        });
        let truncated = rows.len() > sample_limit;
        rows.truncate(sample_limit);
        Ok(TimelineDiff {
            run_id: run.id,
            base_run_id: base.id,
            rows,
            truncated,
        })
    }

    /// Computes the replay drift summary over recent runs.
    ///
    /// # Errors
    ///
    /// Returns store and ledger faults.
    pub fn replay_drift(&self, query: &DriftQuery) -> Result<DriftSummary, IntegrityError> {
        let runs = self.store.list_runs(&RunFilter {
            limit: Some(query.limit),
            ..RunFilter::default()
        })?;
        let mut rows = Vec::new();
        for run in runs {
            let report = self.replay_integrity(&run.id)?;
            if !query.include_pending && report.replay_state == ReplayState::Pending {
                continue;
            }
            rows.push(DriftRunSummary {
                run_id: report.run_id,
                run_status: report.run_status,
                replay_state: report.replay_state,
                issues: report.issues,
            });
        }
        rows.sort_by(|left, right| {
            right
                .replay_state
                .severity()
                .cmp(&left.replay_state.severity())
                .then(right.issues.len().cmp(&left.issues.len()))
        });
        let mut totals: BTreeMap<String, u64> = BTreeMap::new();
        for row in &rows {
            let label = match row.replay_state {
                ReplayState::Pending => "pending",
                ReplayState::Consistent => "consistent",
                ReplayState::Inconclusive => "inconclusive",
                ReplayState::Inconsistent => "inconsistent",
            };
            *totals.entry(label.to_string()).or_default() += 1;
        }
        let inconsistent = totals.get("inconsistent").copied().unwrap_or(0);
        let inconclusive = totals.get("inconclusive").copied().unwrap_or(0);
        let alerting = if query.alert_on_inconclusive {
            inconsistent + inconclusive
        } else {
            inconsistent
        };
        Ok(DriftSummary {
            runs: rows,
            totals,
            alerting,
        })
    }

    /// Builds the signed incident export for a run.
    ///
    /// # Errors
    ///
    /// Returns store, ledger, and signing faults.
    pub fn incident_export(
        &self,
        run_id: &RunId,
        now: Timestamp,
    ) -> Result<SignedExport<IncidentEnvelope>, IntegrityError> {
        let run = self
            .store
            .load_run(run_id)?
            .ok_or_else(|| IntegrityError::RunNotFound(run_id.as_str().to_string()))?;
        let (events, _) = self.collect_events(run_id)?;
        let (audit, _) = self.collect_audit(run_id)?;
        let replay_integrity = self.replay_integrity(run_id)?;
        let envelope = IncidentEnvelope {
            export_type: "incident".to_string(),
            generated_at: now,
            run,
            events,
            audit,
            replay_integrity,
        };
        let signature = self.key_ring.sign(&envelope)?;
        Ok(SignedExport {
            envelope,
            signature,
        })
    }

    /// Builds the signed replay export for a run.
    ///
    /// # Errors
    ///
    /// Returns store, ledger, and signing faults.
    pub fn replay_export(
        &self,
        run_id: &RunId,
        now: Timestamp,
    ) -> Result<SignedExport<ReplayEnvelope>, IntegrityError> {
        let run = self
            .store
            .load_run(run_id)?
            .ok_or_else(|| IntegrityError::RunNotFound(run_id.as_str().to_string()))?;
        let (events, _) = self.collect_events(run_id)?;
        let replay_integrity = self.replay_integrity(run_id)?;
        let envelope = ReplayEnvelope {
            export_type: "replay".to_string(),
            generated_at: now,
            run,
            events,
            replay_integrity,
        };
        let signature = self.key_ring.sign(&envelope)?;
        Ok(SignedExport {
            envelope,
            signature,
        })
    }

    /// Builds the signed policy patch history export.
    ///
    /// # Errors
    ///
    /// Returns history and signing faults.
    pub fn patch_history_export(
        &self,
        profile: Option<&ProfileName>,
        page: PageRequest,
        now: Timestamp,
    ) -> Result<SignedExport<PatchHistoryEnvelope>, IntegrityError> {
        let entries = self.history.list(profile, page)?;
        let envelope = PatchHistoryEnvelope {
            export_type: "policy_patch_history".to_string(),
            generated_at: now,
            total: entries.total,
            entries: entries.items,
        };
        let signature = self.key_ring.sign(&envelope)?;
        Ok(SignedExport {
            envelope,
            signature,
        })
    }

    /// Collects up to the per-stream cap of events, paginating internally.
    fn collect_events(&self, run_id: &RunId) -> Result<(Vec<EventRecord>, bool), IntegrityError> {
        let mut collected = Vec::new();
        let mut offset = 0_u64;
        loop {
            let page: LedgerPage<EventRecord> = self.ledger.read_events(
                run_id,
                PageRequest {
                    limit: COLLECT_PAGE,
                    offset,
                },
            )?;
            let total = page.total;
            offset += u64::try_from(page.items.len()).unwrap_or(u64::MAX);
            collected.extend(page.items);
            if u64::try_from(collected.len()).unwrap_or(u64::MAX) >= self.max_items_per_stream {
                collected.truncate(usize::try_from(self.max_items_per_stream).unwrap_or(usize::MAX));
                return Ok((collected, offset < total || total > self.max_items_per_stream));
            }
            if offset >= total {
                return Ok((collected, false));
            }
        }
    }

    /// Collects up to the per-stream cap of audit entries.
    fn collect_audit(&self, run_id: &RunId) -> Result<(Vec<AuditRecord>, bool), IntegrityError> {
        let mut collected = Vec::new();
        let mut offset = 0_u64;
        loop {
            let page: LedgerPage<AuditRecord> = self.ledger.read_audit(
                run_id,
                PageRequest {
                    limit: COLLECT_PAGE,
                    offset,
                },
            )?;
            let total = page.total;
            offset += u64::try_from(page.items.len()).unwrap_or(u64::MAX);
            collected.extend(page.items);
            if u64::try_from(collected.len()).unwrap_or(u64::MAX) >= self.max_items_per_stream {
                collected.truncate(usize::try_from(self.max_items_per_stream).unwrap_or(usize::MAX));
                return Ok((collected, offset < total || total > self.max_items_per_stream));
            }
            if offset >= total {
                return Ok((collected, false));
            }
        }
    }

    /// Resolves the base run for a timeline diff.
    fn resolve_base(
        &self,
        run: &RunRecord,
        base_run_id: Option<&RunId>,
    ) -> Result<RunRecord, IntegrityError> {
        if let Some(base_id) = base_run_id {
            let base = self
                .store
                .load_run(base_id)?
                .ok_or_else(|| IntegrityError::RunNotFound(base_id.as_str().to_string()))?;
            if base.id == run.id {
                return Err(IntegrityError::BaseScopeMismatch(
                    "base run must differ from the target run".to_string(),
                ));
            }
            if base.workspace_id != run.workspace_id {
                return Err(IntegrityError::BaseScopeMismatch(
                    "base run workspace does not match".to_string(),
                ));
            }
            if base.agent_id != run.agent_id {
                return Err(IntegrityError::BaseScopeMismatch(
                    "base run agent does not match".to_string(),
                ));
            }
            if base.playbook_id != run.playbook_id {
                return Err(IntegrityError::BaseScopeMismatch(
                    "base run playbook does not match".to_string(),
                ));
            }
            return Ok(base);
        }
        let candidates = self.store.list_runs(&RunFilter {
            workspace_id: Some(run.workspace_id.clone()),
            agent_id: Some(run.agent_id.clone()),
            playbook_id: Some(run.playbook_id.clone()),
            ..RunFilter::default()
        })?;
        let mut earlier: Vec<&RunRecord> = candidates
            .iter()
            .filter(|candidate| candidate.id != run.id)
            .collect();
        if earlier.is_empty() {
            return Err(IntegrityError::NoComparableBase(run.id.as_str().to_string()));
        }
        // Candidates are already newest-first; prefer the latest earlier run.
        let before: Vec<&&RunRecord> = earlier
            .iter()
            .filter(|candidate| candidate.started_at < run.started_at)
            .collect();
        if let Some(base) = before.first() {
            return Ok((***base).clone());
        }
        Ok(earlier.remove(0).clone())
    }

    /// Builds the per-dimension count maps for a run.
    fn count_maps(
        &self,
        run: &RunRecord,
    ) -> Result<BTreeMap<(String, String), u64>, IntegrityError> {
        let (events, _) = self.collect_events(&run.id)?;
        let (audit, _) = self.collect_audit(&run.id)?;
        let mut counts: BTreeMap<(String, String), u64> = BTreeMap::new();
        for event in &events {
            *counts.entry(("event".to_string(), event.name.clone())).or_default() += 1;
        }
        for entry in &audit {
            *counts.entry(("audit".to_string(), entry.event_type.clone())).or_default() += 1;
        }
        for intent in &run.action_intents {
            *counts
                .entry(("capability".to_string(), intent.capability.as_str().to_string()))
                .or_default() += 1;
        }
        for decision in &run.policy_decisions {
            *counts
                .entry(("decision".to_string(), decision.decision.label().to_string()))
                .or_default() += 1;
            for code in &decision.reason_codes {
                *counts.entry(("reason".to_string(), code.clone())).or_default() += 1;
            }
        }
        Ok(counts)
    }
}

// ============================================================================
// SECTION: Replay Derivation
// ============================================================================

/// Derives the replay integrity report from collected streams.
#[must_use]
pub fn derive_replay_integrity(
    run: &RunRecord,
    events: &[EventRecord],
    audit: &[AuditRecord],
    partial: bool,
) -> ReplayIntegrity {
    let expected: Vec<ActionIntentId> = run.allowed_intent_ids();
    let expected_set: BTreeSet<&str> = expected.iter().map(ActionIntentId::as_str).collect();
    let known_intents: BTreeSet<&str> =
        run.action_intents.iter().map(|intent| intent.id.as_str()).collect();

    /// Appends an issue code once, preserving first-seen order.
    fn push_issue(issues: &mut Vec<String>, code: &str) {
        if !issues.iter().any(|existing| existing == code) {
            issues.push(code.to_string());
        }
    }

    let mut issues: Vec<String> = Vec::new();
    if partial {
        push_issue(&mut issues, replay_issue::PARTIAL_EVIDENCE);
    }

    let mut observed: BTreeMap<String, u64> = BTreeMap::new();
    let mut event_execution_count = 0_u64;
    for event in events {
        if event.name != event_name::ACTION_EXECUTED
            && event.name != event_name::ACTION_EXECUTED_DEDUPED
        {
            continue;
        }
        event_execution_count += 1;
        let Some(action_id) = event.payload.get("action_intent_id").and_then(Value::as_str)
        else {
            push_issue(&mut issues, replay_issue::UNKNOWN_ACTION_ID);
            continue;
        };
        *observed.entry(action_id.to_string()).or_default() += 1;
        if !known_intents.contains(action_id) {
            push_issue(&mut issues, replay_issue::UNKNOWN_ACTION_ID);
            push_issue(&mut issues, replay_issue::UNEXPECTED);
        } else if !expected_set.contains(action_id) {
            push_issue(&mut issues, replay_issue::UNEXPECTED);
        }
    }
    for intent_id in &expected {
        if observed.get(intent_id.as_str()).copied().unwrap_or(0) == 0 {
            push_issue(&mut issues, replay_issue::MISSING_EXPECTED);
        }
    }
    if observed.values().any(|count| *count > 1) {
        push_issue(&mut issues, replay_issue::DUPLICATE);
    }
    let audit_execution_count = u64::try_from(
        audit
            .iter()
            .filter(|entry| entry.event_type == crate::core::audit_event::ACTION_EXECUTED)
            .count(),
    )
    .unwrap_or(u64::MAX);
    if audit_execution_count != event_execution_count {
        push_issue(&mut issues, replay_issue::AUDIT_COUNT_MISMATCH);
    }

    let replay_state = match run.status {
        RunStatus::Accepted | RunStatus::Running | RunStatus::WaitingApproval => {
            ReplayState::Pending
        }
        _ => {
            let non_partial = issues.iter().any(|code| code != replay_issue::PARTIAL_EVIDENCE);
            if non_partial {
                ReplayState::Inconsistent
            } else if issues.is_empty() {
                ReplayState::Consistent
            } else {
                ReplayState::Inconclusive
            }
        }
    };

    ReplayIntegrity {
        run_id: run.id.clone(),
        run_status: run.status,
        replay_state,
        issues,
        expected,
        observed,
        event_execution_count,
        audit_execution_count,
    }
}

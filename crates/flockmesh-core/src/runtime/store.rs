// crates/flockmesh-core/src/runtime/store.rs
// ============================================================================
// Module: In-Memory Stores
// Description: In-memory state, ledger, and history implementations.
// Purpose: Provide deterministic backends for tests and local demos.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! These implementations back tests and local demos; production deployments
//! use the SQLite state store and the file ledger. Semantics mirror the
//! durable backends exactly, including revision CAS and insertion-ordered
//! ledger streams.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::AgentId;
use crate::core::AgentProfile;
use crate::core::AuditRecord;
use crate::core::BindingId;
use crate::core::ConnectorBinding;
use crate::core::EventRecord;
use crate::core::IdempotencyKey;
use crate::core::LedgerPage;
use crate::core::PageRequest;
use crate::core::PatchHistoryEntry;
use crate::core::PatchId;
use crate::core::ProfileName;
use crate::core::RunId;
use crate::core::RunRecord;
use crate::core::Timestamp;
use crate::interfaces::HistoryError;
use crate::interfaces::IdempotencyResult;
use crate::interfaces::LedgerError;
use crate::interfaces::LedgerStore;
use crate::interfaces::PatchHistoryStore;
use crate::interfaces::RunFilter;
use crate::interfaces::StateStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory State Store
// ============================================================================

/// Mutable tables behind the in-memory state store.
#[derive(Debug, Default)]
struct StateTables {
    /// Agent profiles by id.
    agents: BTreeMap<String, AgentProfile>,
    /// Connector bindings by id.
    bindings: BTreeMap<String, ConnectorBinding>,
    /// Runs by id.
    runs: BTreeMap<String, RunRecord>,
    /// Idempotency results by key.
    idempotency: BTreeMap<String, IdempotencyResult>,
}

/// In-memory state store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStateStore {
    /// Tables protected by a mutex.
    tables: Arc<Mutex<StateTables>>,
}

impl InMemoryStateStore {
    /// Creates a new in-memory state store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the tables, translating poisoning into a store error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StateTables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Store("state store mutex poisoned".to_string()))
    }
}

impl StateStore for InMemoryStateStore {
    fn save_agent(&self, agent: &AgentProfile) -> Result<(), StoreError> {
        self.lock()?.agents.insert(agent.id.as_str().to_string(), agent.clone());
        Ok(())
    }

    fn load_agent(&self, id: &AgentId) -> Result<Option<AgentProfile>, StoreError> {
        Ok(self.lock()?.agents.get(id.as_str()).cloned())
    }

    fn list_agents(
        &self,
        workspace: Option<&crate::core::WorkspaceId>,
    ) -> Result<Vec<AgentProfile>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .agents
            .values()
            .filter(|agent| workspace.is_none_or(|ws| &agent.workspace_id == ws))
            .cloned()
            .collect())
    }

    fn save_binding(&self, binding: &ConnectorBinding) -> Result<(), StoreError> {
        self.lock()?.bindings.insert(binding.id.as_str().to_string(), binding.clone());
        Ok(())
    }

    fn load_binding(&self, id: &BindingId) -> Result<Option<ConnectorBinding>, StoreError> {
        Ok(self.lock()?.bindings.get(id.as_str()).cloned())
    }

    fn list_bindings(
        &self,
        workspace: Option<&crate::core::WorkspaceId>,
    ) -> Result<Vec<ConnectorBinding>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .bindings
            .values()
            .filter(|binding| workspace.is_none_or(|ws| &binding.workspace_id == ws))
            .cloned()
            .collect())
    }

    fn load_run(&self, id: &RunId) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.lock()?.runs.get(id.as_str()).cloned())
    }

    fn save_run(
        &self,
        run: &RunRecord,
        expected_revision: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut guard = self.lock()?;
        let current = guard.runs.get(run.id.as_str()).map(|existing| existing.revision);
        let new_revision = check_revision(current, expected_revision, run.revision)?;
        let mut persisted = run.clone();
        persisted.revision = new_revision;
        guard.runs.insert(run.id.as_str().to_string(), persisted);
        Ok(new_revision)
    }

    fn list_runs(&self, filter: &RunFilter) -> Result<Vec<RunRecord>, StoreError> {
        let guard = self.lock()?;
        let mut runs: Vec<RunRecord> = guard
            .runs
            .values()
            .filter(|run| filter.workspace_id.as_ref().is_none_or(|ws| &run.workspace_id == ws))
            .filter(|run| filter.agent_id.as_ref().is_none_or(|agent| &run.agent_id == agent))
            .filter(|run| {
                filter.playbook_id.as_ref().is_none_or(|playbook| &run.playbook_id == playbook)
            })
            .filter(|run| filter.status.is_none_or(|status| run.status == status))
            .cloned()
            .collect();
        runs.sort_by(|left, right| right.started_at.cmp(&left.started_at));
        if let Some(limit) = filter.limit {
            runs.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(runs)
    }

    fn load_idempotency(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<IdempotencyResult>, StoreError> {
        Ok(self.lock()?.idempotency.get(key.as_str()).cloned())
    }

    fn save_idempotency(&self, result: &IdempotencyResult) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.idempotency.entry(result.key.as_str().to_string()).or_insert_with(|| result.clone());
        Ok(())
    }
}

/// Applies the revision CAS contract shared with durable stores.
///
/// # Errors
///
/// Returns [`StoreError::RevisionConflict`] when the expected revision does
/// not match the persisted row.
pub fn check_revision(
    current: Option<u64>,
    expected: Option<u64>,
    run_revision: u64,
) -> Result<u64, StoreError> {
    match (current, expected) {
        (None, None | Some(0)) => Ok(run_revision.max(1)),
        (Some(current), Some(expected)) if current == expected => Ok(current + 1),
        (Some(current), expected) => Err(StoreError::RevisionConflict {
            expected: expected.unwrap_or(0),
            current,
        }),
        (None, Some(expected)) => Err(StoreError::RevisionConflict {
            expected,
            current: 0,
        }),
    }
}

// ============================================================================
// SECTION: In-Memory Ledger
// ============================================================================

/// Streams behind the in-memory ledger.
#[derive(Debug, Default)]
struct LedgerStreams {
    /// Event streams by run id.
    events: BTreeMap<String, Vec<EventRecord>>,
    /// Audit streams by run id.
    audit: BTreeMap<String, Vec<AuditRecord>>,
}

/// In-memory dual ledger for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedgerStore {
    /// Streams protected by a mutex.
    streams: Arc<Mutex<LedgerStreams>>,
}

impl InMemoryLedgerStore {
    /// Creates a new in-memory ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the streams, translating poisoning into a ledger error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LedgerStreams>, LedgerError> {
        self.streams.lock().map_err(|_| LedgerError::Io("ledger mutex poisoned".to_string()))
    }
}

/// Slices one page out of a stream.
fn paginate<T: Clone>(stream: &[T], page: PageRequest) -> LedgerPage<T> {
    let total = u64::try_from(stream.len()).unwrap_or(u64::MAX);
    let offset = usize::try_from(page.offset).unwrap_or(usize::MAX).min(stream.len());
    let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
    let end = offset.saturating_add(limit).min(stream.len());
    LedgerPage {
        items: stream[offset..end].to_vec(),
        total,
        offset: page.offset,
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn append_event(&self, event: &EventRecord) -> Result<EventRecord, LedgerError> {
        let mut stamped = event.clone();
        stamped.persisted_at = Timestamp::now_utc();
        self.lock()?
            .events
            .entry(event.run_id.as_str().to_string())
            .or_default()
            .push(stamped.clone());
        Ok(stamped)
    }

    fn append_audit(&self, audit: &AuditRecord) -> Result<AuditRecord, LedgerError> {
        let mut stamped = audit.clone();
        stamped.persisted_at = Timestamp::now_utc();
        self.lock()?
            .audit
            .entry(audit.run_id.as_str().to_string())
            .or_default()
            .push(stamped.clone());
        Ok(stamped)
    }

    fn read_events(
        &self,
        run_id: &RunId,
        page: PageRequest,
    ) -> Result<LedgerPage<EventRecord>, LedgerError> {
        let guard = self.lock()?;
        let stream = guard.events.get(run_id.as_str()).map(Vec::as_slice).unwrap_or_default();
        Ok(paginate(stream, page))
    }

    fn read_audit(
        &self,
        run_id: &RunId,
        page: PageRequest,
    ) -> Result<LedgerPage<AuditRecord>, LedgerError> {
        let guard = self.lock()?;
        let stream = guard.audit.get(run_id.as_str()).map(Vec::as_slice).unwrap_or_default();
        Ok(paginate(stream, page))
    }
}

// ============================================================================
// SECTION: In-Memory Patch History
// ============================================================================

/// In-memory patch history journal for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryHistoryStore {
    /// Entries in append order.
    entries: Arc<Mutex<Vec<PatchHistoryEntry>>>,
}

impl InMemoryHistoryStore {
    /// Creates a new in-memory history journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the entries, translating poisoning into a history error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<PatchHistoryEntry>>, HistoryError> {
        self.entries.lock().map_err(|_| HistoryError::Io("history mutex poisoned".to_string()))
    }
}

impl PatchHistoryStore for InMemoryHistoryStore {
    fn append(&self, entry: &PatchHistoryEntry) -> Result<(), HistoryError> {
        self.lock()?.push(entry.clone());
        Ok(())
    }

    fn list(
        &self,
        profile: Option<&ProfileName>,
        page: PageRequest,
    ) -> Result<LedgerPage<PatchHistoryEntry>, HistoryError> {
        let guard = self.lock()?;
        let mut entries: Vec<PatchHistoryEntry> = guard
            .iter()
            .filter(|entry| profile.is_none_or(|name| &entry.profile_name == name))
            .cloned()
            .collect();
        entries.sort_by(|left, right| right.applied_at.cmp(&left.applied_at));
        Ok(paginate(&entries, page))
    }

    fn find(&self, patch_id: &PatchId) -> Result<Option<PatchHistoryEntry>, HistoryError> {
        let guard = self.lock()?;
        Ok(guard.iter().find(|entry| &entry.patch_id == patch_id).cloned())
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

    /// Tests the revision CAS contract table.
    #[test]
    fn test_check_revision_contract() {
        assert_eq!(check_revision(None, None, 1).unwrap(), 1);
        assert_eq!(check_revision(None, Some(0), 3).unwrap(), 3);
        assert_eq!(check_revision(Some(2), Some(2), 2).unwrap(), 3);
        let conflict = check_revision(Some(4), Some(2), 2).unwrap_err();
        match conflict {
            StoreError::RevisionConflict { expected, current } => {
                assert_eq!(expected, 2);
                assert_eq!(current, 4);
            }
            other => panic!("expected RevisionConflict, got {other}"),
        }
        assert!(check_revision(None, Some(2), 2).is_err());
    }
}

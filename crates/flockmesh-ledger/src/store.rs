// crates/flockmesh-ledger/src/store.rs
// ============================================================================
// Module: JSONL Ledger Store
// Description: Append-only JSONL streams with per-run locking.
// Purpose: Durable event/audit ledgers and the patch history journal.
// Dependencies: flockmesh-core, serde_json
// ============================================================================

//! ## Overview
//! One JSON object per line, append-only. Writers lock per run so two
//! handlers touching the same run serialize their appends; readers parse the
//! whole stream and slice the requested page. Run identifiers are validated
//! against path traversal before touching the filesystem.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fs;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use flockmesh_core::AuditRecord;
use flockmesh_core::EventRecord;
use flockmesh_core::LedgerError;
use flockmesh_core::LedgerPage;
use flockmesh_core::LedgerStore;
use flockmesh_core::PageRequest;
use flockmesh_core::PatchHistoryEntry;
use flockmesh_core::PatchHistoryStore;
use flockmesh_core::PatchId;
use flockmesh_core::ProfileName;
use flockmesh_core::RunId;
use flockmesh_core::Timestamp;
use flockmesh_core::interfaces::HistoryError;
use serde::Serialize;
use serde::de::DeserializeOwned;

// ============================================================================
// SECTION: Path Hygiene
// ============================================================================

/// Returns true when the run id is safe to use as a file stem.
fn is_path_safe(run_id: &str) -> bool {
    !run_id.is_empty()
        && run_id.len() <= 255
        && run_id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Validates a run id before building a path from it.
fn path_safe(run_id: &RunId) -> Result<&str, LedgerError> {
    let raw = run_id.as_str();
    if is_path_safe(raw) {
        Ok(raw)
    } else {
        Err(LedgerError::Io(format!("run id unsafe for ledger path: {raw}")))
    }
}

// ============================================================================
// SECTION: JSONL Primitives
// ============================================================================

/// Appends one serialized line, flushing and syncing before returning.
fn append_line<T: Serialize>(path: &Path, record: &T) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| LedgerError::Io(err.to_string()))?;
    }
    let line = serde_json::to_string(record)
        .map_err(|err| LedgerError::Serialization(err.to_string()))?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| LedgerError::Io(err.to_string()))?;
    file.write_all(line.as_bytes()).map_err(|err| LedgerError::Io(err.to_string()))?;
    file.write_all(b"\n").map_err(|err| LedgerError::Io(err.to_string()))?;
    file.flush().map_err(|err| LedgerError::Io(err.to_string()))?;
    file.sync_all().map_err(|err| LedgerError::Io(err.to_string()))?;
    Ok(())
}

/// Reads every line of a JSONL file; a missing file is an empty stream.
fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LedgerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(path).map_err(|err| LedgerError::Io(err.to_string()))?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|err| LedgerError::Io(err.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .map_err(|err| LedgerError::Serialization(err.to_string()))?;
        records.push(record);
    }
    Ok(records)
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

// ============================================================================
// SECTION: File Ledger Store
// ============================================================================

/// JSONL-backed dual ledger rooted at a data directory.
pub struct FileLedgerStore {
    /// Directory holding `events/` and `audit/`.
    root: PathBuf,
    /// Per-run append locks.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileLedgerStore {
    /// Creates a ledger store rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Io`] when the stream directories cannot be
    /// created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let root = root.into();
        fs::create_dir_all(root.join("events")).map_err(|err| LedgerError::Io(err.to_string()))?;
        fs::create_dir_all(root.join("audit")).map_err(|err| LedgerError::Io(err.to_string()))?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the per-run append lock, creating it on first use.
    fn run_lock(&self, run_id: &str) -> Result<Arc<Mutex<()>>, LedgerError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| LedgerError::Io("ledger lock table poisoned".to_string()))?;
        Ok(Arc::clone(locks.entry(run_id.to_string()).or_default()))
    }

    /// Returns the event stream path for a run.
    fn events_path(&self, run_id: &str) -> PathBuf {
        self.root.join("events").join(format!("{run_id}.jsonl"))
    }

    /// Returns the audit stream path for a run.
    fn audit_path(&self, run_id: &str) -> PathBuf {
        self.root.join("audit").join(format!("{run_id}.jsonl"))
    }
}

impl LedgerStore for FileLedgerStore {
    fn append_event(&self, event: &EventRecord) -> Result<EventRecord, LedgerError> {
        let run_id = path_safe(&event.run_id)?;
        let lock = self.run_lock(run_id)?;
        let _guard =
            lock.lock().map_err(|_| LedgerError::Io("ledger run lock poisoned".to_string()))?;
        let mut stamped = event.clone();
        stamped.persisted_at = Timestamp::now_utc();
        append_line(&self.events_path(run_id), &stamped)?;
        Ok(stamped)
    }

    fn append_audit(&self, audit: &AuditRecord) -> Result<AuditRecord, LedgerError> {
        let run_id = path_safe(&audit.run_id)?;
        let lock = self.run_lock(run_id)?;
        let _guard =
            lock.lock().map_err(|_| LedgerError::Io("ledger run lock poisoned".to_string()))?;
        let mut stamped = audit.clone();
        stamped.persisted_at = Timestamp::now_utc();
        append_line(&self.audit_path(run_id), &stamped)?;
        Ok(stamped)
    }

    fn read_events(
        &self,
        run_id: &RunId,
        page: PageRequest,
    ) -> Result<LedgerPage<EventRecord>, LedgerError> {
        let run_id = path_safe(run_id)?;
        let records: Vec<EventRecord> = read_lines(&self.events_path(run_id))?;
        Ok(paginate(&records, page))
    }

    fn read_audit(
        &self,
        run_id: &RunId,
        page: PageRequest,
    ) -> Result<LedgerPage<AuditRecord>, LedgerError> {
        let run_id = path_safe(run_id)?;
        let records: Vec<AuditRecord> = read_lines(&self.audit_path(run_id))?;
        Ok(paginate(&records, page))
    }
}

// ============================================================================
// SECTION: History Journal
// ============================================================================

/// JSONL-backed policy patch history journal.
pub struct JsonlHistoryStore {
    /// Journal file path.
    path: PathBuf,
    /// Append lock.
    lock: Mutex<()>,
}

impl JsonlHistoryStore {
    /// Creates a history journal at the given file path.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Io`] when the parent directory cannot be
    /// created.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| HistoryError::Io(err.to_string()))?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Reads the full journal.
    fn read_all(&self) -> Result<Vec<PatchHistoryEntry>, HistoryError> {
        read_lines(&self.path).map_err(|err| HistoryError::Io(err.to_string()))
    }
}

impl PatchHistoryStore for JsonlHistoryStore {
    fn append(&self, entry: &PatchHistoryEntry) -> Result<(), HistoryError> {
        let _guard =
            self.lock.lock().map_err(|_| HistoryError::Io("history lock poisoned".to_string()))?;
        append_line(&self.path, entry).map_err(|err| HistoryError::Io(err.to_string()))
    }

    fn list(
        &self,
        profile: Option<&ProfileName>,
        page: PageRequest,
    ) -> Result<LedgerPage<PatchHistoryEntry>, HistoryError> {
        let mut entries: Vec<PatchHistoryEntry> = self
            .read_all()?
            .into_iter()
            .filter(|entry| profile.is_none_or(|name| &entry.profile_name == name))
            .collect();
        entries.sort_by(|left, right| right.applied_at.cmp(&left.applied_at));
        Ok(paginate(&entries, page))
    }

    fn find(&self, patch_id: &PatchId) -> Result<Option<PatchHistoryEntry>, HistoryError> {
        Ok(self.read_all()?.into_iter().find(|entry| &entry.patch_id == patch_id))
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

    use flockmesh_core::AuditActor;
    use flockmesh_core::EventId;
    use flockmesh_core::hash_bytes;
    use serde_json::json;

    use super::*;

    /// Builds an event record for tests.
    fn event(run: &str, index: u32) -> EventRecord {
        EventRecord {
            id: EventId::new(format!("evt_{index:04}")),
            run_id: RunId::new(run),
            name: "run.created".to_string(),
            payload: json!({"index": index}),
            at: Timestamp::parse("2026-03-01T00:00:00Z").unwrap(),
            persisted_at: Timestamp::parse("2026-03-01T00:00:00Z").unwrap(),
        }
    }

    /// Tests append order, pagination, and persistence across instances.
    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path()).unwrap();
        for index in 0..5 {
            store.append_event(&event("run_ledger_test", index)).unwrap();
        }

        let page = store
            .read_events(&RunId::new("run_ledger_test"), PageRequest { limit: 2, offset: 1 })
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].payload, json!({"index": 1}));
        assert!(page.truncated());

        // A fresh store instance reads the same stream.
        let reopened = FileLedgerStore::new(dir.path()).unwrap();
        let page = reopened
            .read_events(&RunId::new("run_ledger_test"), PageRequest { limit: 10, offset: 0 })
            .unwrap();
        assert_eq!(page.items.len(), 5);
    }

    /// Tests audit appends stamp `persisted_at`.
    #[test]
    fn test_audit_append_stamps_persisted_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path()).unwrap();
        let at = Timestamp::parse("2020-01-01T00:00:00Z").unwrap();
        let record = AuditRecord {
            id: flockmesh_core::AuditId::new("aud_0001"),
            run_id: RunId::new("run_ledger_test"),
            event_type: "run.created".to_string(),
            actor: AuditActor::from_actor_id(flockmesh_core::ActorId::new("usr_tester_01")),
            payload_hash: hash_bytes(b"payload"),
            decision_ref: None,
            details: serde_json::Value::Null,
            occurred_at: at,
            persisted_at: at,
        };
        let stamped = store.append_audit(&record).unwrap();
        assert!(stamped.persisted_at > at);
        assert_eq!(stamped.occurred_at, at);
    }

    /// Tests rejection of path-unsafe run ids.
    #[test]
    fn test_unsafe_run_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path()).unwrap();
        let result = store.read_events(
            &RunId::new("../../etc/passwd"),
            PageRequest::default(),
        );
        assert!(result.is_err());
    }

    /// Tests the history journal ordering and lookup.
    #[test]
    fn test_history_journal() {
        use flockmesh_core::ActorId;
        use flockmesh_core::PatchOperation;
        use flockmesh_core::PatchSummary;
        use flockmesh_core::ProfileDocument;
        use flockmesh_core::SimulationPreview;
        use std::collections::BTreeMap;

        let dir = tempfile::tempdir().unwrap();
        let journal = JsonlHistoryStore::new(dir.path().join("history.jsonl")).unwrap();
        let entry = |patch: &str, at: &str| PatchHistoryEntry {
            patch_id: PatchId::new(patch),
            operation: PatchOperation::Patch,
            profile_name: ProfileName::new("workspace_ops_cn"),
            actor_id: ActorId::new("usr_admin_01"),
            reason: String::new(),
            applied_at: Timestamp::parse(at).unwrap(),
            file_path: "policies/workspace_ops_cn.policy.json".to_string(),
            before_profile_hash: hash_bytes(b"before"),
            after_profile_hash: hash_bytes(b"after"),
            summary: PatchSummary::default(),
            changes: Vec::new(),
            simulation_preview: SimulationPreview {
                decisions: Vec::new(),
                before_counts: BTreeMap::new(),
                after_counts: BTreeMap::new(),
                improved: Vec::new(),
            },
            before_document: ProfileDocument {
                name: "workspace_ops_cn".to_string(),
                rules: BTreeMap::new(),
            },
            after_document: ProfileDocument {
                name: "workspace_ops_cn".to_string(),
                rules: BTreeMap::new(),
            },
            rollback_of: None,
        };
        journal.append(&entry("pph_first", "2026-03-01T00:00:00Z")).unwrap();
        journal.append(&entry("pph_second", "2026-03-02T00:00:00Z")).unwrap();

        let page = journal.list(None, PageRequest::default()).unwrap();
        assert_eq!(page.items[0].patch_id.as_str(), "pph_second");
        assert_eq!(page.items[1].patch_id.as_str(), "pph_first");
        assert!(journal.find(&PatchId::new("pph_first")).unwrap().is_some());
        assert!(journal.find(&PatchId::new("pph_missing")).unwrap().is_none());
    }
}

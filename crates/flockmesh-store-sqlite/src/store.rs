// crates/flockmesh-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite State Store
// Description: Durable StateStore with revision CAS on runs.
// Purpose: Persist control-plane state with deterministic serialization.
// Dependencies: flockmesh-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! One shared connection guarded by a mutex, WAL journal mode, and a busy
//! timeout. Records serialize to JSON payload columns; scalar columns
//! (`workspace_id`, `agent_id`, `status`, `revision`, timestamps) are indexed
//! for the filtered queries. The run CAS runs inside a transaction so the
//! revision check and the write are atomic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use flockmesh_core::AgentId;
use flockmesh_core::AgentProfile;
use flockmesh_core::BindingId;
use flockmesh_core::ConnectorBinding;
use flockmesh_core::IdempotencyKey;
use flockmesh_core::IdempotencyResult;
use flockmesh_core::RunFilter;
use flockmesh_core::RunId;
use flockmesh_core::RunRecord;
use flockmesh_core::StateStore;
use flockmesh_core::StoreError;
use flockmesh_core::WorkspaceId;
use flockmesh_core::runtime::check_revision;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the `SQLite` state store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed state store.
#[derive(Clone)]
pub struct SqliteStateStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    /// Opens the store, creating the schema when missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| StoreError::Io(err.to_string()))?;
        }
        let connection =
            Connection::open(&config.path).map_err(|err| StoreError::Io(err.to_string()))?;
        connection
            .pragma_update(None, "journal_mode", "wal")
            .map_err(|err| StoreError::Store(err.to_string()))?;
        connection
            .pragma_update(None, "synchronous", "full")
            .map_err(|err| StoreError::Store(err.to_string()))?;
        connection
            .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
            .map_err(|err| StoreError::Store(err.to_string()))?;
        initialize_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Opens an in-memory store for tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when initialization fails.
    pub fn in_memory() -> Result<Self, StoreError> {
        let connection =
            Connection::open_in_memory().map_err(|err| StoreError::Io(err.to_string()))?;
        initialize_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the connection, translating poisoning into a store error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::Store("sqlite connection mutex poisoned".to_string()))
    }
}

/// Creates tables and indexes when absent.
fn initialize_schema(connection: &Connection) -> Result<(), StoreError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_meta (
                version INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                status TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_agents_workspace ON agents (workspace_id);
             CREATE TABLE IF NOT EXISTS connector_bindings (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                agent_id TEXT,
                status TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_bindings_workspace
                ON connector_bindings (workspace_id);
             CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                playbook_id TEXT NOT NULL,
                status TEXT NOT NULL,
                revision INTEGER NOT NULL,
                started_at_ms INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                payload TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_runs_scope
                ON runs (workspace_id, agent_id, playbook_id);
             CREATE INDEX IF NOT EXISTS idx_runs_started ON runs (started_at_ms);
             CREATE TABLE IF NOT EXISTS idempotency_results (
                key TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
             );",
        )
        .map_err(|err| StoreError::Store(err.to_string()))?;
    let version: Option<i64> = connection
        .query_row("SELECT version FROM schema_meta LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(|err| StoreError::Store(err.to_string()))?;
    match version {
        None => {
            connection
                .execute("INSERT INTO schema_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| StoreError::Store(err.to_string()))?;
            Ok(())
        }
        Some(found) if found == SCHEMA_VERSION => Ok(()),
        Some(found) => Err(StoreError::Store(format!(
            "schema version mismatch: found {found}, expected {SCHEMA_VERSION}"
        ))),
    }
}

// ============================================================================
// SECTION: Serialization Helpers
// ============================================================================

/// Serializes a record into its payload column.
fn to_payload<T: serde::Serialize>(record: &T) -> Result<String, StoreError> {
    serde_json::to_string(record).map_err(|err| StoreError::Serialization(err.to_string()))
}

/// Deserializes a record from its payload column.
fn from_payload<T: serde::de::DeserializeOwned>(payload: &str) -> Result<T, StoreError> {
    serde_json::from_str(payload).map_err(|err| StoreError::Serialization(err.to_string()))
}

/// Returns the bare wire label for a unit-variant enum.
fn status_label<T: serde::Serialize>(status: T) -> Result<String, StoreError> {
    serde_json::to_value(status)
        .map_err(|err| StoreError::Serialization(err.to_string()))?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| StoreError::Serialization("status is not a string label".to_string()))
}

// ============================================================================
// SECTION: StateStore Implementation
// ============================================================================

impl StateStore for SqliteStateStore {
    fn save_agent(&self, agent: &AgentProfile) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO agents (id, workspace_id, status, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    workspace_id = excluded.workspace_id,
                    status = excluded.status,
                    payload = excluded.payload,
                    updated_at = excluded.updated_at",
                params![
                    agent.id.as_str(),
                    agent.workspace_id.as_str(),
                    status_label(agent.status)?,
                    to_payload(agent)?,
                    agent.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|err| StoreError::Store(err.to_string()))?;
        Ok(())
    }

    fn load_agent(&self, id: &AgentId) -> Result<Option<AgentProfile>, StoreError> {
        let guard = self.lock()?;
        let payload: Option<String> = guard
            .query_row("SELECT payload FROM agents WHERE id = ?1", params![id.as_str()], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|err| StoreError::Store(err.to_string()))?;
        payload.map(|payload| from_payload(&payload)).transpose()
    }

    fn list_agents(
        &self,
        workspace: Option<&WorkspaceId>,
    ) -> Result<Vec<AgentProfile>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT payload FROM agents
                 WHERE (?1 IS NULL OR workspace_id = ?1)
                 ORDER BY id",
            )
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let rows = statement
            .query_map(params![workspace.map(WorkspaceId::as_str)], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let mut agents = Vec::new();
        for row in rows {
            let payload = row.map_err(|err| StoreError::Store(err.to_string()))?;
            agents.push(from_payload(&payload)?);
        }
        Ok(agents)
    }

    fn save_binding(&self, binding: &ConnectorBinding) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO connector_bindings (id, workspace_id, agent_id, status, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    workspace_id = excluded.workspace_id,
                    agent_id = excluded.agent_id,
                    status = excluded.status,
                    payload = excluded.payload,
                    updated_at = excluded.updated_at",
                params![
                    binding.id.as_str(),
                    binding.workspace_id.as_str(),
                    binding.agent_id.as_ref().map(AgentId::as_str),
                    status_label(binding.status)?,
                    to_payload(binding)?,
                    flockmesh_core::Timestamp::now_utc().to_rfc3339(),
                ],
            )
            .map_err(|err| StoreError::Store(err.to_string()))?;
        Ok(())
    }

    fn load_binding(&self, id: &BindingId) -> Result<Option<ConnectorBinding>, StoreError> {
        let guard = self.lock()?;
        let payload: Option<String> = guard
            .query_row(
                "SELECT payload FROM connector_bindings WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Store(err.to_string()))?;
        payload.map(|payload| from_payload(&payload)).transpose()
    }

    fn list_bindings(
        &self,
        workspace: Option<&WorkspaceId>,
    ) -> Result<Vec<ConnectorBinding>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT payload FROM connector_bindings
                 WHERE (?1 IS NULL OR workspace_id = ?1)
                 ORDER BY id",
            )
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let rows = statement
            .query_map(params![workspace.map(WorkspaceId::as_str)], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let mut bindings = Vec::new();
        for row in rows {
            let payload = row.map_err(|err| StoreError::Store(err.to_string()))?;
            bindings.push(from_payload(&payload)?);
        }
        Ok(bindings)
    }

    fn load_run(&self, id: &RunId) -> Result<Option<RunRecord>, StoreError> {
        let guard = self.lock()?;
        let payload: Option<String> = guard
            .query_row("SELECT payload FROM runs WHERE id = ?1", params![id.as_str()], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|err| StoreError::Store(err.to_string()))?;
        payload.map(|payload| from_payload(&payload)).transpose()
    }

    fn save_run(
        &self,
        run: &RunRecord,
        expected_revision: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Store(err.to_string()))?;
        let current: Option<i64> = tx
            .query_row(
                "SELECT revision FROM runs WHERE id = ?1",
                params![run.id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let current = current.map(|value| u64::try_from(value).unwrap_or(0));
        let new_revision = check_revision(current, expected_revision, run.revision)?;

        let mut persisted = run.clone();
        persisted.revision = new_revision;
        let started_at_ms =
            i64::try_from(persisted.started_at.unix_millis()).unwrap_or(i64::MAX);
        tx.execute(
            "INSERT INTO runs
                (id, workspace_id, agent_id, playbook_id, status, revision,
                 started_at_ms, updated_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                revision = excluded.revision,
                updated_at = excluded.updated_at,
                payload = excluded.payload",
            params![
                persisted.id.as_str(),
                persisted.workspace_id.as_str(),
                persisted.agent_id.as_str(),
                persisted.playbook_id.as_str(),
                status_label(persisted.status)?,
                i64::try_from(new_revision).unwrap_or(i64::MAX),
                started_at_ms,
                flockmesh_core::Timestamp::now_utc().to_rfc3339(),
                to_payload(&persisted)?,
            ],
        )
        .map_err(|err| StoreError::Store(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Store(err.to_string()))?;
        Ok(new_revision)
    }

    fn list_runs(&self, filter: &RunFilter) -> Result<Vec<RunRecord>, StoreError> {
        let guard = self.lock()?;
        let status = filter.status.map(status_label).transpose()?;
        let mut statement = guard
            .prepare(
                "SELECT payload FROM runs
                 WHERE (?1 IS NULL OR workspace_id = ?1)
                   AND (?2 IS NULL OR agent_id = ?2)
                   AND (?3 IS NULL OR playbook_id = ?3)
                   AND (?4 IS NULL OR status = ?4)
                 ORDER BY started_at_ms DESC
                 LIMIT ?5",
            )
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let limit = filter.limit.map_or(i64::MAX, i64::from);
        let rows = statement
            .query_map(
                params![
                    filter.workspace_id.as_ref().map(WorkspaceId::as_str),
                    filter.agent_id.as_ref().map(AgentId::as_str),
                    filter.playbook_id.as_ref().map(flockmesh_core::PlaybookId::as_str),
                    status,
                    limit,
                ],
                |row| row.get::<_, String>(0),
            )
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let mut runs = Vec::new();
        for row in rows {
            let payload = row.map_err(|err| StoreError::Store(err.to_string()))?;
            runs.push(from_payload(&payload)?);
        }
        Ok(runs)
    }

    fn load_idempotency(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<IdempotencyResult>, StoreError> {
        let guard = self.lock()?;
        let payload: Option<String> = guard
            .query_row(
                "SELECT payload FROM idempotency_results WHERE key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Store(err.to_string()))?;
        payload.map(|payload| from_payload(&payload)).transpose()
    }

    fn save_idempotency(&self, result: &IdempotencyResult) -> Result<(), StoreError> {
        let guard = self.lock()?;
        // First write wins; later writers keep the original payload.
        guard
            .execute(
                "INSERT OR IGNORE INTO idempotency_results (key, run_id, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    result.key.as_str(),
                    result.run_id.as_str(),
                    to_payload(result)?,
                    result.created_at.to_rfc3339(),
                ],
            )
            .map_err(|err| StoreError::Store(err.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

// crates/flockmesh-core/src/interfaces/mod.rs
// ============================================================================
// Module: Flockmesh Interfaces
// Description: Backend-agnostic interfaces for storage, ledgers, and adapters.
// Purpose: Define the contract surfaces used by the control-plane runtime.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the control plane integrates with storage backends,
//! ledger files, connector adapters, and the policy catalog without embedding
//! backend-specific details. Implementations must be deterministic and fail
//! closed on missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::AgentId;
use crate::core::AgentProfile;
use crate::core::AuditRecord;
use crate::core::BindingId;
use crate::core::CapabilityName;
use crate::core::ConnectorBinding;
use crate::core::ConnectorId;
use crate::core::EventRecord;
use crate::core::IdempotencyKey;
use crate::core::IntentTarget;
use crate::core::LedgerPage;
use crate::core::PageRequest;
use crate::core::PatchHistoryEntry;
use crate::core::PatchId;
use crate::core::PlaybookId;
use crate::core::ProfileDocument;
use crate::core::ProfileName;
use crate::core::RunId;
use crate::core::RunRecord;
use crate::core::RunStatus;
use crate::core::Timestamp;
use crate::core::WorkspaceId;

// ============================================================================
// SECTION: State Store
// ============================================================================

/// State store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("state store io error: {0}")]
    Io(String),
    /// Stored payload failed to (de)serialize.
    #[error("state store serialization error: {0}")]
    Serialization(String),
    /// Optimistic concurrency check failed.
    #[error("revision conflict: expected {expected}, current {current}")]
    RevisionConflict {
        /// Revision the writer expected.
        expected: u64,
        /// Revision currently persisted.
        current: u64,
    },
    /// Store reported an error.
    #[error("state store error: {0}")]
    Store(String),
}

/// Filter for run listing queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilter {
    /// Restrict to a workspace.
    pub workspace_id: Option<WorkspaceId>,
    /// Restrict to an agent.
    pub agent_id: Option<AgentId>,
    /// Restrict to a playbook.
    pub playbook_id: Option<PlaybookId>,
    /// Restrict to a status.
    pub status: Option<RunStatus>,
    /// Maximum records to return (most recent first by `started_at`).
    pub limit: Option<u32>,
}

/// Idempotency result persisted by the state store.
///
/// # Invariants
/// - `key` is consumed read-before-write; the first producer wins and every
///   later reader observes the identical payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyResult {
    /// Caller-supplied idempotency key.
    pub key: IdempotencyKey,
    /// Run that produced the payload.
    pub run_id: RunId,
    /// Opaque execution payload.
    pub payload: Value,
    /// Production timestamp.
    pub created_at: Timestamp,
}

/// Durable storage for agents, bindings, runs, and idempotency results.
///
/// Run writes use optimistic concurrency on `revision`: the store must
/// reject a write whose expected revision does not match the current row.
pub trait StateStore: Send + Sync {
    /// Persists an agent profile.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn save_agent(&self, agent: &AgentProfile) -> Result<(), StoreError>;

    /// Loads an agent profile by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn load_agent(&self, id: &AgentId) -> Result<Option<AgentProfile>, StoreError>;

    /// Lists agents, optionally restricted to a workspace.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_agents(&self, workspace: Option<&WorkspaceId>)
    -> Result<Vec<AgentProfile>, StoreError>;

    /// Persists a connector binding.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn save_binding(&self, binding: &ConnectorBinding) -> Result<(), StoreError>;

    /// Loads a connector binding by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn load_binding(&self, id: &BindingId) -> Result<Option<ConnectorBinding>, StoreError>;

    /// Lists bindings, optionally restricted to a workspace.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_bindings(
        &self,
        workspace: Option<&WorkspaceId>,
    ) -> Result<Vec<ConnectorBinding>, StoreError>;

    /// Loads a run by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn load_run(&self, id: &RunId) -> Result<Option<RunRecord>, StoreError>;

    /// Persists a run with optimistic concurrency.
    ///
    /// With `expected_revision` of `None` or `Some(0)` and no existing row,
    /// inserts at the run's revision (or 1). With a matching expected
    /// revision, updates and increments. Returns the new revision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RevisionConflict`] carrying both revisions when
    /// the check fails, and [`StoreError`] for storage faults.
    fn save_run(&self, run: &RunRecord, expected_revision: Option<u64>)
    -> Result<u64, StoreError>;

    /// Lists runs matching a filter, most recent first by `started_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_runs(&self, filter: &RunFilter) -> Result<Vec<RunRecord>, StoreError>;

    /// Loads an idempotency result by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn load_idempotency(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<IdempotencyResult>, StoreError>;

    /// Persists an idempotency result; the first write for a key wins.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn save_idempotency(&self, result: &IdempotencyResult) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Ledger Store
// ============================================================================

/// Ledger store errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Ledger I/O error.
    #[error("ledger io error: {0}")]
    Io(String),
    /// Ledger entry failed to (de)serialize.
    #[error("ledger serialization error: {0}")]
    Serialization(String),
    /// Page request is outside the accepted bounds.
    #[error("invalid ledger page: {0}")]
    InvalidPage(String),
}

/// Append-only dual ledger keyed by run.
///
/// Appends must be durable before the HTTP response returns, and appends for
/// one run must be serialized so insertion order equals observation order.
pub trait LedgerStore: Send + Sync {
    /// Appends an event, returning the entry with `persisted_at` stamped.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the append fails.
    fn append_event(&self, event: &EventRecord) -> Result<EventRecord, LedgerError>;

    /// Appends an audit entry, returning it with `persisted_at` stamped.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the append fails.
    fn append_audit(&self, audit: &AuditRecord) -> Result<AuditRecord, LedgerError>;

    /// Reads one page of the event stream in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the read fails.
    fn read_events(
        &self,
        run_id: &RunId,
        page: PageRequest,
    ) -> Result<LedgerPage<EventRecord>, LedgerError>;

    /// Reads one page of the audit stream in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the read fails.
    fn read_audit(
        &self,
        run_id: &RunId,
        page: PageRequest,
    ) -> Result<LedgerPage<AuditRecord>, LedgerError>;
}

// ============================================================================
// SECTION: Connector Adapter
// ============================================================================

/// Request handed to connector adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterRequest {
    /// Connector the request targets.
    pub connector_id: ConnectorId,
    /// Capability being exercised.
    pub capability: CapabilityName,
    /// Capability parameters.
    pub parameters: Value,
    /// Target surface and hints.
    pub target: IntentTarget,
    /// Workspace scope.
    pub workspace_id: WorkspaceId,
    /// Agent scope.
    pub agent_id: AgentId,
    /// Run scope.
    pub run_id: RunId,
    /// Idempotency key for mutations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<IdempotencyKey>,
}

/// Adapter faults surfaced to the guard.
///
/// Timeouts are raised by the guard's deadline, not by adapters themselves.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Adapter does not implement the requested capability.
    #[error("adapter capability error: {0}")]
    Capability(String),
    /// Adapter failed at runtime.
    #[error("adapter runtime error: {0}")]
    Runtime(String),
}

/// Connector adapter seam.
///
/// The core only assumes `simulate`/`invoke` returning an opaque payload or
/// a classified fault; concrete adapters live outside the control plane.
#[async_trait]
pub trait ConnectorAdapter: Send + Sync {
    /// Simulates the request without side effects.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when the adapter refuses or fails.
    async fn simulate(&self, request: &AdapterRequest) -> Result<Value, AdapterError>;

    /// Invokes the request against the connector.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when the adapter refuses or fails.
    async fn invoke(&self, request: &AdapterRequest) -> Result<Value, AdapterError>;
}

// ============================================================================
// SECTION: Profile Writer
// ============================================================================

/// Catalog write errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Catalog I/O error.
    #[error("policy catalog io error: {0}")]
    Io(String),
    /// Catalog entry failed to (de)serialize.
    #[error("policy catalog serialization error: {0}")]
    Serialization(String),
}

/// Writer for patched policy profile documents.
///
/// Implementations must replace the profile file atomically so readers never
/// observe a half-written document.
pub trait ProfileWriter: Send + Sync {
    /// Writes a profile document, returning the file path written.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the write fails.
    fn write_profile(&self, document: &ProfileDocument) -> Result<String, CatalogError>;
}

// ============================================================================
// SECTION: Patch History Store
// ============================================================================

/// Patch history journal errors.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Journal I/O error.
    #[error("patch history io error: {0}")]
    Io(String),
    /// Journal entry failed to (de)serialize.
    #[error("patch history serialization error: {0}")]
    Serialization(String),
}

/// Append-only journal of applied patches and rollbacks.
pub trait PatchHistoryStore: Send + Sync {
    /// Appends a history entry.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] when the append fails.
    fn append(&self, entry: &PatchHistoryEntry) -> Result<(), HistoryError>;

    /// Lists entries sorted by `applied_at` descending, optionally filtered
    /// by profile, honoring the page request.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] when the read fails.
    fn list(
        &self,
        profile: Option<&ProfileName>,
        page: PageRequest,
    ) -> Result<LedgerPage<PatchHistoryEntry>, HistoryError>;

    /// Finds an entry by patch id.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] when the read fails.
    fn find(&self, patch_id: &PatchId) -> Result<Option<PatchHistoryEntry>, HistoryError>;
}

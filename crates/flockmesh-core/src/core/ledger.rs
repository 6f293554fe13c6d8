// crates/flockmesh-core/src/core/ledger.rs
// ============================================================================
// Module: Dual Ledger Records
// Description: Append-only event and audit entries retained per run.
// Purpose: Preserve the tamper-evident trail replay and incident review read.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every run owns two append-only streams: events (what happened) and audit
//! (who decided what, with payload hashes). Entries are insertion-ordered per
//! run and carry both their creation timestamp and a `persisted_at` stamp set
//! by the ledger on write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::AuditId;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::EventId;
use crate::core::identifiers::RunId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Stream Vocabulary
// ============================================================================

/// Event names appended to the event stream.
pub mod event_name {
    /// Run accepted and persisted.
    pub const RUN_CREATED: &str = "run.created";
    /// Run transitioned to completed.
    pub const RUN_COMPLETED: &str = "run.completed";
    /// Run transitioned to failed.
    pub const RUN_FAILED: &str = "run.failed";
    /// Run cancelled by an operator.
    pub const RUN_CANCELLED: &str = "run.cancelled";
    /// Intent executed and produced a payload.
    pub const ACTION_EXECUTED: &str = "action.executed";
    /// Intent execution deduplicated by idempotency key.
    pub const ACTION_EXECUTED_DEDUPED: &str = "action.executed.deduped";
    /// Connector adapter invocation succeeded.
    pub const CONNECTOR_INVOKED: &str = "connector.invoked";
}

/// Audit event types appended to the audit stream.
pub mod audit_event {
    /// Run accepted and persisted.
    pub const RUN_CREATED: &str = "run.created";
    /// Run transitioned to completed.
    pub const RUN_COMPLETED: &str = "run.completed";
    /// Run transitioned to failed.
    pub const RUN_FAILED: &str = "run.failed";
    /// Run cancelled by an operator.
    pub const RUN_CANCELLED: &str = "run.cancelled";
    /// Intent planned for the run.
    pub const ACTION_PLANNED: &str = "action.planned";
    /// Policy engine produced a decision.
    pub const POLICY_EVALUATED: &str = "policy.evaluated";
    /// Escalation opened for an intent.
    pub const APPROVAL_REQUESTED: &str = "approval.requested";
    /// Escalation resolved by an approver.
    pub const APPROVAL_RESOLVED: &str = "approval.resolved";
    /// Intent executed (possibly deduplicated).
    pub const ACTION_EXECUTED: &str = "action.executed";
    /// Intent denied.
    pub const ACTION_DENIED: &str = "action.denied";
    /// Connector invoke admitted to the pipeline.
    pub const CONNECTOR_INVOKE_REQUESTED: &str = "connector.invoke.requested";
    /// Connector invoke blocked before the adapter ran.
    pub const CONNECTOR_INVOKE_BLOCKED: &str = "connector.invoke.blocked";
    /// Connector invoke rejected by the rate limiter.
    pub const CONNECTOR_INVOKE_RATE_LIMITED: &str = "connector.invoke.rate_limited";
    /// Connector invoke retry scheduled.
    pub const CONNECTOR_INVOKE_RETRY: &str = "connector.invoke.retry";
    /// Connector invoke timed out after retries.
    pub const CONNECTOR_INVOKE_TIMEOUT: &str = "connector.invoke.timeout";
    /// Connector invoke failed after retries.
    pub const CONNECTOR_INVOKE_ERROR: &str = "connector.invoke.error";
    /// Connector invoke executed through the adapter.
    pub const CONNECTOR_INVOKE_EXECUTED: &str = "connector.invoke.executed";
    /// Policy profile patched or rolled back.
    pub const POLICY_PROFILE_PATCHED: &str = "policy.profile.patched";
}

// ============================================================================
// SECTION: Event Records
// ============================================================================

/// Event-stream entry.
///
/// # Invariants
/// - Append-only; per-run ordering is insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event identifier (`evt_`).
    pub id: EventId,
    /// Owning run identifier.
    pub run_id: RunId,
    /// Dotted event name.
    pub name: String,
    /// Event payload.
    pub payload: Value,
    /// Creation timestamp.
    pub at: Timestamp,
    /// Ledger write timestamp, stamped on append.
    pub persisted_at: Timestamp,
}

// ============================================================================
// SECTION: Audit Records
// ============================================================================

/// Actor classification recorded on audit entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditActorKind {
    /// Human user (`usr_`).
    User,
    /// Internal service (`svc_`).
    Service,
    /// Autonomous agent (`agt_`).
    Agent,
    /// Control plane itself (`sys_`).
    System,
}

/// Actor block recorded on audit entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditActor {
    /// Actor classification.
    #[serde(rename = "type")]
    pub kind: AuditActorKind,
    /// Actor identifier.
    pub id: ActorId,
}

impl AuditActor {
    /// Classifies an actor id by its prefix; unknown prefixes count as system.
    #[must_use]
    pub fn from_actor_id(actor_id: ActorId) -> Self {
        let kind = match actor_id.as_str().split('_').next() {
            Some("usr") => AuditActorKind::User,
            Some("svc") => AuditActorKind::Service,
            Some("agt") => AuditActorKind::Agent,
            _ => AuditActorKind::System,
        };
        Self { kind, id: actor_id }
    }
}

/// Audit-stream entry.
///
/// # Invariants
/// - Append-only; per-run ordering is insertion order.
/// - `payload_hash` commits to the payload the audit entry describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Audit identifier (`aud_`).
    pub id: AuditId,
    /// Owning run identifier.
    pub run_id: RunId,
    /// Dotted audit event type.
    pub event_type: String,
    /// Acting principal.
    pub actor: AuditActor,
    /// Canonical hash of the described payload.
    pub payload_hash: HashDigest,
    /// Referenced policy decision, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_ref: Option<DecisionId>,
    /// Structured detail flags (for example `deduped`, retry attempts).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
    /// Occurrence timestamp.
    pub occurred_at: Timestamp,
    /// Ledger write timestamp, stamped on append.
    pub persisted_at: Timestamp,
}

// ============================================================================
// SECTION: Pagination
// ============================================================================

/// Lower bound for ledger page sizes.
pub const LEDGER_PAGE_MIN: u32 = 1;
/// Upper bound for ledger page sizes.
pub const LEDGER_PAGE_MAX: u32 = 500;

/// Page request for ledger reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Maximum entries to return (clamped to `1..=500` at the boundary).
    pub limit: u32,
    /// Entries to skip from the start of the stream.
    pub offset: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// One page of ledger entries with the stream total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPage<T> {
    /// Entries in insertion order.
    pub items: Vec<T>,
    /// Total entries in the stream.
    pub total: u64,
    /// Offset the page started at.
    pub offset: u64,
}

impl<T> LedgerPage<T> {
    /// Returns true when entries beyond this page exist.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.offset + u64::try_from(self.items.len()).unwrap_or(u64::MAX) < self.total
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

    /// Tests actor classification by prefix.
    #[test]
    fn test_audit_actor_classification() {
        assert_eq!(
            AuditActor::from_actor_id(ActorId::new("usr_alice_01")).kind,
            AuditActorKind::User
        );
        assert_eq!(
            AuditActor::from_actor_id(ActorId::new("svc_scheduler")).kind,
            AuditActorKind::Service
        );
        assert_eq!(
            AuditActor::from_actor_id(ActorId::new("agt_ops_bot")).kind,
            AuditActorKind::Agent
        );
        assert_eq!(
            AuditActor::from_actor_id(ActorId::new("sys_core")).kind,
            AuditActorKind::System
        );
    }

    /// Tests page truncation arithmetic.
    #[test]
    fn test_page_truncation() {
        let page = LedgerPage {
            items: vec![1, 2, 3],
            total: 5,
            offset: 0,
        };
        assert!(page.truncated());
        let page = LedgerPage {
            items: vec![4, 5],
            total: 5,
            offset: 3,
        };
        assert!(!page.truncated());
    }
}

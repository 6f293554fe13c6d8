// crates/flockmesh-core/src/runtime/recorder.rs
// ============================================================================
// Module: Ledger Recorder
// Description: Convenience layer for appending event and audit entries.
// Purpose: Keep entry minting and payload hashing uniform across the runtime.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The recorder mints entry identifiers, hashes audit payloads canonically,
//! and forwards appends to the configured ledger store. Handler code emits
//! through this one surface so stream ordering mirrors handler order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;

use crate::core::ActorId;
use crate::core::AuditActor;
use crate::core::AuditId;
use crate::core::AuditRecord;
use crate::core::DecisionId;
use crate::core::EventId;
use crate::core::EventRecord;
use crate::core::RunId;
use crate::core::Timestamp;
use crate::core::hash_canonical_json;
use crate::core::hashing::HashDigest;
use crate::interfaces::LedgerError;
use crate::interfaces::LedgerStore;
use crate::runtime::ids::mint_id;

// ============================================================================
// SECTION: Recorder
// ============================================================================

/// Append-side wrapper over the ledger store.
#[derive(Clone)]
pub struct Recorder {
    /// Ledger store receiving appends.
    ledger: Arc<dyn LedgerStore>,
}

impl Recorder {
    /// Creates a recorder over a ledger store.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Returns the underlying ledger store.
    #[must_use]
    pub fn ledger(&self) -> Arc<dyn LedgerStore> {
        Arc::clone(&self.ledger)
    }

    /// Appends an event entry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the append fails.
    pub fn event(
        &self,
        run_id: &RunId,
        name: &str,
        payload: Value,
        at: Timestamp,
    ) -> Result<EventRecord, LedgerError> {
        let record = EventRecord {
            id: EventId::new(mint_id("evt_")),
            run_id: run_id.clone(),
            name: name.to_string(),
            payload,
            at,
            persisted_at: at,
        };
        self.ledger.append_event(&record)
    }

    /// Appends an audit entry, hashing the payload canonically.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when hashing or the append fails.
    #[allow(clippy::too_many_arguments, reason = "Audit entries carry this many fields.")]
    pub fn audit(
        &self,
        run_id: &RunId,
        event_type: &str,
        actor: ActorId,
        payload: &Value,
        decision_ref: Option<DecisionId>,
        details: Value,
        at: Timestamp,
    ) -> Result<AuditRecord, LedgerError> {
        let payload_hash = hash_canonical_json(payload)
            .map_err(|err| LedgerError::Serialization(err.to_string()))?;
        self.audit_with_hash(run_id, event_type, actor, payload_hash, decision_ref, details, at)
    }

    /// Appends an audit entry with a precomputed payload hash.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the append fails.
    #[allow(clippy::too_many_arguments, reason = "Audit entries carry this many fields.")]
    pub fn audit_with_hash(
        &self,
        run_id: &RunId,
        event_type: &str,
        actor: ActorId,
        payload_hash: HashDigest,
        decision_ref: Option<DecisionId>,
        details: Value,
        at: Timestamp,
    ) -> Result<AuditRecord, LedgerError> {
        let record = AuditRecord {
            id: AuditId::new(mint_id("aud_")),
            run_id: run_id.clone(),
            event_type: event_type.to_string(),
            actor: AuditActor::from_actor_id(actor),
            payload_hash,
            decision_ref,
            details,
            occurred_at: at,
            persisted_at: at,
        };
        self.ledger.append_audit(&record)
    }
}

// crates/flockmesh-core/src/lib.rs
// ============================================================================
// Module: Flockmesh Core
// Description: Control plane for agent-initiated actions.
// Purpose: Decide, record, and gate every side-effecting action an agent proposes.
// Dependencies: serde, serde_jcs, sha2, hmac, subtle, thiserror, time, tokio
// ============================================================================

//! ## Overview
//! `flockmesh-core` is the canonical execution path of the Flockmesh control
//! plane. It evaluates action intents against a layered policy lattice with
//! fail-closed semantics, drives the revision-guarded run lifecycle, guards
//! connector invocations, patches the policy catalog under document-hash CAS,
//! and derives integrity views from the dual ledger. Storage backends, ledger
//! files, and connector adapters plug in through the [`interfaces`] seams.

/// Canonical data model.
pub mod core;
/// Backend-agnostic interface seams.
pub mod interfaces;
/// Policy lattice evaluation.
pub mod policy;
/// Control-plane runtime.
pub mod runtime;

pub use crate::core::*;
pub use interfaces::AdapterError;
pub use interfaces::AdapterRequest;
pub use interfaces::CatalogError;
pub use interfaces::ConnectorAdapter;
pub use interfaces::HistoryError;
pub use interfaces::IdempotencyResult;
pub use interfaces::LedgerError;
pub use interfaces::LedgerStore;
pub use interfaces::PatchHistoryStore;
pub use interfaces::ProfileWriter;
pub use interfaces::RunFilter;
pub use interfaces::StateStore;
pub use interfaces::StoreError;

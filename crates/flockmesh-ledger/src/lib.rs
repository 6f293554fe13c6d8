// crates/flockmesh-ledger/src/lib.rs
// ============================================================================
// Module: Flockmesh File Ledger
// Description: JSONL-backed dual ledger and policy patch history journal.
// Purpose: Persist append-only streams durably before responses return.
// Dependencies: flockmesh-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Each run owns two JSONL files, `events/<run>.jsonl` and
//! `audit/<run>.jsonl`, under the ledger root. Appends take a per-run lock so
//! insertion order equals observation order, and every append flushes and
//! syncs before returning. The policy patch history journal is one shared
//! JSONL file with the same durability contract.

/// File-backed ledger store.
pub mod store;

pub use store::FileLedgerStore;
pub use store::JsonlHistoryStore;

// crates/flockmesh-store-sqlite/src/lib.rs
// ============================================================================
// Module: Flockmesh SQLite Store
// Description: Durable StateStore backed by SQLite WAL.
// Purpose: Persist agents, bindings, runs, and idempotency results.
// Dependencies: flockmesh-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! Each table stores the full record as a JSON payload column next to the
//! indexed scalar columns the queries filter on. Run writes are transactional
//! compare-and-set on the `revision` column; a mismatched expectation raises
//! a revision conflict carrying both revisions.

/// SQLite-backed state store.
pub mod store;

pub use store::SqliteStateStore;
pub use store::SqliteStoreConfig;

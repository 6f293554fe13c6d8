// crates/flockmesh-core/src/runtime/idempotency.rs
// ============================================================================
// Module: Idempotency Cache
// Description: Two-layer at-most-once execution cache.
// Purpose: Bind each idempotency key to the first payload it produced.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Keys are consulted in-memory first, then in the durable store; the first
//! producer wins and every later caller with the same key observes the
//! identical payload. Both layers are written on the produce path so the
//! contract survives process restarts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;

use crate::core::IdempotencyKey;
use crate::core::RunId;
use crate::core::Timestamp;
use crate::interfaces::IdempotencyResult;
use crate::interfaces::StateStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Outcome of an idempotent execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotentOutcome {
    /// Payload bound to the key.
    pub payload: Value,
    /// True when the payload was served from a previous execution.
    pub deduped: bool,
}

/// Two-layer idempotency cache over the state store.
#[derive(Clone)]
pub struct IdempotencyCache {
    /// Fast in-process layer.
    memory: Arc<Mutex<HashMap<IdempotencyKey, Value>>>,
    /// Durable layer.
    store: Arc<dyn StateStore>,
}

impl IdempotencyCache {
    /// Creates a cache over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            memory: Arc::new(Mutex::new(HashMap::new())),
            store,
        }
    }

    /// Executes `produce` at most once for the key.
    ///
    /// Consults the in-memory map, then the durable store (backfilling the
    /// map), and only then produces; new payloads are written through to both
    /// layers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the durable layer fails.
    pub fn execute(
        &self,
        key: &IdempotencyKey,
        run_id: &RunId,
        now: Timestamp,
        produce: impl FnOnce() -> Value,
    ) -> Result<IdempotentOutcome, StoreError> {
        if let Some(payload) = self.lookup_memory(key) {
            return Ok(IdempotentOutcome {
                payload,
                deduped: true,
            });
        }
        if let Some(result) = self.store.load_idempotency(key)? {
            self.fill_memory(key, &result.payload);
            return Ok(IdempotentOutcome {
                payload: result.payload,
                deduped: true,
            });
        }
        let payload = produce();
        self.store.save_idempotency(&IdempotencyResult {
            key: key.clone(),
            run_id: run_id.clone(),
            payload: payload.clone(),
            created_at: now,
        })?;
        self.fill_memory(key, &payload);
        Ok(IdempotentOutcome {
            payload,
            deduped: false,
        })
    }

    /// Looks up a key without producing, consulting both layers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the durable layer fails.
    pub fn lookup(&self, key: &IdempotencyKey) -> Result<Option<Value>, StoreError> {
        if let Some(payload) = self.lookup_memory(key) {
            return Ok(Some(payload));
        }
        if let Some(result) = self.store.load_idempotency(key)? {
            self.fill_memory(key, &result.payload);
            return Ok(Some(result.payload));
        }
        Ok(None)
    }

    /// Records a produced payload under the key in both layers.
    ///
    /// The durable layer keeps the first write for a key; the recorded or
    /// previously-stored payload is whichever won.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the durable layer fails.
    pub fn record(
        &self,
        key: &IdempotencyKey,
        run_id: &RunId,
        payload: &Value,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        self.store.save_idempotency(&IdempotencyResult {
            key: key.clone(),
            run_id: run_id.clone(),
            payload: payload.clone(),
            created_at: now,
        })?;
        self.fill_memory(key, payload);
        Ok(())
    }

    /// Reads the in-memory layer.
    fn lookup_memory(&self, key: &IdempotencyKey) -> Option<Value> {
        self.memory.lock().ok().and_then(|guard| guard.get(key).cloned())
    }

    /// Backfills the in-memory layer.
    fn fill_memory(&self, key: &IdempotencyKey, payload: &Value) {
        if let Ok(mut guard) = self.memory.lock() {
            guard.entry(key.clone()).or_insert_with(|| payload.clone());
        }
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

    use serde_json::json;

    use super::*;
    use crate::runtime::store::InMemoryStateStore;

    /// Tests that the first producer wins and later callers dedupe.
    #[test]
    fn test_first_producer_wins() {
        let store = Arc::new(InMemoryStateStore::new());
        let cache = IdempotencyCache::new(store);
        let key = IdempotencyKey::new("idem_run1_step1");
        let run = RunId::new("run_1");
        let now = Timestamp::parse("2026-03-01T00:00:00Z").unwrap();

        let first = cache.execute(&key, &run, now, || json!({"n": 1})).unwrap();
        assert!(!first.deduped);
        let second = cache.execute(&key, &run, now, || json!({"n": 2})).unwrap();
        assert!(second.deduped);
        assert_eq!(second.payload, json!({"n": 1}));
    }

    /// Tests that the durable layer serves hits across cache instances.
    #[test]
    fn test_durable_layer_survives_new_cache() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let key = IdempotencyKey::new("idem_run1_step1");
        let run = RunId::new("run_1");
        let now = Timestamp::parse("2026-03-01T00:00:00Z").unwrap();

        let cache = IdempotencyCache::new(Arc::clone(&store));
        cache.execute(&key, &run, now, || json!({"n": 1})).unwrap();

        let fresh = IdempotencyCache::new(store);
        let outcome = fresh.execute(&key, &run, now, || json!({"n": 2})).unwrap();
        assert!(outcome.deduped);
        assert_eq!(outcome.payload, json!({"n": 1}));
    }
}

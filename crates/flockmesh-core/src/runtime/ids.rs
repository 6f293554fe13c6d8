// crates/flockmesh-core/src/runtime/ids.rs
// ============================================================================
// Module: Identifier Minting
// Description: Opaque identifier generation for runtime records.
// Purpose: Mint prefixed identifiers and planned idempotency keys.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! Runtime records mint prefixed opaque identifiers with random lowercase hex
//! suffixes. Planned idempotency keys are derived deterministically from the
//! run and step so replanning cannot double-execute a mutation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand::Rng;

use crate::core::IdempotencyKey;
use crate::core::RunId;
use crate::core::StepId;

// ============================================================================
// SECTION: Minting
// ============================================================================

/// Suffix length for minted identifiers.
const MINT_SUFFIX_LEN: usize = 16;

/// Mints a prefixed identifier with a random lowercase hex suffix.
#[must_use]
pub fn mint_id(prefix: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(prefix.len() + MINT_SUFFIX_LEN);
    out.push_str(prefix);
    for _ in 0..MINT_SUFFIX_LEN {
        let nibble: usize = rng.gen_range(0..16);
        out.push(HEX[nibble] as char);
    }
    out
}

/// Derives the idempotency key for a planned mutation step.
///
/// Deterministic per `(run, step)` so the same planned step maps to the same
/// key across retries within the run.
#[must_use]
pub fn planned_idempotency_key(run_id: &RunId, step_id: &StepId) -> IdempotencyKey {
    let run_suffix = run_id.as_str().strip_prefix("run_").unwrap_or(run_id.as_str());
    IdempotencyKey::new(format!("idem_{run_suffix}_{}", step_id.as_str()))
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

    /// Tests minted identifier shape and uniqueness.
    #[test]
    fn test_mint_id_shape() {
        let id = mint_id("evt_");
        assert!(id.starts_with("evt_"));
        assert_eq!(id.len(), 4 + MINT_SUFFIX_LEN);
        assert_ne!(mint_id("evt_"), mint_id("evt_"));
    }

    /// Tests deterministic planned idempotency keys.
    #[test]
    fn test_planned_key_is_deterministic() {
        let run = RunId::new("run_abc123");
        let step = StepId::new("send_weekly_summary");
        let first = planned_idempotency_key(&run, &step);
        let second = planned_idempotency_key(&run, &step);
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "idem_abc123_send_weekly_summary");
    }
}

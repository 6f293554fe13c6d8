// crates/flockmesh-core/src/runtime/retry.rs
// ============================================================================
// Module: Adapter Retry Policy
// Description: Bounded exponential backoff with jitter and an idempotency gate.
// Purpose: Retry transient adapter faults without breaking at-most-once writes.
// Dependencies: rand, serde
// ============================================================================

//! ## Overview
//! Adapter faults classify as timeout or error; both are retryable while
//! attempts remain. Mutations are retried only when they carry an idempotency
//! key of at least eight characters, preserving the store's at-most-once
//! contract. Delays grow exponentially from the base, capped at the maximum,
//! plus uniform jitter.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

use crate::core::IdempotencyKey;
use crate::core::SideEffect;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Minimum idempotency key length accepted by the retry gate.
const MIN_RETRY_KEY_LEN: usize = 8;
/// Attempt bounds accepted by [`RetryPolicy::clamped`].
const MAX_POLICY_ATTEMPTS: u32 = 5;

/// Retry policy for adapter invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts including the first (`1..=5`).
    pub max_attempts: u32,
    /// Base delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on the exponential delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Uniform jitter added to every delay, in milliseconds.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
            jitter_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Returns the policy with `max_attempts` clamped into `1..=5`.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            max_attempts: self.max_attempts.clamp(1, MAX_POLICY_ATTEMPTS),
            ..self
        }
    }

    /// Computes the backoff delay before the retry following `attempt`
    /// (1-based), including jitter.
    #[must_use]
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(32);
        let exponential = self
            .base_delay_ms
            .saturating_mul(1_u64.checked_shl(exponent).unwrap_or(u64::MAX));
        let bounded = exponential.min(self.max_delay_ms);
        if self.jitter_ms == 0 {
            bounded
        } else {
            bounded.saturating_add(rand::thread_rng().gen_range(0..=self.jitter_ms))
        }
    }
}

// ============================================================================
// SECTION: Fault Classification
// ============================================================================

/// Classified adapter fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterFault {
    /// Deadline exceeded.
    Timeout,
    /// Runtime failure.
    Error,
}

impl AdapterFault {
    /// Returns the dotted reason/audit code for the fault.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Timeout => "connector.invoke.timeout",
            Self::Error => "connector.invoke.error",
        }
    }
}

// ============================================================================
// SECTION: Retry Gate
// ============================================================================

/// Returns true when another attempt may run after a classified fault.
///
/// All of the following must hold: attempts remain, and mutations carry an
/// idempotency key of at least eight characters.
#[must_use]
pub fn should_retry(
    policy: &RetryPolicy,
    attempt: u32,
    side_effect: SideEffect,
    idempotency_key: Option<&IdempotencyKey>,
) -> bool {
    if attempt >= policy.max_attempts {
        return false;
    }
    if side_effect.is_mutation() {
        return idempotency_key.is_some_and(|key| key.as_str().len() >= MIN_RETRY_KEY_LEN);
    }
    true
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

    /// Tests exponential growth with cap.
    #[test]
    fn test_delay_growth_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 350,
            jitter_ms: 0,
        };
        assert_eq!(policy.delay_ms(1), 100);
        assert_eq!(policy.delay_ms(2), 200);
        assert_eq!(policy.delay_ms(3), 350);
        assert_eq!(policy.delay_ms(4), 350);
    }

    /// Tests that jitter stays within its bound.
    #[test]
    fn test_jitter_bound() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 100,
            max_delay_ms: 100,
            jitter_ms: 50,
        };
        for _ in 0..32 {
            let delay = policy.delay_ms(1);
            assert!((100..=150).contains(&delay));
        }
    }

    /// Tests the mutation/idempotency retry gate.
    #[test]
    fn test_retry_gate() {
        let policy = RetryPolicy::default();
        let key = IdempotencyKey::new("idem_run1_step1");
        let short = IdempotencyKey::new("idem_");

        assert!(should_retry(&policy, 1, SideEffect::None, None));
        assert!(should_retry(&policy, 1, SideEffect::Mutation, Some(&key)));
        assert!(!should_retry(&policy, 1, SideEffect::Mutation, None));
        assert!(!should_retry(&policy, 1, SideEffect::Mutation, Some(&short)));
        assert!(!should_retry(&policy, 3, SideEffect::None, None));
    }

    /// Tests attempt clamping.
    #[test]
    fn test_policy_clamping() {
        let policy = RetryPolicy {
            max_attempts: 9,
            ..RetryPolicy::default()
        }
        .clamped();
        assert_eq!(policy.max_attempts, 5);
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        }
        .clamped();
        assert_eq!(policy.max_attempts, 1);
    }
}

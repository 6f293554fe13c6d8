// crates/flockmesh-core/src/runtime/rate_limit.rs
// ============================================================================
// Module: Connector Rate Limiter
// Description: Sliding-window rate limiter keyed by workspace and connector.
// Purpose: Bound invoke throughput per tenant with an honest retry hint.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The limiter keeps one sliding window of request timestamps per
//! `(workspace, connector)` bucket. A request is denied once the window holds
//! `limit` entries; the retry hint is the time until the oldest entry leaves
//! the window, lower-bounded at one millisecond. Timestamps are supplied by
//! the caller so behavior stays deterministic under test.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;

use crate::core::ConnectorId;
use crate::core::Timestamp;
use crate::core::WorkspaceId;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Rate limit policy for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum requests per window.
    pub limit: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            limit: 30,
            window_ms: 60_000,
        }
    }
}

/// Rate limit configuration with per-connector overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Default policy for connectors without an override.
    #[serde(default)]
    pub default: RateLimitPolicy,
    /// Per-connector policies.
    #[serde(default)]
    pub per_connector: BTreeMap<String, RateLimitPolicy>,
}

impl RateLimitConfig {
    /// Returns the policy for a connector.
    #[must_use]
    pub fn policy_for(&self, connector_id: &ConnectorId) -> RateLimitPolicy {
        self.per_connector.get(connector_id.as_str()).copied().unwrap_or(self.default)
    }
}

// ============================================================================
// SECTION: Limiter
// ============================================================================

/// Decision returned by the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Request admitted and recorded.
    Allow,
    /// Request denied with a retry hint.
    Limited {
        /// Milliseconds until capacity frees up (at least 1).
        retry_after_ms: u64,
    },
}

/// Sliding-window rate limiter with in-memory buckets.
pub struct SlidingWindowLimiter {
    /// Rate limit configuration.
    config: RateLimitConfig,
    /// Request timestamps per bucket key.
    buckets: Mutex<HashMap<String, VecDeque<Timestamp>>>,
}

impl SlidingWindowLimiter {
    /// Creates a limiter from configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Checks the bucket for a workspace/connector pair at the given time.
    ///
    /// Denied requests are not recorded; admitted requests are.
    pub fn check(
        &self,
        workspace_id: &WorkspaceId,
        connector_id: &ConnectorId,
        now: Timestamp,
    ) -> RateLimitDecision {
        let policy = self.config.policy_for(connector_id);
        let key = format!("{}:{}", workspace_id.as_str(), connector_id.as_str());
        let Ok(mut buckets) = self.buckets.lock() else {
            // A poisoned limiter fails closed with a full-window hint.
            return RateLimitDecision::Limited {
                retry_after_ms: policy.window_ms.max(1),
            };
        };
        let window = buckets.entry(key).or_default();
        while let Some(oldest) = window.front() {
            if now.millis_since(*oldest) >= policy.window_ms {
                window.pop_front();
            } else {
                break;
            }
        }
        if u32::try_from(window.len()).unwrap_or(u32::MAX) >= policy.limit {
            let retry_after_ms = window.front().map_or(1, |oldest| {
                policy.window_ms.saturating_sub(now.millis_since(*oldest)).max(1)
            });
            return RateLimitDecision::Limited { retry_after_ms };
        }
        window.push_back(now);
        RateLimitDecision::Allow
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

    /// Builds a limiter with a one-per-minute connector policy.
    fn one_per_minute() -> SlidingWindowLimiter {
        let mut per_connector = BTreeMap::new();
        per_connector.insert(
            "con_mcp_gateway".to_string(),
            RateLimitPolicy {
                limit: 1,
                window_ms: 60_000,
            },
        );
        SlidingWindowLimiter::new(RateLimitConfig {
            default: RateLimitPolicy::default(),
            per_connector,
        })
    }

    /// Tests that the second request inside the window is limited.
    #[test]
    fn test_second_request_limited() {
        let limiter = one_per_minute();
        let workspace = WorkspaceId::new("wsp_mindverse_cn");
        let connector = ConnectorId::new("con_mcp_gateway");
        let now = Timestamp::parse("2026-03-01T00:00:00Z").unwrap();

        assert_eq!(limiter.check(&workspace, &connector, now), RateLimitDecision::Allow);
        match limiter.check(&workspace, &connector, now.plus_millis(10)) {
            RateLimitDecision::Limited { retry_after_ms } => {
                assert!(retry_after_ms >= 1);
                assert!(retry_after_ms <= 60_000);
            }
            RateLimitDecision::Allow => panic!("expected Limited"),
        }
    }

    /// Tests that capacity frees once the oldest entry leaves the window.
    #[test]
    fn test_window_slides() {
        let limiter = one_per_minute();
        let workspace = WorkspaceId::new("wsp_mindverse_cn");
        let connector = ConnectorId::new("con_mcp_gateway");
        let now = Timestamp::parse("2026-03-01T00:00:00Z").unwrap();

        assert_eq!(limiter.check(&workspace, &connector, now), RateLimitDecision::Allow);
        assert_eq!(
            limiter.check(&workspace, &connector, now.plus_millis(60_001)),
            RateLimitDecision::Allow
        );
    }

    /// Tests that buckets are isolated per workspace.
    #[test]
    fn test_buckets_are_per_workspace() {
        let limiter = one_per_minute();
        let connector = ConnectorId::new("con_mcp_gateway");
        let now = Timestamp::parse("2026-03-01T00:00:00Z").unwrap();

        assert_eq!(
            limiter.check(&WorkspaceId::new("wsp_alpha"), &connector, now),
            RateLimitDecision::Allow
        );
        assert_eq!(
            limiter.check(&WorkspaceId::new("wsp_beta"), &connector, now),
            RateLimitDecision::Allow
        );
    }
}

// crates/flockmesh-core/src/runtime/mod.rs
// ============================================================================
// Module: Flockmesh Runtime
// Description: Run lifecycle, connector guard, patches, and integrity views.
// Purpose: Group the control-plane execution paths over the interface seams.
// Dependencies: crate::core, crate::interfaces, crate::policy
// ============================================================================

//! ## Overview
//! The runtime owns the execution paths of the control plane: the run
//! lifecycle engine, the connector invocation guard with its limiter and
//! retry policy, the policy patch pipeline, and the integrity views. All of
//! them reach storage and ledgers through the interface seams only.

/// MCP tool allowlist.
pub mod allowlist;
/// Run lifecycle engine.
pub mod engine;
/// Connector invocation guard.
pub mod guard;
/// Two-layer idempotency cache.
pub mod idempotency;
/// Identifier minting.
pub mod ids;
/// Integrity views and signed exports.
pub mod integrity;
/// Policy patch pipeline.
pub mod patch;
/// Sliding-window rate limiter.
pub mod rate_limit;
/// Ledger recorder.
pub mod recorder;
/// Adapter retry policy.
pub mod retry;
/// In-memory store implementations.
pub mod store;

pub use allowlist::AllowlistVerdict;
pub use allowlist::McpAllowRule;
pub use allowlist::McpAllowlist;
pub use allowlist::McpInvokeScope;
pub use engine::ApprovalOutcome;
pub use engine::ApprovalRequest;
pub use engine::CancelRequest;
pub use engine::CreateRunRequest;
pub use engine::EngineError;
pub use engine::LatticeFallbacks;
pub use engine::RequestedProfiles;
pub use engine::ResolutionState;
pub use engine::RunEngine;
pub use guard::ConnectorGuard;
pub use guard::GuardError;
pub use guard::InvokeRequest;
pub use guard::InvokeSuccess;
pub use guard::SimulateSuccess;
pub use idempotency::IdempotencyCache;
pub use idempotency::IdempotentOutcome;
pub use ids::mint_id;
pub use ids::planned_idempotency_key;
pub use integrity::DriftQuery;
pub use integrity::DriftRunSummary;
pub use integrity::DriftSummary;
pub use integrity::IncidentEnvelope;
pub use integrity::IntegrityError;
pub use integrity::IntegrityViews;
pub use integrity::PatchHistoryEnvelope;
pub use integrity::ReplayEnvelope;
pub use integrity::ReplayIntegrity;
pub use integrity::ReplayState;
pub use integrity::SignedExport;
pub use integrity::TimelineDiff;
pub use integrity::TimelineDiffRow;
pub use integrity::derive_replay_integrity;
pub use integrity::replay_issue;
pub use patch::PatchError;
pub use patch::PatchMode;
pub use patch::PatchPipeline;
pub use patch::PatchRequest;
pub use patch::PatchResponse;
pub use patch::PolicyAdminConfig;
pub use patch::RollbackRequest;
pub use patch::RollbackTarget;
pub use patch::normalize_rules;
pub use rate_limit::RateLimitConfig;
pub use rate_limit::RateLimitDecision;
pub use rate_limit::RateLimitPolicy;
pub use rate_limit::SlidingWindowLimiter;
pub use recorder::Recorder;
pub use retry::AdapterFault;
pub use retry::RetryPolicy;
pub use retry::should_retry;
pub use store::InMemoryHistoryStore;
pub use store::InMemoryLedgerStore;
pub use store::InMemoryStateStore;
pub use store::check_revision;

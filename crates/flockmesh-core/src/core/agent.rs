// crates/flockmesh-core/src/core/agent.rs
// ============================================================================
// Module: Agent Profiles
// Description: Agent profile records owned by the state store.
// Purpose: Describe the autonomous agents whose actions the control plane gates.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Agent profiles are created by the boundary and persisted in the state
//! store. `id` and `workspace_id` are immutable after creation; the default
//! policy profile participates in policy-lattice resolution for runs that do
//! not request one explicitly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ActorId;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::ProfileName;
use crate::core::identifiers::WorkspaceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Agent Status
// ============================================================================

/// Lifecycle status of an agent profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Agent may start runs and invoke connectors.
    Active,
    /// Agent is suspended; new runs are rejected at the boundary.
    Suspended,
    /// Agent is retired and kept for audit history only.
    Retired,
}

// ============================================================================
// SECTION: Agent Profile
// ============================================================================

/// Agent profile record.
///
/// # Invariants
/// - `id` and `workspace_id` are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Agent identifier (`agt_`).
    pub id: AgentId,
    /// Owning workspace identifier (`wsp_`).
    pub workspace_id: WorkspaceId,
    /// Role label for the agent (for example `ops_assistant`).
    pub role: String,
    /// Actor ids that own this agent.
    pub owners: Vec<ActorId>,
    /// Human-readable agent name.
    pub name: String,
    /// Opaque model policy payload; not interpreted by the core.
    pub model_policy: Value,
    /// Default policy profile used when a run requests none.
    pub default_policy_profile: ProfileName,
    /// Lifecycle status.
    pub status: AgentStatus,
    /// Opaque metadata payload.
    pub metadata: Value,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
}

impl AgentProfile {
    /// Returns true when the agent may start runs.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, AgentStatus::Active)
    }
}

// crates/flockmesh-core/src/core/binding.rs
// ============================================================================
// Module: Connector Bindings
// Description: Typed attachments of connectors to workspaces and agents.
// Purpose: Carry the scopes and secret handle a run may exercise on a connector.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A binding attaches a connector to a workspace (and optionally a single
//! agent) with an explicit capability scope set and an opaque secret handle.
//! The guard refuses any invoke whose run workspace or agent does not match
//! the binding exactly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::BindingId;
use crate::core::identifiers::CapabilityName;
use crate::core::identifiers::ConnectorId;
use crate::core::identifiers::WorkspaceId;

// ============================================================================
// SECTION: Risk Profile
// ============================================================================

/// Risk posture assigned to a binding at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingRiskProfile {
    /// Standard controls.
    Standard,
    /// Restricted controls for sensitive connectors.
    Restricted,
    /// High-control posture requiring the strictest policy handling.
    HighControl,
}

// ============================================================================
// SECTION: Binding Status
// ============================================================================

/// Lifecycle status of a connector binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingStatus {
    /// Binding may be used by invokes.
    Active,
    /// Binding is disabled; invokes are refused.
    Disabled,
    /// Binding secret was revoked; invokes are refused.
    Revoked,
}

// ============================================================================
// SECTION: Connector Binding
// ============================================================================

/// Connector binding record.
///
/// # Invariants
/// - A binding may be used only by runs whose workspace and (when
///   `agent_id` is set) agent match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorBinding {
    /// Binding identifier (`cnb_`).
    pub id: BindingId,
    /// Owning workspace identifier.
    pub workspace_id: WorkspaceId,
    /// Optional agent restriction.
    pub agent_id: Option<AgentId>,
    /// Connector identifier (`con_`).
    pub connector_id: ConnectorId,
    /// Capability names the binding grants.
    pub scopes: BTreeSet<CapabilityName>,
    /// Opaque secret handle (`sec_`); never a raw credential.
    pub auth_ref: String,
    /// Risk posture for the binding.
    pub risk_profile: BindingRiskProfile,
    /// Lifecycle status.
    pub status: BindingStatus,
}

impl ConnectorBinding {
    /// Returns true when the binding may be exercised.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, BindingStatus::Active)
    }

    /// Returns true when the binding grants the capability.
    #[must_use]
    pub fn grants(&self, capability: &CapabilityName) -> bool {
        self.scopes.contains(capability)
    }
}

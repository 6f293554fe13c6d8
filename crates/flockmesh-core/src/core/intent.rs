// crates/flockmesh-core/src/core/intent.rs
// ============================================================================
// Module: Action Intents
// Description: Planned side-effecting operations proposed by agents.
// Purpose: Provide the unit of evaluation for the policy engine.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An action intent is one planned operation inside a run: a capability, a
//! side-effect class, a declared risk hint, and an optional idempotency key.
//! Mutating intents must carry an idempotency key or the policy engine denies
//! them fail-closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ActionIntentId;
use crate::core::identifiers::BindingId;
use crate::core::identifiers::CapabilityName;
use crate::core::identifiers::IdempotencyKey;
use crate::core::identifiers::RunId;
use crate::core::identifiers::StepId;

// ============================================================================
// SECTION: Side Effects
// ============================================================================

/// Side-effect class declared by an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// Read-only operation.
    None,
    /// State-changing operation; requires an idempotency key.
    Mutation,
}

impl SideEffect {
    /// Returns true for mutating intents.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        matches!(self, Self::Mutation)
    }
}

// ============================================================================
// SECTION: Risk Tiers
// ============================================================================

/// Recognized risk tiers driving the baseline policy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    /// Read-only blast radius.
    R0,
    /// Low-impact writes.
    R1,
    /// Requires a single approval.
    R2,
    /// Requires dual approval.
    R3,
}

/// Declared risk hint as carried on the wire.
///
/// # Invariants
/// - Opaque on the wire; [`RiskHint::tier`] returns `None` for values outside
///   `R0..=R3`, which the policy engine treats as a fail-closed deny.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskHint(String);

impl RiskHint {
    /// Creates a risk hint from a wire value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the hint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolves the hint into a recognized tier, when possible.
    #[must_use]
    pub fn tier(&self) -> Option<RiskTier> {
        match self.0.as_str() {
            "R0" => Some(RiskTier::R0),
            "R1" => Some(RiskTier::R1),
            "R2" => Some(RiskTier::R2),
            "R3" => Some(RiskTier::R3),
            _ => None,
        }
    }
}

impl fmt::Display for RiskHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<RiskTier> for RiskHint {
    fn from(tier: RiskTier) -> Self {
        match tier {
            RiskTier::R0 => Self::new("R0"),
            RiskTier::R1 => Self::new("R1"),
            RiskTier::R2 => Self::new("R2"),
            RiskTier::R3 => Self::new("R3"),
        }
    }
}

// ============================================================================
// SECTION: Intent Target
// ============================================================================

/// Target surface addressed by an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentTarget {
    /// Surface label (for example `chat.channel`).
    pub surface: String,
    /// Connector-specific addressing hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_hints: Option<Value>,
}

// ============================================================================
// SECTION: Action Intent
// ============================================================================

/// Planned side-effecting operation an agent proposes.
///
/// # Invariants
/// - `side_effect = mutation` requires `idempotency_key` (enforced by the
///   policy engine as a fail-closed deny, not by this type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionIntent {
    /// Intent identifier (`act_`).
    pub id: ActionIntentId,
    /// Owning run identifier.
    pub run_id: RunId,
    /// Step identifier within the playbook.
    pub step_id: StepId,
    /// Connector binding exercised by the intent, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_binding_id: Option<BindingId>,
    /// Dotted capability name.
    pub capability: CapabilityName,
    /// Side-effect class.
    pub side_effect: SideEffect,
    /// Declared risk hint.
    pub risk_hint: RiskHint,
    /// Capability parameters.
    pub parameters: Value,
    /// Target surface and hints.
    pub target: IntentTarget,
    /// Idempotency key binding the mutation to its first result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<IdempotencyKey>,
}

impl ActionIntent {
    /// Returns true when every structural field required by the policy
    /// engine is present and non-empty.
    #[must_use]
    pub fn is_structurally_valid(&self) -> bool {
        !self.id.as_str().is_empty()
            && !self.run_id.as_str().is_empty()
            && !self.step_id.as_str().is_empty()
            && !self.capability.as_str().is_empty()
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

    /// Tests risk hint tier resolution.
    #[test]
    fn test_risk_hint_tiers() {
        assert_eq!(RiskHint::new("R0").tier(), Some(RiskTier::R0));
        assert_eq!(RiskHint::new("R3").tier(), Some(RiskTier::R3));
        assert_eq!(RiskHint::new("R9").tier(), None);
        assert_eq!(RiskHint::new("").tier(), None);
        assert_eq!(RiskHint::from(RiskTier::R2).as_str(), "R2");
    }
}

// crates/flockmesh-core/src/core/playbook.rs
// ============================================================================
// Module: Playbook Templates
// Description: Data-driven intent templates expanded when a run is planned.
// Purpose: Keep playbook contents as catalog data, not core logic.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Planning a run expands the playbook's template into concrete action
//! intents. Templates are catalog data loaded at startup; unknown playbooks
//! fall back to a read-only status template so every run plans something.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::core::identifiers::PlaybookId;
use crate::core::intent::RiskHint;
use crate::core::intent::RiskTier;
use crate::core::intent::SideEffect;

// ============================================================================
// SECTION: Templates
// ============================================================================

/// One step template inside a playbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    /// Step identifier within the playbook.
    pub step_id: String,
    /// Capability the step exercises.
    pub capability: String,
    /// Side-effect class of the step.
    pub side_effect: SideEffect,
    /// Declared risk hint.
    pub risk_hint: RiskHint,
    /// Default parameters for the planned intent.
    pub parameters: Value,
    /// Target surface label.
    pub surface: String,
}

/// Playbook template expanded at plan time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybookTemplate {
    /// Playbook identifier (`pbk_`).
    pub playbook_id: PlaybookId,
    /// Ordered step templates.
    pub steps: Vec<StepTemplate>,
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Catalog of playbook templates with a fallback for unknown playbooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybookCatalog {
    /// Templates keyed by playbook id.
    pub templates: BTreeMap<PlaybookId, PlaybookTemplate>,
    /// Fallback template for unknown playbooks.
    pub fallback: PlaybookTemplate,
}

impl PlaybookCatalog {
    /// Returns the template for a playbook, falling back when unknown.
    #[must_use]
    pub fn template_for(&self, playbook_id: &PlaybookId) -> &PlaybookTemplate {
        self.templates.get(playbook_id).unwrap_or(&self.fallback)
    }

    /// Builds the built-in catalog shipped with the control plane.
    #[must_use]
    pub fn builtin() -> Self {
        let weekly = PlaybookTemplate {
            playbook_id: PlaybookId::new("pbk_weekly_ops_sync"),
            steps: vec![StepTemplate {
                step_id: "send_weekly_summary".to_string(),
                capability: "message.send".to_string(),
                side_effect: SideEffect::Mutation,
                risk_hint: RiskHint::from(RiskTier::R2),
                parameters: json!({"template": "weekly_ops_summary"}),
                surface: "chat.channel".to_string(),
            }],
        };
        let monthly = PlaybookTemplate {
            playbook_id: PlaybookId::new("pbk_monthly_ops_review"),
            steps: vec![
                StepTemplate {
                    step_id: "collect_metrics".to_string(),
                    capability: "metrics.read".to_string(),
                    side_effect: SideEffect::None,
                    risk_hint: RiskHint::from(RiskTier::R0),
                    parameters: json!({"window": "30d"}),
                    surface: "metrics.store".to_string(),
                },
                StepTemplate {
                    step_id: "send_review_summary".to_string(),
                    capability: "message.send".to_string(),
                    side_effect: SideEffect::Mutation,
                    risk_hint: RiskHint::from(RiskTier::R2),
                    parameters: json!({"template": "monthly_ops_review"}),
                    surface: "chat.channel".to_string(),
                },
            ],
        };
        let fallback = PlaybookTemplate {
            playbook_id: PlaybookId::new("pbk_fallback_status"),
            steps: vec![StepTemplate {
                step_id: "report_status".to_string(),
                capability: "workspace.status.read".to_string(),
                side_effect: SideEffect::None,
                risk_hint: RiskHint::from(RiskTier::R0),
                parameters: json!({}),
                surface: "workspace.dashboard".to_string(),
            }],
        };
        let templates = [
            (weekly.playbook_id.clone(), weekly),
            (monthly.playbook_id.clone(), monthly),
        ]
        .into_iter()
        .collect();
        Self {
            templates,
            fallback,
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

    use super::*;

    /// Tests built-in catalog lookup and fallback.
    #[test]
    fn test_builtin_catalog() {
        let catalog = PlaybookCatalog::builtin();
        let weekly = catalog.template_for(&PlaybookId::new("pbk_weekly_ops_sync"));
        assert_eq!(weekly.steps.len(), 1);
        assert_eq!(weekly.steps[0].capability, "message.send");

        let unknown = catalog.template_for(&PlaybookId::new("pbk_never_heard_of_it"));
        assert_eq!(unknown.steps[0].side_effect, SideEffect::None);
    }
}

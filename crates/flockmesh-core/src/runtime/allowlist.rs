// crates/flockmesh-core/src/runtime/allowlist.rs
// ============================================================================
// Module: MCP Allowlist
// Description: Tool-level allowlist for the MCP gateway connector.
// Purpose: Gate MCP tool invokes by workspace, agent, tool, mutation, and risk.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! MCP gateway invokes name a tool rather than a first-class capability, so
//! they pass an extra allowlist before policy evaluation. Rules match on
//! workspace and agent scope (absent fields are wildcards); the first
//! matching rule decides. Every block carries a dotted reason code and the
//! guard translates it into a fail-closed deny decision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::AgentId;
use crate::core::RiskTier;
use crate::core::SideEffect;
use crate::core::WorkspaceId;
use crate::core::reason;

// ============================================================================
// SECTION: Rules
// ============================================================================

/// One allowlist rule for MCP tool invokes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpAllowRule {
    /// Workspace the rule applies to; absent matches any workspace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    /// Agent the rule applies to; absent matches any agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Tool names the rule admits; `*` admits any tool.
    pub tools: Vec<String>,
    /// Whether the rule admits mutating invokes.
    #[serde(default)]
    pub allow_mutation: bool,
    /// Highest risk tier the rule admits.
    pub max_risk_tier: RiskTier,
}

impl McpAllowRule {
    /// Returns true when the rule scope matches the invoke.
    fn matches_scope(&self, workspace_id: &WorkspaceId, agent_id: &AgentId) -> bool {
        self.workspace_id.as_deref().is_none_or(|ws| ws == workspace_id.as_str())
            && self.agent_id.as_deref().is_none_or(|agent| agent == agent_id.as_str())
    }

    /// Returns true when the rule admits the tool name.
    fn admits_tool(&self, tool_name: &str) -> bool {
        self.tools.iter().any(|tool| tool == "*" || tool == tool_name)
    }
}

/// Allowlist for the MCP gateway connector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpAllowlist {
    /// Ordered rules; the first scope match decides.
    #[serde(default)]
    pub rules: Vec<McpAllowRule>,
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Invoke attributes evaluated by the allowlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpInvokeScope<'a> {
    /// Workspace of the run.
    pub workspace_id: &'a WorkspaceId,
    /// Agent of the run.
    pub agent_id: &'a AgentId,
    /// Tool name extracted from the invoke parameters.
    pub tool_name: Option<&'a str>,
    /// Side-effect class of the invoke.
    pub side_effect: SideEffect,
    /// Risk tier of the invoke, when recognized.
    pub risk_tier: Option<RiskTier>,
}

/// Allowlist verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowlistVerdict {
    /// Invoke admitted.
    Allowed,
    /// Invoke blocked with a dotted reason code.
    Blocked {
        /// Dotted block reason.
        reason: &'static str,
    },
}

impl McpAllowlist {
    /// Evaluates the allowlist for one MCP invoke.
    #[must_use]
    pub fn evaluate(&self, scope: &McpInvokeScope<'_>) -> AllowlistVerdict {
        let Some(tool_name) = scope.tool_name else {
            return AllowlistVerdict::Blocked {
                reason: reason::MCP_TOOL_NAME_REQUIRED,
            };
        };
        let Some(rule) = self
            .rules
            .iter()
            .find(|rule| rule.matches_scope(scope.workspace_id, scope.agent_id))
        else {
            return AllowlistVerdict::Blocked {
                reason: reason::MCP_NO_MATCHING_RULE,
            };
        };
        if !rule.admits_tool(tool_name) {
            return AllowlistVerdict::Blocked {
                reason: reason::MCP_TOOL_NOT_ALLOWED,
            };
        }
        if scope.side_effect.is_mutation() && !rule.allow_mutation {
            return AllowlistVerdict::Blocked {
                reason: reason::MCP_MUTATION_NOT_ALLOWED,
            };
        }
        // Unknown tiers exceed every ceiling: fail closed.
        match scope.risk_tier {
            Some(tier) if tier <= rule.max_risk_tier => AllowlistVerdict::Allowed,
            _ => AllowlistVerdict::Blocked {
                reason: reason::MCP_RISK_TIER_EXCEEDED,
            },
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

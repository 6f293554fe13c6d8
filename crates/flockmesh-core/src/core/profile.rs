// crates/flockmesh-core/src/core/profile.rs
// ============================================================================
// Module: Policy Profiles
// Description: Named policy profiles and their canonical documents.
// Purpose: Provide the rule layers the policy lattice merges, with stable hashes.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A policy profile maps capabilities (or the wildcard `*`) to decisions.
//! Profiles serialize as canonical documents; the document hash over the
//! canonical form is the concurrency token for patch/rollback writes. The
//! compiler here is the single path from document to profile, shared by the
//! catalog loader and the patch pipeline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::decision::DecisionKind;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::CapabilityName;
use crate::core::identifiers::IdentifierError;
use crate::core::identifiers::ProfileName;
use crate::core::identifiers::validate_capability;
use crate::core::identifiers::validate_profile_name;

// ============================================================================
// SECTION: Profile Rules
// ============================================================================

/// Approval bounds accepted on escalating rules.
const MIN_RULE_APPROVALS: u32 = 1;
/// Upper approval bound accepted on escalating rules.
const MAX_RULE_APPROVALS: u32 = 5;

/// One profile rule for a capability.
///
/// # Invariants
/// - `required_approvals` is in `1..=5` exactly when `decision = escalate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRule {
    /// Decision contributed by the rule.
    pub decision: DecisionKind,
    /// Approvals requested by the rule when escalating.
    #[serde(
        rename = "requiredApprovals",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub required_approvals: Option<u32>,
}

// ============================================================================
// SECTION: Profile Document
// ============================================================================

/// Serializable policy profile document.
///
/// This is the on-disk shape under `policies/<name>.policy.json`; its
/// canonical-form hash is the CAS token for catalog writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDocument {
    /// Profile name (lowercase snake case).
    pub name: String,
    /// Rules keyed by capability or the wildcard `*`.
    pub rules: BTreeMap<String, ProfileRule>,
}

impl ProfileDocument {
    /// Computes the document hash over the canonical serialization.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn document_hash(&self) -> Result<HashDigest, HashError> {
        hash_canonical_json(self)
    }
}

// ============================================================================
// SECTION: Compiled Profile
// ============================================================================

/// Compiled policy profile held by the policy library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyProfile {
    /// Profile name.
    pub name: ProfileName,
    /// Rules keyed by capability or wildcard.
    pub rules: BTreeMap<CapabilityName, ProfileRule>,
}

impl PolicyProfile {
    /// Looks up the rule for a capability: exact match first, wildcard next.
    #[must_use]
    pub fn rule_for(&self, capability: &CapabilityName) -> Option<&ProfileRule> {
        self.rules
            .get(capability)
            .or_else(|| self.rules.get(&CapabilityName::new("*")))
    }

    /// Serializes the profile back into its document form.
    #[must_use]
    pub fn to_document(&self) -> ProfileDocument {
        ProfileDocument {
            name: self.name.as_str().to_string(),
            rules: self
                .rules
                .iter()
                .map(|(capability, rule)| (capability.as_str().to_string(), rule.clone()))
                .collect(),
        }
    }
}

// ============================================================================
// SECTION: Compiler
// ============================================================================

/// Errors raised when compiling a profile document.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Profile name fails the lowercase-snake contract.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
    /// Escalating rule carries an out-of-range approval count.
    #[error("profile '{profile}' rule '{capability}': escalate requires approvals in 1..=5")]
    InvalidApprovals {
        /// Profile being compiled.
        profile: String,
        /// Offending capability key.
        capability: String,
    },
    /// Non-escalating rule carries an approval count.
    #[error("profile '{profile}' rule '{capability}': approvals only apply to escalate")]
    UnexpectedApprovals {
        /// Profile being compiled.
        profile: String,
        /// Offending capability key.
        capability: String,
    },
    /// Canonicalization failed while hashing the document.
    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Compiles a profile document into a [`PolicyProfile`].
///
/// This is the single compilation path shared by the catalog loader and the
/// patch pipeline, so recompiled after-documents behave identically to loaded
/// ones.
///
/// # Errors
///
/// Returns [`ProfileError`] when the name, a capability key, or an approval
/// count violates the contract.
pub fn compile_profile(document: &ProfileDocument) -> Result<PolicyProfile, ProfileError> {
    validate_profile_name(&document.name)?;
    let mut rules = BTreeMap::new();
    for (capability, rule) in &document.rules {
        validate_capability(capability, true)?;
        match rule.decision {
            DecisionKind::Escalate => {
                let approvals = rule.required_approvals.unwrap_or(0);
                if !(MIN_RULE_APPROVALS..=MAX_RULE_APPROVALS).contains(&approvals) {
                    return Err(ProfileError::InvalidApprovals {
                        profile: document.name.clone(),
                        capability: capability.clone(),
                    });
                }
            }
            DecisionKind::Allow | DecisionKind::Deny => {
                if rule.required_approvals.is_some() {
                    return Err(ProfileError::UnexpectedApprovals {
                        profile: document.name.clone(),
                        capability: capability.clone(),
                    });
                }
            }
        }
        rules.insert(CapabilityName::new(capability.clone()), rule.clone());
    }
    Ok(PolicyProfile {
        name: ProfileName::new(document.name.clone()),
        rules,
    })
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

    /// Builds a small document for tests.
    fn test_document() -> ProfileDocument {
        let mut rules = BTreeMap::new();
        rules.insert(
            "message.send".to_string(),
            ProfileRule {
                decision: DecisionKind::Escalate,
                required_approvals: Some(1),
            },
        );
        rules.insert(
            "*".to_string(),
            ProfileRule {
                decision: DecisionKind::Allow,
                required_approvals: None,
            },
        );
        ProfileDocument {
            name: "org_default_safe".to_string(),
            rules,
        }
    }

    /// Tests exact-then-wildcard rule lookup.
    #[test]
    fn test_rule_lookup_prefers_exact() {
        let profile = compile_profile(&test_document()).unwrap();
        let exact = profile.rule_for(&CapabilityName::new("message.send")).unwrap();
        assert_eq!(exact.decision, DecisionKind::Escalate);
        let wildcard = profile.rule_for(&CapabilityName::new("calendar.event.list")).unwrap();
        assert_eq!(wildcard.decision, DecisionKind::Allow);
    }

    /// Tests compiler rejections for malformed rules.
    #[test]
    fn test_compiler_rejects_bad_rules() {
        let mut document = test_document();
        document.name = "BadName".to_string();
        assert!(compile_profile(&document).is_err());

        let mut document = test_document();
        document.rules.insert(
            "file.delete".to_string(),
            ProfileRule {
                decision: DecisionKind::Escalate,
                required_approvals: Some(9),
            },
        );
        assert!(compile_profile(&document).is_err());

        let mut document = test_document();
        document.rules.insert(
            "file.read".to_string(),
            ProfileRule {
                decision: DecisionKind::Allow,
                required_approvals: Some(1),
            },
        );
        assert!(compile_profile(&document).is_err());
    }

    /// Tests that the document hash is insensitive to rule insertion order.
    #[test]
    fn test_document_hash_stability() {
        let document = test_document();
        let profile = compile_profile(&document).unwrap();
        let round_tripped = profile.to_document();
        assert_eq!(
            document.document_hash().unwrap(),
            round_tripped.document_hash().unwrap()
        );
    }
}

// crates/flockmesh-core/src/policy/library.rs
// ============================================================================
// Module: Policy Library
// Description: Process-wide set of named policy profiles.
// Purpose: Serve lattice lookups and support atomic per-entry replacement.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The library is a read-mostly in-memory map of compiled profiles. Patch
//! and rollback replace one entry at a time after the file write succeeds;
//! readers observe the old or the new profile, never a half-written one.
//! Simulation overlays a candidate profile over the library without
//! mutating it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use crate::core::PolicyProfile;
use crate::core::ProfileName;

// ============================================================================
// SECTION: Profile Lookup
// ============================================================================

/// Read-side lookup over named profiles.
pub trait ProfileLookup {
    /// Returns the profile for a name, when present.
    fn profile(&self, name: &ProfileName) -> Option<Arc<PolicyProfile>>;
}

// ============================================================================
// SECTION: Policy Library
// ============================================================================

/// Process-wide policy profile library.
#[derive(Debug, Default)]
pub struct PolicyLibrary {
    /// Compiled profiles by name.
    profiles: RwLock<BTreeMap<ProfileName, Arc<PolicyProfile>>>,
}

impl PolicyLibrary {
    /// Creates an empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a library from compiled profiles.
    #[must_use]
    pub fn from_profiles(profiles: impl IntoIterator<Item = PolicyProfile>) -> Self {
        let map = profiles
            .into_iter()
            .map(|profile| (profile.name.clone(), Arc::new(profile)))
            .collect();
        Self {
            profiles: RwLock::new(map),
        }
    }

    /// Installs or replaces one profile entry atomically.
    pub fn install(&self, profile: PolicyProfile) {
        if let Ok(mut guard) = self.profiles.write() {
            guard.insert(profile.name.clone(), Arc::new(profile));
        }
    }

    /// Returns true when the named profile exists.
    #[must_use]
    pub fn contains(&self, name: &ProfileName) -> bool {
        self.profiles.read().is_ok_and(|guard| guard.contains_key(name))
    }

    /// Returns all profile names in lexicographic order.
    #[must_use]
    pub fn names(&self) -> Vec<ProfileName> {
        self.profiles
            .read()
            .map(|guard| guard.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ProfileLookup for PolicyLibrary {
    fn profile(&self, name: &ProfileName) -> Option<Arc<PolicyProfile>> {
        self.profiles.read().ok().and_then(|guard| guard.get(name).cloned())
    }
}

// ============================================================================
// SECTION: Simulation Overlay
// ============================================================================

/// Library view with one candidate profile overlaid.
pub struct LibraryOverlay<'a> {
    /// Underlying library.
    base: &'a PolicyLibrary,
    /// Candidate profile shadowing its name in the base.
    overlay: Arc<PolicyProfile>,
}

impl<'a> LibraryOverlay<'a> {
    /// Creates an overlay view over the library.
    #[must_use]
    pub fn new(base: &'a PolicyLibrary, overlay: PolicyProfile) -> Self {
        Self {
            base,
            overlay: Arc::new(overlay),
        }
    }
}

impl ProfileLookup for LibraryOverlay<'_> {
    fn profile(&self, name: &ProfileName) -> Option<Arc<PolicyProfile>> {
        if name == &self.overlay.name {
            Some(Arc::clone(&self.overlay))
        } else {
            self.base.profile(name)
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

    use std::collections::BTreeMap;

    use super::*;
    use crate::core::DecisionKind;
    use crate::core::ProfileRule;

    /// Builds a single-rule profile for tests.
    fn profile(name: &str, decision: DecisionKind) -> PolicyProfile {
        let mut rules = BTreeMap::new();
        rules.insert(
            crate::core::CapabilityName::new("*"),
            ProfileRule {
                decision,
                required_approvals: matches!(decision, DecisionKind::Escalate).then_some(1),
            },
        );
        PolicyProfile {
            name: ProfileName::new(name),
            rules,
        }
    }

    /// Tests install/replace and lookup.
    #[test]
    fn test_install_and_lookup() {
        let library = PolicyLibrary::new();
        library.install(profile("org_default_safe", DecisionKind::Allow));
        assert!(library.contains(&ProfileName::new("org_default_safe")));
        library.install(profile("org_default_safe", DecisionKind::Deny));
        let replaced = library.profile(&ProfileName::new("org_default_safe")).unwrap();
        let rule = replaced.rule_for(&crate::core::CapabilityName::new("message.send")).unwrap();
        assert_eq!(rule.decision, DecisionKind::Deny);
    }

    /// Tests that overlays shadow only their own name.
    #[test]
    fn test_overlay_shadows_one_entry() {
        let library = PolicyLibrary::new();
        library.install(profile("org_default_safe", DecisionKind::Allow));
        library.install(profile("workspace_ops_cn", DecisionKind::Allow));

        let overlay = LibraryOverlay::new(&library, profile("workspace_ops_cn", DecisionKind::Deny));
        let shadowed = overlay.profile(&ProfileName::new("workspace_ops_cn")).unwrap();
        let rule = shadowed.rule_for(&crate::core::CapabilityName::new("message.send")).unwrap();
        assert_eq!(rule.decision, DecisionKind::Deny);

        let untouched = overlay.profile(&ProfileName::new("org_default_safe")).unwrap();
        let rule = untouched.rule_for(&crate::core::CapabilityName::new("message.send")).unwrap();
        assert_eq!(rule.decision, DecisionKind::Allow);
    }
}

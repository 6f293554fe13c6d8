// crates/flockmesh-core/src/core/identifiers.rs
// ============================================================================
// Module: Flockmesh Identifiers
// Description: Canonical opaque identifiers for control-plane records.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout the
//! Flockmesh control plane. Identifiers are opaque strings with typed
//! prefixes (`run_`, `agt_`, `cnb_`, ...). The types themselves apply no
//! normalization; prefix formats are part of the external contract and are
//! enforced at the boundary via the validators in this module.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Validation Errors
// ============================================================================

/// Errors raised when an identifier fails boundary validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    /// Identifier does not carry the required prefix.
    #[error("identifier '{value}' must start with '{prefix}'")]
    MissingPrefix {
        /// Offending identifier value.
        value: String,
        /// Required prefix including the trailing underscore.
        prefix: &'static str,
    },
    /// Identifier suffix is empty, too long, or carries invalid characters.
    #[error("identifier '{value}' has an invalid suffix (allowed [A-Za-z0-9_-], length {min}..={max})")]
    InvalidSuffix {
        /// Offending identifier value.
        value: String,
        /// Minimum suffix length.
        min: usize,
        /// Maximum suffix length.
        max: usize,
    },
    /// Actor identifier does not match the actor contract.
    #[error("actor id '{0}' must match (usr|svc|agt|sys)_[A-Za-z0-9_-]{{4,128}}")]
    InvalidActor(String),
    /// Capability name does not match the dotted-identifier contract.
    #[error("capability '{0}' must match [a-z][a-z0-9_]*(.[a-z][a-z0-9_]*)+")]
    InvalidCapability(String),
    /// Policy profile name does not match the lowercase-snake contract.
    #[error("profile name '{0}' must be lowercase snake case")]
    InvalidProfileName(String),
}

// ============================================================================
// SECTION: Identifier Macro Support
// ============================================================================

/// Declares an opaque string identifier with the shared wire shape.
macro_rules! string_identifier {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// # Invariants
        /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from a string value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_identifier! {
    /// Authenticated actor identifier (`usr_`, `svc_`, `agt_`, or `sys_`).
    ActorId
}

string_identifier! {
    /// Workspace identifier (`wsp_`).
    WorkspaceId
}

string_identifier! {
    /// Agent profile identifier (`agt_`).
    AgentId
}

string_identifier! {
    /// Connector binding identifier (`cnb_`).
    BindingId
}

string_identifier! {
    /// Connector identifier (`con_`).
    ConnectorId
}

string_identifier! {
    /// Run identifier (`run_`).
    RunId
}

string_identifier! {
    /// Action intent identifier (`act_`).
    ActionIntentId
}

string_identifier! {
    /// Policy decision identifier (`pol_`).
    DecisionId
}

string_identifier! {
    /// Playbook identifier (`pbk_`).
    PlaybookId
}

string_identifier! {
    /// Ledger event identifier (`evt_`).
    EventId
}

string_identifier! {
    /// Ledger audit identifier (`aud_`).
    AuditId
}

string_identifier! {
    /// Policy patch history identifier (`pph_`).
    PatchId
}

string_identifier! {
    /// Export signing key identifier (`exp_`).
    SigningKeyId
}

string_identifier! {
    /// Caller-supplied idempotency key (`idem_`).
    IdempotencyKey
}

string_identifier! {
    /// Step identifier within a playbook run.
    StepId
}

string_identifier! {
    /// Dotted capability name (for example `message.send`).
    CapabilityName
}

string_identifier! {
    /// Policy profile name (lowercase snake case).
    ProfileName
}

// ============================================================================
// SECTION: Prefix Validators
// ============================================================================

/// Minimum suffix length for prefixed identifiers.
const PREFIXED_SUFFIX_MIN: usize = 1;
/// Maximum suffix length for prefixed identifiers.
const PREFIXED_SUFFIX_MAX: usize = 128;
/// Minimum suffix length for actor identifiers.
const ACTOR_SUFFIX_MIN: usize = 4;
/// Maximum suffix length for actor identifiers.
const ACTOR_SUFFIX_MAX: usize = 128;
/// Actor identifier prefixes accepted at the boundary.
const ACTOR_PREFIXES: &[&str] = &["usr_", "svc_", "agt_", "sys_"];

/// Returns true when every byte is in the `[A-Za-z0-9_-]` identifier set.
fn is_identifier_suffix(value: &str) -> bool {
    !value.is_empty()
        && value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Validates a prefixed identifier such as `run_...` or `cnb_...`.
///
/// # Errors
///
/// Returns [`IdentifierError`] when the prefix is missing or the suffix is
/// empty, over-long, or carries invalid characters.
pub fn validate_prefixed(value: &str, prefix: &'static str) -> Result<(), IdentifierError> {
    let Some(suffix) = value.strip_prefix(prefix) else {
        return Err(IdentifierError::MissingPrefix {
            value: value.to_string(),
            prefix,
        });
    };
    if suffix.len() < PREFIXED_SUFFIX_MIN
        || suffix.len() > PREFIXED_SUFFIX_MAX
        || !is_identifier_suffix(suffix)
    {
        return Err(IdentifierError::InvalidSuffix {
            value: value.to_string(),
            min: PREFIXED_SUFFIX_MIN,
            max: PREFIXED_SUFFIX_MAX,
        });
    }
    Ok(())
}

/// Validates an actor identifier against `(usr|svc|agt|sys)_[A-Za-z0-9_-]{4,128}`.
///
/// # Errors
///
/// Returns [`IdentifierError::InvalidActor`] when the value does not match.
pub fn validate_actor_id(value: &str) -> Result<(), IdentifierError> {
    let suffix = ACTOR_PREFIXES.iter().find_map(|prefix| value.strip_prefix(prefix));
    match suffix {
        Some(suffix)
            if suffix.len() >= ACTOR_SUFFIX_MIN
                && suffix.len() <= ACTOR_SUFFIX_MAX
                && is_identifier_suffix(suffix) =>
        {
            Ok(())
        }
        _ => Err(IdentifierError::InvalidActor(value.to_string())),
    }
}

/// Validates a dotted capability name.
///
/// Policy rule capabilities may additionally be the wildcard `*` when
/// `allow_wildcard` is set; intent capabilities never are.
///
/// # Errors
///
/// Returns [`IdentifierError::InvalidCapability`] when the value does not
/// match `[a-z][a-z0-9_]*(.[a-z][a-z0-9_]*)+`.
pub fn validate_capability(value: &str, allow_wildcard: bool) -> Result<(), IdentifierError> {
    if allow_wildcard && value == "*" {
        return Ok(());
    }
    let segments: Vec<&str> = value.split('.').collect();
    if segments.len() < 2 || !segments.iter().all(|segment| is_capability_segment(segment)) {
        return Err(IdentifierError::InvalidCapability(value.to_string()));
    }
    Ok(())
}

/// Returns true when a capability segment matches `[a-z][a-z0-9_]*`.
fn is_capability_segment(segment: &str) -> bool {
    let mut bytes = segment.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_lowercase() => {
            bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        }
        _ => false,
    }
}

/// Validates a policy profile name (lowercase snake case).
///
/// # Errors
///
/// Returns [`IdentifierError::InvalidProfileName`] when the value does not
/// match `[a-z][a-z0-9_]*`.
pub fn validate_profile_name(value: &str) -> Result<(), IdentifierError> {
    if is_capability_segment(value) {
        Ok(())
    } else {
        Err(IdentifierError::InvalidProfileName(value.to_string()))
    }
}

/// Validates an export signing key identifier against `exp_[A-Za-z0-9_-]{4,64}`.
///
/// # Errors
///
/// Returns [`IdentifierError`] when the prefix is missing or the suffix falls
/// outside the 4..=64 length window.
pub fn validate_signing_key_id(value: &str) -> Result<(), IdentifierError> {
    let Some(suffix) = value.strip_prefix("exp_") else {
        return Err(IdentifierError::MissingPrefix {
            value: value.to_string(),
            prefix: "exp_",
        });
    };
    if suffix.len() < 4 || suffix.len() > 64 || !is_identifier_suffix(suffix) {
        return Err(IdentifierError::InvalidSuffix {
            value: value.to_string(),
            min: 4,
            max: 64,
        });
    }
    Ok(())
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

    /// Tests that prefixed identifiers validate their prefix and suffix.
    #[test]
    fn test_validate_prefixed() {
        assert!(validate_prefixed("run_weekly_01", "run_").is_ok());
        assert!(validate_prefixed("cnb_feishu-01", "cnb_").is_ok());
        assert!(validate_prefixed("run_", "run_").is_err());
        assert!(validate_prefixed("wsp_abc", "run_").is_err());
        assert!(validate_prefixed("run_bad space", "run_").is_err());
    }

    /// Tests the actor identifier contract.
    #[test]
    fn test_validate_actor_id() {
        assert!(validate_actor_id("usr_alice_01").is_ok());
        assert!(validate_actor_id("svc_scheduler").is_ok());
        assert!(validate_actor_id("agt_ops-bot-7").is_ok());
        assert!(validate_actor_id("sys_core").is_ok());
        assert!(validate_actor_id("usr_abc").is_err());
        assert!(validate_actor_id("bot_abcdef").is_err());
        assert!(validate_actor_id("usr_has space").is_err());
    }

    /// Tests the dotted capability contract, with and without wildcard.
    #[test]
    fn test_validate_capability() {
        assert!(validate_capability("message.send", false).is_ok());
        assert!(validate_capability("calendar.event.create", false).is_ok());
        assert!(validate_capability("message", false).is_err());
        assert!(validate_capability("Message.Send", false).is_err());
        assert!(validate_capability("message..send", false).is_err());
        assert!(validate_capability("*", true).is_ok());
        assert!(validate_capability("*", false).is_err());
    }

    /// Tests profile-name and signing-key validators.
    #[test]
    fn test_validate_profile_and_key_names() {
        assert!(validate_profile_name("org_default_safe").is_ok());
        assert!(validate_profile_name("OrgDefault").is_err());
        assert!(validate_signing_key_id("exp_default_key").is_ok());
        assert!(validate_signing_key_id("exp_ab").is_err());
        assert!(validate_signing_key_id("key_default").is_err());
    }

    /// Tests identifier wire transparency.
    #[test]
    fn test_identifier_serde_is_transparent() {
        let run = RunId::new("run_abc123");
        let json = serde_json::to_string(&run).unwrap();
        assert_eq!(json, "\"run_abc123\"");
        let parsed: RunId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, run);
    }
}

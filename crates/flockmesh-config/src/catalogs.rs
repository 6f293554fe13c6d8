// crates/flockmesh-config/src/catalogs.rs
// ============================================================================
// Module: File-Backed Catalogs
// Description: Loaders for profiles, manifests, allowlists, and playbooks.
// Purpose: Compile startup catalogs into memory, failing closed on bad input.
// Dependencies: flockmesh-core, serde_json
// ============================================================================

//! ## Overview
//! Catalogs load once at startup. Policy profiles compile through the shared
//! core compiler; connector manifests must verify their attestation against
//! the attestation key ring or loading aborts. Missing optional catalog files
//! fall back to the built-in defaults so a bare checkout still boots.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use flockmesh_core::CatalogError;
use flockmesh_core::ConnectorManifest;
use flockmesh_core::DecisionKind;
use flockmesh_core::PlaybookCatalog;
use flockmesh_core::ProfileDocument;
use flockmesh_core::ProfileRule;
use flockmesh_core::ProfileWriter;
use flockmesh_core::canonical_json_bytes;
use flockmesh_core::compile_profile;
use flockmesh_core::policy::PolicyLibrary;
use flockmesh_core::runtime::McpAllowlist;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Catalog loading errors.
#[derive(Debug, Error)]
pub enum CatalogLoadError {
    /// Catalog file could not be read.
    #[error("catalog io error: {0}")]
    Io(String),
    /// Catalog file failed to parse.
    #[error("catalog parse error in {path}: {reason}")]
    Parse {
        /// Offending file path.
        path: String,
        /// Parse failure reason.
        reason: String,
    },
    /// Policy profile failed to compile.
    #[error("profile compile error in {path}: {reason}")]
    Compile {
        /// Offending file path.
        path: String,
        /// Compile failure reason.
        reason: String,
    },
    /// Connector manifest failed attestation.
    #[error("manifest attestation error: {0}")]
    Attestation(String),
}

// ============================================================================
// SECTION: Policy Profiles
// ============================================================================

/// Suffix for policy profile documents.
const PROFILE_SUFFIX: &str = ".policy.json";

/// Loads every `<name>.policy.json` under the directory into a library.
///
/// When the directory is missing or holds no profiles, the built-in default
/// lattice profiles are installed instead.
///
/// # Errors
///
/// Returns [`CatalogLoadError`] when a present document fails to parse or
/// compile.
pub fn load_policy_library(profiles_dir: &Path) -> Result<PolicyLibrary, CatalogLoadError> {
    let library = PolicyLibrary::new();
    let mut loaded = 0_u32;
    if profiles_dir.is_dir() {
        let entries =
            fs::read_dir(profiles_dir).map_err(|err| CatalogLoadError::Io(err.to_string()))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(PROFILE_SUFFIX))
            })
            .collect();
        paths.sort();
        for path in paths {
            let content =
                fs::read_to_string(&path).map_err(|err| CatalogLoadError::Io(err.to_string()))?;
            let document: ProfileDocument =
                serde_json::from_str(&content).map_err(|err| CatalogLoadError::Parse {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                })?;
            let profile = compile_profile(&document).map_err(|err| CatalogLoadError::Compile {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;
            library.install(profile);
            loaded += 1;
        }
    }
    if loaded == 0 {
        for profile in default_profiles() {
            let compiled = compile_profile(&profile).map_err(|err| CatalogLoadError::Compile {
                path: format!("<builtin:{}>", profile.name),
                reason: err.to_string(),
            })?;
            library.install(compiled);
        }
    }
    Ok(library)
}

/// Returns the built-in default lattice profiles.
#[must_use]
pub fn default_profiles() -> Vec<ProfileDocument> {
    let allow_all = |name: &str| ProfileDocument {
        name: name.to_string(),
        rules: [(
            "*".to_string(),
            ProfileRule {
                decision: DecisionKind::Allow,
                required_approvals: None,
            },
        )]
        .into_iter()
        .collect(),
    };
    vec![
        allow_all("org_default_safe"),
        allow_all("workspace_ops_cn"),
        allow_all("agent_ops_assistant"),
    ]
}

// ============================================================================
// SECTION: Profile Writer
// ============================================================================

/// File-backed profile writer with atomic replace.
pub struct FileProfileWriter {
    /// Directory holding profile documents.
    profiles_dir: PathBuf,
}

impl FileProfileWriter {
    /// Creates a writer rooted at the profiles directory.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogLoadError::Io`] when the directory cannot be created.
    pub fn new(profiles_dir: impl Into<PathBuf>) -> Result<Self, CatalogLoadError> {
        let profiles_dir = profiles_dir.into();
        fs::create_dir_all(&profiles_dir).map_err(|err| CatalogLoadError::Io(err.to_string()))?;
        Ok(Self { profiles_dir })
    }
}

impl ProfileWriter for FileProfileWriter {
    fn write_profile(&self, document: &ProfileDocument) -> Result<String, CatalogError> {
        let final_path = self.profiles_dir.join(format!("{}{PROFILE_SUFFIX}", document.name));
        let temp_path = self.profiles_dir.join(format!(".{}{PROFILE_SUFFIX}.tmp", document.name));
        let bytes = canonical_json_bytes(document)
            .map_err(|err| CatalogError::Serialization(err.to_string()))?;
        fs::write(&temp_path, &bytes).map_err(|err| CatalogError::Io(err.to_string()))?;
        fs::rename(&temp_path, &final_path).map_err(|err| CatalogError::Io(err.to_string()))?;
        Ok(final_path.display().to_string())
    }
}

// ============================================================================
// SECTION: Connector Manifests
// ============================================================================

/// Loads and attests the connector manifest catalog.
///
/// A missing path yields an empty catalog. Every present manifest must verify
/// its attestation against the key ring.
///
/// # Errors
///
/// Returns [`CatalogLoadError`] for unreadable files, parse failures, and
/// attestation failures.
pub fn load_manifests(
    path: Option<&Path>,
    attestation_keys: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, ConnectorManifest>, CatalogLoadError> {
    let Some(path) = path else {
        return Ok(BTreeMap::new());
    };
    let content = fs::read_to_string(path).map_err(|err| CatalogLoadError::Io(err.to_string()))?;
    let manifests: Vec<ConnectorManifest> =
        serde_json::from_str(&content).map_err(|err| CatalogLoadError::Parse {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
    let mut catalog = BTreeMap::new();
    for manifest in manifests {
        manifest
            .verify_attestation(attestation_keys)
            .map_err(|err| CatalogLoadError::Attestation(err.to_string()))?;
        catalog.insert(manifest.connector_id.as_str().to_string(), manifest);
    }
    Ok(catalog)
}

// ============================================================================
// SECTION: MCP Allowlist
// ============================================================================

/// Loads the MCP allowlist; a missing path yields an empty (deny-all) list.
///
/// # Errors
///
/// Returns [`CatalogLoadError`] for unreadable or unparsable files.
pub fn load_mcp_allowlist(path: Option<&Path>) -> Result<McpAllowlist, CatalogLoadError> {
    let Some(path) = path else {
        return Ok(McpAllowlist::default());
    };
    let content = fs::read_to_string(path).map_err(|err| CatalogLoadError::Io(err.to_string()))?;
    serde_json::from_str(&content).map_err(|err| CatalogLoadError::Parse {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}

// ============================================================================
// SECTION: Playbooks
// ============================================================================

/// Loads the playbook catalog; a missing path yields the built-in catalog.
///
/// # Errors
///
/// Returns [`CatalogLoadError`] for unreadable or unparsable files.
pub fn load_playbooks(path: Option<&Path>) -> Result<PlaybookCatalog, CatalogLoadError> {
    let Some(path) = path else {
        return Ok(PlaybookCatalog::builtin());
    };
    let content = fs::read_to_string(path).map_err(|err| CatalogLoadError::Io(err.to_string()))?;
    serde_json::from_str(&content).map_err(|err| CatalogLoadError::Parse {
        path: path.display().to_string(),
        reason: err.to_string(),
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

    use flockmesh_core::CapabilityName;
    use flockmesh_core::ConnectorId;
    use flockmesh_core::ConnectorProtocol;
    use flockmesh_core::ManifestAttestation;
    use flockmesh_core::ProfileName;
    use flockmesh_core::TrustLevel;
    use flockmesh_core::hash_bytes;
    use flockmesh_core::policy::ProfileLookup;

    use super::*;

    /// Tests the builtin fallback and a loaded profile directory.
    #[test]
    fn test_load_policy_library() {
        let dir = tempfile::tempdir().unwrap();
        let library = load_policy_library(dir.path()).unwrap();
        assert!(library.contains(&ProfileName::new("org_default_safe")));
        assert!(library.contains(&ProfileName::new("workspace_ops_cn")));
        assert!(library.contains(&ProfileName::new("agent_ops_assistant")));

        let document = ProfileDocument {
            name: "workspace_restricted".to_string(),
            rules: [(
                "message.send".to_string(),
                ProfileRule {
                    decision: DecisionKind::Deny,
                    required_approvals: None,
                },
            )]
            .into_iter()
            .collect(),
        };
        fs::write(
            dir.path().join("workspace_restricted.policy.json"),
            serde_json::to_string(&document).unwrap(),
        )
        .unwrap();
        let library = load_policy_library(dir.path()).unwrap();
        assert!(library.contains(&ProfileName::new("workspace_restricted")));
        // With at least one on-disk profile, the builtins are not implied.
        assert!(!library.contains(&ProfileName::new("org_default_safe")));
    }

    /// Tests that a malformed profile aborts loading.
    #[test]
    fn test_bad_profile_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.policy.json"), "{not json").unwrap();
        assert!(load_policy_library(dir.path()).is_err());
    }

    /// Tests the atomic writer round-trips through the loader.
    #[test]
    fn test_writer_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileProfileWriter::new(dir.path()).unwrap();
        let document = default_profiles().remove(0);
        let path = writer.write_profile(&document).unwrap();
        assert!(path.ends_with("org_default_safe.policy.json"));

        let library = load_policy_library(dir.path()).unwrap();
        let profile = library.profile(&ProfileName::new("org_default_safe")).unwrap();
        assert_eq!(profile.to_document().document_hash().unwrap(), document.document_hash().unwrap());
    }

    /// Tests manifest attestation enforcement at load.
    #[test]
    fn test_manifest_attestation_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let keys: BTreeMap<String, String> =
            [("att_catalog".to_string(), "attest-secret".to_string())].into_iter().collect();

        let mut manifest = ConnectorManifest {
            connector_id: ConnectorId::new("con_feishu_official"),
            name: "Feishu".to_string(),
            category: "messaging".to_string(),
            protocol: ConnectorProtocol::OfficeChat,
            trust_level: TrustLevel::Official,
            capabilities: [CapabilityName::new("message.send")].into_iter().collect(),
            attestation: ManifestAttestation {
                key_id: String::new(),
                payload_hash: hash_bytes(b""),
                signature: String::new(),
            },
        };
        manifest.attest("att_catalog", "attest-secret").unwrap();
        let path = dir.path().join("manifests.json");
        fs::write(&path, serde_json::to_string(&vec![manifest.clone()]).unwrap()).unwrap();

        let catalog = load_manifests(Some(&path), &keys).unwrap();
        assert!(catalog.contains_key("con_feishu_official"));

        // Tamper the capabilities and expect attestation failure.
        manifest.capabilities.insert(CapabilityName::new("calendar.event.create"));
        fs::write(&path, serde_json::to_string(&vec![manifest]).unwrap()).unwrap();
        assert!(matches!(
            load_manifests(Some(&path), &keys),
            Err(CatalogLoadError::Attestation(_))
        ));
    }

    /// Tests allowlist and playbook fallbacks.
    #[test]
    fn test_optional_catalog_fallbacks() {
        let allowlist = load_mcp_allowlist(None).unwrap();
        assert!(allowlist.rules.is_empty());
        let playbooks = load_playbooks(None).unwrap();
        assert!(
            playbooks
                .templates
                .contains_key(&flockmesh_core::PlaybookId::new("pbk_weekly_ops_sync"))
        );
    }
}

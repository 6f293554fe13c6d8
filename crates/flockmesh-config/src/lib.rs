// crates/flockmesh-config/src/lib.rs
// ============================================================================
// Module: Flockmesh Config
// Description: Configuration, environment overrides, and startup catalogs.
// Purpose: Assemble everything the server wires together at boot.
// Dependencies: flockmesh-core, serde, serde_json, toml
// ============================================================================

//! ## Overview
//! This crate owns the TOML configuration surface, the recognized
//! `FLOCKMESH_*` environment overrides, the file-backed catalog loaders
//! (policy profiles, connector manifests, MCP allowlists, playbooks), the
//! atomic profile writer used by the patch pipeline, and signing key ring
//! resolution.

/// File-backed catalog loaders and the profile writer.
pub mod catalogs;
/// TOML configuration with environment overrides.
pub mod config;
/// Signing key resolution.
pub mod keys;

pub use catalogs::CatalogLoadError;
pub use catalogs::FileProfileWriter;
pub use catalogs::default_profiles;
pub use catalogs::load_manifests;
pub use catalogs::load_mcp_allowlist;
pub use catalogs::load_playbooks;
pub use catalogs::load_policy_library;
pub use config::ConfigError;
pub use config::ConnectorConfig;
pub use config::EnvSource;
pub use config::FlockmeshConfig;
pub use config::LedgerConfig;
pub use config::PolicyConfig;
pub use config::ServerConfig;
pub use config::SigningConfig;
pub use config::StoreConfig;
pub use keys::resolve_attestation_keys;
pub use keys::resolve_export_key_ring;

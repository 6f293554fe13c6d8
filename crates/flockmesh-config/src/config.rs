// crates/flockmesh-config/src/config.rs
// ============================================================================
// Module: Flockmesh Configuration
// Description: TOML configuration with recognized environment overrides.
// Purpose: Assemble the control plane's startup settings with validation.
// Dependencies: flockmesh-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration loads from `flockmesh.toml` (path optional; defaults apply
//! when the file is absent) and is then overlaid with the recognized
//! `FLOCKMESH_*` environment variables. Validation rejects malformed actor
//! ids, key ids, and out-of-range retry attempts before the server starts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;

use flockmesh_core::identifiers::validate_actor_id;
use flockmesh_core::identifiers::validate_signing_key_id;
use flockmesh_core::runtime::RateLimitConfig;
use flockmesh_core::runtime::RetryPolicy;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Environment Variables
// ============================================================================

/// Adapter deadline override.
pub const ENV_ADAPTER_TIMEOUT_MS: &str = "FLOCKMESH_ADAPTER_TIMEOUT_MS";
/// Adapter retry policy override (JSON).
pub const ENV_ADAPTER_RETRY_POLICY: &str = "FLOCKMESH_ADAPTER_RETRY_POLICY";
/// Connector rate limit policy override (JSON).
pub const ENV_RATE_LIMIT_POLICY: &str = "FLOCKMESH_CONNECTOR_RATE_LIMIT_POLICY";
/// Export signing keys override (JSON object of key id to secret).
pub const ENV_EXPORT_SIGN_KEYS: &str = "FLOCKMESH_INCIDENT_EXPORT_SIGN_KEYS";
/// Active export signing key id override.
pub const ENV_EXPORT_SIGN_KEY_ID: &str = "FLOCKMESH_INCIDENT_EXPORT_SIGN_KEY_ID";
/// Connector attestation keys override (JSON object of key id to secret).
pub const ENV_ATTESTATION_KEYS: &str = "FLOCKMESH_CONNECTOR_ATTESTATION_KEYS";
/// Trusted fallback actor id for internal callers.
pub const ENV_TRUSTED_DEFAULT_ACTOR: &str = "FLOCKMESH_TRUSTED_DEFAULT_ACTOR_ID";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Configuration file failed to parse.
    #[error("config parse error: {0}")]
    Parse(String),
    /// An environment override failed to parse.
    #[error("config env override '{name}' invalid: {reason}")]
    Env {
        /// Environment variable name.
        name: &'static str,
        /// Parse failure reason.
        reason: String,
    },
    /// Configuration failed validation.
    #[error("config validation error: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// HTTP server section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Trusted fallback actor id for internal callers.
    #[serde(default)]
    pub trusted_default_actor_id: Option<String>,
}

/// Returns the default bind address.
fn default_bind_addr() -> String {
    "127.0.0.1:7710".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            trusted_default_actor_id: None,
        }
    }
}

/// State store section.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Returns the default database path.
fn default_store_path() -> PathBuf {
    PathBuf::from("data/flockmesh.db")
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Ledger section.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Root directory for `events/`, `audit/`, and `policy-patches/`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Returns the default data directory.
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Policy catalog section.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Directory holding `<name>.policy.json` documents.
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: PathBuf,
    /// Actors allowed to change any profile.
    #[serde(default)]
    pub global_admins: BTreeSet<String>,
    /// Actors allowed to change specific profiles.
    #[serde(default)]
    pub profile_admins: BTreeMap<String, BTreeSet<String>>,
}

/// Returns the default profiles directory.
fn default_profiles_dir() -> PathBuf {
    PathBuf::from("policies")
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            profiles_dir: default_profiles_dir(),
            global_admins: BTreeSet::new(),
            profile_admins: BTreeMap::new(),
        }
    }
}

/// Connector section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorConfig {
    /// Adapter deadline in milliseconds.
    #[serde(default = "default_adapter_timeout_ms")]
    pub adapter_timeout_ms: u64,
    /// Adapter retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Rate limit policy.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Manifest catalog file (JSON array of manifests).
    #[serde(default)]
    pub manifests_path: Option<PathBuf>,
    /// MCP allowlist file (JSON).
    #[serde(default)]
    pub mcp_allowlist_path: Option<PathBuf>,
    /// Playbook catalog file (JSON).
    #[serde(default)]
    pub playbooks_path: Option<PathBuf>,
}

/// Returns the default adapter deadline.
const fn default_adapter_timeout_ms() -> u64 {
    10_000
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            adapter_timeout_ms: default_adapter_timeout_ms(),
            retry: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            manifests_path: None,
            mcp_allowlist_path: None,
            playbooks_path: None,
        }
    }
}

/// Signing section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SigningConfig {
    /// Export signing secrets by key id.
    #[serde(default)]
    pub export_keys: BTreeMap<String, String>,
    /// Active export signing key id.
    #[serde(default)]
    pub export_key_id: Option<String>,
    /// Connector attestation secrets by key id.
    #[serde(default)]
    pub attestation_keys: BTreeMap<String, String>,
}

// ============================================================================
// SECTION: Root Configuration
// ============================================================================

/// Flockmesh control plane configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FlockmeshConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// State store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Ledger settings.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Policy catalog settings.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Connector settings.
    #[serde(default)]
    pub connector: ConnectorConfig,
    /// Signing settings.
    #[serde(default)]
    pub signing: SigningConfig,
}

impl FlockmeshConfig {
    /// Loads configuration from an optional TOML file plus the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unreadable files, parse failures, invalid
    /// environment overrides, and validation failures.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
                toml::from_str(&content).map_err(|err| ConfigError::Parse(err.to_string()))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(&EnvSource::process())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies the recognized `FLOCKMESH_*` overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] when an override fails to parse.
    pub fn apply_env_overrides(&mut self, env: &EnvSource) -> Result<(), ConfigError> {
        if let Some(value) = env.get(ENV_ADAPTER_TIMEOUT_MS) {
            self.connector.adapter_timeout_ms =
                value.parse().map_err(|_| ConfigError::Env {
                    name: ENV_ADAPTER_TIMEOUT_MS,
                    reason: format!("expected milliseconds, got '{value}'"),
                })?;
        }
        if let Some(value) = env.get(ENV_ADAPTER_RETRY_POLICY) {
            self.connector.retry =
                serde_json::from_str(&value).map_err(|err| ConfigError::Env {
                    name: ENV_ADAPTER_RETRY_POLICY,
                    reason: err.to_string(),
                })?;
        }
        if let Some(value) = env.get(ENV_RATE_LIMIT_POLICY) {
            self.connector.rate_limit =
                serde_json::from_str(&value).map_err(|err| ConfigError::Env {
                    name: ENV_RATE_LIMIT_POLICY,
                    reason: err.to_string(),
                })?;
        }
        if let Some(value) = env.get(ENV_EXPORT_SIGN_KEYS) {
            self.signing.export_keys =
                serde_json::from_str(&value).map_err(|err| ConfigError::Env {
                    name: ENV_EXPORT_SIGN_KEYS,
                    reason: err.to_string(),
                })?;
        }
        if let Some(value) = env.get(ENV_EXPORT_SIGN_KEY_ID) {
            self.signing.export_key_id = Some(value);
        }
        if let Some(value) = env.get(ENV_ATTESTATION_KEYS) {
            self.signing.attestation_keys =
                serde_json::from_str(&value).map_err(|err| ConfigError::Env {
                    name: ENV_ATTESTATION_KEYS,
                    reason: err.to_string(),
                })?;
        }
        if let Some(value) = env.get(ENV_TRUSTED_DEFAULT_ACTOR) {
            self.server.trusted_default_actor_id = Some(value);
        }
        Ok(())
    }

    /// Validates the assembled configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(actor) = &self.server.trusted_default_actor_id {
            validate_actor_id(actor).map_err(|err| {
                ConfigError::Invalid(format!("server.trusted_default_actor_id: {err}"))
            })?;
        }
        if self.connector.adapter_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connector.adapter_timeout_ms must be positive".to_string(),
            ));
        }
        if !(1..=5).contains(&self.connector.retry.max_attempts) {
            return Err(ConfigError::Invalid(
                "connector.retry.max_attempts must be in 1..=5".to_string(),
            ));
        }
        for key_id in self.signing.export_keys.keys() {
            validate_signing_key_id(key_id).map_err(|err| {
                ConfigError::Invalid(format!("signing.export_keys: {err}"))
            })?;
        }
        if let Some(key_id) = &self.signing.export_key_id {
            if !self.signing.export_keys.contains_key(key_id) {
                return Err(ConfigError::Invalid(format!(
                    "signing.export_key_id '{key_id}' has no configured secret"
                )));
            }
        }
        for admin in &self.policy.global_admins {
            validate_actor_id(admin)
                .map_err(|err| ConfigError::Invalid(format!("policy.global_admins: {err}")))?;
        }
        for admins in self.policy.profile_admins.values() {
            for admin in admins {
                validate_actor_id(admin).map_err(|err| {
                    ConfigError::Invalid(format!("policy.profile_admins: {err}"))
                })?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Environment Source
// ============================================================================

/// Environment lookup seam, swappable for tests.
pub struct EnvSource {
    /// Lookup function.
    lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl EnvSource {
    /// Reads from the process environment.
    #[must_use]
    pub fn process() -> Self {
        Self {
            lookup: Box::new(|name| std::env::var(name).ok()),
        }
    }

    /// Reads from a fixed map (tests).
    #[must_use]
    pub fn fixed(values: BTreeMap<String, String>) -> Self {
        Self {
            lookup: Box::new(move |name| values.get(name).cloned()),
        }
    }

    /// Returns the value for a variable, when set.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

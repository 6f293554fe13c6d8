// crates/flockmesh-server/src/state.rs
// ============================================================================
// Module: Server State
// Description: Wiring of stores, ledgers, catalogs, and runtime components.
// Purpose: Build one shared application state from configuration.
// Dependencies: flockmesh-config, flockmesh-core, flockmesh-ledger, flockmesh-store-sqlite
// ============================================================================

//! ## Overview
//! `AppState::build` opens the SQLite store and file ledger, loads the
//! catalogs, resolves the signing key ring, and assembles the run engine,
//! connector guard, patch pipeline, and integrity views around them. Adapter
//! implementations are injected by the host; the bundled echo adapter exists
//! for demos and tests only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use flockmesh_config::FlockmeshConfig;
use flockmesh_core::ActorId;
use flockmesh_core::AdapterError;
use flockmesh_core::AdapterRequest;
use flockmesh_core::ConnectorAdapter;
use flockmesh_core::ConnectorManifest;
use flockmesh_core::LedgerStore;
use flockmesh_core::PatchHistoryStore;
use flockmesh_core::ProfileWriter;
use flockmesh_core::SigningKeyRing;
use flockmesh_core::StateStore;
use flockmesh_core::policy::PolicyLibrary;
use flockmesh_core::runtime::ConnectorGuard;
use flockmesh_core::runtime::IntegrityViews;
use flockmesh_core::runtime::LatticeFallbacks;
use flockmesh_core::runtime::PatchPipeline;
use flockmesh_core::runtime::PolicyAdminConfig;
use flockmesh_core::runtime::Recorder;
use flockmesh_core::runtime::RunEngine;
use flockmesh_core::runtime::SlidingWindowLimiter;
use flockmesh_ledger::FileLedgerStore;
use flockmesh_ledger::JsonlHistoryStore;
use flockmesh_store_sqlite::SqliteStateStore;
use flockmesh_store_sqlite::SqliteStoreConfig;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::identity::IdentityGate;

// ============================================================================
// SECTION: Build Errors
// ============================================================================

/// Errors raised while building the application state.
#[derive(Debug, Error)]
pub enum StateBuildError {
    /// State store failed to open.
    #[error("state store init failed: {0}")]
    Store(String),
    /// Ledger failed to open.
    #[error("ledger init failed: {0}")]
    Ledger(String),
    /// Catalog failed to load.
    #[error("catalog load failed: {0}")]
    Catalog(String),
    /// Signing key ring failed to resolve.
    #[error("signing key ring failed: {0}")]
    Signing(String),
}

// ============================================================================
// SECTION: Demo Adapter
// ============================================================================

/// Deterministic echo adapter for demos and tests.
///
/// Production deployments register real adapter implementations instead; the
/// guard returns 501 for connectors without one.
pub struct EchoAdapter;

#[async_trait]
impl ConnectorAdapter for EchoAdapter {
    async fn simulate(&self, request: &AdapterRequest) -> Result<Value, AdapterError> {
        Ok(json!({
            "simulated": true,
            "capability": request.capability.as_str(),
            "parameters": request.parameters,
        }))
    }

    async fn invoke(&self, request: &AdapterRequest) -> Result<Value, AdapterError> {
        Ok(json!({
            "delivered": true,
            "connector_id": request.connector_id.as_str(),
            "capability": request.capability.as_str(),
            "parameters": request.parameters,
        }))
    }
}

// ============================================================================
// SECTION: App State
// ============================================================================

/// Shared application state behind the router.
pub struct AppState {
    /// Identity gate.
    pub identity: IdentityGate,
    /// Authoritative state store.
    pub store: Arc<dyn StateStore>,
    /// Dual ledger.
    pub ledger: Arc<dyn LedgerStore>,
    /// Policy profile library.
    pub library: Arc<PolicyLibrary>,
    /// Run lifecycle engine.
    pub engine: RunEngine,
    /// Connector invocation guard.
    pub guard: ConnectorGuard,
    /// Policy patch pipeline.
    pub patches: PatchPipeline,
    /// Integrity views.
    pub views: IntegrityViews,
    /// Export signing key ring.
    pub key_ring: Arc<SigningKeyRing>,
    /// Connector manifest catalog.
    pub manifests: Arc<BTreeMap<String, ConnectorManifest>>,
}

impl AppState {
    /// Builds the application state from configuration and adapters.
    ///
    /// # Errors
    ///
    /// Returns [`StateBuildError`] when any backend or catalog fails to
    /// initialize.
    pub fn build(
        config: &FlockmeshConfig,
        adapters: BTreeMap<String, Arc<dyn ConnectorAdapter>>,
    ) -> Result<Self, StateBuildError> {
        let store: Arc<dyn StateStore> = Arc::new(
            SqliteStateStore::new(&SqliteStoreConfig {
                path: config.store.path.clone(),
                busy_timeout_ms: config.store.busy_timeout_ms,
            })
            .map_err(|err| StateBuildError::Store(err.to_string()))?,
        );
        let ledger: Arc<dyn LedgerStore> = Arc::new(
            FileLedgerStore::new(&config.ledger.data_dir)
                .map_err(|err| StateBuildError::Ledger(err.to_string()))?,
        );
        let history: Arc<dyn PatchHistoryStore> = Arc::new(
            JsonlHistoryStore::new(config.ledger.data_dir.join("policy-patches/history.jsonl"))
                .map_err(|err| StateBuildError::Ledger(err.to_string()))?,
        );
        let library = Arc::new(
            flockmesh_config::load_policy_library(&config.policy.profiles_dir)
                .map_err(|err| StateBuildError::Catalog(err.to_string()))?,
        );
        let writer: Arc<dyn ProfileWriter> = Arc::new(
            flockmesh_config::FileProfileWriter::new(&config.policy.profiles_dir)
                .map_err(|err| StateBuildError::Catalog(err.to_string()))?,
        );
        let attestation_keys = flockmesh_config::resolve_attestation_keys(&config.signing);
        let manifests = Arc::new(
            flockmesh_config::load_manifests(
                config.connector.manifests_path.as_deref(),
                &attestation_keys,
            )
            .map_err(|err| StateBuildError::Catalog(err.to_string()))?,
        );
        let allowlist =
            flockmesh_config::load_mcp_allowlist(config.connector.mcp_allowlist_path.as_deref())
                .map_err(|err| StateBuildError::Catalog(err.to_string()))?;
        let playbooks = Arc::new(
            flockmesh_config::load_playbooks(config.connector.playbooks_path.as_deref())
                .map_err(|err| StateBuildError::Catalog(err.to_string()))?,
        );
        let key_ring = Arc::new(
            flockmesh_config::resolve_export_key_ring(&config.signing)
                .map_err(|err| StateBuildError::Signing(err.to_string()))?,
        );

        let recorder = Recorder::new(Arc::clone(&ledger));
        let fallbacks = LatticeFallbacks::default();
        let engine = RunEngine::new(
            Arc::clone(&store),
            recorder.clone(),
            Arc::clone(&library),
            playbooks,
            fallbacks.clone(),
        );
        let limiter = Arc::new(SlidingWindowLimiter::new(config.connector.rate_limit.clone()));
        let guard = ConnectorGuard::new(
            Arc::clone(&store),
            recorder.clone(),
            Arc::clone(&library),
            Arc::clone(&manifests),
            Arc::new(adapters),
            allowlist,
            limiter,
            engine.idempotency().clone(),
            config.connector.retry,
            config.connector.adapter_timeout_ms,
            fallbacks.clone(),
        );
        let patches = PatchPipeline::new(
            Arc::clone(&library),
            writer,
            Arc::clone(&history),
            recorder,
            PolicyAdminConfig {
                global_admins: config.policy.global_admins.clone(),
                profile_admins: config.policy.profile_admins.clone(),
            },
            fallbacks,
        );
        let views = IntegrityViews::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            history,
            Arc::clone(&key_ring),
            2_000,
        );
        let identity = IdentityGate::new(
            config.server.trusted_default_actor_id.clone().map(ActorId::new),
        );

        Ok(Self {
            identity,
            store,
            ledger,
            library,
            engine,
            guard,
            patches,
            views,
            key_ring,
            manifests,
        })
    }
}

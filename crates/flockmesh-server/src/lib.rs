// crates/flockmesh-server/src/lib.rs
// ============================================================================
// Module: Flockmesh Server
// Description: HTTP boundary for the Flockmesh control plane.
// Purpose: Expose the /v0 surface over axum with identity and error mapping.
// Dependencies: axum, flockmesh-config, flockmesh-core, tokio
// ============================================================================

//! ## Overview
//! The server crate is strictly a boundary: it authenticates the actor,
//! validates wire formats, translates DTOs into core requests, and maps core
//! errors onto the HTTP taxonomy. All behavior lives in `flockmesh-core`;
//! adapters are injected by the host binary.

/// Request/response DTOs.
pub mod dto;
/// HTTP error mapping.
pub mod error;
/// Identity gate.
pub mod identity;
/// Route handlers.
pub mod routes;
/// Application state wiring.
pub mod state;

use std::collections::BTreeMap;
use std::sync::Arc;

use flockmesh_config::FlockmeshConfig;
use flockmesh_core::ConnectorAdapter;
use thiserror::Error;

pub use error::ApiError;
pub use identity::ACTOR_HEADER;
pub use identity::IdentityGate;
pub use routes::router;
pub use state::AppState;
pub use state::EchoAdapter;
pub use state::StateBuildError;

/// Errors raised when serving the HTTP API.
#[derive(Debug, Error)]
pub enum ServeError {
    /// State construction failed.
    #[error(transparent)]
    Build(#[from] StateBuildError),
    /// Listener could not bind or serve.
    #[error("server io error: {0}")]
    Io(String),
}

/// Builds the application state and serves the API until shutdown.
///
/// # Errors
///
/// Returns [`ServeError`] when state construction or the listener fails.
pub async fn serve(
    config: &FlockmeshConfig,
    adapters: BTreeMap<String, Arc<dyn ConnectorAdapter>>,
) -> Result<(), ServeError> {
    let state = Arc::new(AppState::build(config, adapters)?);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .map_err(|err| ServeError::Io(err.to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|err| ServeError::Io(err.to_string()))
}

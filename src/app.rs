use std::sync::Arc;

use anyhow::Context;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::authz::{DecisionEngine, PolicyStore};
use crate::config::GatewayConfig;
use crate::directory::{DirectoryClient, HttpDirectoryClient};
use crate::middleware::authorize_request;
use crate::plugins;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DecisionEngine>,
}

impl AppState {
    pub fn new(
        config: &GatewayConfig,
        store: Arc<PolicyStore>,
        directory: Arc<dyn DirectoryClient>,
    ) -> anyhow::Result<Self> {
        let engine = DecisionEngine::new(config, store, directory).context("failed to build decision engine")?;
        Ok(Self {
            engine: Arc::new(engine),
        })
    }
}

/// Seeds the catalog, loads every plugin, then wires the HTTP directory client.
///
/// Returns only after plugin loading has finished, so the server never sees a
/// partially populated store.
pub fn build_state(config: &GatewayConfig) -> anyhow::Result<AppState> {
    let store = Arc::new(PolicyStore::with_catalog());

    if config.plugin_base_path.is_dir() {
        let summaries = plugins::load_plugins(&config.plugin_base_path, &store, &config.client_ids)?;
        tracing::info!(plugins = summaries.len(), "plugins loaded");
    } else {
        tracing::warn!(path = %config.plugin_base_path.display(), "plugin directory not found, serving core policy only");
    }

    let directory_url = config.directory_url.as_deref().context("DIRECTORY_URL must be set")?;
    let directory: Arc<dyn DirectoryClient> = Arc::new(HttpDirectoryClient::new(directory_url));

    AppState::new(config, store, directory)
}

#[derive(Serialize)]
struct HealthResponse {
    message: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { message: "ok" })
}

/// Puts the authorization middleware in front of `dispatcher` and the health route.
pub fn create_app(state: AppState, dispatcher: Router) -> Router {
    Router::new()
        .route("/_internal/health", get(health))
        .merge(dispatcher)
        .layer(from_fn_with_state(state, authorize_request))
        .layer(TraceLayer::new_for_http())
}

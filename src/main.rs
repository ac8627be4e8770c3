use std::net::SocketAddr;

use axum::http::{StatusCode, Uri};
use axum::Router;

use gateway_authz::{build_state, create_app, GatewayConfig};

/// Stand-in for the plugin dispatcher: authorized requests with no handler get a 404.
async fn unrouted(uri: Uri) -> StatusCode {
    tracing::debug!(path = %uri.path(), "no handler registered");
    StatusCode::NOT_FOUND
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let config = GatewayConfig::from_env()?;
    let state = build_state(&config)?;
    let app = create_app(state, Router::new().fallback(unrouted));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

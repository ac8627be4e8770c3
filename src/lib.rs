pub mod app;
pub mod authz;
pub mod config;
pub mod directory;
pub mod errors;
pub mod jwt;
pub mod middleware;
pub mod plugins;

// Re-export commonly used items for tests
pub use app::{build_state, create_app, AppState};
pub use config::GatewayConfig;
pub use middleware::AuthorizedCaller;

use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{ClanError, Result};

pub mod api;
pub mod routes;
pub mod state;

pub use state::AppState;

pub async fn run_server(config: AppConfig) -> Result<()> {
    let state = AppState::from_config(&config)?;
    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|err| ClanError::Config(format!("cannot bind {}: {err}", config.bind_addr)))?;
    info!(
        bind = %config.bind_addr,
        members_file = %config.members_file.display(),
        clans_file = %config.clans_file.display(),
        secret_configured = config.secret.is_configured(),
        extraction_configured = config.extract.api_key.is_some(),
        "clanstats server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| ClanError::Config(format!("server stopped: {err}")))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => {
            warn!(error = %err, "cannot listen for ctrl-c; running until killed");
            std::future::pending::<()>().await
        }
    }
}

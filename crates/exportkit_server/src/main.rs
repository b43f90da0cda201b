use std::process::ExitCode;
use std::sync::Arc;

use exportkit_server::config::load_dotenv;
use exportkit_server::telemetry::init_tracing;
use exportkit_server::{
    AppState, PgRecordSource, ServiceRecordSource, SpecServerConfig, StartupError,
    UpstreamRecordSource, build_router,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let res_dotenv = load_dotenv();
    init_tracing();
    if let Err(reason) = res_dotenv {
        warn!(%reason, ".env file not found, using environment variables");
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Server stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let config = SpecServerConfig::from_env()?;
    info!(?config, "Configuration loaded");

    let source_pg = PgRecordSource::connect(&config).await?;
    let source_upstream = UpstreamRecordSource::from_config(&config)?;
    if source_upstream.is_some() {
        info!("Upstream record API enabled");
    }
    let state = Arc::new(AppState::new(
        ServiceRecordSource::new(source_pg, source_upstream),
        &config,
    ));

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Starting server");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

use std::net::{Ipv4Addr, SocketAddr};

use accounts::{app, initialize_state, telemetry};
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();

    let state = initialize_state().await?;
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, state.config.port));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, version = state.config.version, "accounts server started");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

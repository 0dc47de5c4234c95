//! Notifier binary: local overlay server, realtime session, and console.

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use courtside_notifier_lib::app::SharedState;
use courtside_notifier_lib::{console, shutdown};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Step 1: Tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting Courtside notifier");

    // Step 2: Foundation
    let (db, config, dir) = courtside_notifier_lib::init_foundation()?;
    let state = SharedState::new(db, config, dir);

    // Step 3: Web server + realtime session
    let server_handle = courtside_notifier_lib::spawn_background_tasks(&state);

    // Step 4: Console
    let s = state.clone();
    tokio::spawn(async move { console::run(s).await });

    tracing::info!(
        port = state.server_port(),
        "Notifier running. Type `help` for commands, Ctrl+C to stop."
    );

    // Wait for Ctrl+C or `quit`
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = state.shutdown_token().cancelled() => {}
    }
    tracing::info!("Shutting down...");

    shutdown::graceful_shutdown(&state).await;
    match tokio::time::timeout(Duration::from_secs(2), server_handle).await {
        Ok(Err(e)) => tracing::warn!("Server task ended abnormally: {e}"),
        Err(_) => tracing::warn!("Server did not stop in time"),
        Ok(Ok(())) => {}
    }
    Ok(())
}

//! dashlink service entry point
//!
//! Usage: `dashlink [CONFIG_PATH]` (defaults to `dashlink.conf`).
//! Log verbosity follows `RUST_LOG` and defaults to `info`.

use std::sync::Arc;

use anyhow::{Context, Result};
use dashlink_core::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "dashlink.conf";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = BridgeConfig::from_file(&path)
        .with_context(|| format!("Failed to load configuration from {}", path))?;
    info!(
        version = dashlink_core::VERSION,
        config = %path,
        "Starting dashlink"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    let stats = Bridge::new(Arc::new(config))
        .run(TokioSerialConnector, cancel)
        .await
        .context("Bridge failed to start")?;

    info!(
        written = stats.written,
        dropped = stats.dropped,
        "Shutdown complete"
    );
    Ok(())
}

async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown requested");
    cancel.cancel();
}

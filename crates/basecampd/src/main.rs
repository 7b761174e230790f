//! basecampd — swarm rendezvous tracker daemon.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use basecamp_core::config::TrackerConfig;
use basecamp_services::AvailabilityRegistry;
use basecampd::Dispatcher;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = TrackerConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = TrackerConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        TrackerConfig::default()
    });

    let bind = SocketAddr::new(config.network.bind_address, config.network.listen_port);
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind tracker listener on {bind}"))?;
    tracing::info!(addr = %listener.local_addr()?, "basecampd listening");

    // The registry is built here and handed down — never ambient state.
    let registry = AvailabilityRegistry::new();

    let idle_timeout = match config.session.idle_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    if idle_timeout.is_none() {
        tracing::warn!("idle timeout disabled — silent peers hold their sessions forever");
    }

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Run ──────────────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();
    let dispatcher_task =
        tokio::spawn(Dispatcher::new(listener, registry, idle_timeout, shutdown_tx).run());

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = dispatcher_task => match r {
            Ok(Ok(())) => tracing::info!("dispatcher exited"),
            Ok(Err(e)) => return Err(e.context("dispatcher failed")),
            Err(e) => tracing::error!(error = %e, "dispatcher task panicked"),
        },
    }

    Ok(())
}

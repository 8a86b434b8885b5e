mod config;
mod pump;
mod routes;

use std::sync::Arc;

use anyhow::Context;
use mjcast_hub::Hub;
use mjcast_transport::{MulticastReceiver, ReceiverConfig, TracingLogger};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Settings;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mjcast_proxy=debug,mjcast_transport=info,mjcast_hub=info,tower_http=debug".into()),
        )
        .init();

    let settings = Settings::from_env().context("invalid configuration")?;

    let receiver = MulticastReceiver::open(ReceiverConfig {
        group: settings.addr.clone(),
        interface: settings.iface.clone(),
        logger: Arc::new(TracingLogger),
    })
    .await
    .with_context(|| format!("failed to open receiver for {}", settings.addr))?;
    match receiver.joined_interface() {
        Some(iface) => info!("Receiving {} on {} ({})", settings.addr, iface.name, iface.addr),
        None => info!("Receiving {} without group membership", settings.addr),
    }

    let hub = Hub::new();
    let cancel = CancellationToken::new();
    let receiver_stats = receiver.stats();

    let pump = tokio::spawn(pump::run_pump(receiver, hub.clone(), cancel.clone()));
    let report = tokio::spawn(pump::run_client_report(
        hub.clone(),
        pump::CLIENT_REPORT_INTERVAL,
        cancel.clone(),
    ));

    let app = routes::router(AppState {
        hub: hub.clone(),
        client_queue: settings.client_queue,
        receiver_stats,
    });

    let listener = tokio::net::TcpListener::bind(settings.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.http_addr))?;
    info!("mjcast proxy listening on http://{}", settings.http_addr);

    // Open /stream responses never finish on their own, so ending every
    // subscription is what lets graceful shutdown complete.
    let shutdown_hub = hub.clone();
    let shutdown_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_cancel.cancel();
            shutdown_hub.close();
        })
        .await?;

    cancel.cancel();
    let broadcasted = pump.await?;
    report.await?;
    info!("Proxy stopped after broadcasting {} frames", broadcasted);

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            },
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

mod bandwidth;
mod change;
mod config;
mod control;
mod source;

use std::sync::Arc;

use anyhow::Context;
use mjcast_transport::{MulticastSender, SenderConfig, TracingLogger};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Settings;
use crate::control::ControlLoop;
use crate::source::SlideshowSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mjcast_sender=info,mjcast_transport=info".into()),
        )
        .init();

    let settings = Settings::from_env().context("invalid configuration")?;

    let source = SlideshowSource::load(&settings.slides, settings.slide_interval)
        .context("failed to load slideshow")?;
    info!(
        "Slideshow: {} slides, {}s each",
        source.len(),
        settings.slide_interval.as_secs()
    );

    let sender = MulticastSender::open(SenderConfig {
        target: settings.addr.clone(),
        interface: settings.iface.clone(),
        ttl: settings.ttl,
        logger: Arc::new(TracingLogger),
    })
    .await
    .with_context(|| format!("failed to open sender for {}", settings.addr))?;
    info!(
        "mjcast sender -> {} (mtu={}, repeats={}, ttl={})",
        sender.target(),
        settings.mtu,
        settings.repeats,
        settings.ttl
    );

    let cancel = CancellationToken::new();
    let control = ControlLoop::new(source, sender, settings.mtu, settings.repeats);
    let task = tokio::spawn(control.run(cancel.clone()));

    shutdown_signal().await;
    cancel.cancel();
    let stats = task.await?;
    info!(
        "Sent {} frames, skipped {} unchanged, {} source errors, {} send errors",
        stats.sent, stats.skipped, stats.source_errors, stats.send_errors
    );

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

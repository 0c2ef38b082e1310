use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use leadwatch::config::MonitorConfig;
use leadwatch::connectors::{BridgeConnector, ChatConnector};
use leadwatch::pipeline::LeadMonitor;

/// Console logging, plus a daily-rolling file when `LEADWATCH_LOG_DIR` is set.
///
/// The returned guard must live as long as the process so buffered file
/// output is flushed on exit.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match std::env::var("LEADWATCH_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "leadwatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

/// Load configuration and build the bridge connector.
fn prepare() -> leadwatch::error::Result<(MonitorConfig, BridgeConnector)> {
    let config = MonitorConfig::from_env()?;
    let connector = BridgeConnector::new(&config.bridge)?;
    Ok((config, connector))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();

    let (config, connector) = prepare().context("Failed to start")?;

    eprintln!("🔎 leadwatch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Bridge: {}", config.bridge.base_url);
    eprintln!(
        "   Listening: {}",
        if config.listen_names.is_empty() {
            "(nothing; set LEADWATCH_LISTEN)".to_string()
        } else {
            config.listen_names.join(", ")
        }
    );
    eprintln!(
        "   Keywords: {} required, {} blacklist, {} override",
        config.keywords.required.len(),
        config.keywords.blacklist.len(),
        config.keywords.overrides.len()
    );
    eprintln!("   Results: {}", config.result_path.display());
    eprintln!(
        "   Every {}s, last {} messages per chat. Ctrl-C to stop.\n",
        config.poll_interval.as_secs(),
        config.recent_window
    );

    if config.listen_names.is_empty() {
        tracing::warn!("No listen names configured; no conversation will be monitored");
    }
    if config.keywords.required.is_empty() {
        tracing::warn!("No required keywords configured; no message can become a lead");
    }

    connector
        .connect()
        .await
        .context("Cannot reach the chat client; is the bridge running?")?;
    let connector: Arc<dyn ChatConnector> = Arc::new(connector);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Stop requested");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut monitor = LeadMonitor::new(&config, connector);
    monitor.run(shutdown_rx).await;

    Ok(())
}

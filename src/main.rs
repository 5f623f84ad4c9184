use anyhow::Context;
use chrono::Utc;
use spread_monitor::{
    init_logging, AlertRouter, IngestionAdapter, MonitorConfig, RefreshCycle, RefreshOutput,
    SeriesHandle, SymbolPair, WebhookChannel,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = MonitorConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        feed = %config.feed.stream_url(),
        capacity = config.buffer_capacity,
        refresh_ms = config.refresh_interval.as_millis() as u64,
        "Starting spread monitor"
    );

    let handle = SeriesHandle::new(config.buffer_capacity)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let adapter = IngestionAdapter::new(handle.clone(), config.feed.symbols.clone());
    let stats = adapter.stats();
    let ingestion = tokio::spawn({
        let feed = config.feed.clone();
        async move { adapter.run(feed, shutdown_rx).await }
    });

    let mut router = AlertRouter::new();
    if let Some(url) = &config.webhook_url {
        router.add_channel(Box::new(WebhookChannel::new(url)));
        tracing::info!("Webhook alert channel enabled");
    }
    let router = Arc::new(router);

    let requested = config.refresh;
    let mut cycle = RefreshCycle::new(handle.clone(), config.kalman, requested)
        .context("invalid smoother parameters")?;
    let mut ticker = interval(config.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, shutting down");
                break;
            }
            _ = ticker.tick() => {
                if ingestion.is_finished() {
                    tracing::error!("Ingestion task exited, stopping");
                    break;
                }
                let output = cycle.tick(
                    &requested.mode.to_string(),
                    &requested.granularity.to_string(),
                    requested.threshold.value(),
                    Utc::now(),
                );
                if let Some(output) = output {
                    render(&output, &config.feed.symbols);
                    // Delivery runs off the refresh loop so a slow channel
                    // cannot hold up the next tick or Ctrl-C
                    if let Some(alert) = output.alert.alert() {
                        let router = Arc::clone(&router);
                        let alert = alert.clone();
                        tokio::spawn(async move {
                            router.dispatch(&alert).await;
                        });
                    }
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    match ingestion.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Ingestion ended: {}", e),
        Err(e) => tracing::error!("Ingestion task panicked: {}", e),
    }

    tracing::info!(stats = ?stats.snapshot(), buffered = handle.len(), "Spread monitor stopped");
    Ok(())
}

/// Presentation sink: one structured log event per refresh
fn render(output: &RefreshOutput, symbols: &SymbolPair) {
    for series in &output.prices {
        if let Some(last) = series.points.last() {
            tracing::info!(
                symbol = symbols.label(series.symbol),
                points = series.points.len(),
                price = last.value,
                "Price"
            );
        }
    }

    if let Some(spread) = &output.spread {
        if let (Some(raw), Some(smoothed)) = (spread.spread.last(), spread.smoothed.last()) {
            tracing::info!(spread = raw.value, smoothed = smoothed.value, "Spread");
        }
    }

    if let Some(zscore) = output.zscore.as_ref().and_then(|z| z.points.last()) {
        match zscore.1 {
            Some(z) => tracing::info!(zscore = z, threshold = %output.params.threshold, "Z-score"),
            None => tracing::info!("Z-score undefined for current window"),
        }
    }

    match serde_json::to_string(output) {
        Ok(json) => tracing::trace!(payload = %json, "Refresh payload"),
        Err(e) => tracing::warn!("Failed to serialize refresh payload: {}", e),
    }
}

//! tapeflow binary: wire the trade feed into the aggregation engine and
//! report signals through structured logging.

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, trace, warn};
use tracing_subscriber::EnvFilter;

use tapeflow::config::AppConfig;
use tapeflow::engine::FlowEngine;
use tapeflow::feed::{BinanceFeed, FeedEvent, TradeSource};
use tapeflow::types::EngineEvent;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    info!(config = %config.digest(), "Starting tapeflow");

    let engine_config = config.engine_config().context("Invalid configuration")?;
    let mut engine = FlowEngine::new(engine_config).context("Failed to build engine")?;

    // Single bounded channel: the feed task produces, this loop is the only
    // consumer, so ingestion stays strictly serial.
    let (tx, mut rx) = mpsc::channel(config.feed.channel_capacity);
    let feed_config = config.feed.clone();
    let feed_task = tokio::spawn(async move {
        let mut feed = BinanceFeed::new(feed_config);
        if let Err(e) = feed.run(tx).await {
            error!(error = %e, "Feed terminated");
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else {
                    warn!("Feed channel closed");
                    break;
                };
                match event {
                    FeedEvent::Trade(raw) => match engine.ingest(&raw) {
                        Ok(events) => report(&engine, &events),
                        Err(e) => warn!(error = %e, "Dropped trade"),
                    },
                    FeedEvent::Connected => info!("Feed connected"),
                    FeedEvent::Disconnected => warn!("Feed disconnected"),
                    FeedEvent::Error(msg) => warn!(error = %msg, "Feed error"),
                }
            }
        }
    }

    feed_task.abort();
    let stats = engine.stats();
    info!(
        trades = stats.trades,
        rejected = stats.rejected,
        "Stopped"
    );
    Ok(())
}

/// Log engine output; a richer presentation layer would subscribe here.
fn report(engine: &FlowEngine, events: &[EngineEvent]) {
    for event in events {
        match event {
            EngineEvent::BucketUpdated {
                timeframe,
                bucket_id,
                candle,
            } => {
                trace!(
                    %timeframe,
                    %bucket_id,
                    close = candle.close,
                    buy = candle.buy_volume,
                    sell = candle.sell_volume,
                    trades = candle.trade_count,
                    "bucket updated"
                );
            }
            EngineEvent::WindowReady { timeframe } => {
                info!(%timeframe, "window ready for display");
            }
            EngineEvent::Signal(signal) => {
                let gauges: Vec<String> = engine
                    .gauges()
                    .iter()
                    .map(|g| format!("{}:{:+.2}", g.window, g.imbalance()))
                    .collect();
                info!(
                    timeframe = %signal.timeframe,
                    direction = %signal.direction,
                    magnitude = format!("{:.3}", signal.magnitude),
                    bucket = %signal.bucket_id,
                    level = engine.level(),
                    gauges = gauges.join(" "),
                    "🚨 Imbalance signal"
                );
            }
        }
    }
}

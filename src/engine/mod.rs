//! Streaming aggregation-and-signal engine
//!
//! Owns all mutable state (level mapper, trade history, candle windows) and
//! exposes a single serial `ingest` path: normalize, level-map, record,
//! aggregate per timeframe, and evaluate imbalance signals on bucket
//! finalization. No ambient globals; construction takes a validated
//! configuration.

pub mod candles;
pub mod history;
pub mod imbalance;
pub mod level;

pub use candles::{CandleWindow, WindowUpdate};
pub use history::{TradeHistory, VolumeGauge};
pub use imbalance::{ImbalanceDetector, Weighting};
pub use level::LevelMapper;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::errors::{ConfigError, EngineError};
use crate::feed::RawTrade;
use crate::types::{EngineEvent, Timeframe, Trade};

/// Ingestion counters for data-loss tracking.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    /// Trades accepted and applied
    pub trades: u64,
    /// Raw records rejected as malformed
    pub rejected: u64,
}

/// The aggregation engine. Single-threaded: one trade is processed to
/// completion before the next; an async transport must serialize delivery
/// into this path.
pub struct FlowEngine {
    config: EngineConfig,
    level: LevelMapper,
    history: TradeHistory,
    windows: Vec<CandleWindow>,
    detector: ImbalanceDetector,
    stats: EngineStats,
}

impl FlowEngine {
    /// Build an engine from configuration. Invalid configuration is
    /// rejected here, before any ingestion begins.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let windows = config
            .timeframes
            .iter()
            .map(|spec| CandleWindow::new(spec.timeframe, spec.cap))
            .collect();
        Ok(Self {
            level: LevelMapper::new(config.delta_history, config.max_level),
            history: TradeHistory::new(config.history_capacity),
            windows,
            detector: ImbalanceDetector::new(config.threshold, config.weighting),
            stats: EngineStats::default(),
            config,
        })
    }

    /// Ingest one raw trade record. Returns the events produced by this
    /// trade, or a recoverable error when the record is malformed (in which
    /// case no engine state changed).
    pub fn ingest(&mut self, raw: &RawTrade) -> Result<Vec<EngineEvent>, EngineError> {
        let mut trade = match Self::normalize(raw) {
            Ok(trade) => trade,
            Err(err) => {
                self.stats.rejected += 1;
                return Err(err);
            }
        };

        trade.level = self.level.map(trade.price);
        self.history.record(trade.clone());
        self.stats.trades += 1;

        let mut events = Vec::new();
        for window in &mut self.windows {
            let timeframe = window.timeframe();
            let update = window.apply(&trade);

            let bucket_id = match update {
                WindowUpdate::Stale { bucket_id } => {
                    warn!(
                        %timeframe,
                        %bucket_id,
                        ts = trade.ts,
                        "out-of-order trade dropped from window"
                    );
                    continue;
                }
                WindowUpdate::Applied { bucket_id } | WindowUpdate::Overflowed { bucket_id } => {
                    bucket_id
                }
            };

            if let Some((_, candle)) = window.newest() {
                events.push(EngineEvent::BucketUpdated {
                    timeframe,
                    bucket_id,
                    candle: candle.clone(),
                });
            }
            if window.mark_ready() {
                events.push(EngineEvent::WindowReady { timeframe });
            }

            if matches!(update, WindowUpdate::Overflowed { .. }) {
                // A slot just finalized: evaluate over the closed buckets
                // before the oldest one is discarded.
                let closed = window.closed();
                match self.detector.evaluate(timeframe, &closed) {
                    Some(signal) => {
                        if window.mark_signaled(signal.bucket_id) {
                            events.push(EngineEvent::Signal(signal));
                        }
                    }
                    None => {
                        debug!(%timeframe, %bucket_id, "no signal at bucket close");
                    }
                }
                window.evict_oldest();
            }
        }

        Ok(events)
    }

    /// Parse and validate a raw record into a trade. Pure: touches no
    /// engine state, so a rejection leaves everything unchanged.
    fn normalize(raw: &RawTrade) -> Result<Trade, EngineError> {
        let price = raw
            .price
            .as_f64()
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| {
                EngineError::MalformedTrade(format!(
                    "price {:?} is not a finite positive number",
                    raw.price
                ))
            })?;
        let quantity = raw
            .quantity
            .as_f64()
            .filter(|q| q.is_finite() && *q > 0.0)
            .ok_or_else(|| {
                EngineError::MalformedTrade(format!(
                    "quantity {:?} is not a finite positive number",
                    raw.quantity
                ))
            })?;
        if raw.timestamp <= 0 {
            return Err(EngineError::MalformedTrade(format!(
                "timestamp {} is not a valid epoch time",
                raw.timestamp
            )));
        }

        Ok(Trade {
            price,
            quantity,
            is_buyer_maker: raw.is_buyer_maker,
            ts: raw.timestamp,
            level: 0,
        })
    }

    /// Window for a configured timeframe.
    pub fn window(&self, timeframe: Timeframe) -> Option<&CandleWindow> {
        self.windows.iter().find(|w| w.timeframe() == timeframe)
    }

    /// Volume gauges over the configured trailing windows.
    pub fn gauges(&self) -> Vec<VolumeGauge> {
        self.config
            .gauge_windows
            .iter()
            .map(|&w| self.history.gauge(w))
            .collect()
    }

    /// Current movement level.
    pub fn level(&self) -> i32 {
        self.level.level()
    }

    pub fn history(&self) -> &TradeHistory {
        &self.history
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Attach externally-sourced open interest to a timeframe's newest
    /// bucket. The engine never derives this value itself.
    pub fn set_open_interest(&mut self, timeframe: Timeframe, value: f64) -> bool {
        self.windows
            .iter_mut()
            .find(|w| w.timeframe() == timeframe)
            .map(|w| w.set_open_interest(value))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeframeSpec;

    fn test_config() -> EngineConfig {
        EngineConfig {
            timeframes: vec![TimeframeSpec {
                timeframe: Timeframe::from_secs(60),
                cap: 2,
            }],
            delta_history: 100,
            max_level: 320,
            threshold: 0.95,
            weighting: Weighting::Volume,
            history_capacity: 100,
            gauge_windows: vec![4, 8],
        }
    }

    fn raw(price: &str, quantity: &str, is_buyer_maker: bool, ts: i64) -> RawTrade {
        RawTrade {
            price: price.into(),
            quantity: quantity.into(),
            is_buyer_maker,
            timestamp: ts,
        }
    }

    const BASE: i64 = 1_700_006_400_000;

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = test_config();
        config.threshold = 1.5;
        assert!(FlowEngine::new(config).is_err());
    }

    #[test]
    fn test_malformed_price_leaves_state_unchanged() {
        let mut engine = FlowEngine::new(test_config()).unwrap();
        engine.ingest(&raw("100.0", "1.0", false, BASE)).unwrap();

        let err = engine
            .ingest(&raw("not-a-price", "1.0", false, BASE + 1000))
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedTrade(_)));

        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.level(), 0);
        assert_eq!(engine.stats().rejected, 1);
        assert_eq!(engine.stats().trades, 1);
        let window = engine.window(Timeframe::from_secs(60)).unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window.newest().unwrap().1.trade_count, 1);
    }

    #[test]
    fn test_malformed_quantity_and_timestamp() {
        let mut engine = FlowEngine::new(test_config()).unwrap();
        assert!(engine.ingest(&raw("100.0", "-3.0", false, BASE)).is_err());
        assert!(engine.ingest(&raw("100.0", "0", false, BASE)).is_err());
        assert!(engine.ingest(&raw("100.0", "1.0", false, 0)).is_err());
        assert!(engine.ingest(&raw("inf", "1.0", false, BASE)).is_err());
        assert_eq!(engine.stats().rejected, 4);
    }

    #[test]
    fn test_bucket_updated_every_ingest() {
        let mut engine = FlowEngine::new(test_config()).unwrap();
        let events = engine.ingest(&raw("100.0", "1.0", false, BASE)).unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::BucketUpdated { .. })));
    }

    #[test]
    fn test_window_ready_fires_once() {
        let mut engine = FlowEngine::new(test_config()).unwrap();
        let events = engine.ingest(&raw("100.0", "1.0", false, BASE)).unwrap();
        assert!(!events
            .iter()
            .any(|e| matches!(e, EngineEvent::WindowReady { .. })));

        let events = engine
            .ingest(&raw("100.0", "1.0", false, BASE + 60_000))
            .unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::WindowReady { .. })));

        let events = engine
            .ingest(&raw("100.0", "1.0", false, BASE + 120_000))
            .unwrap();
        assert!(!events
            .iter()
            .any(|e| matches!(e, EngineEvent::WindowReady { .. })));
    }

    #[test]
    fn test_open_interest_enrichment() {
        let tf = Timeframe::from_secs(60);
        let mut engine = FlowEngine::new(test_config()).unwrap();
        assert!(!engine.set_open_interest(tf, 5.0));

        engine.ingest(&raw("100.0", "1.0", false, BASE)).unwrap();
        assert!(engine.set_open_interest(tf, 5.0));
        assert_eq!(
            engine.window(tf).unwrap().newest().unwrap().1.open_interest,
            Some(5.0)
        );
        assert!(!engine.set_open_interest(Timeframe::from_secs(999), 5.0));
    }
}

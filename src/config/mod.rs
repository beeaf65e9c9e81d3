//! Configuration management for tapeflow
//!
//! Loads from YAML files + environment variables via .env, then converts the
//! raw app config into a validated engine configuration. Validation is fatal
//! at construction time; nothing is ingested under a bad config.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::str::FromStr;

use crate::engine::Weighting;
use crate::errors::ConfigError;
use crate::types::Timeframe;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub candles: CandlesConfig,
    pub level: LevelConfig,
    pub signal: SignalConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Stream symbol, e.g. "btcusdt"
    pub symbol: String,
    /// Websocket endpoint
    pub ws_url: String,
    /// Base reconnect delay in milliseconds
    pub reconnect_delay_ms: u64,
    /// Bounded feed->engine channel capacity (block policy on overflow)
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandlesConfig {
    /// Timeframe specs as "width:cap", e.g. "1m:1440". Shorter widths carry
    /// larger caps to keep a roughly constant retention horizon.
    pub timeframes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LevelConfig {
    /// Rolling delta history length
    pub delta_history: usize,
    /// Level clamp magnitude
    pub max_level: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalConfig {
    /// Normalized imbalance threshold in [0, 1]
    pub threshold: f64,
    /// Imbalance weighting strategy: "volume" or "count"
    pub weighting: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Trade history capacity
    pub capacity: usize,
    /// Trailing trade counts the volume gauges are computed over
    pub gauge_windows: Vec<usize>,
}

/// One timeframe width with its retention cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeframeSpec {
    pub timeframe: Timeframe,
    pub cap: usize,
}

impl FromStr for TimeframeSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ConfigError::InvalidTimeframe {
            spec: s.to_string(),
            reason,
        };
        let (width, cap) = s
            .split_once(':')
            .ok_or_else(|| invalid("expected \"width:cap\"".to_string()))?;
        let timeframe: Timeframe = width.parse().map_err(|e| invalid(e))?;
        let cap: usize = cap
            .trim()
            .parse()
            .map_err(|_| invalid(format!("invalid cap {cap:?}")))?;
        Ok(TimeframeSpec { timeframe, cap })
    }
}

/// Validated engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub timeframes: Vec<TimeframeSpec>,
    pub delta_history: usize,
    pub max_level: i32,
    pub threshold: f64,
    pub weighting: Weighting,
    pub history_capacity: usize,
    pub gauge_windows: Vec<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeframes: vec![
                TimeframeSpec {
                    timeframe: Timeframe::from_minutes(1),
                    cap: 1440,
                },
                TimeframeSpec {
                    timeframe: Timeframe::from_minutes(5),
                    cap: 288,
                },
                TimeframeSpec {
                    timeframe: Timeframe::from_minutes(15),
                    cap: 96,
                },
                TimeframeSpec {
                    timeframe: Timeframe::from_minutes(60),
                    cap: 72,
                },
            ],
            delta_history: 200,
            max_level: 368,
            threshold: 0.95,
            weighting: Weighting::Volume,
            history_capacity: 3000,
            gauge_windows: vec![375, 750, 1500, 3000],
        }
    }
}

impl EngineConfig {
    /// Reject invalid configuration before any ingestion begins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeframes.is_empty() {
            return Err(ConfigError::NoTimeframes);
        }
        for spec in &self.timeframes {
            if spec.timeframe.duration_secs() == 0 {
                return Err(ConfigError::NonPositive {
                    name: "timeframe width",
                    value: 0,
                });
            }
            if spec.cap == 0 {
                return Err(ConfigError::NonPositive {
                    name: "timeframe cap",
                    value: 0,
                });
            }
        }
        if self.delta_history == 0 {
            return Err(ConfigError::NonPositive {
                name: "delta_history",
                value: 0,
            });
        }
        if self.max_level <= 0 {
            return Err(ConfigError::NonPositive {
                name: "max_level",
                value: i64::from(self.max_level),
            });
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.threshold));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::NonPositive {
                name: "history capacity",
                value: 0,
            });
        }
        for &window in &self.gauge_windows {
            if window == 0 {
                return Err(ConfigError::NonPositive {
                    name: "gauge window",
                    value: 0,
                });
            }
            if window > self.history_capacity {
                return Err(ConfigError::GaugeWindowTooLarge {
                    window,
                    capacity: self.history_capacity,
                });
            }
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Feed defaults
            .set_default("feed.symbol", "btcusdt")?
            .set_default("feed.ws_url", "wss://stream.binance.com:9443/ws")?
            .set_default("feed.reconnect_delay_ms", 5000)?
            .set_default("feed.channel_capacity", 1024)?
            // Candle defaults: co-varying caps for a near-constant horizon
            .set_default(
                "candles.timeframes",
                vec!["1m:1440", "5m:288", "15m:96", "1h:72"],
            )?
            // Level defaults
            .set_default("level.delta_history", 200)?
            .set_default("level.max_level", 368)?
            // Signal defaults
            .set_default("signal.threshold", 0.95)?
            .set_default("signal.weighting", "volume")?
            // History defaults
            .set_default("history.capacity", 3000)?
            .set_default("history.gauge_windows", vec![375, 750, 1500, 3000])?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (TAPEFLOW_*)
            .add_source(Environment::with_prefix("TAPEFLOW").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Convert the raw app config into a validated engine configuration.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let timeframes = self
            .candles
            .timeframes
            .iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<TimeframeSpec>, _>>()?;
        let weighting: Weighting = self
            .signal
            .weighting
            .parse()
            .map_err(|_| ConfigError::UnknownWeighting(self.signal.weighting.clone()))?;

        let engine = EngineConfig {
            timeframes,
            delta_history: self.level.delta_history,
            max_level: self.level.max_level,
            threshold: self.signal.threshold,
            weighting,
            history_capacity: self.history.capacity,
            gauge_windows: self.history.gauge_windows.clone(),
        };
        engine.validate()?;
        Ok(engine)
    }

    /// Generate a digest of the config for startup logging
    pub fn digest(&self) -> String {
        format!(
            "symbol={} timeframes={:?} threshold={:.2} weighting={}",
            self.feed.symbol, self.candles.timeframes, self.signal.threshold, self.signal.weighting
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_spec_parse() {
        let spec: TimeframeSpec = "1m:1440".parse().unwrap();
        assert_eq!(spec.timeframe, Timeframe::from_minutes(1));
        assert_eq!(spec.cap, 1440);

        let spec: TimeframeSpec = "30s:120".parse().unwrap();
        assert_eq!(spec.timeframe, Timeframe::from_secs(30));

        assert!("1m".parse::<TimeframeSpec>().is_err());
        assert!("1m:".parse::<TimeframeSpec>().is_err());
        assert!("xx:10".parse::<TimeframeSpec>().is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.threshold = 1.01;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange(_))
        ));

        let mut config = EngineConfig::default();
        config.timeframes.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoTimeframes)));

        let mut config = EngineConfig::default();
        config.timeframes[0].cap = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.max_level = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.gauge_windows = vec![10_000];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::GaugeWindowTooLarge { .. })
        ));
    }
}

//! Error taxonomy for the aggregation engine
//!
//! Per-event failures are recoverable (drop the event, keep running);
//! configuration failures are fatal and rejected before any ingestion.

use thiserror::Error;

/// Recoverable per-event ingestion errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The raw record could not be normalized into a trade. The event is
    /// dropped; no engine state changes.
    #[error("malformed trade: {0}")]
    MalformedTrade(String),
}

/// Fatal construction-time configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid timeframe spec {spec:?}: {reason}")]
    InvalidTimeframe { spec: String, reason: String },

    #[error("{name} must be positive (got {value})")]
    NonPositive { name: &'static str, value: i64 },

    #[error("signal threshold {0} outside [0, 1]")]
    ThresholdOutOfRange(f64),

    #[error("unknown imbalance weighting {0:?} (expected \"volume\" or \"count\")")]
    UnknownWeighting(String),

    #[error("gauge window {window} exceeds trade history capacity {capacity}")]
    GaugeWindowTooLarge { window: usize, capacity: usize },

    #[error("no timeframes configured")]
    NoTimeframes,
}

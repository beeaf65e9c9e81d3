//! Core types used throughout tapeflow
//!
//! Defines the normalized trade, candle aggregates, bucket identity and the
//! events the engine emits toward presentation/alerting consumers.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MS_PER_DAY: i64 = 86_400_000;

/// A candle resolution: fixed bucket width in seconds.
///
/// Parsed from strings like `"30s"`, `"1m"`, `"15m"`, `"1h"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timeframe {
    secs: u32,
}

impl Timeframe {
    pub fn from_secs(secs: u32) -> Self {
        Self { secs }
    }

    pub fn from_minutes(mins: u32) -> Self {
        Self { secs: mins * 60 }
    }

    pub fn duration_secs(&self) -> u32 {
        self.secs
    }

    pub fn width_ms(&self) -> i64 {
        i64::from(self.secs) * 1000
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let (value, unit) = s.split_at(s.len().saturating_sub(1));
        let value: u32 = value
            .parse()
            .map_err(|_| format!("invalid timeframe value in {s:?}"))?;
        let secs = match unit {
            "s" => Some(value),
            "m" => value.checked_mul(60),
            "h" => value.checked_mul(3600),
            _ => return Err(format!("invalid timeframe unit in {s:?} (use s/m/h)")),
        }
        .ok_or_else(|| format!("timeframe {s:?} is too large"))?;
        Ok(Timeframe { secs })
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.secs % 3600 == 0 {
            write!(f, "{}h", self.secs / 3600)
        } else if self.secs % 60 == 0 {
            write!(f, "{}m", self.secs / 60)
        } else {
            write!(f, "{}s", self.secs)
        }
    }
}

/// Signal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
        }
    }
}

/// Normalized trade event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Execution price
    pub price: f64,
    /// Quantity in base units
    pub quantity: f64,
    /// True if the resting (maker) order was the buyer, i.e. the taker sold
    pub is_buyer_maker: bool,
    /// Exchange timestamp in epoch milliseconds
    pub ts: i64,
    /// Volatility-scaled movement level, assigned at normalization time
    pub level: i32,
}

impl Trade {
    /// Whether the aggressor (taker) side was the buyer.
    pub fn taker_is_buyer(&self) -> bool {
        !self.is_buyer_maker
    }
}

/// Identity of one candle bucket: calendar day plus slot index within the day.
///
/// Ordering is chronological for a fixed timeframe width; the day prefix keeps
/// ids globally unique across midnight rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketId {
    /// Calendar day as yyyymmdd (UTC)
    pub day: u32,
    /// Bucket index within the day for the timeframe's width
    pub slot: u32,
}

impl BucketId {
    /// Derive the bucket id for a timestamp at the given width.
    pub fn from_timestamp(ts_ms: i64, timeframe: Timeframe) -> Self {
        let dt = DateTime::<Utc>::from_timestamp_millis(ts_ms).unwrap_or(DateTime::UNIX_EPOCH);
        let day = dt.year() as u32 * 10_000 + dt.month() * 100 + dt.day();
        let ms_of_day = ts_ms.rem_euclid(MS_PER_DAY);
        let slot = (ms_of_day / timeframe.width_ms()) as u32;
        Self { day, slot }
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}-{:06}", self.day, self.slot)
    }
}

/// Aggregate statistics for one time bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Volume where the taker was the buyer
    pub buy_volume: f64,
    /// Volume where the taker was the seller
    pub sell_volume: f64,
    /// Number of trades aggregated
    pub trade_count: u64,
    /// Last trade price seen in the bucket
    pub close: f64,
    /// External enrichment, never derived by the engine
    pub open_interest: Option<f64>,
}

impl Candle {
    pub fn total_volume(&self) -> f64 {
        self.buy_volume + self.sell_volume
    }

    /// Net taker flow (buy minus sell volume).
    pub fn volume_delta(&self) -> f64 {
        self.buy_volume - self.sell_volume
    }

    pub(crate) fn apply(&mut self, trade: &Trade) {
        self.close = trade.price;
        self.trade_count += 1;
        if trade.taker_is_buyer() {
            self.buy_volume += trade.quantity;
        } else {
            self.sell_volume += trade.quantity;
        }
    }
}

/// One-shot threshold crossing raised when a bucket is finalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImbalanceSignal {
    pub timeframe: Timeframe,
    pub direction: Direction,
    /// Normalized magnitude in (0, 1]
    pub magnitude: f64,
    /// The finalized bucket the signal fired for
    pub bucket_id: BucketId,
}

/// Events emitted by the engine toward presentation/alerting consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Fired on every ingest, per timeframe, for live redraw
    BucketUpdated {
        timeframe: Timeframe,
        bucket_id: BucketId,
        candle: Candle,
    },
    /// Fired once per timeframe when the window first holds enough buckets
    /// (>= 2) to be chart-worthy
    WindowReady { timeframe: Timeframe },
    /// Fired at most once per finalized bucket per timeframe
    Signal(ImbalanceSignal),
}

//! Imbalance signal detector
//!
//! Runs when a window slot closes: computes a normalized order-flow
//! imbalance series over the closed buckets and raises a one-shot signal
//! when the most recently finalized bucket meets the threshold.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{BucketId, Candle, Direction, ImbalanceSignal, Timeframe};

/// How per-bucket imbalance is weighted by activity. Source variants differ
/// here, so it is a configurable strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    /// `(buy - sell) * (buy + sell)`
    Volume,
    /// `(buy - sell) * trade_count`
    Count,
}

impl FromStr for Weighting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "volume" => Ok(Weighting::Volume),
            "count" => Ok(Weighting::Count),
            other => Err(format!("unknown weighting {other:?}")),
        }
    }
}

/// Threshold-crossing detector over a window's closed buckets.
#[derive(Debug, Clone)]
pub struct ImbalanceDetector {
    threshold: f64,
    weighting: Weighting,
}

impl ImbalanceDetector {
    pub fn new(threshold: f64, weighting: Weighting) -> Self {
        Self {
            threshold,
            weighting,
        }
    }

    /// Activity-weighted imbalance for one bucket.
    fn diff(&self, candle: &Candle) -> f64 {
        match self.weighting {
            Weighting::Volume => candle.volume_delta() * candle.total_volume(),
            Weighting::Count => candle.volume_delta() * candle.trade_count as f64,
        }
    }

    /// Normalized imbalance series over the closed buckets, each value in
    /// [-1, 1]. `None` when the window is degenerate (all-zero activity),
    /// in which case signal evaluation must be skipped to avoid 0/0.
    pub fn normalized<'a, I>(&self, closed: I) -> Option<Vec<f64>>
    where
        I: IntoIterator<Item = &'a Candle>,
    {
        let diffs: Vec<f64> = closed.into_iter().map(|c| self.diff(c)).collect();
        let max_abs = diffs.iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));
        if max_abs == 0.0 {
            return None;
        }
        Some(diffs.into_iter().map(|d| d / max_abs).collect())
    }

    /// Evaluate the just-finalized slot. `closed` is the window's closed
    /// buckets in chronological order, the last entry being the bucket that
    /// just finalized. At most one signal per call; the caller enforces
    /// at-most-once per bucket.
    pub fn evaluate(
        &self,
        timeframe: Timeframe,
        closed: &[(BucketId, Candle)],
    ) -> Option<ImbalanceSignal> {
        let normalized = self.normalized(closed.iter().map(|(_, c)| c))?;
        let (bucket_id, _) = *closed.last()?;
        let last = *normalized.last()?;

        if last.abs() < self.threshold {
            return None;
        }

        Some(ImbalanceSignal {
            timeframe,
            direction: if last > 0.0 {
                Direction::Up
            } else {
                Direction::Down
            },
            magnitude: last.abs(),
            bucket_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(buy: f64, sell: f64, trades: u64) -> Candle {
        Candle {
            buy_volume: buy,
            sell_volume: sell,
            trade_count: trades,
            close: 100.0,
            open_interest: None,
        }
    }

    fn bucket(slot: u32, c: Candle) -> (BucketId, Candle) {
        (BucketId { day: 20_240_101, slot }, c)
    }

    #[test]
    fn test_degenerate_window_skips() {
        let detector = ImbalanceDetector::new(0.95, Weighting::Volume);
        let closed = vec![bucket(0, candle(0.0, 0.0, 0)), bucket(1, candle(0.0, 0.0, 0))];
        assert!(detector.evaluate(Timeframe::from_minutes(1), &closed).is_none());
    }

    #[test]
    fn test_balanced_flow_cancels() {
        // Equal buy and sell volume in every bucket: diff is zero everywhere.
        let detector = ImbalanceDetector::new(0.95, Weighting::Volume);
        let closed = vec![bucket(0, candle(2.0, 2.0, 4)), bucket(1, candle(1.0, 1.0, 2))];
        assert!(detector.evaluate(Timeframe::from_minutes(1), &closed).is_none());
    }

    #[test]
    fn test_normalized_range_and_extremal_bucket() {
        let detector = ImbalanceDetector::new(1.0, Weighting::Volume);
        let candles = [
            candle(5.0, 1.0, 3),
            candle(1.0, 9.0, 4),
            candle(2.0, 1.0, 2),
        ];
        let normalized = detector.normalized(candles.iter()).unwrap();
        assert_eq!(normalized.len(), 3);
        for v in &normalized {
            assert!(*v >= -1.0 && *v <= 1.0);
        }
        // Bucket 1 has the extremal |diff| = 8 * 10 = 80
        assert_eq!(normalized[1], -1.0);
    }

    #[test]
    fn test_signal_fires_on_extremal_last_bucket() {
        let detector = ImbalanceDetector::new(0.95, Weighting::Volume);
        let closed = vec![
            bucket(0, candle(1.0, 1.5, 2)),
            bucket(1, candle(9.0, 1.0, 5)),
        ];
        let signal = detector
            .evaluate(Timeframe::from_minutes(1), &closed)
            .unwrap();
        assert_eq!(signal.direction, Direction::Up);
        assert_eq!(signal.magnitude, 1.0);
        assert_eq!(signal.bucket_id.slot, 1);
    }

    #[test]
    fn test_no_signal_below_threshold() {
        let detector = ImbalanceDetector::new(0.95, Weighting::Volume);
        // Last bucket's |diff| = 1*2 = 2 against max 80: normalized 0.025
        let closed = vec![
            bucket(0, candle(1.0, 9.0, 4)),
            bucket(1, candle(2.0, 1.0, 2)),
        ];
        assert!(detector.evaluate(Timeframe::from_minutes(1), &closed).is_none());
    }

    #[test]
    fn test_count_weighting() {
        let detector = ImbalanceDetector::new(0.95, Weighting::Count);
        // Volume deltas equal; trade counts decide the extremal bucket.
        let closed = vec![
            bucket(0, candle(2.0, 1.0, 10)),
            bucket(1, candle(2.0, 1.0, 4)),
        ];
        // diff = [10, 4] -> last normalized 0.4, below threshold
        assert!(detector.evaluate(Timeframe::from_minutes(1), &closed).is_none());

        let closed = vec![
            bucket(0, candle(2.0, 1.0, 4)),
            bucket(1, candle(1.0, 2.0, 10)),
        ];
        let signal = detector
            .evaluate(Timeframe::from_minutes(1), &closed)
            .unwrap();
        assert_eq!(signal.direction, Direction::Down);
    }

    #[test]
    fn test_weighting_parse() {
        assert_eq!("volume".parse::<Weighting>().unwrap(), Weighting::Volume);
        assert_eq!("Count".parse::<Weighting>().unwrap(), Weighting::Count);
        assert!("vwap".parse::<Weighting>().is_err());
    }
}

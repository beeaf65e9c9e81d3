//! Bounded candle window for one timeframe
//!
//! Ordered newest-last sequence of buckets; insertion order equals
//! chronological order. Capacity `cap` is exceeded by at most one entry,
//! only between inserting a new bucket and evicting the oldest.

use std::collections::VecDeque;

use crate::types::{BucketId, Candle, Timeframe, Trade};

/// Result of applying one trade to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowUpdate {
    /// Bucket updated in place, or a new bucket appended without overflow
    Applied { bucket_id: BucketId },
    /// A new bucket was appended and the window now exceeds capacity; the
    /// caller must evaluate signals over the closed buckets, then call
    /// `evict_oldest`
    Overflowed { bucket_id: BucketId },
    /// The trade maps to a bucket older than the newest retained one and
    /// was not applied (out-of-order delivery)
    Stale { bucket_id: BucketId },
}

/// Sliding window of candle buckets for a single timeframe.
#[derive(Debug)]
pub struct CandleWindow {
    timeframe: Timeframe,
    cap: usize,
    buckets: VecDeque<(BucketId, Candle)>,
    /// Set once the window first reached 2 populated buckets
    ready: bool,
    /// Last bucket a signal fired for, enforcing at-most-once
    last_signaled: Option<BucketId>,
    stale_drops: u64,
}

impl CandleWindow {
    pub fn new(timeframe: Timeframe, cap: usize) -> Self {
        Self {
            timeframe,
            cap,
            buckets: VecDeque::with_capacity(cap + 1),
            ready: false,
            last_signaled: None,
            stale_drops: 0,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Buckets in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = &(BucketId, Candle)> {
        self.buckets.iter()
    }

    /// Newest (still open) bucket.
    pub fn newest(&self) -> Option<&(BucketId, Candle)> {
        self.buckets.back()
    }

    /// Closed buckets: everything except the newest, chronological order.
    /// The last entry is the most recently finalized slot.
    pub fn closed(&self) -> Vec<(BucketId, Candle)> {
        let open = self.buckets.len().saturating_sub(1);
        self.buckets.iter().take(open).cloned().collect()
    }

    pub fn stale_drops(&self) -> u64 {
        self.stale_drops
    }

    /// Apply one trade. Buckets are appended in non-decreasing id order;
    /// trades mapping before the newest bucket are dropped as stale.
    pub fn apply(&mut self, trade: &Trade) -> WindowUpdate {
        let bucket_id = BucketId::from_timestamp(trade.ts, self.timeframe);

        match self.buckets.back_mut() {
            Some((newest_id, candle)) if *newest_id == bucket_id => {
                candle.apply(trade);
                return WindowUpdate::Applied { bucket_id };
            }
            Some((newest_id, _)) if bucket_id < *newest_id => {
                self.stale_drops += 1;
                return WindowUpdate::Stale { bucket_id };
            }
            _ => {}
        }

        let mut candle = Candle::default();
        candle.apply(trade);
        self.buckets.push_back((bucket_id, candle));

        if self.buckets.len() > self.cap {
            WindowUpdate::Overflowed { bucket_id }
        } else {
            WindowUpdate::Applied { bucket_id }
        }
    }

    /// Drop the single chronologically-oldest bucket. Evicted buckets are
    /// never recreated (older trades are rejected as stale by `apply`).
    pub fn evict_oldest(&mut self) -> Option<(BucketId, Candle)> {
        self.buckets.pop_front()
    }

    /// True exactly once: the first call after the window reached 2 buckets.
    pub fn mark_ready(&mut self) -> bool {
        if !self.ready && self.buckets.len() >= 2 {
            self.ready = true;
            return true;
        }
        false
    }

    /// Record that a signal fired for `bucket_id`; returns false if one
    /// already fired for it.
    pub fn mark_signaled(&mut self, bucket_id: BucketId) -> bool {
        if self.last_signaled == Some(bucket_id) {
            return false;
        }
        self.last_signaled = Some(bucket_id);
        true
    }

    /// Attach externally-sourced open interest to the newest bucket.
    pub fn set_open_interest(&mut self, value: f64) -> bool {
        match self.buckets.back_mut() {
            Some((_, candle)) => {
                candle.open_interest = Some(value);
                true
            }
            None => false,
        }
    }
}

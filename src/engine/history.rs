//! Bounded trade history
//!
//! Newest-first FIFO of recent trades backing the volume gauges: buy/sell
//! splits over trailing trade counts (e.g. last 375/750/1500/3000 trades).

use std::collections::VecDeque;

use crate::types::Trade;

/// Buy/sell volume split over a trailing trade count.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VolumeGauge {
    /// Trailing trade count the gauge was computed over
    pub window: usize,
    /// Taker buy volume
    pub buy_volume: f64,
    /// Taker sell volume
    pub sell_volume: f64,
    /// Trades actually scanned (less than `window` until warmed up)
    pub trades: usize,
}

impl VolumeGauge {
    /// Net pressure in [-1, 1]; 0 when the gauge is empty.
    pub fn imbalance(&self) -> f64 {
        let total = self.buy_volume + self.sell_volume;
        if total == 0.0 {
            0.0
        } else {
            (self.buy_volume - self.sell_volume) / total
        }
    }
}

/// Fixed-capacity, newest-first sequence of recent trades.
#[derive(Debug)]
pub struct TradeHistory {
    trades: VecDeque<Trade>,
    capacity: usize,
}

impl TradeHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            trades: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend a trade, evicting from the back past capacity.
    pub fn record(&mut self, trade: Trade) {
        self.trades.push_front(trade);
        while self.trades.len() > self.capacity {
            self.trades.pop_back();
        }
    }

    /// Buy/sell volume over the `window` most recent trades. O(window) scan;
    /// gauge windows are small relative to capacity.
    pub fn gauge(&self, window: usize) -> VolumeGauge {
        let mut gauge = VolumeGauge {
            window,
            ..Default::default()
        };
        for trade in self.trades.iter().take(window) {
            if trade.taker_is_buyer() {
                gauge.buy_volume += trade.quantity;
            } else {
                gauge.sell_volume += trade.quantity;
            }
            gauge.trades += 1;
        }
        gauge
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Most recent trade, if any.
    pub fn latest(&self) -> Option<&Trade> {
        self.trades.front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_trade(ts: i64, quantity: f64, is_buyer_maker: bool) -> Trade {
        Trade {
            price: 100.0,
            quantity,
            is_buyer_maker,
            ts,
            level: 0,
        }
    }

    #[test]
    fn test_newest_first_and_bounded() {
        let mut history = TradeHistory::new(3);
        for i in 0..5 {
            history.record(make_trade(i, 1.0, false));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().unwrap().ts, 4);
    }

    #[test]
    fn test_gauge_splits_by_taker_side() {
        let mut history = TradeHistory::new(10);
        history.record(make_trade(1, 2.0, false)); // taker buy
        history.record(make_trade(2, 3.0, true)); // taker sell
        history.record(make_trade(3, 5.0, false)); // taker buy

        let gauge = history.gauge(10);
        assert_eq!(gauge.buy_volume, 7.0);
        assert_eq!(gauge.sell_volume, 3.0);
        assert_eq!(gauge.trades, 3);
        assert!((gauge.imbalance() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_gauge_scans_only_newest_window() {
        let mut history = TradeHistory::new(10);
        history.record(make_trade(1, 100.0, true)); // oldest, outside window
        history.record(make_trade(2, 1.0, false));
        history.record(make_trade(3, 1.0, false));

        let gauge = history.gauge(2);
        assert_eq!(gauge.buy_volume, 2.0);
        assert_eq!(gauge.sell_volume, 0.0);
        assert_eq!(gauge.trades, 2);
    }

    #[test]
    fn test_empty_gauge_is_neutral() {
        let history = TradeHistory::new(10);
        let gauge = history.gauge(5);
        assert_eq!(gauge.imbalance(), 0.0);
        assert_eq!(gauge.trades, 0);
    }
}

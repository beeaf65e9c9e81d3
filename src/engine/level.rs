//! Adaptive level mapper
//!
//! Turns each price delta into a bounded signed level scaled by a rolling
//! average of recent deltas. A large move relative to recent calm saturates
//! the level quickly; the same absolute move in a volatile regime barely
//! nudges it. Drives the intensity rendering of the tape.

use std::collections::VecDeque;

/// Step scale: a delta exactly equal to the rolling average moves the level
/// by 8.
const STEP_SCALE: f64 = 8.0;

#[derive(Debug, Clone, Copy)]
struct PrevTrade {
    price: f64,
    level: i32,
}

/// Stateful price-delta to level mapper.
#[derive(Debug)]
pub struct LevelMapper {
    /// Rolling FIFO of recent absolute deltas, capacity `capacity`
    deltas: VecDeque<f64>,
    capacity: usize,
    max_level: i32,
    prev: Option<PrevTrade>,
}

impl LevelMapper {
    pub fn new(capacity: usize, max_level: i32) -> Self {
        Self {
            deltas: VecDeque::with_capacity(capacity),
            capacity,
            max_level,
            prev: None,
        }
    }

    /// Map the next trade price to a level in `[-max_level, max_level]`.
    pub fn map(&mut self, price: f64) -> i32 {
        let Some(prev) = self.prev else {
            self.prev = Some(PrevTrade { price, level: 0 });
            return 0;
        };

        let delta = (price - prev.price).abs();
        if delta == 0.0 {
            // Zero deltas carry the level forward and are kept out of the
            // rolling average so they don't suppress sensitivity.
            return prev.level;
        }

        self.deltas.push_back(delta);
        while self.deltas.len() > self.capacity {
            self.deltas.pop_front();
        }
        let average = self.deltas.iter().sum::<f64>() / self.deltas.len() as f64;
        let step = (STEP_SCALE * delta / average).round() as i32;

        let level = if price > prev.price {
            prev.level.saturating_add(step)
        } else {
            prev.level.saturating_sub(step)
        }
        .clamp(-self.max_level, self.max_level);

        self.prev = Some(PrevTrade { price, level });
        level
    }

    /// Current level (0 before the first trade).
    pub fn level(&self) -> i32 {
        self.prev.map(|p| p.level).unwrap_or(0)
    }

    pub fn delta_count(&self) -> usize {
        self.deltas.len()
    }
}

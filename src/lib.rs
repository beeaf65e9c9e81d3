//! tapeflow Library
//!
//! Streaming trade aggregation: multi-resolution candle windows, adaptive
//! movement levels and order-flow imbalance signals from a live trade feed.

pub mod config;
pub mod engine;
pub mod errors;
pub mod feed;
pub mod types;

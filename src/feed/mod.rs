//! Feed module - trade event transport
//!
//! Wire model for the exchange trade stream plus the websocket client that
//! delivers raw trade records into the engine's single consumer loop.

mod binance;

pub use binance::BinanceFeed;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;

/// A wire number that may arrive as a decimal string or a JSON number.
/// Parsing and validation happen in the engine's normalizer, so malformed
/// values survive deserialization and are rejected per-event there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Float(f64),
    Text(String),
}

impl RawNumber {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawNumber::Float(v) => Some(*v),
            RawNumber::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<f64> for RawNumber {
    fn from(v: f64) -> Self {
        RawNumber::Float(v)
    }
}

impl From<&str> for RawNumber {
    fn from(s: &str) -> Self {
        RawNumber::Text(s.to_string())
    }
}

/// Raw trade record as delivered by the feed (Binance aggTrade field names).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrade {
    /// Price, decimal string or number
    #[serde(rename = "p")]
    pub price: RawNumber,
    /// Quantity, decimal string or number
    #[serde(rename = "q")]
    pub quantity: RawNumber,
    /// True if the buyer was the resting (maker) order
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
    /// Trade time in epoch milliseconds
    #[serde(rename = "T")]
    pub timestamp: i64,
}

/// Subscription acknowledgement frame, e.g. `{"result":null,"id":1}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeAck {
    pub result: Option<serde_json::Value>,
    pub id: u64,
}

/// Error frame from the stream endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamError {
    pub error: StreamErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamErrorBody {
    pub code: i64,
    pub msg: String,
}

/// The closed set of message kinds the stream delivers. Handled by
/// exhaustive match in the feed loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FeedMessage {
    Trade(AggTradeEvent),
    Error(StreamError),
    Ack(SubscribeAck),
}

/// An aggTrade event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct AggTradeEvent {
    /// Event type discriminator, always "aggTrade"
    #[serde(rename = "e")]
    pub event: String,
    /// Symbol, e.g. "BTCUSDT"
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(flatten)]
    pub trade: RawTrade,
}

/// Events delivered from a feed task to the consumer loop.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Connected,
    Disconnected,
    Trade(RawTrade),
    Error(String),
}

/// A source of trade events. Runs until the connection is permanently lost;
/// transient failures are retried inside `run`.
#[async_trait]
pub trait TradeSource {
    fn name(&self) -> &'static str;

    /// Connect and deliver events into `tx` until shutdown or permanent
    /// failure. Delivery through the single channel serializes ingestion;
    /// concurrent ingest paths are not allowed.
    async fn run(&mut self, tx: Sender<FeedEvent>) -> Result<()>;
}

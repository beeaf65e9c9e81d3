//! Binance WebSocket client for the aggTrade stream
//!
//! Connects to the raw websocket endpoint, subscribes to the configured
//! symbol's aggTrade stream, and delivers raw trade records into the
//! engine's consumer channel. Reconnects with capped exponential backoff.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::config::FeedConfig;
use crate::feed::{FeedEvent, FeedMessage, TradeSource};

const MAX_RECONNECT_ATTEMPTS: u32 = 10;
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

pub struct BinanceFeed {
    config: FeedConfig,
    connected: bool,
}

impl BinanceFeed {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config,
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn subscribe_frame(&self) -> String {
        json!({
            "method": "SUBSCRIBE",
            "params": [format!("{}@aggTrade", self.config.symbol.to_lowercase())],
            "id": 1,
        })
        .to_string()
    }

    /// Parse one text frame and forward anything interesting. The message
    /// kinds form a closed set; anything else is a parse failure.
    async fn handle_message(text: &str, tx: &Sender<FeedEvent>) -> Result<()> {
        let message: FeedMessage =
            serde_json::from_str(text).context("unrecognized stream message")?;

        match message {
            FeedMessage::Trade(event) => {
                // Delivery must stay serial: a bounded channel with a single
                // consumer is the engine's ingestion path.
                if tx.send(FeedEvent::Trade(event.trade)).await.is_err() {
                    bail!("consumer channel closed");
                }
            }
            FeedMessage::Ack(ack) => {
                tracing::debug!(id = ack.id, "subscription acknowledged");
            }
            FeedMessage::Error(err) => {
                tracing::warn!(code = err.error.code, msg = %err.error.msg, "stream error frame");
                let _ = tx.send(FeedEvent::Error(err.error.msg)).await;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl TradeSource for BinanceFeed {
    fn name(&self) -> &'static str {
        "Binance"
    }

    async fn run(&mut self, tx: Sender<FeedEvent>) -> Result<()> {
        let url = self.config.ws_url.clone();
        let base_delay = Duration::from_millis(self.config.reconnect_delay_ms.max(1));
        let mut reconnect_attempts = 0u32;

        'reconnect_loop: loop {
            tracing::info!(
                source = %self.name(),
                url = %url,
                symbol = %self.config.symbol,
                attempt = reconnect_attempts,
                "Connecting to trade stream..."
            );

            let (ws_stream, _) = match connect_async(&url).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(source = %self.name(), error = %e, "Connection failed");
                    let _ = tx.send(FeedEvent::Error(e.to_string())).await;

                    reconnect_attempts += 1;
                    if reconnect_attempts > MAX_RECONNECT_ATTEMPTS {
                        bail!(
                            "Max reconnection attempts ({}) reached",
                            MAX_RECONNECT_ATTEMPTS
                        );
                    }
                    let delay = std::cmp::min(base_delay * reconnect_attempts, MAX_RECONNECT_DELAY);
                    tracing::info!(
                        source = %self.name(),
                        delay_secs = delay.as_secs(),
                        "Reconnecting in {} seconds...", delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                    continue 'reconnect_loop;
                }
            };

            let (mut write, mut read) = ws_stream.split();
            self.connected = true;
            reconnect_attempts = 0;

            write
                .send(Message::Text(self.subscribe_frame()))
                .await
                .context("Failed to send subscribe frame")?;

            let _ = tx.send(FeedEvent::Connected).await;
            tracing::info!(source = %self.name(), "✅ Connected to trade stream");

            let should_reconnect = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = Self::handle_message(&text, &tx).await {
                            tracing::warn!(source = %self.name(), error = %e, "Failed to handle message");
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::warn!(source = %self.name(), "Connection closed by server");
                        break true;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Connection is alive
                    }
                    Some(Err(e)) => {
                        tracing::error!(source = %self.name(), error = %e, "WebSocket error");
                        let _ = tx.send(FeedEvent::Error(e.to_string())).await;
                        break true;
                    }
                    None => {
                        tracing::warn!(source = %self.name(), "Stream ended");
                        break true;
                    }
                    _ => {}
                }

                if tx.is_closed() {
                    break false;
                }
            };

            self.connected = false;
            let _ = tx.send(FeedEvent::Disconnected).await;

            if should_reconnect {
                reconnect_attempts += 1;
                if reconnect_attempts > MAX_RECONNECT_ATTEMPTS {
                    bail!(
                        "Max reconnection attempts ({}) reached",
                        MAX_RECONNECT_ATTEMPTS
                    );
                }
                let delay = std::cmp::min(base_delay * reconnect_attempts, MAX_RECONNECT_DELAY);
                tracing::info!(
                    source = %self.name(),
                    delay_secs = delay.as_secs(),
                    attempt = reconnect_attempts,
                    "🔄 Reconnecting in {} seconds...", delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            } else {
                break 'reconnect_loop;
            }
        }

        Ok(())
    }
}

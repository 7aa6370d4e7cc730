//! Streamed price plumbing
//!
//! A `PriceFeed` pushes ticks into a channel; the router fans them into the
//! `StreamHub` (latest quote per symbol, fresh within a TTL) and forwards
//! them to the engine through a bounded queue. When the queue is full the
//! update is dropped: freshness wins over completeness, and a slow consumer
//! must never block the producer.

use super::PriceSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A single streamed price update
#[derive(Debug, Clone)]
pub struct PriceTick {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl PriceTick {
    pub fn new(symbol: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            price,
            timestamp: Utc::now(),
        }
    }
}

/// Trait for streaming price feed implementations
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Subscribe to price updates
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<PriceTick>>;
}

/// Latest streamed quote per symbol
///
/// Doubles as the cache's streaming source: a quote older than the TTL is
/// treated as absent so resolution falls through to the next source.
pub struct StreamHub {
    ttl: Duration,
    inner: Mutex<HashMap<String, (Decimal, Instant)>>,
}

impl StreamHub {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Record a streamed quote
    pub fn update(&self, symbol: &str, price: Decimal) {
        self.inner
            .lock()
            .insert(symbol.to_uppercase(), (price, Instant::now()));
    }

    /// Latest quote if still within the TTL
    pub fn fresh(&self, symbol: &str) -> Option<Decimal> {
        let inner = self.inner.lock();
        let (price, at) = inner.get(&symbol.to_uppercase())?;
        (at.elapsed() <= self.ttl).then_some(*price)
    }

    /// Latest quote regardless of age
    pub fn last(&self, symbol: &str) -> Option<Decimal> {
        self.inner
            .lock()
            .get(&symbol.to_uppercase())
            .map(|(price, _)| *price)
    }
}

#[async_trait]
impl PriceSource for StreamHub {
    fn name(&self) -> &'static str {
        "stream"
    }

    async fn last_price(&self, symbol: &str) -> anyhow::Result<Decimal> {
        self.fresh(symbol)
            .ok_or_else(|| anyhow::anyhow!("no fresh streamed price for {symbol}"))
    }
}

/// Route feed ticks into the hub and the engine queue
///
/// Returns the router task handle. The task ends when the feed channel
/// closes; a full engine queue drops the tick rather than waiting.
pub fn spawn_price_router(
    mut feed_rx: mpsc::Receiver<PriceTick>,
    hub: Arc<StreamHub>,
    out_tx: mpsc::Sender<PriceTick>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(tick) = feed_rx.recv().await {
            hub.update(&tick.symbol, tick.price);
            match out_tx.try_send(tick) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(tick)) => {
                    tracing::debug!(symbol = %tick.symbol, "tick queue full, dropping update");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!("tick receiver dropped, stopping router");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_hub_fresh_and_last() {
        let hub = StreamHub::new(Duration::from_secs(5));
        assert!(hub.fresh("SBER").is_none());

        hub.update("sber", dec!(280.5));
        assert_eq!(hub.fresh("SBER"), Some(dec!(280.5)));
        assert_eq!(hub.last("SBER"), Some(dec!(280.5)));
    }

    #[test]
    fn test_hub_expiry() {
        let hub = StreamHub::new(Duration::from_millis(0));
        hub.update("SBER", dec!(280));
        std::thread::sleep(Duration::from_millis(5));
        assert!(hub.fresh("SBER").is_none());
        assert_eq!(hub.last("SBER"), Some(dec!(280)));
    }

    #[tokio::test]
    async fn test_hub_as_price_source() {
        let hub = StreamHub::new(Duration::from_secs(5));
        assert!(hub.last_price("SBER").await.is_err());

        hub.update("SBER", dec!(100));
        assert_eq!(hub.last_price("SBER").await.unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn test_router_forwards_and_updates_hub() {
        let hub = Arc::new(StreamHub::new(Duration::from_secs(5)));
        let (feed_tx, feed_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let handle = spawn_price_router(feed_rx, Arc::clone(&hub), out_tx);

        feed_tx.send(PriceTick::new("SBER", dec!(281))).await.unwrap();
        let tick = out_rx.recv().await.unwrap();
        assert_eq!(tick.symbol, "SBER");
        assert_eq!(hub.fresh("SBER"), Some(dec!(281)));

        drop(feed_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_router_drops_when_queue_full() {
        let hub = Arc::new(StreamHub::new(Duration::from_secs(5)));
        let (feed_tx, feed_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let handle = spawn_price_router(feed_rx, Arc::clone(&hub), out_tx);

        feed_tx.send(PriceTick::new("SBER", dec!(1))).await.unwrap();
        feed_tx.send(PriceTick::new("SBER", dec!(2))).await.unwrap();
        feed_tx.send(PriceTick::new("SBER", dec!(3))).await.unwrap();
        drop(feed_tx);
        handle.await.unwrap();

        // Only the first tick fits the queue, but the hub saw every update
        assert_eq!(out_rx.recv().await.unwrap().price, dec!(1));
        assert!(out_rx.recv().await.is_none());
        assert_eq!(hub.fresh("SBER"), Some(dec!(3)));
    }
}

//! Multi-source last-price resolver with bounded-TTL caching
//!
//! Resolution order, first success wins: streaming source, REST source,
//! fresh cache, stale cache, last close from historical series. A failing
//! source never prevents the fallthrough; only exhausting every step yields
//! "not found".

use super::{HistoryStore, PriceSource};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upstream price validator; invalid values are discarded and the next
/// source is tried
pub type PriceValidator = Arc<dyn Fn(Decimal) -> bool + Send + Sync>;

fn default_validator() -> PriceValidator {
    Arc::new(|price| price > Decimal::ZERO)
}

/// Resilient last-price cache over unreliable upstream sources
pub struct PriceCache {
    stream: Option<Arc<dyn PriceSource>>,
    rest: Option<Arc<dyn PriceSource>>,
    history: Arc<HistoryStore>,
    cache_ttl: Duration,
    validator: PriceValidator,
    network_enabled: AtomicBool,
    cache: Mutex<HashMap<String, (Decimal, Instant)>>,
}

impl PriceCache {
    /// Create a cache backed by `history` with the given live-price TTL
    pub fn new(history: Arc<HistoryStore>, cache_ttl: Duration) -> Self {
        Self {
            stream: None,
            rest: None,
            history,
            cache_ttl,
            validator: default_validator(),
            network_enabled: AtomicBool::new(true),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a streaming source (tried first)
    pub fn with_stream(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.stream = Some(source);
        self
    }

    /// Attach a REST source (tried after the stream)
    pub fn with_rest(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.rest = Some(source);
        self
    }

    /// Replace the default `price > 0` validator
    pub fn with_validator(mut self, validator: PriceValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Re-enable network sources after a manual disable
    pub fn enable_network(&self) {
        self.network_enabled.store(true, Ordering::Relaxed);
    }

    /// Skip network sources and resolve from cache/history only
    ///
    /// Used during shutdown or a manual pause.
    pub fn disable_network(&self) {
        self.network_enabled.store(false, Ordering::Relaxed);
    }

    pub fn network_enabled(&self) -> bool {
        self.network_enabled.load(Ordering::Relaxed)
    }

    /// Drop cached prices and history for `symbol`, or everything when `None`
    pub fn invalidate(&self, symbol: Option<&str>) {
        match symbol {
            None => self.cache.lock().clear(),
            Some(symbol) => {
                self.cache.lock().remove(&symbol.to_uppercase());
            }
        }
        self.history.invalidate(symbol);
    }

    /// Resolve the most recent price for `symbol`
    pub async fn get_price(&self, symbol: &str) -> Option<Decimal> {
        let symbol = symbol.to_uppercase();
        if !self.network_enabled() {
            return self
                .cached(&symbol, true)
                .or_else(|| self.history.last_close(&symbol));
        }

        for source in [self.stream.as_ref(), self.rest.as_ref()].into_iter().flatten() {
            match source.last_price(&symbol).await {
                Ok(price) if (self.validator)(price) => {
                    self.store(&symbol, price);
                    return Some(price);
                }
                Ok(price) => {
                    tracing::warn!(
                        %symbol,
                        source = source.name(),
                        %price,
                        "discarded invalid upstream price"
                    );
                }
                Err(e) => {
                    tracing::debug!(%symbol, source = source.name(), error = %e, "price source failed");
                }
            }
        }

        if let Some(price) = self.cached(&symbol, false) {
            return Some(price);
        }
        if let Some(price) = self.cached(&symbol, true) {
            tracing::debug!(%symbol, "returning stale cached price");
            return Some(price);
        }
        self.history.last_close(&symbol)
    }

    /// Last known price without touching the network: cache first (stale
    /// allowed), then the historical series
    pub fn latest_price(&self, symbol: &str) -> Option<Decimal> {
        let symbol = symbol.to_uppercase();
        self.cached(&symbol, true)
            .or_else(|| self.history.last_close(&symbol))
    }

    fn cached(&self, symbol: &str, allow_stale: bool) -> Option<Decimal> {
        let cache = self.cache.lock();
        let (price, at) = cache.get(symbol)?;
        if allow_stale || at.elapsed() <= self.cache_ttl {
            return Some(*price);
        }
        None
    }

    fn store(&self, symbol: &str, price: Decimal) {
        self.cache
            .lock()
            .insert(symbol.to_string(), (price, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price::PriceSource;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use std::sync::atomic::AtomicU32;

    /// Source returning a fixed answer, counting calls
    struct StubSource {
        name: &'static str,
        price: Option<Decimal>,
        calls: AtomicU32,
    }

    impl StubSource {
        fn ok(name: &'static str, price: Decimal) -> Self {
            Self {
                name,
                price: Some(price),
                calls: AtomicU32::new(0),
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                price: None,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl PriceSource for StubSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn last_price(&self, _symbol: &str) -> anyhow::Result<Decimal> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.price
                .ok_or_else(|| anyhow::anyhow!("{} unavailable", self.name))
        }
    }

    fn empty_history() -> Arc<HistoryStore> {
        let dir = tempfile::tempdir().unwrap();
        // Leak the tempdir so the path outlives the store in these tests
        let path = dir.keep();
        Arc::new(HistoryStore::new(path, Duration::from_secs(300)))
    }

    fn history_with_close(close: &str) -> Arc<HistoryStore> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.keep();
        let mut file = std::fs::File::create(path.join("SBER_hour_90d.csv")).unwrap();
        writeln!(file, "datetime,open,high,low,close,volume").unwrap();
        writeln!(file, "2024-01-01 10:00:00,1,1,1,{close},0").unwrap();
        Arc::new(HistoryStore::new(path, Duration::from_secs(300)))
    }

    #[tokio::test]
    async fn test_stream_preferred_over_rest() {
        let stream = Arc::new(StubSource::ok("stream", dec!(100)));
        let rest = Arc::new(StubSource::ok("rest", dec!(99)));
        let cache = PriceCache::new(empty_history(), Duration::from_secs(5))
            .with_stream(Arc::clone(&stream) as _)
            .with_rest(Arc::clone(&rest) as _);

        assert_eq!(cache.get_price("SBER").await, Some(dec!(100)));
        assert_eq!(rest.calls(), 0);
    }

    #[tokio::test]
    async fn test_failing_stream_falls_through_to_rest() {
        let stream = Arc::new(StubSource::failing("stream"));
        let rest = Arc::new(StubSource::ok("rest", dec!(99)));
        let cache = PriceCache::new(empty_history(), Duration::from_secs(5))
            .with_stream(stream as _)
            .with_rest(rest as _);

        assert_eq!(cache.get_price("SBER").await, Some(dec!(99)));
    }

    #[tokio::test]
    async fn test_invalid_price_discarded() {
        let stream = Arc::new(StubSource::ok("stream", dec!(-5)));
        let rest = Arc::new(StubSource::ok("rest", dec!(42)));
        let cache = PriceCache::new(empty_history(), Duration::from_secs(5))
            .with_stream(stream as _)
            .with_rest(rest as _);

        assert_eq!(cache.get_price("SBER").await, Some(dec!(42)));
    }

    #[tokio::test]
    async fn test_stale_cache_used_when_sources_fail() {
        let good = Arc::new(StubSource::ok("rest", dec!(77)));
        let cache = PriceCache::new(empty_history(), Duration::from_millis(0)).with_rest(good as _);
        assert_eq!(cache.get_price("SBER").await, Some(dec!(77)));

        // Sources gone; the zero-TTL entry is stale but still usable
        let cache2 = PriceCache {
            rest: None,
            ..cache
        };
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache2.get_price("SBER").await, Some(dec!(77)));
    }

    #[tokio::test]
    async fn test_history_is_last_resort() {
        let cache = PriceCache::new(history_with_close("123.4"), Duration::from_secs(5));
        assert_eq!(cache.get_price("SBER").await, Some(dec!(123.4)));
    }

    #[tokio::test]
    async fn test_total_exhaustion_is_none() {
        let stream = Arc::new(StubSource::failing("stream"));
        let cache =
            PriceCache::new(empty_history(), Duration::from_secs(5)).with_stream(stream as _);
        assert_eq!(cache.get_price("SBER").await, None);
    }

    #[tokio::test]
    async fn test_disable_network_skips_sources() {
        let stream = Arc::new(StubSource::ok("stream", dec!(100)));
        let cache = PriceCache::new(history_with_close("50"), Duration::from_secs(5))
            .with_stream(Arc::clone(&stream) as _);

        cache.disable_network();
        assert_eq!(cache.get_price("SBER").await, Some(dec!(50)));
        assert_eq!(stream.calls(), 0);

        cache.enable_network();
        assert_eq!(cache.get_price("SBER").await, Some(dec!(100)));
        assert_eq!(stream.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_clears_cache() {
        let rest = Arc::new(StubSource::ok("rest", dec!(10)));
        let cache =
            PriceCache::new(empty_history(), Duration::from_secs(300)).with_rest(rest as _);
        assert_eq!(cache.get_price("SBER").await, Some(dec!(10)));
        assert_eq!(cache.latest_price("SBER"), Some(dec!(10)));

        cache.invalidate(Some("SBER"));
        assert_eq!(cache.latest_price("SBER"), None);
    }

    #[tokio::test]
    async fn test_custom_validator() {
        // Reject anything above 1000 as a fat-finger quote
        let rest = Arc::new(StubSource::ok("rest", dec!(5000)));
        let cache = PriceCache::new(empty_history(), Duration::from_secs(5))
            .with_rest(rest as _)
            .with_validator(Arc::new(|price| {
                price > Decimal::ZERO && price < dec!(1000)
            }));
        assert_eq!(cache.get_price("SBER").await, None);
    }
}

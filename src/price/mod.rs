//! Price resolution module
//!
//! Resilient last-price lookup over unreliable upstream feeds: a streaming
//! hub, a REST source, a bounded-TTL cache and historical series on disk.

mod cache;
mod history;
mod moex_iss;
mod stream;

pub use cache::{PriceCache, PriceValidator};
pub use history::{Candle, HistoryStore};
pub use moex_iss::IssClient;
pub use stream::{spawn_price_router, PriceFeed, PriceTick, StreamHub};

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Trait for queryable last-price sources
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Source name used in logs
    fn name(&self) -> &'static str;

    /// Latest price for `symbol`; an error means "try the next source"
    async fn last_price(&self, symbol: &str) -> anyhow::Result<Decimal>;
}

//! MOEX ISS last-price source
//!
//! Queries the public Moscow Exchange ISS marketdata endpoint for the last
//! traded price of a board security. No credentials required, which makes
//! it the default REST fallback behind the broker stream.

use super::PriceSource;
use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

/// ISS API base URL
pub const ISS_BASE_URL: &str = "https://iss.moex.com/iss";

/// Configuration for the ISS client
#[derive(Debug, Clone)]
pub struct IssConfig {
    /// Base URL for the ISS API
    pub base_url: String,
    /// Trading board queried for quotes
    pub board: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for IssConfig {
    fn default() -> Self {
        Self {
            base_url: ISS_BASE_URL.to_string(),
            board: "TQBR".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// ISS marketdata table: parallel column names and row arrays
#[derive(Debug, Deserialize)]
struct IssTable {
    columns: Vec<String>,
    data: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct IssResponse {
    marketdata: IssTable,
}

/// Client for the MOEX ISS marketdata endpoint
pub struct IssClient {
    config: IssConfig,
    client: reqwest::Client,
}

impl IssClient {
    /// Create a client with default configuration
    pub fn new() -> anyhow::Result<Self> {
        Self::with_config(IssConfig::default())
    }

    /// Create a client with custom configuration
    pub fn with_config(config: IssConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }

    fn quote_url(&self, symbol: &str) -> String {
        format!(
            "{}/engines/stock/markets/shares/boards/{}/securities/{}.json",
            self.config.base_url, self.config.board, symbol
        )
    }

    fn extract_last(response: &IssResponse) -> Option<Decimal> {
        let last_idx = response
            .marketdata
            .columns
            .iter()
            .position(|column| column == "LAST")?;
        let row = response.marketdata.data.first()?;
        let value = row.get(last_idx)?;
        value.as_f64().and_then(Decimal::from_f64)
    }
}

#[async_trait]
impl PriceSource for IssClient {
    fn name(&self) -> &'static str {
        "iss"
    }

    async fn last_price(&self, symbol: &str) -> anyhow::Result<Decimal> {
        let url = self.quote_url(symbol);
        tracing::debug!(symbol, url = %url, "fetching last price from ISS");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("iss.meta", "off"),
                ("iss.only", "marketdata"),
                ("marketdata.columns", "SECID,LAST"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("ISS API error for {}: {}", symbol, response.status());
        }

        let payload: IssResponse = response.json().await?;
        Self::extract_last(&payload)
            .ok_or_else(|| anyhow::anyhow!("no last price in ISS response for {symbol}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_url() {
        let client = IssClient::new().unwrap();
        assert_eq!(
            client.quote_url("SBER"),
            "https://iss.moex.com/iss/engines/stock/markets/shares/boards/TQBR/securities/SBER.json"
        );
    }

    #[test]
    fn test_extract_last() {
        let payload: IssResponse = serde_json::from_str(
            r#"{"marketdata":{"columns":["SECID","LAST"],"data":[["SBER",280.55]]}}"#,
        )
        .unwrap();
        assert_eq!(IssClient::extract_last(&payload), Some(dec!(280.55)));
    }

    #[test]
    fn test_extract_last_null_price() {
        let payload: IssResponse = serde_json::from_str(
            r#"{"marketdata":{"columns":["SECID","LAST"],"data":[["SBER",null]]}}"#,
        )
        .unwrap();
        assert_eq!(IssClient::extract_last(&payload), None);
    }

    #[test]
    fn test_extract_last_empty_table() {
        let payload: IssResponse =
            serde_json::from_str(r#"{"marketdata":{"columns":["SECID","LAST"],"data":[]}}"#)
                .unwrap();
        assert_eq!(IssClient::extract_last(&payload), None);
    }

    #[test]
    fn test_extract_last_missing_column() {
        let payload: IssResponse = serde_json::from_str(
            r#"{"marketdata":{"columns":["SECID","OPEN"],"data":[["SBER",100.0]]}}"#,
        )
        .unwrap();
        assert_eq!(IssClient::extract_last(&payload), None);
    }

    #[test]
    fn test_custom_board() {
        let client = IssClient::with_config(IssConfig {
            board: "TQTF".to_string(),
            ..IssConfig::default()
        })
        .unwrap();
        assert!(client.quote_url("FXRL").contains("/boards/TQTF/"));
    }
}

//! Historical OHLC series on disk
//!
//! Series are CSV files under a data directory, one file per symbol and
//! interval. Reads are memoized with a longer TTL than live prices since
//! re-parsing a file per tick is wasteful. A missing file is "no data",
//! never an error.

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One OHLC bar
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub ts: NaiveDateTime,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Raw CSV row before timestamp parsing
#[derive(Debug, Deserialize)]
struct CandleRow {
    #[serde(alias = "date", alias = "time", alias = "begin")]
    datetime: String,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    #[serde(default)]
    volume: Option<Decimal>,
}

const TS_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d"];

fn parse_ts(raw: &str) -> Option<NaiveDateTime> {
    for format in TS_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
        if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

type HistoryKey = (String, String, u32);

/// Cached reader for historical OHLC CSV files
pub struct HistoryStore {
    data_dir: PathBuf,
    ttl: Duration,
    default_interval: String,
    default_days: u32,
    cache: Mutex<HashMap<HistoryKey, (Arc<Vec<Candle>>, Instant)>>,
}

impl HistoryStore {
    /// Create a store reading from `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            data_dir: data_dir.into(),
            ttl,
            default_interval: "hour".to_string(),
            default_days: 90,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Set the interval/days used by [`HistoryStore::last_close`]
    pub fn with_defaults(mut self, interval: impl Into<String>, days: u32) -> Self {
        self.default_interval = interval.into();
        self.default_days = days;
        self
    }

    /// Load the series for `(symbol, interval, days)`
    ///
    /// Returns an empty series when no file matches or the file cannot be
    /// parsed. Bars are sorted by timestamp with duplicates collapsed to the
    /// latest occurrence.
    pub fn load(&self, symbol: &str, interval: &str, days: u32) -> Arc<Vec<Candle>> {
        let symbol = symbol.to_uppercase();
        let key = (symbol.clone(), interval.to_string(), days);
        {
            let cache = self.cache.lock();
            if let Some((series, at)) = cache.get(&key) {
                if at.elapsed() <= self.ttl {
                    return Arc::clone(series);
                }
            }
        }

        let series = Arc::new(self.read_series(&symbol, interval, days));
        self.cache
            .lock()
            .insert(key, (Arc::clone(&series), Instant::now()));
        series
    }

    /// Last close price from the default series, if any
    pub fn last_close(&self, symbol: &str) -> Option<Decimal> {
        let series = self.load(symbol, &self.default_interval, self.default_days);
        series.last().map(|candle| candle.close)
    }

    /// Drop cached series for `symbol`, or everything when `None`
    pub fn invalidate(&self, symbol: Option<&str>) {
        let mut cache = self.cache.lock();
        match symbol {
            None => cache.clear(),
            Some(symbol) => {
                let symbol = symbol.to_uppercase();
                cache.retain(|(sym, _, _), _| *sym != symbol);
            }
        }
    }

    fn read_series(&self, symbol: &str, interval: &str, days: u32) -> Vec<Candle> {
        let path = match self.resolve_file(symbol, interval, days) {
            Some(path) => path,
            None => return vec![],
        };
        match Self::parse_file(&path) {
            Ok(series) => series,
            Err(e) => {
                tracing::warn!(symbol, path = %path.display(), error = %e, "failed to read history");
                vec![]
            }
        }
    }

    /// Candidate filenames, most specific first
    fn resolve_file(&self, symbol: &str, interval: &str, days: u32) -> Option<PathBuf> {
        let candidates = [
            self.data_dir.join(format!("{symbol}_{interval}_{days}d.csv")),
            self.data_dir.join(format!("{symbol}_{interval}.csv")),
            self.data_dir.join(format!("{symbol}.csv")),
        ];
        for candidate in candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
        // Any day-span file for the same symbol and interval
        let prefix = format!("{symbol}_{interval}_");
        let mut matches: Vec<PathBuf> = std::fs::read_dir(&self.data_dir)
            .ok()?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with(&prefix) && name.ends_with("d.csv"))
                    .unwrap_or(false)
            })
            .collect();
        matches.sort();
        matches.into_iter().next()
    }

    fn parse_file(path: &Path) -> anyhow::Result<Vec<Candle>> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut series: Vec<Candle> = vec![];
        let mut skipped = 0usize;
        for row in reader.deserialize::<CandleRow>() {
            let row = match row {
                Ok(row) => row,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            let ts = match parse_ts(&row.datetime) {
                Some(ts) => ts,
                None => {
                    skipped += 1;
                    continue;
                }
            };
            series.push(Candle {
                ts,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume.unwrap_or_default(),
            });
        }
        if skipped > 0 {
            tracing::debug!(path = %path.display(), skipped, "skipped malformed history rows");
        }
        series.sort_by_key(|candle| candle.ts);
        // Duplicate timestamps keep the last occurrence
        let mut deduped: Vec<Candle> = Vec::with_capacity(series.len());
        for candle in series {
            match deduped.last_mut() {
                Some(previous) if previous.ts == candle.ts => *previous = candle,
                _ => deduped.push(candle),
            }
        }
        Ok(deduped)
    }
}

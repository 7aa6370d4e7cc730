//! Append-only execution journal
//!
//! Every order attempt and risk event is recorded as one JSON line so the
//! session can be audited and reconstructed after a crash. Records are
//! buffered in memory; writing happens on an explicit `flush` (typically at
//! session end) or when the buffer crosses the configured threshold, keeping
//! I/O out of the order path.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Journal record categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// An order submission attempt
    Order,
    /// A risk lifecycle event (entry, exit, halt, breach)
    Risk,
    /// A mark-to-market equity observation
    Equity,
}

/// One journal line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lots: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JournalEvent {
    /// Record an order submission attempt
    pub fn order(
        symbol: &str,
        side: &str,
        lots: i64,
        price: Option<Decimal>,
        status: &str,
        attempt: u32,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: EventKind::Order,
            symbol: Some(symbol.to_string()),
            side: Some(side.to_string()),
            lots: Some(lots),
            price,
            status: Some(status.to_string()),
            attempt: Some(attempt),
            detail: None,
        }
    }

    /// Record a risk lifecycle event
    pub fn risk(symbol: Option<&str>, detail: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: EventKind::Risk,
            symbol: symbol.map(str::to_string),
            side: None,
            lots: None,
            price: None,
            status: None,
            attempt: None,
            detail: Some(detail.into()),
        }
    }

    /// Record a mark-to-market equity value
    pub fn equity(value: Decimal) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: EventKind::Equity,
            symbol: None,
            side: None,
            lots: None,
            price: Some(value),
            status: None,
            attempt: None,
            detail: None,
        }
    }

    /// Attach free-form detail
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Append-only JSON-lines journal with buffered writes
pub struct ExecutionJournal {
    path: PathBuf,
    flush_threshold: usize,
    buffer: Mutex<Vec<JournalEvent>>,
}

impl ExecutionJournal {
    /// Create a journal writing to `path`
    pub fn new(path: impl Into<PathBuf>, flush_threshold: usize) -> Self {
        Self {
            path: path.into(),
            flush_threshold: flush_threshold.max(1),
            buffer: Mutex::new(vec![]),
        }
    }

    /// Journal output path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffer an event; flushes implicitly past the threshold
    pub fn record(&self, event: JournalEvent) {
        let should_flush = {
            let mut buffer = self.buffer.lock();
            buffer.push(event);
            buffer.len() >= self.flush_threshold
        };
        if should_flush {
            if let Err(e) = self.flush() {
                tracing::warn!(error = %e, "journal flush failed");
            }
        }
    }

    /// Write all buffered events to disk
    pub fn flush(&self) -> anyhow::Result<()> {
        let pending: Vec<JournalEvent> = {
            let mut buffer = self.buffer.lock();
            std::mem::take(&mut *buffer)
        };
        if pending.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for event in &pending {
            let line = serde_json::to_string(event)?;
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }

    /// Read the last `limit` journaled events from disk
    ///
    /// Malformed lines are skipped. Buffered but unflushed events are not
    /// included.
    pub fn read_tail(&self, limit: usize) -> Vec<JournalEvent> {
        if limit == 0 || !self.path.exists() {
            return vec![];
        }
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(limit);
        lines[start..]
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Number of buffered, unflushed events
    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }
}

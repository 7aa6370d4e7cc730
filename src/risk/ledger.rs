//! Position book and exposure accounting
//!
//! The ledger is a plain structure with no interior lock: it is owned by the
//! RiskController's single mutex so exposure reads and fill mutations always
//! serialize through one point. A partially-applied update is never
//! observable.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// An open position
///
/// Quantity sign encodes direction: positive = long, negative = short. A
/// quantity of zero is never stored; such entries are removed instead.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    /// Only ever ratchets toward profit: up for longs, down for shorts
    pub trailing_stop: Decimal,
    pub take_profit: Decimal,
    pub last_price: Decimal,
    /// Strategy that opened the position (diagnostic only)
    pub strategy: String,
}

impl Position {
    pub fn is_short(&self) -> bool {
        self.quantity < 0
    }

    /// Signed market value at the last mark
    pub fn market_value(&self) -> Decimal {
        Decimal::from(self.quantity) * self.last_price
    }

    /// Absolute market value at the last mark
    pub fn gross_value(&self) -> Decimal {
        self.market_value().abs()
    }

    /// Unrealized profit relative to entry
    pub fn unrealized_pnl(&self) -> Decimal {
        (self.last_price - self.entry_price) * Decimal::from(self.quantity)
    }
}

/// In-memory position book keyed by symbol
#[derive(Debug, Default)]
pub struct ExposureLedger {
    positions: HashMap<String, Position>,
}

impl ExposureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a position; a zero-quantity position is removed
    pub fn upsert(&mut self, position: Position) {
        if position.quantity == 0 {
            self.positions.remove(&position.symbol);
            return;
        }
        self.positions.insert(position.symbol.clone(), position);
    }

    /// Remove and return the position for `symbol`
    pub fn remove(&mut self, symbol: &str) -> Option<Position> {
        self.positions.remove(symbol)
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.positions.get_mut(symbol)
    }

    /// Update the last mark for a known symbol
    ///
    /// Never creates a position: marking an unknown symbol is a no-op and
    /// returns false.
    pub fn mark_price(&mut self, symbol: &str, price: Decimal) -> bool {
        match self.positions.get_mut(symbol) {
            Some(position) => {
                position.last_price = price;
                true
            }
            None => false,
        }
    }

    /// Sum of absolute position values at last marks
    pub fn gross_exposure(&self) -> Decimal {
        self.positions.values().map(Position::gross_value).sum()
    }

    /// Signed sum of position values at last marks
    pub fn net_exposure(&self) -> Decimal {
        self.positions.values().map(Position::market_value).sum()
    }

    /// Absolute value of a single position, zero when absent
    pub fn exposure_for(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(Position::gross_value)
            .unwrap_or_default()
    }

    /// Sum of unrealized PnL across open positions
    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(Position::unrealized_pnl).sum()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Owned copy of every open position
    pub fn snapshot(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    /// Remove and return every open position
    pub fn drain(&mut self) -> Vec<Position> {
        self.positions.drain().map(|(_, position)| position).collect()
    }
}

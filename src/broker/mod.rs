//! Broker integration module
//!
//! The `BrokerClient` trait is the boundary to the actual broker transport;
//! this crate only owns the submission discipline around it (idempotent ids,
//! slippage, retries, journaling) and a dry-run synthesis for running
//! without a broker at all.

mod gateway;

pub use gateway::OrderGateway;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw broker response for one submission attempt
#[derive(Debug, Clone)]
pub struct BrokerReply {
    /// Broker-reported status string (e.g. "fill", "rejected")
    pub status: String,
    pub lots_executed: i64,
    pub message: Option<String>,
}

/// Trait for broker client implementations
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Submit one order attempt
    ///
    /// `order_id` is the idempotency key for this attempt. An `Err` is a
    /// transport failure; a broker-side rejection comes back as an `Ok`
    /// reply whose status says so.
    async fn place_order(
        &self,
        symbol: &str,
        lots: i64,
        side: Side,
        limit_price: Option<Decimal>,
        order_id: &str,
    ) -> anyhow::Result<BrokerReply>;

    /// Cancel all open orders for the account
    async fn cancel_all_orders(&self) -> anyhow::Result<()>;
}

/// Final order status after submission (and retries) settle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Accepted by the broker
    Accepted,
    /// Synthesized fill in dry-run mode
    Simulated,
    /// Broker rejected the order after every attempt
    Rejected,
    /// Broker cancelled the order
    Cancelled,
    /// Transport failed on every attempt
    Error,
    /// Nothing was submitted (non-positive lot count)
    Skipped,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Accepted => "accepted",
            OrderStatus::Simulated => "simulated",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Error => "error",
            OrderStatus::Skipped => "skipped",
        }
    }
}

/// Outcome of a submission, after retries settle
#[derive(Debug, Clone)]
pub struct OrderOutcome {
    /// Generated id of the final attempt
    pub order_id: String,
    pub status: OrderStatus,
    pub lots_requested: i64,
    pub lots_executed: i64,
    /// Slippage-adjusted limit price actually sent
    pub limit_price: Option<Decimal>,
    pub message: Option<String>,
}

impl OrderOutcome {
    /// Whether the order went through with any executed quantity
    pub fn filled(&self) -> bool {
        matches!(self.status, OrderStatus::Accepted | OrderStatus::Simulated)
            && self.lots_executed > 0
    }

    pub fn partially_filled(&self) -> bool {
        self.lots_executed > 0 && self.lots_executed < self.lots_requested
    }
}

//! Order gateway: idempotent submission with retry and journaling
//!
//! Turns a sized intent into a broker order. Limit prices are pushed
//! against the caller by the configured slippage so resting orders still
//! cross. Transport failures and broker rejections both retry up to the
//! bound with capped linear backoff, and every attempt lands in the
//! execution journal. Without a broker client the gateway synthesizes
//! deterministic simulated fills (dry-run).

use super::{BrokerClient, OrderOutcome, OrderStatus, Side};
use crate::journal::{ExecutionJournal, JournalEvent};
use crate::telemetry;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Backoff before retry `attempt` (1-based): 0.5s, 1.0s, ... capped at 2s
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs_f64((0.5 * attempt as f64).min(2.0))
}

/// Broker statuses worth retrying: rejections and cancellations may be
/// transient (liquidity, throttling), errors definitely are
fn is_retryable_status(status: &str) -> bool {
    let status = status.to_lowercase();
    ["reject", "cancel", "error"]
        .iter()
        .any(|needle| status.contains(needle))
}

/// Submits orders against a broker client, or simulates without one
pub struct OrderGateway {
    client: Option<Arc<dyn BrokerClient>>,
    journal: Arc<ExecutionJournal>,
    slippage_bps: Decimal,
    max_retries: u32,
}

impl OrderGateway {
    /// Gateway over a real broker client
    pub fn new(
        client: Arc<dyn BrokerClient>,
        journal: Arc<ExecutionJournal>,
        slippage_bps: Decimal,
        max_retries: u32,
    ) -> Self {
        Self {
            client: Some(client),
            journal,
            slippage_bps,
            max_retries: max_retries.max(1),
        }
    }

    /// Dry-run gateway: every submission synthesizes a simulated full fill
    pub fn dry_run(journal: Arc<ExecutionJournal>, slippage_bps: Decimal) -> Self {
        Self {
            client: None,
            journal,
            slippage_bps,
            max_retries: 1,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.client.is_none()
    }

    /// Unique id per attempt: retried submissions within one call stay
    /// distinguishable in logs and the journal
    fn generate_order_id(side: Side, symbol: &str, lots: i64) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}-{}-{}-{}", side.as_str(), symbol, lots, &suffix[..8])
    }

    /// Push a limit price against the caller: buys up, sells down
    fn apply_slippage(&self, side: Side, limit_price: Option<Decimal>) -> Option<Decimal> {
        let price = limit_price?;
        let adjustment = price * self.slippage_bps / Decimal::from(10_000);
        Some(match side {
            Side::Buy => price + adjustment,
            Side::Sell => price - adjustment,
        })
    }

    /// Place a buy order
    pub async fn buy(&self, symbol: &str, lots: i64, limit_price: Option<Decimal>) -> OrderOutcome {
        self.submit(Side::Buy, symbol, lots, limit_price).await
    }

    /// Place a sell order
    pub async fn sell(
        &self,
        symbol: &str,
        lots: i64,
        limit_price: Option<Decimal>,
    ) -> OrderOutcome {
        self.submit(Side::Sell, symbol, lots, limit_price).await
    }

    /// Submit an order, retrying up to the configured bound
    ///
    /// A non-positive lot count is a skip, not an error. The outcome never
    /// carries an `Err`: transport exhaustion surfaces as `Error`, broker
    /// refusal as `Rejected`; callers must not assume the position changed
    /// unless [`OrderOutcome::filled`] holds.
    pub async fn submit(
        &self,
        side: Side,
        symbol: &str,
        lots: i64,
        limit_price: Option<Decimal>,
    ) -> OrderOutcome {
        let symbol = symbol.to_uppercase();
        if lots <= 0 {
            tracing::debug!(%symbol, lots, "skipping order with non-positive lot count");
            return OrderOutcome {
                order_id: String::new(),
                status: OrderStatus::Skipped,
                lots_requested: lots,
                lots_executed: 0,
                limit_price,
                message: Some("non-positive lot count".to_string()),
            };
        }
        let price = self.apply_slippage(side, limit_price);

        let Some(client) = &self.client else {
            let order_id = Self::generate_order_id(side, &symbol, lots);
            tracing::info!(
                %order_id,
                %symbol,
                lots,
                price = ?price,
                "[dry-run] {} order simulated",
                side
            );
            self.journal.record(JournalEvent::order(
                &symbol,
                side.as_str(),
                lots,
                price,
                OrderStatus::Simulated.as_str(),
                1,
            ));
            telemetry::record_order(OrderStatus::Simulated.as_str());
            return OrderOutcome {
                order_id,
                status: OrderStatus::Simulated,
                lots_requested: lots,
                lots_executed: lots,
                limit_price: price,
                message: Some("dry-run mode".to_string()),
            };
        };

        let mut last_outcome: Option<OrderOutcome> = None;
        for attempt in 1..=self.max_retries {
            let order_id = Self::generate_order_id(side, &symbol, lots);
            match client
                .place_order(&symbol, lots, side, price, &order_id)
                .await
            {
                Ok(reply) => {
                    self.journal.record(JournalEvent::order(
                        &symbol,
                        side.as_str(),
                        lots,
                        price,
                        &reply.status,
                        attempt,
                    ));
                    if is_retryable_status(&reply.status) {
                        // Business rejection: not worth retrying blindly,
                        // but a bounded retry covers transient refusals
                        tracing::warn!(
                            %order_id,
                            %symbol,
                            status = %reply.status,
                            attempt,
                            "broker rejected order"
                        );
                        telemetry::record_order("rejected");
                        last_outcome = Some(OrderOutcome {
                            order_id,
                            status: if reply.status.to_lowercase().contains("cancel") {
                                OrderStatus::Cancelled
                            } else {
                                OrderStatus::Rejected
                            },
                            lots_requested: lots,
                            lots_executed: reply.lots_executed,
                            limit_price: price,
                            message: reply.message,
                        });
                    } else {
                        tracing::info!(
                            %order_id,
                            %symbol,
                            lots,
                            executed = reply.lots_executed,
                            status = %reply.status,
                            "submitted {} order",
                            side
                        );
                        telemetry::record_order("accepted");
                        return OrderOutcome {
                            order_id,
                            status: OrderStatus::Accepted,
                            lots_requested: lots,
                            lots_executed: reply.lots_executed,
                            limit_price: price,
                            message: reply.message,
                        };
                    }
                }
                Err(e) => {
                    // Transport failure: blind retry is the right call
                    tracing::error!(
                        %order_id,
                        %symbol,
                        attempt,
                        error = %e,
                        "order transport failed"
                    );
                    self.journal.record(JournalEvent::order(
                        &symbol,
                        side.as_str(),
                        lots,
                        price,
                        OrderStatus::Error.as_str(),
                        attempt,
                    ));
                    telemetry::record_order("error");
                    last_outcome = Some(OrderOutcome {
                        order_id,
                        status: OrderStatus::Error,
                        lots_requested: lots,
                        lots_executed: 0,
                        limit_price: price,
                        message: Some(e.to_string()),
                    });
                }
            }
            if attempt < self.max_retries {
                telemetry::record_order_retry();
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }

        // Exhausted every attempt
        last_outcome.unwrap_or(OrderOutcome {
            order_id: String::new(),
            status: OrderStatus::Error,
            lots_requested: lots,
            lots_executed: 0,
            limit_price: price,
            message: Some("no attempts made".to_string()),
        })
    }

    /// Cancel all open orders
    ///
    /// Delegates to the broker client. Unsupported or failing cancellation
    /// logs and returns normally: dry-run and virtual setups have no
    /// open-order concept.
    pub async fn cancel_all(&self) {
        match &self.client {
            None => {
                tracing::info!("cancel_all: no broker client, skipping cancellation");
            }
            Some(client) => {
                if let Err(e) = client.cancel_all_orders().await {
                    tracing::warn!(error = %e, "cancel_all failed");
                }
            }
        }
    }
}

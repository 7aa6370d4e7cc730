//! Alert notification sink
//!
//! Risk events (drawdown, daily-loss halt, limit breaches) and session
//! summaries are pushed through a `Notifier`. Delivery is fire-and-forget:
//! implementations must log failures and never let them reach risk logic.

use std::sync::Arc;

/// Trait for alert sinks
pub trait Notifier: Send + Sync {
    /// Deliver a message. Must not panic or propagate delivery errors.
    fn notify(&self, message: &str);
}

/// Notifier that writes alerts to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        tracing::info!(alert = %message, "risk alert");
    }
}

/// Notifier that discards all messages
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _message: &str) {}
}

/// Shared notifier handle
pub type SharedNotifier = Arc<dyn Notifier>;

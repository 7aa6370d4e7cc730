//! Telemetry module
//!
//! Metrics and logging

mod logging;
mod metrics;

pub use logging::init_logging;
pub use metrics::{
    record_order, record_order_retry, record_risk_breach, set_gauge, GaugeMetric,
};

use crate::config::TelemetryConfig;

/// Initialize logging and the Prometheus exporter
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    init_logging(&config.log_level)?;

    if config.metrics_port > 0 {
        metrics::init_exporter(config.metrics_port)?;
    }

    Ok(())
}

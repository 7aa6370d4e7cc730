//! Prometheus metrics

use metrics_exporter_prometheus::PrometheusBuilder;

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current mark-to-market equity
    Equity,
    /// Peak equity
    PeakEquity,
    /// Gross exposure across open positions
    GrossExposure,
    /// Net (signed) exposure across open positions
    NetExposure,
    /// Open position count
    OpenPositions,
    /// Current drawdown from peak
    DrawdownPct,
}

impl GaugeMetric {
    fn name(&self) -> &'static str {
        match self {
            GaugeMetric::Equity => "lotgate_equity",
            GaugeMetric::PeakEquity => "lotgate_peak_equity",
            GaugeMetric::GrossExposure => "lotgate_gross_exposure",
            GaugeMetric::NetExposure => "lotgate_net_exposure",
            GaugeMetric::OpenPositions => "lotgate_open_positions",
            GaugeMetric::DrawdownPct => "lotgate_drawdown_pct",
        }
    }
}

/// Start the Prometheus exporter on the given port
pub fn init_exporter(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;
    tracing::info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

/// Count a settled order submission attempt by final status
pub fn record_order(status: &'static str) {
    metrics::counter!("lotgate_orders_total", "status" => status).increment(1);
}

/// Count an order retry
pub fn record_order_retry() {
    metrics::counter!("lotgate_order_retries_total").increment(1);
}

/// Count a risk limit breach by kind
pub fn record_risk_breach(kind: &'static str) {
    metrics::counter!("lotgate_risk_breaches_total", "kind" => kind).increment(1);
}

//! Risk limits and per-instrument/asset-class overrides

use super::RiskError;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

/// Optional tighter limits for a single instrument
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstrumentLimits {
    /// Maximum position value as a fraction of equity
    pub max_position_pct: Option<Decimal>,
    /// Maximum absolute lot count
    pub max_lots: Option<i64>,
    /// Maximum position value as a multiple of equity
    pub max_leverage: Option<Decimal>,
}

/// Optional limits shared by all instruments of one asset class
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetClassLimits {
    /// Maximum combined class value as a multiple of equity
    pub max_leverage: Option<Decimal>,
    /// Maximum combined class value as a fraction of equity
    pub max_exposure_pct: Option<Decimal>,
}

/// Risk limits, immutable per controller instance
#[derive(Debug, Clone, Deserialize)]
pub struct RiskLimits {
    /// Maximum drawdown from peak equity (alert only)
    #[serde(default = "default_max_drawdown")]
    pub max_drawdown_pct: Decimal,
    /// Daily loss fraction that halts trading for the day
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss_pct: Decimal,
    /// Maximum single-position value as a fraction of equity
    #[serde(default = "default_max_position")]
    pub max_position_pct: Decimal,
    /// Per-trade risk as a fraction of equity
    #[serde(default = "default_per_trade_risk")]
    pub per_trade_risk_pct: Decimal,
    /// Stop loss distance as a fraction of entry price
    #[serde(default = "default_stop_loss")]
    pub stop_loss_pct: Decimal,
    /// Take profit distance as a fraction of entry price
    #[serde(default = "default_take_profit")]
    pub take_profit_pct: Decimal,
    /// Maximum concurrent positions
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Whether short positions are permitted
    #[serde(default)]
    pub allow_short: bool,
    /// Combined position value cap as a fraction of equity.
    /// A value of exactly 1.0 is a real 100% cap, not a no-op sentinel.
    #[serde(default = "default_exposure_pct")]
    pub max_portfolio_exposure_pct: Decimal,
    /// Combined position value cap as a multiple of equity
    #[serde(default = "default_max_leverage")]
    pub max_leverage: Decimal,
    /// Seconds between monitor-loop scans; 0 disables the monitor
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: f64,
    /// Per-instrument overrides keyed by symbol
    #[serde(default)]
    pub instruments: HashMap<String, InstrumentLimits>,
    /// Per-asset-class limits keyed by class name
    #[serde(default)]
    pub classes: HashMap<String, AssetClassLimits>,
    /// Symbol to asset-class assignment
    #[serde(default)]
    pub instrument_classes: HashMap<String, String>,
}

fn default_max_drawdown() -> Decimal {
    Decimal::new(2, 1) // 0.2
}
fn default_max_daily_loss() -> Decimal {
    Decimal::new(1, 1) // 0.1
}
fn default_max_position() -> Decimal {
    Decimal::new(2, 1) // 0.2
}
fn default_per_trade_risk() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_stop_loss() -> Decimal {
    Decimal::new(5, 2) // 0.05
}
fn default_take_profit() -> Decimal {
    Decimal::new(1, 1) // 0.1
}
fn default_max_positions() -> usize {
    5
}
fn default_exposure_pct() -> Decimal {
    Decimal::ONE
}
fn default_max_leverage() -> Decimal {
    Decimal::ONE
}
fn default_monitor_interval() -> f64 {
    5.0
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_drawdown_pct: default_max_drawdown(),
            max_daily_loss_pct: default_max_daily_loss(),
            max_position_pct: default_max_position(),
            per_trade_risk_pct: default_per_trade_risk(),
            stop_loss_pct: default_stop_loss(),
            take_profit_pct: default_take_profit(),
            max_positions: default_max_positions(),
            allow_short: false,
            max_portfolio_exposure_pct: default_exposure_pct(),
            max_leverage: default_max_leverage(),
            monitor_interval_secs: default_monitor_interval(),
            instruments: HashMap::new(),
            classes: HashMap::new(),
            instrument_classes: HashMap::new(),
        }
    }
}

impl RiskLimits {
    /// Check limit consistency; a controller must not start otherwise
    pub fn validate(&self) -> Result<(), RiskError> {
        let positive = [
            ("per_trade_risk_pct", self.per_trade_risk_pct),
            ("stop_loss_pct", self.stop_loss_pct),
            ("take_profit_pct", self.take_profit_pct),
            ("max_position_pct", self.max_position_pct),
            ("max_portfolio_exposure_pct", self.max_portfolio_exposure_pct),
            ("max_leverage", self.max_leverage),
        ];
        for (name, value) in positive {
            if value <= Decimal::ZERO {
                return Err(RiskError::InvalidLimit { name, value });
            }
        }
        let fractions = [
            ("max_drawdown_pct", self.max_drawdown_pct),
            ("max_daily_loss_pct", self.max_daily_loss_pct),
        ];
        for (name, value) in fractions {
            if value <= Decimal::ZERO || value > Decimal::ONE {
                return Err(RiskError::InvalidLimit { name, value });
            }
        }
        if self.max_positions == 0 {
            return Err(RiskError::NoPositionsAllowed);
        }
        Ok(())
    }

    /// Portfolio-wide exposure cap as a fraction of equity
    pub fn effective_exposure_cap(&self) -> Decimal {
        self.max_leverage.min(self.max_portfolio_exposure_pct)
    }

    /// Per-instrument override for `symbol`, if configured
    pub fn instrument(&self, symbol: &str) -> Option<&InstrumentLimits> {
        self.instruments.get(&symbol.to_uppercase())
    }

    /// Asset class and its limits for `symbol`, if both are configured
    pub fn class_of(&self, symbol: &str) -> Option<(&str, &AssetClassLimits)> {
        let class = self.instrument_classes.get(&symbol.to_uppercase())?;
        let limits = self.classes.get(class)?;
        Some((class.as_str(), limits))
    }
}

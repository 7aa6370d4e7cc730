//! Risk management types

use rust_decimal::Decimal;
use thiserror::Error;

/// Risk configuration errors, fatal at construction
#[derive(Debug, Error)]
pub enum RiskError {
    /// A limit value outside its allowed range
    #[error("invalid risk limit {name}: {value}")]
    InvalidLimit { name: &'static str, value: Decimal },
    /// max_positions must allow at least one position
    #[error("max_positions must be at least 1")]
    NoPositionsAllowed,
}

/// Reason trading was halted or an equity alert raised
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HaltReason {
    /// Daily loss fraction reached the configured threshold
    DailyLoss(Decimal),
    /// Drawdown from peak reached the configured threshold
    Drawdown(Decimal),
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::DailyLoss(loss) => write!(f, "daily loss {loss} reached limit"),
            HaltReason::Drawdown(dd) => write!(f, "drawdown {dd} reached limit"),
        }
    }
}

/// A limit breach found by the monitor loop
#[derive(Debug, Clone, PartialEq)]
pub enum LimitBreach {
    /// Position exceeds its per-instrument lot cap
    InstrumentLots { lots: i64, max_lots: i64 },
    /// Position value exceeds its per-instrument equity fraction
    InstrumentExposure { exposure: Decimal, cap: Decimal },
    /// Position value exceeds its per-instrument leverage cap
    InstrumentLeverage { exposure: Decimal, cap: Decimal },
    /// Asset-class value exceeds the class exposure fraction
    ClassExposure {
        class: String,
        exposure: Decimal,
        cap: Decimal,
    },
    /// Asset-class value exceeds the class leverage cap
    ClassLeverage {
        class: String,
        exposure: Decimal,
        cap: Decimal,
    },
}

impl LimitBreach {
    /// Short tag used for metrics and journal entries
    pub fn kind(&self) -> &'static str {
        match self {
            LimitBreach::InstrumentLots { .. } => "instrument_lots",
            LimitBreach::InstrumentExposure { .. } => "instrument_exposure",
            LimitBreach::InstrumentLeverage { .. } => "instrument_leverage",
            LimitBreach::ClassExposure { .. } => "class_exposure",
            LimitBreach::ClassLeverage { .. } => "class_leverage",
        }
    }
}

impl std::fmt::Display for LimitBreach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitBreach::InstrumentLots { lots, max_lots } => {
                write!(f, "lot cap exceeded: {lots} > {max_lots}")
            }
            LimitBreach::InstrumentExposure { exposure, cap } => {
                write!(f, "instrument exposure {exposure} exceeds cap {cap}")
            }
            LimitBreach::InstrumentLeverage { exposure, cap } => {
                write!(f, "instrument leverage exposure {exposure} exceeds cap {cap}")
            }
            LimitBreach::ClassExposure {
                class,
                exposure,
                cap,
            } => write!(f, "class {class} exposure {exposure} exceeds cap {cap}"),
            LimitBreach::ClassLeverage {
                class,
                exposure,
                cap,
            } => write!(f, "class {class} leverage exposure {exposure} exceeds cap {cap}"),
        }
    }
}

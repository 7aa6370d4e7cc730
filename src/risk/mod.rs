//! Risk management module
//!
//! Position sizing, stop/take-profit lifecycle, exposure accounting and
//! portfolio-level risk controls.

mod controller;
mod ledger;
mod limits;
mod types;

pub use controller::{ForceExitFn, RiskController};
pub use ledger::{ExposureLedger, Position};
pub use limits::{AssetClassLimits, InstrumentLimits, RiskLimits};
pub use types::{HaltReason, LimitBreach, RiskError};

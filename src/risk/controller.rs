//! Risk controller: sizing, stops, halts and limit monitoring
//!
//! Owns the exposure ledger behind a single mutex. Sizing reads a consistent
//! snapshot of gross exposure under that lock; fill reconciliation mutates
//! under the same lock. The lock is never held across network I/O: orders go
//! out between the sizing read and the registration write.

use super::{ExposureLedger, HaltReason, LimitBreach, Position, RiskError, RiskLimits};
use crate::alert::SharedNotifier;
use crate::journal::{ExecutionJournal, JournalEvent};
use crate::telemetry;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Callback used by the monitor loop to request a forced exit
///
/// Actual order placement belongs to the gateway, so the monitor only
/// reports; the orchestrating layer supplies the callback and drives the
/// exit through the normal submission path.
pub type ForceExitFn = Arc<dyn Fn(&str, &LimitBreach) + Send + Sync>;

/// Mutable risk state, single-writer-at-a-time under the controller lock
struct RiskInner {
    ledger: ExposureLedger,
    equity: Decimal,
    peak_equity: Decimal,
    day_start_equity: Decimal,
    realized_pnl: Decimal,
    halt_trading: bool,
    last_equity_date: NaiveDate,
}

/// Evaluates sizing, limit breaches and daily-loss halts; owns the ledger
pub struct RiskController {
    limits: RiskLimits,
    initial_capital: Decimal,
    inner: Mutex<RiskInner>,
    notifier: SharedNotifier,
    journal: Option<Arc<ExecutionJournal>>,
    force_exit: Mutex<Option<ForceExitFn>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl RiskController {
    /// Create a controller; invalid limits are fatal here
    pub fn new(
        limits: RiskLimits,
        initial_capital: Decimal,
        notifier: SharedNotifier,
    ) -> Result<Self, RiskError> {
        limits.validate()?;
        Ok(Self {
            limits,
            initial_capital,
            inner: Mutex::new(RiskInner {
                ledger: ExposureLedger::new(),
                equity: initial_capital,
                peak_equity: initial_capital,
                day_start_equity: initial_capital,
                realized_pnl: Decimal::ZERO,
                halt_trading: false,
                last_equity_date: Utc::now().date_naive(),
            }),
            notifier,
            journal: None,
            force_exit: Mutex::new(None),
            monitor: Mutex::new(None),
        })
    }

    /// Attach an execution journal for risk events
    pub fn with_journal(mut self, journal: Arc<ExecutionJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Install the force-exit callback used by the monitor loop
    pub fn set_force_exit(&self, callback: ForceExitFn) {
        *self.force_exit.lock() = Some(callback);
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    pub fn halted(&self) -> bool {
        self.inner.lock().halt_trading
    }

    pub fn equity(&self) -> Decimal {
        self.inner.lock().equity
    }

    pub fn peak_equity(&self) -> Decimal {
        self.inner.lock().peak_equity
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.inner.lock().realized_pnl
    }

    pub fn gross_exposure(&self) -> Decimal {
        self.inner.lock().ledger.gross_exposure()
    }

    pub fn net_exposure(&self) -> Decimal {
        self.inner.lock().ledger.net_exposure()
    }

    pub fn open_positions(&self) -> usize {
        self.inner.lock().ledger.len()
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.inner.lock().ledger.contains(&symbol.to_uppercase())
    }

    /// Owned copy of the position for `symbol`
    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.inner
            .lock()
            .ledger
            .get(&symbol.to_uppercase())
            .cloned()
    }

    /// Owned copy of every open position
    pub fn positions_snapshot(&self) -> Vec<Position> {
        self.inner.lock().ledger.snapshot()
    }

    /// Maximum lots allowed for a new entry at `price`
    ///
    /// Zero while halted. Otherwise the per-trade risk size, capped by the
    /// single-position equity fraction, the remaining portfolio capacity
    /// under `min(max_leverage, max_portfolio_exposure_pct)`, and any
    /// per-instrument override. The whole computation reads one consistent
    /// ledger snapshot under the controller lock.
    pub fn allowed_size(&self, symbol: &str, price: Decimal) -> i64 {
        let inner = self.inner.lock();
        if inner.halt_trading || price <= Decimal::ZERO {
            return 0;
        }
        let equity = inner.equity;

        // Size so a stop-loss exit loses at most per_trade_risk_pct of equity
        let risk_amount = equity * self.limits.per_trade_risk_pct;
        let stop_amount = price * self.limits.stop_loss_pct;
        let base = risk_amount / stop_amount;

        let mut size = base.min(equity * self.limits.max_position_pct / price);

        let cap = self.limits.effective_exposure_cap();
        let remaining =
            (equity * cap - inner.ledger.gross_exposure()).max(Decimal::ZERO) / price;
        size = size.min(remaining);

        if let Some(instrument) = self.limits.instrument(symbol) {
            if let Some(pct) = instrument.max_position_pct {
                size = size.min(equity * pct / price);
            }
            if let Some(max_lots) = instrument.max_lots {
                size = size.min(Decimal::from(max_lots));
            }
        }

        size.floor().to_i64().unwrap_or(0).max(0)
    }

    /// Record a confirmed entry and initialise its stop/take levels
    ///
    /// Rejected (logged, no-op) while halted, at the position-count cap, for
    /// zero quantity, or for shorts when shorting is disabled. Returns
    /// whether the position was registered.
    pub fn register_entry(
        &self,
        symbol: &str,
        price: Decimal,
        quantity: i64,
        strategy: &str,
    ) -> bool {
        let symbol = symbol.to_uppercase();
        {
            let mut inner = self.inner.lock();
            if inner.halt_trading {
                tracing::warn!(%symbol, "trading halted, entry rejected");
                return false;
            }
            if !inner.ledger.contains(&symbol) && inner.ledger.len() >= self.limits.max_positions {
                tracing::warn!(%symbol, "maximum open positions reached, entry rejected");
                return false;
            }
            if quantity == 0 {
                return false;
            }
            let is_short = quantity < 0;
            if is_short && !self.limits.allow_short {
                tracing::warn!(%symbol, "short positions disabled, entry rejected");
                return false;
            }

            // Stop below entry for longs, above for shorts; take profit mirrored
            let (stop_price, take_profit) = if is_short {
                (
                    price * (Decimal::ONE + self.limits.stop_loss_pct),
                    price * (Decimal::ONE - self.limits.take_profit_pct),
                )
            } else {
                (
                    price * (Decimal::ONE - self.limits.stop_loss_pct),
                    price * (Decimal::ONE + self.limits.take_profit_pct),
                )
            };
            inner.ledger.upsert(Position {
                symbol: symbol.clone(),
                quantity,
                entry_price: price,
                stop_price,
                trailing_stop: stop_price,
                take_profit,
                last_price: price,
                strategy: strategy.to_string(),
            });
        }

        let direction = if quantity < 0 { "short" } else { "long" };
        tracing::info!(%symbol, %price, quantity, strategy, "entered {direction} position");
        self.journal_risk(
            Some(&symbol),
            format!("entered {direction} {quantity} @ {price} ({strategy})"),
        );
        true
    }

    /// Mark the position and decide whether it should be exited
    ///
    /// Updates the trailing stop first: for longs it only ratchets upward,
    /// for shorts only downward. Returns true when the price has crossed the
    /// trailing stop or the take-profit level.
    pub fn check_exit(&self, symbol: &str, price: Decimal) -> bool {
        let symbol = symbol.to_uppercase();
        let mut inner = self.inner.lock();
        let Some(position) = inner.ledger.get_mut(&symbol) else {
            return false;
        };
        position.last_price = price;

        if position.quantity > 0 {
            let new_trailing = price * (Decimal::ONE - self.limits.stop_loss_pct);
            if new_trailing > position.trailing_stop {
                position.trailing_stop = new_trailing;
            }
            if price <= position.trailing_stop {
                tracing::info!(%symbol, %price, "trailing stop hit, exiting long");
                return true;
            }
            if price >= position.take_profit {
                tracing::info!(%symbol, %price, "take profit reached, exiting long");
                return true;
            }
        } else {
            let new_trailing = price * (Decimal::ONE + self.limits.stop_loss_pct);
            if new_trailing < position.trailing_stop {
                position.trailing_stop = new_trailing;
            }
            if price >= position.trailing_stop {
                tracing::info!(%symbol, %price, "trailing stop hit, exiting short");
                return true;
            }
            if price <= position.take_profit {
                tracing::info!(%symbol, %price, "take profit reached, exiting short");
                return true;
            }
        }
        false
    }

    /// Update the last mark without exit evaluation
    pub fn mark_price(&self, symbol: &str, price: Decimal) -> bool {
        self.inner
            .lock()
            .ledger
            .mark_price(&symbol.to_uppercase(), price)
    }

    /// Update equity tracking using today's calendar date
    pub fn update_equity(&self, equity: Decimal) {
        self.update_equity_on(equity, Utc::now().date_naive());
    }

    /// Update equity tracking as of `today`
    ///
    /// The first update of a new calendar day resets the daily baseline and
    /// clears the halt. A drawdown past the limit is alerted but does not
    /// close positions; a daily loss past the limit clears every position
    /// and halts trading for the rest of the day.
    pub fn update_equity_on(&self, equity: Decimal, today: NaiveDate) {
        let mut alerts: Vec<HaltReason> = vec![];
        let mut cleared: Vec<Position> = vec![];
        {
            let mut inner = self.inner.lock();
            inner.equity = equity;
            if today != inner.last_equity_date {
                inner.day_start_equity = equity;
                inner.last_equity_date = today;
                inner.halt_trading = false;
            }
            if equity > inner.peak_equity {
                inner.peak_equity = equity;
            }

            if inner.peak_equity > Decimal::ZERO {
                let drawdown = Decimal::ONE - equity / inner.peak_equity;
                if drawdown >= self.limits.max_drawdown_pct {
                    alerts.push(HaltReason::Drawdown(drawdown));
                }
            }

            if inner.day_start_equity > Decimal::ZERO {
                let daily_loss = (inner.day_start_equity - equity) / inner.day_start_equity;
                if daily_loss >= self.limits.max_daily_loss_pct && !inner.halt_trading {
                    cleared = inner.ledger.drain();
                    for position in &cleared {
                        inner.realized_pnl += position.unrealized_pnl();
                    }
                    inner.halt_trading = true;
                    alerts.push(HaltReason::DailyLoss(daily_loss));
                }
            }
        }

        for position in &cleared {
            tracing::info!(symbol = %position.symbol, "force closing position on daily loss halt");
            self.journal_risk(
                Some(&position.symbol),
                format!("cleared on daily loss halt, qty {}", position.quantity),
            );
        }
        for alert in alerts {
            match alert {
                HaltReason::Drawdown(dd) => {
                    tracing::error!(drawdown = %dd, "max drawdown exceeded");
                    telemetry::record_risk_breach("max_drawdown");
                    self.notifier
                        .notify(&format!("Max drawdown exceeded: {dd:.4}"));
                }
                HaltReason::DailyLoss(loss) => {
                    tracing::error!(daily_loss = %loss, "max daily loss exceeded, halting for the day");
                    telemetry::record_risk_breach("max_daily_loss");
                    self.notifier.notify(&format!(
                        "Daily loss limit exceeded: {loss:.4}. Trading halted until tomorrow."
                    ));
                    self.journal_risk(None, format!("daily loss halt at {loss}"));
                }
            }
        }
    }

    /// Close out a position, realising its PnL at the last mark
    pub fn exit_position(&self, symbol: &str) -> Option<Position> {
        let symbol = symbol.to_uppercase();
        let position = {
            let mut inner = self.inner.lock();
            let position = inner.ledger.remove(&symbol)?;
            inner.realized_pnl += position.unrealized_pnl();
            position
        };
        tracing::info!(%symbol, quantity = position.quantity, "exited position");
        self.journal_risk(
            Some(&symbol),
            format!(
                "exited qty {} @ {} (pnl {})",
                position.quantity,
                position.last_price,
                position.unrealized_pnl()
            ),
        );
        Some(position)
    }

    /// Close out every position (drawdown breach or shutdown)
    pub fn clear_all(&self) {
        let cleared = {
            let mut inner = self.inner.lock();
            let cleared = inner.ledger.drain();
            for position in &cleared {
                inner.realized_pnl += position.unrealized_pnl();
            }
            cleared
        };
        for position in cleared {
            tracing::info!(symbol = %position.symbol, "force closing position");
            self.journal_risk(
                Some(&position.symbol),
                format!("force closed, qty {}", position.quantity),
            );
        }
    }

    /// Mark-to-market equity: initial capital plus realized and unrealized PnL
    pub fn mark_to_market(&self) -> Decimal {
        let inner = self.inner.lock();
        self.initial_capital + inner.realized_pnl + inner.ledger.unrealized_pnl()
    }

    /// Start the background limit monitor
    ///
    /// Replaces a previously running monitor. The task holds only a weak
    /// reference, so dropping the controller stops it.
    pub fn start_monitoring(self: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                controller.scan_limits();
            }
        });
        if let Some(previous) = self.monitor.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the background limit monitor
    pub fn stop_monitoring(&self) {
        if let Some(handle) = self.monitor.lock().take() {
            handle.abort();
        }
    }

    /// One monitor pass: scan open positions against instrument and
    /// asset-class limits, invoking the force-exit callback per breach
    ///
    /// The scan works on a snapshot; it never mutates the ledger itself.
    pub fn scan_limits(&self) -> Vec<(String, LimitBreach)> {
        let (equity, positions) = {
            let inner = self.inner.lock();
            (inner.equity, inner.ledger.snapshot())
        };

        let mut class_gross: HashMap<&str, Decimal> = HashMap::new();
        for position in &positions {
            if let Some((class, _)) = self.limits.class_of(&position.symbol) {
                *class_gross.entry(class).or_default() += position.gross_value();
            }
        }

        let mut breaches: Vec<(String, LimitBreach)> = vec![];
        for position in &positions {
            let gross = position.gross_value();
            if let Some(instrument) = self.limits.instrument(&position.symbol) {
                if let Some(max_lots) = instrument.max_lots {
                    if position.quantity.abs() > max_lots {
                        breaches.push((
                            position.symbol.clone(),
                            LimitBreach::InstrumentLots {
                                lots: position.quantity,
                                max_lots,
                            },
                        ));
                        continue;
                    }
                }
                if let Some(pct) = instrument.max_position_pct {
                    let cap = equity * pct;
                    if gross > cap {
                        breaches.push((
                            position.symbol.clone(),
                            LimitBreach::InstrumentExposure {
                                exposure: gross,
                                cap,
                            },
                        ));
                        continue;
                    }
                }
                if let Some(leverage) = instrument.max_leverage {
                    let cap = equity * leverage;
                    if gross > cap {
                        breaches.push((
                            position.symbol.clone(),
                            LimitBreach::InstrumentLeverage {
                                exposure: gross,
                                cap,
                            },
                        ));
                        continue;
                    }
                }
            }
            if let Some((class, class_limits)) = self.limits.class_of(&position.symbol) {
                let class_exposure = class_gross.get(class).copied().unwrap_or_default();
                if let Some(pct) = class_limits.max_exposure_pct {
                    let cap = equity * pct;
                    if class_exposure > cap {
                        breaches.push((
                            position.symbol.clone(),
                            LimitBreach::ClassExposure {
                                class: class.to_string(),
                                exposure: class_exposure,
                                cap,
                            },
                        ));
                        continue;
                    }
                }
                if let Some(leverage) = class_limits.max_leverage {
                    let cap = equity * leverage;
                    if class_exposure > cap {
                        breaches.push((
                            position.symbol.clone(),
                            LimitBreach::ClassLeverage {
                                class: class.to_string(),
                                exposure: class_exposure,
                                cap,
                            },
                        ));
                    }
                }
            }
        }

        if breaches.is_empty() {
            return breaches;
        }
        let callback = self.force_exit.lock().clone();
        for (symbol, breach) in &breaches {
            tracing::warn!(%symbol, breach = %breach, "position limit breach");
            telemetry::record_risk_breach(breach.kind());
            self.notifier
                .notify(&format!("Limit breach on {symbol}: {breach}"));
            self.journal_risk(Some(symbol), format!("limit breach: {breach}"));
            if let Some(callback) = &callback {
                callback(symbol, breach);
            }
        }
        breaches
    }

    fn journal_risk(&self, symbol: Option<&str>, detail: String) {
        if let Some(journal) = &self.journal {
            journal.record(JournalEvent::risk(symbol, detail));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::NullNotifier;
    use crate::risk::{AssetClassLimits, InstrumentLimits};
    use rust_decimal_macros::dec;

    fn controller(limits: RiskLimits, capital: Decimal) -> RiskController {
        RiskController::new(limits, capital, Arc::new(NullNotifier)).unwrap()
    }

    fn default_controller(capital: Decimal) -> RiskController {
        controller(RiskLimits::default(), capital)
    }

    #[test]
    fn test_invalid_limits_fatal_at_construction() {
        let limits = RiskLimits {
            stop_loss_pct: Decimal::ZERO,
            ..RiskLimits::default()
        };
        assert!(RiskController::new(limits, dec!(10000), Arc::new(NullNotifier)).is_err());
    }

    #[test]
    fn test_allowed_size_formula() {
        // base = 10000*0.02/(100*0.05) = 40 lots,
        // capped by max_position_pct: 10000*0.2/100 = 20 lots
        let risk = default_controller(dec!(10000));
        assert_eq!(risk.allowed_size("SBER", dec!(100)), 20);
    }

    #[test]
    fn test_allowed_size_zero_when_halted() {
        let day = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        let risk = default_controller(dec!(1000000));
        risk.update_equity_on(dec!(1000000), day);
        risk.update_equity_on(dec!(850000), day);
        assert!(risk.halted());
        assert_eq!(risk.allowed_size("SBER", dec!(100)), 0);
        assert_eq!(risk.allowed_size("SBER", dec!(1)), 0);
    }

    #[test]
    fn test_allowed_size_zero_for_bad_price() {
        let risk = default_controller(dec!(10000));
        assert_eq!(risk.allowed_size("SBER", Decimal::ZERO), 0);
        assert_eq!(risk.allowed_size("SBER", dec!(-10)), 0);
    }

    #[test]
    fn test_portfolio_exposure_cap_scenario() {
        // equity=10000, max_position_pct=1.0, exposure cap 0.2, price=100:
        // allowed size * 100 ~= 2000, and a second call returns 0
        let limits = RiskLimits {
            max_position_pct: dec!(1.0),
            max_portfolio_exposure_pct: dec!(0.2),
            per_trade_risk_pct: dec!(0.5),
            ..RiskLimits::default()
        };
        let risk = controller(limits, dec!(10000));
        let lots = risk.allowed_size("SBER", dec!(100));
        assert_eq!(lots, 20);

        assert!(risk.register_entry("SBER", dec!(100), lots, "test"));
        assert_eq!(risk.gross_exposure(), dec!(2000));
        assert_eq!(risk.allowed_size("GAZP", dec!(100)), 0);
    }

    #[test]
    fn test_exposure_cap_of_one_is_enforced() {
        let limits = RiskLimits {
            max_position_pct: dec!(1.0),
            per_trade_risk_pct: dec!(0.9),
            ..RiskLimits::default()
        };
        let risk = controller(limits, dec!(10000));
        // base = 10000*0.9/5 = 1800, equity cap = 100, remaining = 100
        let lots = risk.allowed_size("SBER", dec!(100));
        assert_eq!(lots, 100);
        risk.register_entry("SBER", dec!(100), lots, "test");
        // Gross exposure now equals equity; the 1.0 cap blocks further growth
        assert_eq!(risk.allowed_size("GAZP", dec!(100)), 0);
    }

    #[test]
    fn test_instrument_overrides_cap_size() {
        let mut limits = RiskLimits {
            max_position_pct: dec!(1.0),
            per_trade_risk_pct: dec!(0.5),
            ..RiskLimits::default()
        };
        limits.instruments.insert(
            "SBER".to_string(),
            InstrumentLimits {
                max_lots: Some(7),
                ..Default::default()
            },
        );
        limits.instruments.insert(
            "GAZP".to_string(),
            InstrumentLimits {
                max_position_pct: Some(dec!(0.05)),
                ..Default::default()
            },
        );
        let risk = controller(limits, dec!(10000));
        assert_eq!(risk.allowed_size("SBER", dec!(100)), 7);
        // 10000 * 0.05 / 100 = 5
        assert_eq!(risk.allowed_size("GAZP", dec!(100)), 5);
    }

    #[test]
    fn test_register_entry_rejections() {
        let limits = RiskLimits {
            max_positions: 1,
            ..RiskLimits::default()
        };
        let risk = controller(limits, dec!(100000));

        assert!(!risk.register_entry("SBER", dec!(100), 0, "test"));
        assert!(!risk.register_entry("SBER", dec!(100), -5, "test"));
        assert!(risk.register_entry("SBER", dec!(100), 5, "test"));
        assert!(!risk.register_entry("GAZP", dec!(50), 5, "test"));
        assert_eq!(risk.open_positions(), 1);
    }

    #[test]
    fn test_register_entry_short_levels() {
        let limits = RiskLimits {
            allow_short: true,
            ..RiskLimits::default()
        };
        let risk = controller(limits, dec!(100000));
        assert!(risk.register_entry("SBER", dec!(100), -10, "test"));

        let position = risk.position("SBER").unwrap();
        assert!(position.is_short());
        assert_eq!(position.stop_price, dec!(105.00));
        assert_eq!(position.take_profit, dec!(90.000));
        assert_eq!(position.trailing_stop, dec!(105.00));
    }

    #[test]
    fn test_stop_loss_exit_scenario() {
        let risk = default_controller(dec!(100000));
        risk.register_entry("SBER", dec!(100), 10, "test");
        // stop at 95; 94 crosses it
        assert!(!risk.check_exit("SBER", dec!(96)));
        assert!(risk.check_exit("SBER", dec!(94)));
    }

    #[test]
    fn test_take_profit_exit_scenario() {
        let limits = RiskLimits {
            take_profit_pct: dec!(0.02),
            ..RiskLimits::default()
        };
        let risk = controller(limits, dec!(100000));
        risk.register_entry("SBER", dec!(100), 10, "test");
        assert!(risk.check_exit("SBER", dec!(103)));
    }

    #[test]
    fn test_trailing_stop_monotonicity() {
        let risk = default_controller(dec!(100000));
        risk.register_entry("SBER", dec!(100), 10, "test");

        let mut previous = risk.position("SBER").unwrap().trailing_stop;
        for price in [101, 103, 103, 108, 109] {
            assert!(!risk.check_exit("SBER", Decimal::from(price)));
            let trailing = risk.position("SBER").unwrap().trailing_stop;
            assert!(trailing >= previous);
            previous = trailing;
        }
        // 109 * 0.95 = 103.55; falling through it fires the trailing stop
        assert!(risk.check_exit("SBER", dec!(103)));
    }

    #[test]
    fn test_trailing_stop_never_loosens_on_pullback() {
        let risk = default_controller(dec!(100000));
        risk.register_entry("SBER", dec!(100), 10, "test");
        assert!(!risk.check_exit("SBER", dec!(108)));
        let high_water = risk.position("SBER").unwrap().trailing_stop;
        assert!(!risk.check_exit("SBER", dec!(106)));
        assert_eq!(risk.position("SBER").unwrap().trailing_stop, high_water);
    }

    #[test]
    fn test_short_exit_mirrors() {
        let limits = RiskLimits {
            allow_short: true,
            ..RiskLimits::default()
        };
        let risk = controller(limits, dec!(100000));
        risk.register_entry("SBER", dec!(100), -10, "test");
        // trailing at 105; rising through it exits
        assert!(!risk.check_exit("SBER", dec!(104)));
        assert!(risk.check_exit("SBER", dec!(106)));

        // trailing ratchets down as price falls
        let risk = controller(
            RiskLimits {
                allow_short: true,
                ..RiskLimits::default()
            },
            dec!(100000),
        );
        risk.register_entry("GAZP", dec!(100), -10, "test");
        assert!(!risk.check_exit("GAZP", dec!(95)));
        assert_eq!(risk.position("GAZP").unwrap().trailing_stop, dec!(99.75));
        // take profit at 90
        assert!(risk.check_exit("GAZP", dec!(89)));
    }

    #[test]
    fn test_check_exit_unknown_symbol() {
        let risk = default_controller(dec!(100000));
        assert!(!risk.check_exit("SBER", dec!(100)));
        assert_eq!(risk.open_positions(), 0);
    }

    #[test]
    fn test_daily_loss_halt_scenario() {
        let day = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        let risk = default_controller(dec!(1000000));
        risk.register_entry("SBER", dec!(100), 10, "test");

        risk.update_equity_on(dec!(1000000), day);
        assert!(!risk.halted());

        // 15% daily loss >= 10% limit: halt and clear the book
        risk.update_equity_on(dec!(850000), day);
        assert!(risk.halted());
        assert_eq!(risk.open_positions(), 0);
    }

    #[test]
    fn test_halt_clears_on_new_day() {
        let day1 = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2020, 1, 3).unwrap();
        let risk = default_controller(dec!(1000000));

        risk.update_equity_on(dec!(1000000), day1);
        risk.update_equity_on(dec!(850000), day1);
        assert!(risk.halted());
        assert_eq!(risk.allowed_size("SBER", dec!(100)), 0);

        // First update of the next day resets the baseline and the halt
        risk.update_equity_on(dec!(850000), day2);
        assert!(!risk.halted());
        assert!(risk.allowed_size("SBER", dec!(100)) > 0);
    }

    #[test]
    fn test_drawdown_alert_does_not_clear_positions() {
        let day = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        let limits = RiskLimits {
            max_daily_loss_pct: dec!(0.5),
            ..RiskLimits::default()
        };
        let risk = controller(limits, dec!(1000000));
        risk.register_entry("SBER", dec!(100), 10, "test");

        risk.update_equity_on(dec!(1000000), day);
        // 25% drawdown >= 20% limit, but under the 50% daily loss limit
        risk.update_equity_on(dec!(750000), day);
        assert!(!risk.halted());
        assert_eq!(risk.open_positions(), 1);
    }

    #[test]
    fn test_peak_equity_tracking() {
        let day = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        let risk = default_controller(dec!(100000));
        risk.update_equity_on(dec!(110000), day);
        assert_eq!(risk.peak_equity(), dec!(110000));
        risk.update_equity_on(dec!(105000), day);
        assert_eq!(risk.peak_equity(), dec!(110000));
    }

    #[test]
    fn test_exit_position_realizes_pnl() {
        let risk = default_controller(dec!(100000));
        risk.register_entry("SBER", dec!(100), 10, "test");
        assert!(!risk.check_exit("SBER", dec!(104)));

        let position = risk.exit_position("SBER").unwrap();
        assert_eq!(position.quantity, 10);
        assert_eq!(risk.realized_pnl(), dec!(40));
        assert!(risk.exit_position("SBER").is_none());
    }

    #[test]
    fn test_mark_to_market_continuity() {
        let risk = default_controller(dec!(100000));
        risk.register_entry("SBER", dec!(100), 10, "test");
        assert!(!risk.check_exit("SBER", dec!(105)));
        // unrealized +50
        assert_eq!(risk.mark_to_market(), dec!(100050));

        risk.exit_position("SBER");
        // realized +50, equity unchanged by the close
        assert_eq!(risk.mark_to_market(), dec!(100050));
    }

    #[test]
    fn test_clear_all_journals_and_realizes() {
        let risk = default_controller(dec!(100000));
        risk.register_entry("SBER", dec!(100), 10, "a");
        risk.register_entry("GAZP", dec!(50), 4, "b");
        risk.check_exit("SBER", dec!(101));
        risk.clear_all();
        assert_eq!(risk.open_positions(), 0);
        assert_eq!(risk.realized_pnl(), dec!(10));
    }

    #[test]
    fn test_scan_limits_instrument_lots() {
        let mut limits = RiskLimits {
            max_position_pct: dec!(1.0),
            ..RiskLimits::default()
        };
        limits.instruments.insert(
            "SBER".to_string(),
            InstrumentLimits {
                max_lots: Some(5),
                ..Default::default()
            },
        );
        let risk = Arc::new(controller(limits, dec!(100000)));
        risk.register_entry("SBER", dec!(100), 10, "test");

        let fired: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
        let fired_clone = Arc::clone(&fired);
        risk.set_force_exit(Arc::new(move |symbol, _breach| {
            fired_clone.lock().push(symbol.to_string());
        }));

        let breaches = risk.scan_limits();
        assert_eq!(breaches.len(), 1);
        assert!(matches!(
            breaches[0].1,
            LimitBreach::InstrumentLots { lots: 10, max_lots: 5 }
        ));
        assert_eq!(fired.lock().as_slice(), &["SBER".to_string()]);
        // The monitor itself never touches the ledger
        assert_eq!(risk.open_positions(), 1);
    }

    #[test]
    fn test_scan_limits_class_exposure() {
        let mut limits = RiskLimits {
            max_position_pct: dec!(1.0),
            ..RiskLimits::default()
        };
        limits
            .instrument_classes
            .insert("SBER".to_string(), "equity".to_string());
        limits
            .instrument_classes
            .insert("GAZP".to_string(), "equity".to_string());
        limits.classes.insert(
            "equity".to_string(),
            AssetClassLimits {
                max_exposure_pct: Some(dec!(0.1)),
                max_leverage: None,
            },
        );
        let risk = controller(limits, dec!(100000));
        risk.register_entry("SBER", dec!(100), 60, "test");
        risk.register_entry("GAZP", dec!(100), 60, "test");

        // class gross = 12000 > 100000*0.1; both positions breach
        let breaches = risk.scan_limits();
        assert_eq!(breaches.len(), 2);
        assert!(breaches
            .iter()
            .all(|(_, breach)| matches!(breach, LimitBreach::ClassExposure { .. })));
    }

    #[test]
    fn test_scan_limits_clean_book() {
        let risk = default_controller(dec!(100000));
        risk.register_entry("SBER", dec!(100), 10, "test");
        assert!(risk.scan_limits().is_empty());
    }

    #[tokio::test]
    async fn test_monitor_loop_scans_periodically() {
        let mut limits = RiskLimits {
            max_position_pct: dec!(1.0),
            ..RiskLimits::default()
        };
        limits.instruments.insert(
            "SBER".to_string(),
            InstrumentLimits {
                max_lots: Some(1),
                ..Default::default()
            },
        );
        let risk = Arc::new(controller(limits, dec!(100000)));
        risk.register_entry("SBER", dec!(100), 10, "test");

        let fired: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
        let fired_clone = Arc::clone(&fired);
        risk.set_force_exit(Arc::new(move |_, _| {
            *fired_clone.lock() += 1;
        }));

        risk.start_monitoring(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        risk.stop_monitoring();
        assert!(*fired.lock() >= 1);
    }
}

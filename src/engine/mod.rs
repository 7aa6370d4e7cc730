//! Live trading cycle
//!
//! The `Engine` owns every moving part of a session: price resolution, the
//! risk controller, the order gateway, the journal and the strategy slots.
//! One `run_once` call is a full sweep over enabled strategy/symbol pairs;
//! sweeps never overlap. All mutable session state lives here, passed by
//! reference, never in globals.

use crate::alert::{LogNotifier, SharedNotifier};
use crate::broker::{BrokerClient, OrderGateway};
use crate::config::{Config, ExecutionConfig, ExecutionMode};
use crate::journal::{ExecutionJournal, JournalEvent};
use crate::price::{
    spawn_price_router, HistoryStore, PriceCache, PriceFeed, PriceTick, StreamHub,
};
use crate::risk::{Position, RiskController};
use crate::strategy::{Signal, SmaCross, Strategy};
use crate::telemetry::{self, GaugeMetric};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A strategy and the symbols it trades
struct StrategySlot {
    strategy: Box<dyn Strategy>,
    symbols: Vec<String>,
    enabled: bool,
}

/// Orchestrates the live order-execution and risk-control cycle
pub struct Engine {
    prices: Arc<PriceCache>,
    history: Arc<HistoryStore>,
    hub: Arc<StreamHub>,
    risk: Arc<RiskController>,
    gateway: Arc<OrderGateway>,
    journal: Arc<ExecutionJournal>,
    notifier: SharedNotifier,
    strategies: Vec<StrategySlot>,
    execution: ExecutionConfig,
    tick_interval: Duration,
    stream_timeout: Duration,
    queue_size: usize,
    history_interval: String,
    history_days: u32,
    tick_rx: Option<mpsc::Receiver<PriceTick>>,
    router: Option<JoinHandle<()>>,
    running: bool,
}

impl Engine {
    /// Build an engine from configuration
    ///
    /// The gateway starts in dry-run mode; attach a broker client with
    /// [`Engine::attach_broker`] for sandbox/live execution. Strategies
    /// named in the config are wired to the built-in crossover.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let history = Arc::new(
            HistoryStore::new(
                &config.engine.data_dir,
                Duration::from_secs_f64(config.feed.history_ttl_secs),
            )
            .with_defaults(&config.engine.history_interval, config.engine.history_days),
        );
        let hub = Arc::new(StreamHub::new(Duration::from_secs_f64(
            config.feed.cache_ttl_secs,
        )));
        let mut prices = PriceCache::new(
            Arc::clone(&history),
            Duration::from_secs_f64(config.feed.cache_ttl_secs),
        )
        .with_stream(Arc::clone(&hub) as _);
        if config.feed.iss_enabled {
            prices = prices.with_rest(Arc::new(crate::price::IssClient::new()?) as _);
        }

        let journal = Arc::new(ExecutionJournal::new(
            &config.journal.path,
            config.journal.flush_threshold,
        ));
        let notifier: SharedNotifier = Arc::new(LogNotifier);
        let risk = Arc::new(
            RiskController::new(
                config.risk.clone(),
                config.engine.initial_capital,
                Arc::clone(&notifier),
            )?
            .with_journal(Arc::clone(&journal)),
        );
        let gateway = Arc::new(OrderGateway::dry_run(
            Arc::clone(&journal),
            config.execution.slippage_bps,
        ));
        if config.execution.mode != ExecutionMode::DryRun {
            tracing::warn!(
                "execution mode {:?} configured but no broker client attached; running dry",
                config.execution.mode
            );
        }

        let mut engine = Self {
            prices: Arc::new(prices),
            history,
            hub,
            risk,
            gateway,
            journal,
            notifier,
            strategies: vec![],
            execution: config.execution.clone(),
            tick_interval: Duration::from_secs(config.engine.tick_interval_secs),
            stream_timeout: Duration::from_secs_f64(config.feed.stream_timeout_secs),
            queue_size: config.feed.queue_size,
            history_interval: config.engine.history_interval.clone(),
            history_days: config.engine.history_days,
            tick_rx: None,
            router: None,
            running: false,
        };
        for (name, spec) in &config.strategies {
            let strategy = SmaCross::new(name.clone(), spec.fast_window, spec.slow_window);
            engine.register_strategy(Box::new(strategy), spec.symbols.clone());
            if !spec.enabled {
                engine.set_strategy_enabled(name, false);
            }
        }
        Ok(engine)
    }

    /// Replace the dry-run gateway with one over a real broker client
    pub fn attach_broker(&mut self, client: Arc<dyn BrokerClient>) {
        self.gateway = Arc::new(OrderGateway::new(
            client,
            Arc::clone(&self.journal),
            self.execution.slippage_bps,
            self.execution.max_retries,
        ));
    }

    /// Add a strategy trading the given symbols
    pub fn register_strategy(&mut self, strategy: Box<dyn Strategy>, symbols: Vec<String>) {
        self.strategies.push(StrategySlot {
            strategy,
            symbols: symbols.into_iter().map(|s| s.to_uppercase()).collect(),
            enabled: true,
        });
    }

    /// Enable or disable a strategy by name; returns whether it was found
    pub fn set_strategy_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let mut found = false;
        for slot in &mut self.strategies {
            if slot.strategy.name() == name {
                slot.enabled = enabled;
                found = true;
            }
        }
        found
    }

    /// Subscribe to a streaming feed and start routing its ticks
    pub async fn attach_feed(&mut self, feed: &dyn PriceFeed) -> anyhow::Result<()> {
        let feed_rx = feed.subscribe().await?;
        let (out_tx, out_rx) = mpsc::channel(self.queue_size);
        let handle = spawn_price_router(feed_rx, Arc::clone(&self.hub), out_tx);
        if let Some(previous) = self.router.replace(handle) {
            previous.abort();
        }
        self.tick_rx = Some(out_rx);
        Ok(())
    }

    /// Mark the session running and start the risk monitor
    pub fn start(&mut self) {
        self.wire_force_exit();
        let monitor_interval = self.risk.limits().monitor_interval_secs;
        if monitor_interval > 0.0 {
            self.risk
                .start_monitoring(Duration::from_secs_f64(monitor_interval));
        }
        self.running = true;
        tracing::info!("trading engine started");
    }

    /// Stop the session: halt the monitor, flush the journal, send a summary
    pub fn stop(&mut self) {
        self.running = false;
        self.risk.stop_monitoring();
        if let Some(router) = self.router.take() {
            router.abort();
        }
        self.prices.disable_network();
        if let Err(e) = self.journal.flush() {
            tracing::warn!(error = %e, "failed to flush journal at session end");
        }
        let equity = self.risk.mark_to_market();
        let pnl = equity - self.risk.initial_capital();
        self.notifier.notify(&format!(
            "Session finished: equity {equity}, PnL {pnl}, open positions {}",
            self.risk.open_positions()
        ));
        tracing::info!("trading engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn risk(&self) -> &Arc<RiskController> {
        &self.risk
    }

    pub fn journal(&self) -> &Arc<ExecutionJournal> {
        &self.journal
    }

    /// Owned copy of the open position book, for status displays
    pub fn positions_snapshot(&self) -> Vec<Position> {
        self.risk.positions_snapshot()
    }

    /// The monitor loop reports breaches; this wires them back into the
    /// gateway so forced exits go through the normal submission path
    fn wire_force_exit(&self) {
        let gateway = Arc::clone(&self.gateway);
        let risk = Arc::downgrade(&self.risk);
        self.risk.set_force_exit(Arc::new(move |symbol, breach| {
            let Some(risk) = risk.upgrade() else {
                return;
            };
            let gateway = Arc::clone(&gateway);
            let symbol = symbol.to_string();
            let breach = breach.clone();
            tokio::spawn(async move {
                let Some(position) = risk.position(&symbol) else {
                    return;
                };
                tracing::warn!(%symbol, %breach, "forcing exit on limit breach");
                let quantity = position.quantity;
                let outcome = if quantity > 0 {
                    gateway.sell(&symbol, quantity, None).await
                } else {
                    gateway.buy(&symbol, quantity.abs(), None).await
                };
                if outcome.filled() {
                    risk.exit_position(&symbol);
                } else {
                    tracing::warn!(
                        %symbol,
                        status = outcome.status.as_str(),
                        "forced exit order did not fill"
                    );
                }
            });
        }));
    }

    /// Execute one full trading sweep
    ///
    /// Per enabled strategy/symbol pair: resolve a price, run the exit
    /// check, evaluate the signal, size and submit, reconcile the fill.
    /// A symbol without a resolvable price is skipped; one bad feed never
    /// halts the sweep. Finishes with a mark-to-market equity update.
    pub async fn run_once(&mut self) {
        if !self.running {
            tracing::debug!("cycle skipped: engine stopped");
            return;
        }
        if self.strategies.iter().all(|slot| !slot.enabled) {
            tracing::warn!("all strategies disabled, cycle skipped");
            return;
        }

        let mut tick_rx = self.tick_rx.take();
        for slot in &self.strategies {
            if !slot.enabled {
                continue;
            }
            for symbol in &slot.symbols {
                let history = self
                    .history
                    .load(symbol, &self.history_interval, self.history_days);
                if history.is_empty() {
                    tracing::debug!(%symbol, "no history, skipping");
                    continue;
                }
                let Some(price) = Self::wait_for_price(
                    &self.prices,
                    &self.hub,
                    &mut tick_rx,
                    symbol,
                    self.stream_timeout,
                )
                .await
                else {
                    tracing::warn!(%symbol, "could not resolve price, skipping for this tick");
                    continue;
                };

                if self.risk.has_position(symbol) && self.risk.check_exit(symbol, price) {
                    self.close_position(symbol, price).await;
                    continue;
                }

                let signal = slot.strategy.signal(&history);
                let allowed = self.risk.allowed_size(symbol, price);
                match signal {
                    Signal::Buy => {
                        self.ensure_long(symbol, price, allowed, slot.strategy.name())
                            .await
                    }
                    Signal::Sell => {
                        self.ensure_short(symbol, price, allowed, slot.strategy.name())
                            .await
                    }
                    Signal::Hold => {}
                }
            }
        }
        self.tick_rx = tick_rx;
        self.mark_to_market();
    }

    /// Best price available within the stream timeout
    ///
    /// Prefers a fresh streamed quote, then drains the tick queue up to the
    /// deadline, then falls back to the cache chain (REST, cache, history).
    /// A silent stream degrades the cycle, it never stalls it.
    async fn wait_for_price(
        prices: &PriceCache,
        hub: &StreamHub,
        tick_rx: &mut Option<mpsc::Receiver<PriceTick>>,
        symbol: &str,
        timeout: Duration,
    ) -> Option<Decimal> {
        if let Some(price) = hub.fresh(symbol) {
            return Some(price);
        }
        if let Some(rx) = tick_rx {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(Some(tick)) => {
                        if tick.symbol == symbol {
                            return Some(tick.price);
                        }
                    }
                    // Feed closed or deadline passed: fall through
                    Ok(None) => break,
                    Err(_) => break,
                }
            }
        }
        prices.get_price(symbol).await
    }

    /// Close an open position after an exit trigger
    async fn close_position(&self, symbol: &str, price: Decimal) {
        let Some(position) = self.risk.position(symbol) else {
            return;
        };
        let quantity = position.quantity;
        let outcome = if quantity > 0 {
            self.gateway.sell(symbol, quantity, Some(price)).await
        } else {
            self.gateway.buy(symbol, quantity.abs(), Some(price)).await
        };
        if outcome.filled() {
            self.risk.exit_position(symbol);
            self.notifier
                .notify(&format!("Closed {symbol} at {price} on stop/take-profit"));
        } else {
            tracing::warn!(
                symbol,
                status = outcome.status.as_str(),
                "exit order failed, keeping position"
            );
        }
    }

    /// Drive the book long: cover any short, then open with `allowed` lots
    async fn ensure_long(&self, symbol: &str, price: Decimal, allowed: i64, strategy: &str) {
        if let Some(position) = self.risk.position(symbol) {
            if position.quantity > 0 {
                return;
            }
            let outcome = self
                .gateway
                .buy(symbol, position.quantity.abs(), Some(price))
                .await;
            if !outcome.filled() {
                tracing::warn!(%symbol, "failed to cover short, keeping position");
                return;
            }
            self.risk.exit_position(symbol);
        }
        if allowed <= 0 {
            return;
        }
        let outcome = self.gateway.buy(symbol, allowed, Some(price)).await;
        if outcome.filled() {
            self.risk
                .register_entry(symbol, price, outcome.lots_executed, strategy);
        }
    }

    /// Drive the book short: close any long, then open if shorting is allowed
    async fn ensure_short(&self, symbol: &str, price: Decimal, allowed: i64, strategy: &str) {
        if let Some(position) = self.risk.position(symbol) {
            if position.quantity < 0 {
                return;
            }
            let outcome = self
                .gateway
                .sell(symbol, position.quantity, Some(price))
                .await;
            if !outcome.filled() {
                tracing::warn!(%symbol, "failed to close long, keeping position");
                return;
            }
            self.risk.exit_position(symbol);
        }
        if !self.risk.limits().allow_short || allowed <= 0 {
            return;
        }
        let outcome = self.gateway.sell(symbol, allowed, Some(price)).await;
        if outcome.filled() {
            self.risk
                .register_entry(symbol, price, -outcome.lots_executed, strategy);
        }
    }

    /// Recompute equity from the book and feed it back into risk tracking
    fn mark_to_market(&self) {
        let equity = self.risk.mark_to_market();
        self.risk.update_equity(equity);
        self.journal.record(JournalEvent::equity(equity));

        telemetry::set_gauge(GaugeMetric::Equity, equity.to_f64().unwrap_or(0.0));
        telemetry::set_gauge(
            GaugeMetric::PeakEquity,
            self.risk.peak_equity().to_f64().unwrap_or(0.0),
        );
        telemetry::set_gauge(
            GaugeMetric::GrossExposure,
            self.risk.gross_exposure().to_f64().unwrap_or(0.0),
        );
        telemetry::set_gauge(
            GaugeMetric::NetExposure,
            self.risk.net_exposure().to_f64().unwrap_or(0.0),
        );
        telemetry::set_gauge(
            GaugeMetric::OpenPositions,
            self.risk.open_positions() as f64,
        );
        let peak = self.risk.peak_equity();
        if peak > Decimal::ZERO {
            let drawdown = Decimal::ONE - equity / peak;
            telemetry::set_gauge(GaugeMetric::DrawdownPct, drawdown.to_f64().unwrap_or(0.0));
        }
    }
}

//! Strategy seam
//!
//! The engine only depends on the `Strategy` trait: a pure, synchronous
//! signal over a symbol's price history. Signal research lives outside this
//! crate; the crossover below exists so the binary and the integration
//! tests can drive a full cycle.

use crate::price::Candle;
use rust_decimal::Decimal;

/// Directional signal for the latest bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Sell,
    Hold,
    Buy,
}

/// Trait for strategy implementations
pub trait Strategy: Send + Sync {
    /// Strategy name used in logs and position ownership
    fn name(&self) -> &str;

    /// Signal for the latest bar of `history`; must be side-effect free
    fn signal(&self, history: &[Candle]) -> Signal;
}

/// Simple moving average of the last `window` closes
fn sma(history: &[Candle], window: usize) -> Option<Decimal> {
    if window == 0 || history.len() < window {
        return None;
    }
    let sum: Decimal = history[history.len() - window..]
        .iter()
        .map(|candle| candle.close)
        .sum();
    Some(sum / Decimal::from(window as u64))
}

/// Moving-average crossover
///
/// Buy while the fast average is above the slow one, sell while below.
/// Holds until enough history accumulates.
pub struct SmaCross {
    name: String,
    fast: usize,
    slow: usize,
}

impl SmaCross {
    pub fn new(name: impl Into<String>, fast: usize, slow: usize) -> Self {
        Self {
            name: name.into(),
            fast: fast.max(1),
            slow: slow.max(2),
        }
    }
}

impl Strategy for SmaCross {
    fn name(&self) -> &str {
        &self.name
    }

    fn signal(&self, history: &[Candle]) -> Signal {
        let (Some(fast), Some(slow)) = (sma(history, self.fast), sma(history, self.slow)) else {
            return Signal::Hold;
        };
        if fast > slow {
            Signal::Buy
        } else if fast < slow {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn candles(closes: &[i64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| Candle {
                ts: NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
                    + chrono::Duration::hours(i as i64),
                open: Decimal::from(*close),
                high: Decimal::from(*close),
                low: Decimal::from(*close),
                close: Decimal::from(*close),
                volume: dec!(0),
            })
            .collect()
    }

    #[test]
    fn test_sma() {
        let history = candles(&[1, 2, 3, 4]);
        assert_eq!(sma(&history, 2), Some(dec!(3.5)));
        assert_eq!(sma(&history, 4), Some(dec!(2.5)));
        assert_eq!(sma(&history, 5), None);
        assert_eq!(sma(&history, 0), None);
    }

    #[test]
    fn test_crossover_buy_on_uptrend() {
        let strategy = SmaCross::new("sma_cross", 2, 4);
        let history = candles(&[1, 1, 1, 2, 3, 4]);
        assert_eq!(strategy.signal(&history), Signal::Buy);
    }

    #[test]
    fn test_crossover_sell_on_downtrend() {
        let strategy = SmaCross::new("sma_cross", 2, 4);
        let history = candles(&[4, 4, 4, 3, 2, 1]);
        assert_eq!(strategy.signal(&history), Signal::Sell);
    }

    #[test]
    fn test_holds_without_enough_history() {
        let strategy = SmaCross::new("sma_cross", 2, 10);
        let history = candles(&[1, 2, 3]);
        assert_eq!(strategy.signal(&history), Signal::Hold);
    }

    #[test]
    fn test_holds_on_flat_series() {
        let strategy = SmaCross::new("sma_cross", 2, 4);
        let history = candles(&[5, 5, 5, 5, 5]);
        assert_eq!(strategy.signal(&history), Signal::Hold);
    }
}

//! Loop configuration, portfolio state and settlement queues.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::LoopError;

/// How signal values translate into trades.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    /// Negative values liquidate that fraction of the holding, positive
    /// values allocate that fraction of total value to buying.
    #[default]
    #[serde(rename = "PS")]
    Proportion,
    /// Values are target portfolio weights; trades close the gap when it
    /// exceeds the buy/sell thresholds.
    #[serde(rename = "PT")]
    Target,
    /// Values are share counts to buy (positive) or sell (negative).
    #[serde(rename = "VS")]
    Volume,
}

/// Per-run trading options shared by every step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopOptions {
    pub signal_kind: SignalKind,
    /// Buy lot size; 0 allows fractional purchases.
    pub lot_buy: f64,
    /// Sell lot size; 0 allows fractional sales.
    pub lot_sell: f64,
    /// Minimum weight gap that triggers a buy under [`SignalKind::Target`].
    pub pt_buy_threshold: f64,
    /// Minimum weight gap that triggers a sell under [`SignalKind::Target`].
    pub pt_sell_threshold: f64,
    /// Steps before sale proceeds can fund purchases (T+N). 0 and 1 both
    /// settle at the next step.
    pub cash_delivery_period: usize,
    /// Steps before purchased units can be sold (T+N).
    pub stock_delivery_period: usize,
    /// Allow negative holdings.
    pub allow_sell_short: bool,
    /// Cap on long exposure as a fraction of total value. Above 1 the
    /// portfolio may borrow cash.
    pub long_pos_limit: f64,
    /// Cap on short exposure as a non-positive fraction of total value.
    pub short_pos_limit: f64,
    /// Let proceeds of this step's sales fund this step's purchases when
    /// cash settles immediately.
    pub max_cash_usage: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            signal_kind: SignalKind::Proportion,
            lot_buy: 0.0,
            lot_sell: 0.0,
            pt_buy_threshold: 0.1,
            pt_sell_threshold: 0.1,
            cash_delivery_period: 0,
            stock_delivery_period: 0,
            allow_sell_short: false,
            long_pos_limit: 1.0,
            short_pos_limit: -1.0,
            max_cash_usage: true,
        }
    }
}

impl LoopOptions {
    /// Same lot size on both sides.
    pub fn with_lot_size(lot_size: f64) -> Self {
        Self {
            lot_buy: lot_size,
            lot_sell: lot_size,
            ..Self::default()
        }
    }

    /// Whether sale proceeds are spendable within the step that earned them.
    pub fn same_step_proceeds(&self) -> bool {
        self.max_cash_usage && self.cash_delivery_period == 0
    }

    pub fn validate(&self) -> Result<(), LoopError> {
        for (name, v) in [
            ("lot_buy", self.lot_buy),
            ("lot_sell", self.lot_sell),
            ("pt_buy_threshold", self.pt_buy_threshold),
            ("pt_sell_threshold", self.pt_sell_threshold),
            ("long_pos_limit", self.long_pos_limit),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(LoopError::InvalidOption(format!(
                    "{name} must be finite and non-negative, got {v}"
                )));
            }
        }
        if !(self.short_pos_limit.is_finite() && self.short_pos_limit <= 0.0) {
            return Err(LoopError::InvalidOption(format!(
                "short_pos_limit must be finite and non-positive, got {}",
                self.short_pos_limit
            )));
        }
        if self.lot_buy == 0.0 && self.lot_sell != 0.0 {
            return Err(LoopError::InvalidOption(
                "lot_sell must be 0 when lot_buy is 0".into(),
            ));
        }
        if self.lot_sell > 0.0 {
            let ratio = self.lot_buy / self.lot_sell;
            if (ratio - ratio.round()).abs() > 1e-9 {
                return Err(LoopError::InvalidOption(format!(
                    "lot_buy {} is not a multiple of lot_sell {}",
                    self.lot_buy, self.lot_sell
                )));
            }
        }
        Ok(())
    }
}

/// Cash and holdings carried between steps.
///
/// `cash` and `holdings` are what the portfolio owns, pending deliveries
/// included. The `available_*` fields are the settled part that can fund
/// purchases or be sold.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioState {
    pub cash: f64,
    pub holdings: Vec<f64>,
    pub available_cash: f64,
    pub available_holdings: Vec<f64>,
}

impl PortfolioState {
    pub fn new(n_assets: usize) -> Self {
        Self {
            cash: 0.0,
            holdings: vec![0.0; n_assets],
            available_cash: 0.0,
            available_holdings: vec![0.0; n_assets],
        }
    }

    /// A state where everything owned is already settled.
    pub fn settled(cash: f64, holdings: Vec<f64>) -> Self {
        Self {
            cash,
            available_cash: cash,
            available_holdings: holdings.iter().map(|h| h.max(0.0)).collect(),
            holdings,
        }
    }

    /// Add cash that is spendable at once (injections).
    pub fn deposit(&mut self, amount: f64) {
        self.cash += amount;
        self.available_cash += amount;
    }

    /// Grow owned and settled cash by `factor`.
    pub fn accrue(&mut self, factor: f64) {
        self.cash *= factor;
        self.available_cash *= factor;
    }

    /// `cash + Σ holdings × price`, skipping assets with no usable price.
    pub fn value(&self, prices: &[f64]) -> f64 {
        self.cash
            + self
                .holdings
                .iter()
                .zip(prices)
                .filter(|(h, p)| **h != 0.0 && p.is_finite())
                .map(|(h, p)| h * p)
                .sum::<f64>()
    }
}

/// FIFO queues of sale proceeds and purchased units waiting to settle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settlement {
    cash_period: usize,
    stock_period: usize,
    cash: VecDeque<f64>,
    stock: VecDeque<Vec<f64>>,
}

impl Settlement {
    pub fn new(options: &LoopOptions) -> Self {
        Self {
            cash_period: options.cash_delivery_period,
            stock_period: options.stock_delivery_period,
            cash: VecDeque::new(),
            stock: VecDeque::new(),
        }
    }

    /// Release the oldest entries that have waited their full period.
    ///
    /// One entry is queued per step, so an entry pushed at step `t` is
    /// released at step `t + max(period, 1)`.
    pub fn deliver(&mut self, state: &mut PortfolioState) {
        if self.cash.len() >= self.cash_period.max(1) {
            if let Some(cash) = self.cash.pop_front() {
                state.available_cash += cash;
            }
        }
        if self.stock.len() >= self.stock_period.max(1) {
            if let Some(units) = self.stock.pop_front() {
                for (a, u) in state.available_holdings.iter_mut().zip(units) {
                    *a += u;
                }
            }
        }
    }

    /// Queue what one step earned and bought.
    pub fn push(&mut self, cash_gained: f64, units_bought: Vec<f64>) {
        self.cash.push_back(cash_gained);
        self.stock.push_back(units_bought);
    }

    pub fn pending_cash(&self) -> f64 {
        self.cash.iter().sum()
    }
}

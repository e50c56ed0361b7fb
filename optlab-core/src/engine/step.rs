//! One simulation step: value, sell, cover, limit, buy, short, revalue.

use crate::cost::{tradable, Cost};

use super::state::{LoopOptions, PortfolioState, SignalKind};

/// Budgets with a smaller magnitude are dropped.
const MIN_BUDGET: f64 = 0.01;

/// Everything a single step did to the portfolio.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Net proceeds of long sales and newly opened shorts.
    pub cash_gained: f64,
    /// Cash paid for purchases and short covers, fees included.
    pub cash_spent: f64,
    /// Units bought into long positions.
    pub units_bought: Vec<f64>,
    /// Units covered on short positions.
    pub units_covered: Vec<f64>,
    /// Non-positive per-asset quantities, long sales and short opens.
    pub units_sold: Vec<f64>,
    /// Fees of every trade combined.
    pub fee: f64,
    /// Portfolio value when the step starts, after any injection.
    pub value_before: f64,
    pub value_after: f64,
}

/// Scale buy budgets down so they sum to `available_cash` when they exceed it.
///
/// Every budget keeps its share of the total; nothing is dropped or
/// reordered. Returns the factor applied (1.0 when no throttling happened).
pub fn throttle_purchases(budgets: &mut [f64], available_cash: f64) -> f64 {
    let total: f64 = budgets.iter().sum();
    let available = available_cash.max(0.0);
    if total <= available || total <= 0.0 {
        return 1.0;
    }
    let factor = available / total;
    for b in budgets.iter_mut() {
        *b *= factor;
    }
    factor
}

/// Trades requested by one signal row, before any limit applies.
#[derive(Debug, Clone, PartialEq)]
struct TradePlan {
    /// Non-positive units to sell out of long positions.
    sell: Vec<f64>,
    /// Non-negative units to buy back on short positions.
    cover: Vec<f64>,
    /// Notional per asset: positive buys long, negative opens shorts.
    budgets: Vec<f64>,
}

/// Apply one row of signals to the portfolio.
///
/// `trade_prices` are the prices on the step's date (missing or
/// non-positive ones block trading in that asset). `mark_prices` value the
/// portfolio and carry the last known price through gaps.
///
/// Purchases are funded from settled cash, plus this step's sale proceeds
/// when [`LoopOptions::same_step_proceeds`] holds, and capped by the long
/// position limit. Sales are capped at settled units unless short selling
/// is allowed.
pub fn loop_step(
    state: &mut PortfolioState,
    signals: &[f64],
    trade_prices: &[f64],
    mark_prices: &[f64],
    cost: &Cost,
    options: &LoopOptions,
) -> StepOutcome {
    let value_before = state.value(mark_prices);
    let plan = plan_trades(
        state,
        signals,
        trade_prices,
        mark_prices,
        value_before,
        options,
    );

    let mut to_sell = plan.sell;
    if !options.allow_sell_short {
        for (s, a) in to_sell.iter_mut().zip(&state.available_holdings) {
            *s = s.max(-a.max(0.0));
        }
    }
    let sale = cost.sell_units(trade_prices, &to_sell, options.lot_sell);
    state.cash += sale.cash_gained;
    for ((h, a), u) in state
        .holdings
        .iter_mut()
        .zip(state.available_holdings.iter_mut())
        .zip(&sale.units)
    {
        *h = (*h + u).max(0.0);
        *a = (*a + u).max(0.0);
    }

    let cover = cost.cover_units(trade_prices, &plan.cover, options.lot_sell);
    state.cash -= cover.cash_spent;
    state.available_cash -= cover.cash_spent;
    for (h, u) in state.holdings.iter_mut().zip(&cover.units) {
        *h = (*h + u).min(0.0);
    }

    let mut spendable = state.available_cash;
    if options.same_step_proceeds() {
        spendable += sale.cash_gained;
    }
    let (mut longs, mut shorts): (Vec<f64>, Vec<f64>) = plan
        .budgets
        .iter()
        .map(|&b| {
            if b > MIN_BUDGET {
                (b, 0.0)
            } else if b < -MIN_BUDGET && options.allow_sell_short {
                (0.0, b)
            } else {
                (0.0, 0.0)
            }
        })
        .unzip();

    let long_room = long_capacity(state, mark_prices, value_before, spendable, options);
    throttle_purchases(&mut longs, long_room);
    let purchase = cost.buy_notional(trade_prices, &longs, options.lot_buy);
    state.cash -= purchase.cash_spent;
    state.available_cash -= purchase.cash_spent;
    for (h, u) in state.holdings.iter_mut().zip(&purchase.units) {
        *h += u;
    }

    let short_room = short_capacity(state, mark_prices, value_before, options);
    throttle_shorts(&mut shorts, short_room);
    let short_units: Vec<f64> = shorts
        .iter()
        .zip(trade_prices)
        .map(|(&b, &p)| if tradable(p) { b / p } else { 0.0 })
        .collect();
    let opened = cost.sell_units(trade_prices, &short_units, options.lot_sell);
    state.cash += opened.cash_gained;
    for (h, u) in state.holdings.iter_mut().zip(&opened.units) {
        *h += u;
    }

    StepOutcome {
        cash_gained: sale.cash_gained + opened.cash_gained,
        cash_spent: purchase.cash_spent + cover.cash_spent,
        units_bought: purchase.units,
        units_covered: cover.units,
        units_sold: sale
            .units
            .iter()
            .zip(&opened.units)
            .map(|(a, b)| a + b)
            .collect(),
        fee: sale.fee + cover.fee + purchase.fee + opened.fee,
        value_before,
        value_after: state.value(mark_prices),
    }
}

/// Notional that long purchases may still add without breaking the long
/// position limit. Limits up to 1 also stop at spendable cash.
fn long_capacity(
    state: &PortfolioState,
    mark_prices: &[f64],
    total_value: f64,
    spendable: f64,
    options: &LoopOptions,
) -> f64 {
    if total_value <= 0.0 {
        return 0.0;
    }
    let long: f64 = exposure(state, mark_prices, |h| h > 0.0);
    let room = (options.long_pos_limit - long / total_value) * total_value;
    if options.long_pos_limit <= 1.0 {
        room.min(spendable)
    } else {
        room
    }
}

/// Notional (as a non-negative number) that new shorts may still add.
fn short_capacity(
    state: &PortfolioState,
    mark_prices: &[f64],
    total_value: f64,
    options: &LoopOptions,
) -> f64 {
    if total_value <= 0.0 || !options.allow_sell_short {
        return 0.0;
    }
    let short: f64 = exposure(state, mark_prices, |h| h < 0.0);
    (short / total_value - options.short_pos_limit) * total_value
}

fn exposure(state: &PortfolioState, mark_prices: &[f64], side: impl Fn(f64) -> bool) -> f64 {
    state
        .holdings
        .iter()
        .zip(mark_prices)
        .filter(|(h, p)| side(**h) && p.is_finite())
        .map(|(h, p)| h * p)
        .sum()
}

/// Shrink negative budgets so their magnitudes sum to at most `room`.
fn throttle_shorts(budgets: &mut [f64], room: f64) {
    for b in budgets.iter_mut() {
        *b = -*b;
    }
    throttle_purchases(budgets, room);
    for b in budgets.iter_mut() {
        *b = -*b;
    }
}

/// Turn one signal row into sells, covers and budgets.
fn plan_trades(
    state: &PortfolioState,
    signals: &[f64],
    trade_prices: &[f64],
    mark_prices: &[f64],
    total_value: f64,
    options: &LoopOptions,
) -> TradePlan {
    let n = state.holdings.len();
    let short = options.allow_sell_short;
    let mut plan = TradePlan {
        sell: vec![0.0; n],
        cover: vec![0.0; n],
        budgets: vec![0.0; n],
    };

    for i in 0..n {
        let s = signals.get(i).copied().unwrap_or(0.0);
        if !s.is_finite() || (s == 0.0 && options.signal_kind != SignalKind::Target) {
            continue;
        }
        let held = state.holdings[i];
        match options.signal_kind {
            SignalKind::Proportion => {
                if s < 0.0 {
                    if held > 0.0 {
                        plan.sell[i] = s.max(-1.0) * held;
                    } else if short && total_value > 0.0 {
                        plan.budgets[i] = s * total_value;
                    }
                } else if held < 0.0 {
                    plan.cover[i] = s.min(1.0) * -held;
                } else if total_value > 0.0 {
                    plan.budgets[i] = s * total_value;
                }
            }
            SignalKind::Target => {
                if total_value <= 0.0 {
                    continue;
                }
                let mark = mark_prices.get(i).copied().unwrap_or(f64::NAN);
                let priced = tradable(mark);
                let weight = if held != 0.0 && priced {
                    held * mark / total_value
                } else {
                    0.0
                };
                let gap = s - weight;
                if gap < -options.pt_sell_threshold {
                    let mut excess = -gap * total_value;
                    if held > 0.0 && priced {
                        let units = (excess / mark).min(held);
                        plan.sell[i] = -units;
                        excess -= units * mark;
                    }
                    if short {
                        plan.budgets[i] = -excess;
                    }
                } else if gap > options.pt_buy_threshold {
                    let mut deficit = gap * total_value;
                    if held < 0.0 && priced {
                        let units = (deficit / mark).min(-held);
                        plan.cover[i] = units;
                        deficit -= units * mark;
                    }
                    plan.budgets[i] = deficit;
                }
            }
            SignalKind::Volume => {
                let price = trade_prices[i];
                if s < 0.0 {
                    let mut remaining = -s;
                    if held > 0.0 {
                        let units = remaining.min(held);
                        plan.sell[i] = -units;
                        remaining -= units;
                    }
                    if short && remaining > 0.0 && tradable(price) {
                        plan.budgets[i] = -remaining * price;
                    }
                } else {
                    let mut remaining = s;
                    if held < 0.0 {
                        let units = remaining.min(-held);
                        plan.cover[i] = units;
                        remaining -= units;
                    }
                    if remaining > 0.0 && tradable(price) {
                        plan.budgets[i] = remaining * price;
                    }
                }
            }
        }
    }

    plan
}

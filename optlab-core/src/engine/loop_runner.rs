//! Full-run driver: replays a signal matrix against a price table.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::cash_plan::CashPlan;
use crate::cost::{tradable, Cost};
use crate::data::{PriceTable, SignalMatrix};

use super::state::{LoopOptions, PortfolioState, Settlement};
use super::step::loop_step;
use super::trajectory::{Trajectory, TrajectoryRow};
use super::LoopError;

/// One scheduled step: a price row, an optional signal row and the cash
/// injected before trading.
#[derive(Debug, Clone, Copy, Default)]
struct ScheduledStep {
    signal_row: Option<usize>,
    injection: f64,
}

/// Builder-style entry point holding the read-only inputs of a run.
#[derive(Debug, Clone)]
pub struct Simulation<'a> {
    prices: &'a PriceTable,
    cost: Option<Cost>,
    cash_plan: Option<CashPlan>,
    options: LoopOptions,
}

impl<'a> Simulation<'a> {
    pub fn new(prices: &'a PriceTable) -> Self {
        Self {
            prices,
            cost: None,
            cash_plan: None,
            options: LoopOptions::default(),
        }
    }

    pub fn with_cost(mut self, cost: Cost) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_cash_plan(mut self, cash_plan: CashPlan) -> Self {
        self.cash_plan = Some(cash_plan);
        self
    }

    pub fn with_options(mut self, options: LoopOptions) -> Self {
        self.options = options;
        self
    }

    /// Replay `signals`. Fails before the first step if the cost model or
    /// cash plan was never supplied.
    pub fn run(&self, signals: &SignalMatrix) -> Result<Trajectory, LoopError> {
        apply_loop(
            signals,
            self.prices,
            self.cost.as_ref(),
            self.cash_plan.as_ref(),
            &self.options,
        )
    }
}

/// Replay `signals` with one lot size for both sides.
pub fn simulate(
    signals: &SignalMatrix,
    prices: &PriceTable,
    cost: &Cost,
    cash_plan: &CashPlan,
    lot_size: f64,
) -> Result<Trajectory, LoopError> {
    apply_loop(
        signals,
        prices,
        Some(cost),
        Some(cash_plan),
        &LoopOptions::with_lot_size(lot_size),
    )
}

/// Run every step in date order and collect the trajectory.
///
/// Steps are the signal dates plus the cash-injection dates (an injection on
/// a date without prices moves to the next price date). Before each step
/// carried cash accrues at the plan's rate for the days since the previous
/// step, then the injection is added and due settlements are delivered.
/// Each step's sale proceeds and purchased units are queued and settle
/// after the configured delivery periods. All input checks happen before
/// the first step; no partial trajectory is ever returned.
pub fn apply_loop(
    signals: &SignalMatrix,
    prices: &PriceTable,
    cost: Option<&Cost>,
    cash_plan: Option<&CashPlan>,
    options: &LoopOptions,
) -> Result<Trajectory, LoopError> {
    if signals.is_empty() {
        return Err(LoopError::EmptySignals);
    }
    let cost = cost.ok_or(LoopError::MissingCost)?;
    let cash_plan = cash_plan.ok_or(LoopError::MissingCashPlan)?;
    options.validate()?;
    if prices.is_empty() {
        return Err(LoopError::EmptyPrices);
    }
    if signals.columns() != prices.columns() {
        return Err(LoopError::AssetMismatch {
            signals: signals.columns().to_vec(),
            prices: prices.columns().to_vec(),
        });
    }

    let schedule = build_schedule(signals, prices, cash_plan)?;
    let n_assets = prices.n_columns();
    let daily_rate = cash_plan.rate() / 365.0;
    let zeros = vec![0.0; n_assets];

    let mut state = PortfolioState::new(n_assets);
    let mut settlement = Settlement::new(options);
    let mut marks = vec![f64::NAN; n_assets];
    let mut mark_cursor = 0usize;
    let mut prev_date: Option<NaiveDate> = None;
    let mut trajectory = Trajectory::new(prices.columns().to_vec());

    for (&row, step) in &schedule {
        // Advance the last-known prices up to and including this row.
        while mark_cursor <= row {
            for (m, p) in marks.iter_mut().zip(prices.row(mark_cursor)) {
                if tradable(*p) {
                    *m = *p;
                }
            }
            mark_cursor += 1;
        }

        let date = prices.dates()[row];
        if let Some(prev) = prev_date {
            let days = (date - prev).num_days();
            if daily_rate > 0.0 && days > 0 {
                state.accrue((1.0 + daily_rate).powi(days as i32));
            }
        }
        state.deposit(step.injection);
        settlement.deliver(&mut state);
        prev_date = Some(date);

        let signal_row = step.signal_row.map_or(zeros.as_slice(), |i| signals.row(i));
        let outcome = loop_step(
            &mut state,
            signal_row,
            prices.row(row),
            &marks,
            cost,
            options,
        );
        settlement.push(outcome.cash_gained, outcome.units_bought);

        trajectory.push(TrajectoryRow {
            date,
            holdings: state.holdings.clone(),
            cash: state.cash,
            fee: outcome.fee,
            value: outcome.value_after,
            injected: step.injection,
        });
    }

    Ok(trajectory)
}

fn build_schedule(
    signals: &SignalMatrix,
    prices: &PriceTable,
    cash_plan: &CashPlan,
) -> Result<BTreeMap<usize, ScheduledStep>, LoopError> {
    let mut schedule: BTreeMap<usize, ScheduledStep> = BTreeMap::new();

    for (i, date) in signals.dates().iter().enumerate() {
        let row = prices
            .position(*date)
            .ok_or(LoopError::SignalDateNotInPrices(*date))?;
        schedule.entry(row).or_default().signal_row = Some(i);
    }

    for (date, amount) in cash_plan.iter() {
        let row = prices
            .position_on_or_after(date)
            .ok_or(LoopError::InjectionAfterHistory(date))?;
        let shifted = prices.dates()[row];
        if shifted != date {
            debug!(%date, %shifted, "cash injection moved to next price date");
        }
        schedule.entry(row).or_default().injection += amount;
    }

    Ok(schedule)
}

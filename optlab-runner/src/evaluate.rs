//! Candidate evaluation: parameters → signals → trajectory → score.
//!
//! An [`Evaluator`] holds an immutable snapshot of everything an evaluation
//! reads (prices, cost model, cash plan, loop options, objective and signal
//! generator) behind `Arc`s, so it is built once per run and shared by
//! reference with every worker.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use optlab_core::{
    apply_loop, CashPlan, Cost, LoopError, LoopOptions, Objective, ObjectiveKind, ParamValue,
    PriceTable, SignalMatrix, Trajectory,
};

use crate::signal::{ParamLayout, SignalError, SignalGenerator};

/// Errors from a single candidate evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("signal error: {0}")]
    Signal(#[from] SignalError),

    #[error("simulation error: {0}")]
    Loop(#[from] LoopError),

    #[error("invalid evaluation periods: {0}")]
    Periods(String),

    #[error("evaluation failed: {0}")]
    Failed(String),
}

/// Maps one parameter vector to a score.
///
/// Implemented by [`Evaluator`] and by any `Fn(&[ParamValue]) -> Result<f64, EvalError>`
/// closure, which is handy for searches over synthetic objectives.
pub trait Evaluate: Send + Sync {
    fn evaluate(&self, params: &[ParamValue]) -> Result<f64, EvalError>;
}

impl<F> Evaluate for F
where
    F: Fn(&[ParamValue]) -> Result<f64, EvalError> + Send + Sync,
{
    fn evaluate(&self, params: &[ParamValue]) -> Result<f64, EvalError> {
        self(params)
    }
}

/// How much of the price history one evaluation replays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodMode {
    /// One run from the first cash injection to the last price date.
    #[default]
    Single,
    /// `count` evenly staggered windows, each `length` of the history,
    /// scored separately and averaged. Each window starts with the plan's
    /// first amount injected on its first date.
    Multiple {
        #[serde(default = "default_sub_periods")]
        count: usize,
        #[serde(default = "default_sub_length")]
        length: f64,
    },
}

fn default_sub_periods() -> usize {
    5
}

fn default_sub_length() -> f64 {
    0.6
}

impl PeriodMode {
    pub fn validate(&self) -> Result<(), EvalError> {
        if let Self::Multiple { count, length } = *self {
            if count == 0 {
                return Err(EvalError::Periods("count must be at least 1".into()));
            }
            if !(length > 0.0 && length <= 1.0) {
                return Err(EvalError::Periods(format!(
                    "length must be in (0, 1], got {length}"
                )));
            }
        }
        Ok(())
    }

    /// Inclusive `(first, last)` price-row windows starting no earlier than
    /// `start_row`.
    pub fn windows(
        &self,
        prices: &PriceTable,
        start_row: usize,
    ) -> Result<Vec<(usize, usize)>, EvalError> {
        self.validate()?;
        let dates = prices.dates();
        let Some(&last) = dates.last() else {
            return Err(LoopError::EmptyPrices.into());
        };
        let last_row = dates.len() - 1;
        match *self {
            Self::Single => Ok(vec![(start_row.min(last_row), last_row)]),
            Self::Multiple { count, length } => {
                let first = dates[start_row.min(last_row)];
                let range = (last - first).num_days() as f64;
                let span = range * length;
                let stride = (1.0 - length) * range / count as f64;
                let windows = (0..count)
                    .map(|i| {
                        let offset = whole_days(i as f64 * stride);
                        let lo = prices.position_on_or_after(first + offset).unwrap_or(last_row);
                        let end = dates[lo] + whole_days(span);
                        let hi = prices.position_on_or_after(end).unwrap_or(last_row);
                        (lo, hi)
                    })
                    .collect();
                Ok(windows)
            }
        }
    }
}

/// Round a fractional day count up, ignoring representation error.
fn whole_days(days: f64) -> Duration {
    Duration::days((days - 1e-9).ceil().max(0.0) as i64)
}

/// Read-only evaluation context shared by all workers.
#[derive(Clone)]
pub struct Evaluator {
    generator: Arc<dyn SignalGenerator>,
    layout: ParamLayout,
    prices: Arc<PriceTable>,
    cost: Arc<Cost>,
    cash_plan: Arc<CashPlan>,
    options: LoopOptions,
    objective: Arc<dyn Objective>,
    full_history: bool,
    maximize: bool,
    periods: PeriodMode,
}

impl Evaluator {
    pub fn new(
        generator: Arc<dyn SignalGenerator>,
        prices: Arc<PriceTable>,
        cost: Cost,
        cash_plan: CashPlan,
    ) -> Self {
        let layout = generator.layout();
        Self {
            generator,
            layout,
            prices,
            cost: Arc::new(cost),
            cash_plan: Arc::new(cash_plan),
            options: LoopOptions::default(),
            objective: Arc::new(ObjectiveKind::default()),
            full_history: false,
            maximize: true,
            periods: PeriodMode::Single,
        }
    }

    pub fn with_options(mut self, options: LoopOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_objective(mut self, objective: Arc<dyn Objective>) -> Self {
        self.objective = objective;
        self
    }

    /// Score the trajectory expanded to every price date instead of only
    /// the signal dates.
    pub fn with_full_history(mut self, full_history: bool) -> Self {
        self.full_history = full_history;
        self
    }

    /// Direction of the search this evaluator feeds. Candidates with
    /// nothing to simulate score as the worst value in that direction.
    pub fn with_maximize(mut self, maximize: bool) -> Self {
        self.maximize = maximize;
        self
    }

    pub fn with_periods(mut self, periods: PeriodMode) -> Self {
        self.periods = periods;
        self
    }

    pub fn generator(&self) -> &dyn SignalGenerator {
        self.generator.as_ref()
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Run the full pipeline for one vector over the whole history. An
    /// empty vector stands for the generator's default parameters.
    pub fn trajectory(&self, params: &[ParamValue]) -> Result<Trajectory, EvalError> {
        let signals = self.signals(params)?;
        self.replay(&signals, &self.prices, &self.cash_plan)
    }

    fn signals(&self, params: &[ParamValue]) -> Result<SignalMatrix, EvalError> {
        let defaults;
        let vector = if params.is_empty() {
            defaults = self.generator.default_params();
            defaults.as_slice()
        } else {
            params
        };
        let bound = self.layout.bind(vector)?;
        Ok(self.generator.generate(&bound, &self.prices)?)
    }

    fn replay(
        &self,
        signals: &SignalMatrix,
        prices: &PriceTable,
        cash_plan: &CashPlan,
    ) -> Result<Trajectory, EvalError> {
        let trajectory = apply_loop(
            signals,
            prices,
            Some(self.cost.as_ref()),
            Some(cash_plan),
            &self.options,
        )?;
        Ok(if self.full_history {
            trajectory.expand(prices)
        } else {
            trajectory
        })
    }

    /// Mean score over the sub-period windows that contain signals.
    fn score_windows(&self, signals: &SignalMatrix) -> Result<f64, EvalError> {
        let start_row = self
            .prices
            .position_on_or_after(self.cash_plan.first_day())
            .ok_or(LoopError::InjectionAfterHistory(self.cash_plan.first_day()))?;
        let amount = self.cash_plan.amounts().first().copied().unwrap_or(0.0);
        let dates = self.prices.dates();

        let mut scores = Vec::new();
        for (lo, hi) in self.periods.windows(&self.prices, start_row)? {
            let window_signals = signals.between(dates[lo], dates[hi]);
            if window_signals.is_empty() {
                continue;
            }
            let window_prices = self.prices.between(dates[lo], dates[hi]);
            let plan = CashPlan::new(vec![dates[lo]], vec![amount], self.cash_plan.rate())
                .map_err(|e| EvalError::Periods(e.to_string()))?;
            let trajectory = self.replay(&window_signals, &window_prices, &plan)?;
            let score = self.objective.score(&trajectory);
            trace!(from = %dates[lo], to = %dates[hi], score, "window scored");
            scores.push(score);
        }
        if scores.is_empty() {
            return Err(LoopError::EmptySignals.into());
        }
        Ok(scores.iter().sum::<f64>() / scores.len() as f64)
    }

    /// Score sentinel for candidates that produce nothing to simulate.
    fn worst(&self) -> f64 {
        if self.maximize {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        }
    }
}

impl Evaluate for Evaluator {
    fn evaluate(&self, params: &[ParamValue]) -> Result<f64, EvalError> {
        let scored = self.signals(params).and_then(|signals| match self.periods {
            PeriodMode::Single => self
                .replay(&signals, &self.prices, &self.cash_plan)
                .map(|t| self.objective.score(&t)),
            PeriodMode::Multiple { .. } => self.score_windows(&signals),
        });
        match scored {
            // No signals is a normal outcome for some parameter sets.
            Err(EvalError::Loop(LoopError::EmptySignals)) => Ok(self.worst()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{FnGenerator, SmaCross, StrategyParams};
    use chrono::NaiveDate;
    use optlab_core::{DateFrame, Space};

    fn prices() -> PriceTable {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        PriceTable::new(
            (0..4).map(|i| base + Duration::days(i)).collect(),
            vec!["A".into()],
            vec![vec![10.0], vec![20.0], vec![20.0], vec![40.0]],
        )
        .unwrap()
    }

    fn evaluator(gen: Arc<dyn SignalGenerator>) -> Evaluator {
        let p = Arc::new(prices());
        let plan = CashPlan::single(p.dates()[0], 1000.0).unwrap();
        Evaluator::new(gen, p, Cost::frictionless(), plan)
    }

    /// Buys everything on day one with a fraction taken from the first parameter.
    fn fraction_generator() -> FnGenerator {
        FnGenerator::new(
            "fraction",
            Space::default(),
            vec![ParamValue::Float(1.0)],
            |params: &StrategyParams, prices: &PriceTable| {
                let f = params.for_asset("A")?[0].as_f64().unwrap_or(0.0);
                Ok(DateFrame::new(
                    vec![prices.dates()[0]],
                    prices.columns().to_vec(),
                    vec![vec![f]],
                )?)
            },
        )
    }

    /// Buys everything on every date.
    fn always_buy() -> FnGenerator {
        FnGenerator::new("always", Space::default(), Vec::new(), |_, p| {
            Ok(DateFrame::new(
                p.dates().to_vec(),
                p.columns().to_vec(),
                vec![vec![1.0]; p.n_dates()],
            )?)
        })
    }

    fn daily_prices(values: &[f64]) -> Arc<PriceTable> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        Arc::new(
            PriceTable::new(
                (0..values.len() as i64).map(|i| base + Duration::days(i)).collect(),
                vec!["A".into()],
                values.iter().map(|v| vec![*v]).collect(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn scores_final_value() {
        let ev = evaluator(Arc::new(fraction_generator()));
        let score = ev.evaluate(&[ParamValue::Float(0.5)]).unwrap();
        // Half in at 10; the only step is day one.
        assert!((score - 1000.0).abs() < 1e-9);
        let full = ev.clone().with_full_history(true);
        // Expanded to the last date, 50 units at 40.
        assert!((full.evaluate(&[ParamValue::Float(0.5)]).unwrap() - 2500.0).abs() < 1e-9);
    }

    #[test]
    fn empty_vector_uses_defaults() {
        let ev = evaluator(Arc::new(fraction_generator())).with_full_history(true);
        assert!((ev.evaluate(&[]).unwrap() - 4000.0).abs() < 1e-9);
    }

    #[test]
    fn empty_signals_score_worst() {
        let gen = FnGenerator::new("none", Space::default(), Vec::new(), |_, p| {
            Ok(SignalMatrix::empty(p.columns().to_vec()))
        });
        let ev = evaluator(Arc::new(gen));
        assert_eq!(ev.evaluate(&[]).unwrap(), f64::NEG_INFINITY);
        let minimizing = ev.with_maximize(false);
        assert_eq!(minimizing.evaluate(&[]).unwrap(), f64::INFINITY);
    }

    #[test]
    fn generator_errors_propagate() {
        let ev = evaluator(Arc::new(SmaCross::default()));
        assert!(matches!(
            ev.evaluate(&[ParamValue::Int(3)]),
            Err(EvalError::Signal(SignalError::Arity { .. }))
        ));
    }

    #[test]
    fn objective_can_be_swapped() {
        let ev = evaluator(Arc::new(fraction_generator()))
            .with_full_history(true)
            .with_objective(Arc::new(ObjectiveKind::TotalReturn));
        assert!((ev.evaluate(&[]).unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn closures_evaluate() {
        let f = |p: &[ParamValue]| -> Result<f64, EvalError> { Ok(p.len() as f64) };
        assert_eq!(f.evaluate(&[ParamValue::Int(1)]).unwrap(), 1.0);
    }

    #[test]
    fn windows_stagger_across_history() {
        let p = daily_prices(&[1.0; 11]);
        let mode = PeriodMode::Multiple {
            count: 2,
            length: 0.6,
        };
        // Ten days of history: six-day windows, stride of two days.
        assert_eq!(mode.windows(&p, 0).unwrap(), vec![(0, 6), (2, 8)]);
        assert_eq!(PeriodMode::Single.windows(&p, 3).unwrap(), vec![(3, 10)]);
    }

    #[test]
    fn invalid_periods_are_rejected() {
        let p = daily_prices(&[1.0; 3]);
        for mode in [
            PeriodMode::Multiple {
                count: 0,
                length: 0.5,
            },
            PeriodMode::Multiple {
                count: 2,
                length: 1.5,
            },
        ] {
            assert!(matches!(mode.windows(&p, 0), Err(EvalError::Periods(_))));
        }
    }

    #[test]
    fn multiple_periods_average_window_scores() {
        // Doubling every day: a 1-day window returns 1.0, a 2-day one 3.0.
        let p = daily_prices(&[1.0, 2.0, 4.0, 8.0, 16.0]);
        let plan = CashPlan::single(p.dates()[0], 100.0).unwrap();
        let ev = Evaluator::new(Arc::new(always_buy()), p.clone(), Cost::frictionless(), plan)
            .with_objective(Arc::new(ObjectiveKind::TotalReturn));

        let single = ev.evaluate(&[]).unwrap();
        assert!((single - 15.0).abs() < 1e-9);

        let windowed = ev.with_periods(PeriodMode::Multiple {
            count: 2,
            length: 0.5,
        });
        // Four days of history: windows (0, 2) and (1, 3), each returning 3.0.
        assert_eq!(
            windowed.periods.windows(&p, 0).unwrap(),
            vec![(0, 2), (1, 3)]
        );
        assert!((windowed.evaluate(&[]).unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn windows_without_signals_are_skipped() {
        let p = daily_prices(&[1.0, 2.0, 4.0, 8.0, 16.0]);
        let plan = CashPlan::single(p.dates()[0], 100.0).unwrap();
        let late = FnGenerator::new("late", Space::default(), Vec::new(), |_, p| {
            let last = p.n_dates() - 1;
            Ok(DateFrame::new(
                vec![p.dates()[last]],
                p.columns().to_vec(),
                vec![vec![1.0]],
            )?)
        });
        let ev = Evaluator::new(Arc::new(late), p, Cost::frictionless(), plan).with_periods(
            PeriodMode::Multiple {
                count: 2,
                length: 0.5,
            },
        );
        // Neither window reaches the last date.
        assert_eq!(ev.evaluate(&[]).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn period_mode_reads_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            periods: PeriodMode,
        }
        let w: Wrapper = toml::from_str("[periods]\ntype = \"MULTIPLE\"\ncount = 3\n").unwrap();
        assert_eq!(
            w.periods,
            PeriodMode::Multiple {
                count: 3,
                length: 0.6
            }
        );
    }
}

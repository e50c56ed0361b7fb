//! Value trajectory produced by the loop runner.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::PriceTable;

/// Portfolio snapshot after one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRow {
    pub date: NaiveDate,
    pub holdings: Vec<f64>,
    pub cash: f64,
    pub fee: f64,
    pub value: f64,
    /// Cash injected before this step.
    pub injected: f64,
}

/// Per-step holdings, cash, fee and value, indexed by date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    assets: Vec<String>,
    rows: Vec<TrajectoryRow>,
}

impl Trajectory {
    pub fn new(assets: Vec<String>) -> Self {
        Self {
            assets,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: TrajectoryRow) {
        self.rows.push(row);
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn rows(&self) -> &[TrajectoryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.value).collect()
    }

    pub fn final_value(&self) -> Option<f64> {
        self.rows.last().map(|r| r.value)
    }

    pub fn total_fee(&self) -> f64 {
        self.rows.iter().map(|r| r.fee).sum()
    }

    pub fn total_injected(&self) -> f64 {
        self.rows.iter().map(|r| r.injected).sum()
    }

    /// Re-index onto every price date from the first step onward.
    ///
    /// Price dates before the first step are left out: nothing was invested
    /// yet, and a zero-value row there would distort return objectives.
    /// Holdings and cash are carried forward between steps, fee and
    /// injection are zero on dates without a step, and value is recomputed
    /// from that date's price (the last known one through gaps).
    pub fn expand(&self, prices: &PriceTable) -> Trajectory {
        let Some(first) = self.rows.first() else {
            return Trajectory::new(self.assets.clone());
        };
        let marks = prices.filled_forward();
        let start = prices.position_on_or_after(first.date).unwrap_or(prices.n_dates());

        let mut out = Trajectory::new(self.assets.clone());
        let mut steps = self.rows.iter().peekable();
        let mut carried: Option<&TrajectoryRow> = None;

        for (date, mark) in marks.dates()[start..].iter().zip(&marks.rows()[start..]) {
            while let Some(row) = steps.next_if(|r| r.date <= *date) {
                if row.date == *date {
                    out.push(row.clone());
                }
                carried = Some(row);
            }
            let Some(last) = carried else { continue };
            if last.date == *date {
                continue;
            }
            let held: f64 = last
                .holdings
                .iter()
                .zip(mark)
                .filter(|(h, p)| **h != 0.0 && p.is_finite())
                .map(|(h, p)| h * p)
                .sum();
            out.push(TrajectoryRow {
                date: *date,
                holdings: last.holdings.clone(),
                cash: last.cash,
                fee: 0.0,
                value: last.cash + held,
                injected: 0.0,
            });
        }
        out
    }
}

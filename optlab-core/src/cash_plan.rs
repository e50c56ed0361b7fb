//! Scheduled cash injections with an annual accrual rate.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Mul};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CashPlanError {
    #[error("cash plan has {dates} dates but {amounts} amounts")]
    LengthMismatch { dates: usize, amounts: usize },

    #[error("cash plan needs at least one injection")]
    Empty,

    #[error("injection amount must be positive and finite, got {0}")]
    NonPositiveAmount(f64),

    #[error("accrual rate must lie in [0, 1], got {0}")]
    RateOutOfRange(f64),

    #[error("scale factor must be non-negative and finite, got {0}")]
    InvalidScale(f64),

    #[error("repeat count must be at least 1, got {0}")]
    InvalidRepeat(usize),
}

/// Ordered cash injections plus an annual accrual rate.
///
/// Dates are unique and ascending; amounts booked on the same date are
/// summed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CashPlanSpec", into = "CashPlanSpec")]
pub struct CashPlan {
    dates: Vec<NaiveDate>,
    amounts: Vec<f64>,
    rate: f64,
}

/// Serialized form of a [`CashPlan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashPlanSpec {
    pub dates: Vec<NaiveDate>,
    pub amounts: Vec<f64>,
    #[serde(default)]
    pub rate: f64,
}

impl CashPlan {
    pub fn new(dates: Vec<NaiveDate>, amounts: Vec<f64>, rate: f64) -> Result<Self, CashPlanError> {
        if dates.len() != amounts.len() {
            return Err(CashPlanError::LengthMismatch {
                dates: dates.len(),
                amounts: amounts.len(),
            });
        }
        if dates.is_empty() {
            return Err(CashPlanError::Empty);
        }
        if let Some(bad) = amounts.iter().find(|a| !(a.is_finite() && **a > 0.0)) {
            return Err(CashPlanError::NonPositiveAmount(*bad));
        }
        if !(0.0..=1.0).contains(&rate) {
            return Err(CashPlanError::RateOutOfRange(rate));
        }
        let mut merged: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for (date, amount) in dates.into_iter().zip(amounts) {
            *merged.entry(date).or_insert(0.0) += amount;
        }
        Ok(Self::from_sorted(merged, rate))
    }

    /// A single injection.
    pub fn single(date: NaiveDate, amount: f64) -> Result<Self, CashPlanError> {
        Self::new(vec![date], vec![amount], 0.0)
    }

    fn from_sorted(entries: BTreeMap<NaiveDate, f64>, rate: f64) -> Self {
        let (dates, amounts) = entries.into_iter().unzip();
        Self {
            dates,
            amounts,
            rate,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn amounts(&self) -> &[f64] {
        &self.amounts
    }

    /// Annual accrual rate.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.amounts.iter().copied())
    }

    pub fn first_day(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn last_day(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    /// Days between the first and last injection.
    pub fn period(&self) -> i64 {
        (self.last_day() - self.first_day()).num_days()
    }

    pub fn investment_count(&self) -> usize {
        self.dates.len()
    }

    pub fn total(&self) -> f64 {
        self.amounts.iter().sum()
    }

    pub fn amount_on(&self, date: NaiveDate) -> Option<f64> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|idx| self.amounts[idx])
    }

    /// Value of every injection compounded at the accrual rate to the last day.
    pub fn closing_value(&self) -> f64 {
        let last = self.last_day();
        self.iter()
            .map(|(d, a)| a * (1.0 + self.rate).powf((last - d).num_days() as f64 / 365.0))
            .sum()
    }

    /// Value of every injection discounted at the accrual rate to the first day.
    pub fn opening_value(&self) -> f64 {
        let first = self.first_day();
        self.iter()
            .map(|(d, a)| a / (1.0 + self.rate).powf((d - first).num_days() as f64 / 365.0))
            .sum()
    }

    /// Union of two plans, summing amounts on shared dates. Keeps this plan's
    /// rate unless it is zero.
    pub fn merge(&self, other: &CashPlan) -> CashPlan {
        let mut merged: BTreeMap<NaiveDate, f64> = self.iter().collect();
        for (date, amount) in other.iter() {
            *merged.entry(date).or_insert(0.0) += amount;
        }
        let rate = if self.rate == 0.0 { other.rate } else { self.rate };
        Self::from_sorted(merged, rate)
    }

    /// Add `delta` to every amount.
    pub fn add_amount(&self, delta: f64) -> Result<CashPlan, CashPlanError> {
        let amounts = self.amounts.iter().map(|a| a + delta).collect();
        Self::new(self.dates.clone(), amounts, self.rate)
    }

    /// Multiply every amount by `factor`.
    pub fn scale(&self, factor: f64) -> Result<CashPlan, CashPlanError> {
        if !(factor.is_finite() && factor >= 0.0) {
            return Err(CashPlanError::InvalidScale(factor));
        }
        let amounts = self.amounts.iter().map(|a| a * factor).collect();
        Self::new(self.dates.clone(), amounts, self.rate)
    }

    /// Concatenate `times` copies of the plan, each shifted past the previous.
    ///
    /// The shift depends on the plan's shape: one year for a single date,
    /// twice the period for two dates, otherwise the period rounded up to a
    /// month, a quarter, a year or a whole number of years.
    pub fn repeat(&self, times: usize) -> Result<CashPlan, CashPlanError> {
        if times == 0 {
            return Err(CashPlanError::InvalidRepeat(times));
        }
        let period = self.period();
        let offset = match self.investment_count() {
            1 => 365,
            2 => period * 2,
            _ if period <= 28 => 31,
            _ if period <= 90 => 93,
            _ if period <= 365 => 365,
            _ => 365 * (period / 365 + 1),
        };
        let mut merged: BTreeMap<NaiveDate, f64> = self.iter().collect();
        for i in 1..times {
            let shift = Duration::days(offset * i as i64);
            for (date, amount) in self.iter() {
                *merged.entry(date + shift).or_insert(0.0) += amount;
            }
        }
        Ok(Self::from_sorted(merged, self.rate))
    }
}

impl TryFrom<CashPlanSpec> for CashPlan {
    type Error = CashPlanError;

    fn try_from(spec: CashPlanSpec) -> Result<Self, Self::Error> {
        Self::new(spec.dates, spec.amounts, spec.rate)
    }
}

impl From<CashPlan> for CashPlanSpec {
    fn from(plan: CashPlan) -> Self {
        Self {
            dates: plan.dates,
            amounts: plan.amounts,
            rate: plan.rate,
        }
    }
}

impl Add for &CashPlan {
    type Output = CashPlan;

    fn add(self, rhs: &CashPlan) -> CashPlan {
        self.merge(rhs)
    }
}

impl Mul<f64> for &CashPlan {
    type Output = Result<CashPlan, CashPlanError>;

    fn mul(self, rhs: f64) -> Self::Output {
        self.scale(rhs)
    }
}

impl fmt::Display for CashPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} injections from {} to {}, total {:.2}, rate {:.2}%",
            self.investment_count(),
            self.first_day(),
            self.last_day(),
            self.total(),
            self.rate * 100.0
        )?;
        for (date, amount) in self.iter() {
            writeln!(f, "  {date}  {amount:>14.2}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn sorts_and_merges_duplicates() {
        let plan = CashPlan::new(
            vec![d(2020, 3, 1), d(2020, 1, 1), d(2020, 3, 1)],
            vec![100.0, 50.0, 25.0],
            0.0,
        )
        .unwrap();
        assert_eq!(plan.dates(), &[d(2020, 1, 1), d(2020, 3, 1)]);
        assert_eq!(plan.amounts(), &[50.0, 125.0]);
        assert_eq!(plan.investment_count(), 2);
        assert!((plan.total() - 175.0).abs() < 1e-10);
        assert_eq!(plan.period(), 60);
    }

    #[test]
    fn rejects_invalid_input() {
        assert!(matches!(
            CashPlan::new(vec![d(2020, 1, 1)], vec![], 0.0),
            Err(CashPlanError::LengthMismatch { .. })
        ));
        assert_eq!(
            CashPlan::new(vec![d(2020, 1, 1)], vec![0.0], 0.0),
            Err(CashPlanError::NonPositiveAmount(0.0))
        );
        assert_eq!(
            CashPlan::new(vec![d(2020, 1, 1)], vec![1.0], 1.5),
            Err(CashPlanError::RateOutOfRange(1.5))
        );
        assert_eq!(CashPlan::new(vec![], vec![], 0.0), Err(CashPlanError::Empty));
    }

    #[test]
    fn closing_and_opening_values() {
        let plan = CashPlan::new(vec![d(2020, 1, 1), d(2020, 12, 31)], vec![100.0, 100.0], 0.1)
            .unwrap();
        // 365 days between the two injections.
        assert!((plan.closing_value() - (110.0 + 100.0)).abs() < 1e-9);
        assert!((plan.opening_value() - (100.0 + 100.0 / 1.1)).abs() < 1e-9);
    }

    #[test]
    fn merge_sums_shared_dates_and_prefers_left_rate() {
        let a = CashPlan::new(vec![d(2020, 1, 1)], vec![100.0], 0.0).unwrap();
        let b = CashPlan::new(vec![d(2020, 1, 1), d(2020, 2, 1)], vec![10.0, 20.0], 0.05).unwrap();
        let c = &a + &b;
        assert_eq!(c.amounts(), &[110.0, 20.0]);
        assert_eq!(c.rate(), 0.05);
    }

    #[test]
    fn scale_and_add() {
        let plan = CashPlan::new(vec![d(2020, 1, 1), d(2020, 2, 1)], vec![10.0, 20.0], 0.0).unwrap();
        let scaled = (&plan * 2.0).unwrap();
        assert_eq!(scaled.amounts(), &[20.0, 40.0]);
        assert!(plan.scale(-1.0).is_err());
        let shifted = plan.add_amount(5.0).unwrap();
        assert_eq!(shifted.amounts(), &[15.0, 25.0]);
        assert!(plan.add_amount(-15.0).is_err());
    }

    #[test]
    fn repeat_single_date_is_yearly() {
        let plan = CashPlan::single(d(2020, 1, 1), 100.0).unwrap();
        let repeated = plan.repeat(3).unwrap();
        assert_eq!(repeated.investment_count(), 3);
        assert_eq!(repeated.dates()[1], d(2020, 12, 31));
        assert!((repeated.total() - 300.0).abs() < 1e-10);
    }

    #[test]
    fn repeat_monthly_schedule() {
        let plan = CashPlan::new(
            vec![d(2020, 1, 1), d(2020, 1, 8), d(2020, 1, 15)],
            vec![1.0, 1.0, 1.0],
            0.0,
        )
        .unwrap();
        let repeated = plan.repeat(2).unwrap();
        assert_eq!(repeated.investment_count(), 6);
        assert_eq!(repeated.dates()[3], d(2020, 2, 1));
    }

    #[test]
    fn amount_lookup() {
        let plan = CashPlan::single(d(2020, 1, 1), 100.0).unwrap();
        assert_eq!(plan.amount_on(d(2020, 1, 1)), Some(100.0));
        assert_eq!(plan.amount_on(d(2020, 1, 2)), None);
    }

    #[test]
    fn serde_validates() {
        let ok: CashPlan =
            serde_json::from_str(r#"{"dates":["2020-01-01"],"amounts":[10.0]}"#).unwrap();
        assert_eq!(ok.total(), 10.0);
        let bad = serde_json::from_str::<CashPlan>(r#"{"dates":["2020-01-01"],"amounts":[-1.0]}"#);
        assert!(bad.is_err());
    }
}

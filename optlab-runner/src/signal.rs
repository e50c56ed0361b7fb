//! Signal generators — the strategy side of an evaluation.
//!
//! A generator declares the parameter space it can be optimised over and
//! turns one bound parameter set plus a price table into a signal matrix.
//! Parameter vectors arrive flat from the search; [`ParamLayout`] resolves
//! them once into [`StrategyParams`] before generation.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use optlab_core::{
    Axis, DateFrame, FrameError, ParamValue, ParamVector, PriceTable, SignalMatrix, Space,
};

/// Errors raised while binding parameters or generating signals.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("expected {expected} parameters, got {got}")]
    Arity { expected: usize, got: usize },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("no parameters bound for asset '{0}'")]
    MissingAsset(String),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

/// A parameter set resolved for a concrete strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyParams {
    /// One vector shared by every asset.
    Positional(ParamVector),
    /// One vector per asset.
    PerAsset(BTreeMap<String, ParamVector>),
}

impl StrategyParams {
    /// The vector that applies to `asset`.
    pub fn for_asset(&self, asset: &str) -> Result<&[ParamValue], SignalError> {
        match self {
            Self::Positional(v) => Ok(v),
            Self::PerAsset(map) => map
                .get(asset)
                .map(Vec::as_slice)
                .ok_or_else(|| SignalError::MissingAsset(asset.to_string())),
        }
    }
}

/// How a flat search vector maps onto [`StrategyParams`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParamLayout {
    #[default]
    Positional,
    /// `width` consecutive values per asset, in `assets` order.
    PerAsset { assets: Vec<String>, width: usize },
}

impl ParamLayout {
    pub fn bind(&self, vector: &[ParamValue]) -> Result<StrategyParams, SignalError> {
        match self {
            Self::Positional => Ok(StrategyParams::Positional(vector.to_vec())),
            Self::PerAsset { assets, width } => {
                let expected = assets.len() * width;
                if vector.len() != expected {
                    return Err(SignalError::Arity {
                        expected,
                        got: vector.len(),
                    });
                }
                let map = assets
                    .iter()
                    .zip(vector.chunks((*width).max(1)))
                    .map(|(asset, chunk)| (asset.clone(), chunk.to_vec()))
                    .collect();
                Ok(StrategyParams::PerAsset(map))
            }
        }
    }
}

/// Produces signals for one parameter set.
///
/// Implementations are shared read-only across worker threads.
pub trait SignalGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// The optimisable parameter space, in flat-vector form.
    fn space(&self) -> Space;

    /// Parameters used when the space has no axes or nothing is searched.
    fn default_params(&self) -> ParamVector;

    fn layout(&self) -> ParamLayout {
        ParamLayout::Positional
    }

    fn generate(
        &self,
        params: &StrategyParams,
        prices: &PriceTable,
    ) -> Result<SignalMatrix, SignalError>;
}

type GenerateFn =
    dyn Fn(&StrategyParams, &PriceTable) -> Result<SignalMatrix, SignalError> + Send + Sync;

/// Adapts a closure into a [`SignalGenerator`].
pub struct FnGenerator {
    name: String,
    space: Space,
    defaults: ParamVector,
    layout: ParamLayout,
    func: Box<GenerateFn>,
}

impl FnGenerator {
    pub fn new<F>(name: impl Into<String>, space: Space, defaults: ParamVector, func: F) -> Self
    where
        F: Fn(&StrategyParams, &PriceTable) -> Result<SignalMatrix, SignalError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            space,
            defaults,
            layout: ParamLayout::Positional,
            func: Box::new(func),
        }
    }

    pub fn with_layout(mut self, layout: ParamLayout) -> Self {
        self.layout = layout;
        self
    }
}

impl fmt::Debug for FnGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnGenerator")
            .field("name", &self.name)
            .field("space", &self.space)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl SignalGenerator for FnGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn space(&self) -> Space {
        self.space.clone()
    }

    fn default_params(&self) -> ParamVector {
        self.defaults.clone()
    }

    fn layout(&self) -> ParamLayout {
        self.layout.clone()
    }

    fn generate(
        &self,
        params: &StrategyParams,
        prices: &PriceTable,
    ) -> Result<SignalMatrix, SignalError> {
        (self.func)(params, prices)
    }
}

// ─── Reference generator ─────────────────────────────────────────────

/// Simple moving-average crossover over each asset's price.
///
/// Parameters are `(short, long)` window lengths. When the short average
/// crosses above the long one the asset gets a buy signal of `1 / n_assets`;
/// when it crosses below, a sell-all signal of `-1`. Every price date gets a
/// row. Windows with `short >= long` never cross and produce no trades.
#[derive(Debug, Clone)]
pub struct SmaCross {
    short: (i64, i64),
    long: (i64, i64),
    defaults: (i64, i64),
    per_asset: Option<Vec<String>>,
}

impl Default for SmaCross {
    fn default() -> Self {
        Self {
            short: (2, 30),
            long: (10, 120),
            defaults: (5, 20),
            per_asset: None,
        }
    }
}

impl SmaCross {
    /// Window ranges for the short and long averages.
    pub fn new(short: (i64, i64), long: (i64, i64)) -> Result<Self, SignalError> {
        for (name, (lo, hi)) in [("short", short), ("long", long)] {
            if lo < 1 || lo > hi {
                return Err(SignalError::InvalidParam {
                    name: name.to_string(),
                    reason: format!("window range ({lo}, {hi}) must satisfy 1 <= lo <= hi"),
                });
            }
        }
        Ok(Self {
            short,
            long,
            defaults: (short.0, long.1),
            per_asset: None,
        })
    }

    /// Give each listed asset its own pair of windows.
    pub fn per_asset(mut self, assets: Vec<String>) -> Self {
        self.per_asset = Some(assets);
        self
    }

    fn windows(params: &[ParamValue]) -> Result<(usize, usize), SignalError> {
        if params.len() != 2 {
            return Err(SignalError::Arity {
                expected: 2,
                got: params.len(),
            });
        }
        let window = |name: &str, v: &ParamValue| {
            v.as_i64()
                .filter(|w| *w >= 1)
                .map(|w| w as usize)
                .ok_or_else(|| SignalError::InvalidParam {
                    name: name.to_string(),
                    reason: format!("window must be a positive integer, got {v}"),
                })
        };
        Ok((window("short", &params[0])?, window("long", &params[1])?))
    }
}

impl SignalGenerator for SmaCross {
    fn name(&self) -> &str {
        "sma_cross"
    }

    fn space(&self) -> Space {
        let pair = [
            Axis::Discrete {
                lower: self.short.0,
                upper: self.short.1,
            },
            Axis::Discrete {
                lower: self.long.0,
                upper: self.long.1,
            },
        ];
        let copies = self.per_asset.as_ref().map_or(1, Vec::len);
        Space::from_axes(pair.iter().cloned().cycle().take(2 * copies).collect())
    }

    fn default_params(&self) -> ParamVector {
        let copies = self.per_asset.as_ref().map_or(1, Vec::len);
        (0..copies)
            .flat_map(|_| [ParamValue::Int(self.defaults.0), ParamValue::Int(self.defaults.1)])
            .collect()
    }

    fn layout(&self) -> ParamLayout {
        match &self.per_asset {
            Some(assets) => ParamLayout::PerAsset {
                assets: assets.clone(),
                width: 2,
            },
            None => ParamLayout::Positional,
        }
    }

    fn generate(
        &self,
        params: &StrategyParams,
        prices: &PriceTable,
    ) -> Result<SignalMatrix, SignalError> {
        let filled = prices.filled_forward();
        let n_dates = filled.n_dates();
        let n_assets = filled.n_columns();
        let buy = if n_assets > 0 { 1.0 / n_assets as f64 } else { 0.0 };
        let mut rows = vec![vec![0.0; n_assets]; n_dates];

        for (j, asset) in filled.columns().iter().enumerate() {
            let (short, long) = Self::windows(params.for_asset(asset)?)?;
            if short >= long {
                continue;
            }
            let series: Vec<f64> = filled.rows().iter().map(|r| r[j]).collect();
            let fast = rolling_mean(&series, short);
            let slow = rolling_mean(&series, long);
            let mut prev = f64::NAN;
            for (t, row) in rows.iter_mut().enumerate() {
                let diff = fast[t] - slow[t];
                if prev.is_finite() && diff.is_finite() {
                    if prev <= 0.0 && diff > 0.0 {
                        row[j] = buy;
                    } else if prev >= 0.0 && diff < 0.0 {
                        row[j] = -1.0;
                    }
                }
                prev = diff;
            }
        }

        Ok(DateFrame::new(
            filled.dates().to_vec(),
            filled.columns().to_vec(),
            rows,
        )?)
    }
}

/// Trailing mean over `window` values; NaN until the window is full of
/// finite values.
fn rolling_mean(series: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; series.len()];
    let mut sum = 0.0;
    let mut finite = 0usize;
    for (i, v) in series.iter().enumerate() {
        if v.is_finite() {
            sum += v;
            finite += 1;
        }
        if i >= window {
            let old = series[i - window];
            if old.is_finite() {
                sum -= old;
                finite -= 1;
            }
        }
        if i + 1 >= window && finite == window {
            out[i] = sum / window as f64;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn prices(series: &[&[f64]]) -> PriceTable {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let n = series[0].len();
        let dates = (0..n).map(|i| base + Duration::days(i as i64)).collect();
        let columns = (0..series.len()).map(|j| format!("A{j}")).collect();
        let rows = (0..n).map(|i| series.iter().map(|s| s[i]).collect()).collect();
        PriceTable::new(dates, columns, rows).unwrap()
    }

    fn ints(v: &[i64]) -> ParamVector {
        v.iter().map(|x| ParamValue::Int(*x)).collect()
    }

    #[test]
    fn rolling_mean_waits_for_full_window() {
        let m = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(m[0].is_nan());
        assert_eq!(&m[1..], &[1.5, 2.5, 3.5]);
    }

    #[test]
    fn positional_layout_shares_vector() {
        let params = ParamLayout::Positional.bind(&ints(&[3, 7])).unwrap();
        assert_eq!(params.for_asset("anything").unwrap(), ints(&[3, 7]).as_slice());
    }

    #[test]
    fn per_asset_layout_splits_vector() {
        let layout = ParamLayout::PerAsset {
            assets: vec!["A".into(), "B".into()],
            width: 2,
        };
        let params = layout.bind(&ints(&[1, 2, 3, 4])).unwrap();
        assert_eq!(params.for_asset("B").unwrap(), ints(&[3, 4]).as_slice());
        assert_eq!(
            params.for_asset("C"),
            Err(SignalError::MissingAsset("C".into()))
        );
        assert_eq!(
            layout.bind(&ints(&[1, 2, 3])),
            Err(SignalError::Arity {
                expected: 4,
                got: 3
            })
        );
    }

    #[test]
    fn sma_cross_signals_on_crossings() {
        // Falls, then rises, then falls again.
        let p = prices(&[&[5.0, 4.0, 3.0, 4.0, 6.0, 8.0, 6.0, 3.0, 1.0]]);
        let gen = SmaCross::default();
        let signals = gen
            .generate(&StrategyParams::Positional(ints(&[1, 3])), &p)
            .unwrap();
        let column: Vec<f64> = signals.rows().iter().map(|r| r[0]).collect();
        assert_eq!(signals.n_dates(), 9);
        assert!(column.iter().any(|s| *s == 1.0));
        assert!(column.iter().any(|s| *s == -1.0));
        let first_buy = column.iter().position(|s| *s > 0.0).unwrap();
        let first_sell = column.iter().position(|s| *s < 0.0).unwrap();
        assert!(first_buy < first_sell);
    }

    #[test]
    fn sma_cross_inverted_windows_do_nothing() {
        let p = prices(&[&[5.0, 4.0, 3.0, 4.0, 6.0, 8.0]]);
        let signals = SmaCross::default()
            .generate(&StrategyParams::Positional(ints(&[4, 2])), &p)
            .unwrap();
        assert!(signals.rows().iter().all(|r| r[0] == 0.0));
    }

    #[test]
    fn sma_cross_rejects_wrong_arity() {
        let p = prices(&[&[1.0, 2.0]]);
        let err = SmaCross::default()
            .generate(&StrategyParams::Positional(ints(&[1])), &p)
            .unwrap_err();
        assert_eq!(err, SignalError::Arity { expected: 2, got: 1 });
    }

    #[test]
    fn sma_cross_per_asset_space_and_defaults() {
        let gen = SmaCross::default().per_asset(vec!["A0".into(), "A1".into()]);
        assert_eq!(gen.space().dim(), 4);
        assert_eq!(gen.default_params().len(), 4);
        let bound = gen.layout().bind(&gen.default_params()).unwrap();
        let p = prices(&[&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]]);
        assert_eq!(gen.generate(&bound, &p).unwrap().n_columns(), 2);
    }

    #[test]
    fn sma_cross_new_validates_ranges() {
        assert!(SmaCross::new((0, 5), (10, 20)).is_err());
        assert!(SmaCross::new((5, 3), (10, 20)).is_err());
        let gen = SmaCross::new((2, 8), (10, 40)).unwrap();
        assert_eq!(gen.default_params(), ints(&[2, 40]));
    }

    #[test]
    fn fn_generator_delegates() {
        let gen = FnGenerator::new("flat", Space::default(), Vec::new(), |_, prices| {
            Ok(DateFrame::new(
                prices.dates().to_vec(),
                prices.columns().to_vec(),
                vec![vec![0.0; prices.n_columns()]; prices.n_dates()],
            )?)
        });
        let p = prices(&[&[1.0, 2.0]]);
        let s = gen
            .generate(&StrategyParams::Positional(Vec::new()), &p)
            .unwrap();
        assert_eq!(gen.name(), "flat");
        assert_eq!(gen.space().dim(), 0);
        assert_eq!(s.n_dates(), 2);
    }
}

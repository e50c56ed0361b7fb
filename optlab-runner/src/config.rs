//! Search configuration loaded from TOML.
//!
//! Every section has defaults, so an empty file is a valid config:
//!
//! ```toml
//! output_count = 20
//! objective = "TOTAL_RETURN"
//!
//! [method]
//! type = "INCREMENTAL"
//! init_step = 16.0
//! inc_step = 2.0
//! min_step = 1.0
//!
//! [cost]
//! buy_rate = 0.0003
//! buy_min = 5.0
//!
//! [cash_plan]
//! dates = ["2024-01-02", "2024-07-01"]
//! amounts = [100000.0, 50000.0]
//! rate = 0.0
//!
//! [trading]
//! signal_kind = "PS"
//! lot_buy = 100.0
//! lot_sell = 100.0
//! cash_delivery_period = 1
//!
//! [periods]
//! type = "MULTIPLE"
//! count = 5
//! length = 0.6
//!
//! [[space]]
//! bounds = [2, 30]
//! kind = "int"
//! ```
//!
//! Dates are quoted ISO strings.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use optlab_core::{
    Axis, AxisKind, CashPlan, CashPlanError, Cost, CostError, CostParams, LoopError, LoopOptions,
    ObjectiveKind, ParamValue, PriceTable, SignalKind, Space, SpaceError,
};

use crate::evaluate::{Evaluator, PeriodMode};
use crate::harness::HarnessOptions;
use crate::search::{SearchMethod, SearchOptions};
use crate::signal::SignalGenerator;

/// Unique identifier for a search run (content-addressable hash).
pub type RunId = String;

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("space error: {0}")]
    Space(#[from] SpaceError),

    #[error("cost error: {0}")]
    Cost(#[from] CostError),

    #[error("cash plan error: {0}")]
    CashPlan(#[from] CashPlanError),

    #[error("trading options error: {0}")]
    Trading(#[from] LoopError),

    #[error("price table has no dates to anchor the default cash plan")]
    NoPriceDates,
}

/// Top-level search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub method: SearchMethod,
    /// Pool capacity: how many ranked results to keep.
    pub output_count: usize,
    pub maximize: bool,
    pub parallel: bool,
    /// Worker threads; 0 lets rayon decide.
    pub threads: usize,
    pub batch_size: usize,
    pub seed: u64,
    pub objective: ObjectiveKind,
    pub cost: CostParams,
    pub cash_plan: CashPlanConfig,
    pub trading: TradingConfig,
    /// Whole-history or staggered sub-period evaluation.
    pub periods: PeriodMode,
    /// Axes overriding the generator's own space.
    pub space: Option<Vec<AxisConfig>>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            method: SearchMethod::default(),
            output_count: 50,
            maximize: true,
            parallel: true,
            threads: 0,
            batch_size: 1024,
            seed: 42,
            objective: ObjectiveKind::default(),
            cost: CostParams::default(),
            cash_plan: CashPlanConfig::default(),
            trading: TradingConfig::default(),
            periods: PeriodMode::default(),
            space: None,
        }
    }
}

/// Cash injections. With no dates, the first amount is injected on the
/// first price date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CashPlanConfig {
    pub dates: Vec<NaiveDate>,
    pub amounts: Vec<f64>,
    /// Annual accrual rate on carried cash.
    pub rate: f64,
}

impl Default for CashPlanConfig {
    fn default() -> Self {
        Self {
            dates: Vec::new(),
            amounts: vec![100_000.0],
            rate: 0.0,
        }
    }
}

impl CashPlanConfig {
    pub fn build(&self, prices: &PriceTable) -> Result<CashPlan, ConfigError> {
        if !self.dates.is_empty() {
            return Ok(CashPlan::new(
                self.dates.clone(),
                self.amounts.clone(),
                self.rate,
            )?);
        }
        let first = prices.dates().first().copied().ok_or(ConfigError::NoPriceDates)?;
        let amount = self.amounts.first().copied().unwrap_or(100_000.0);
        Ok(CashPlan::new(vec![first], vec![amount], self.rate)?)
    }
}

/// Trading rules applied by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub signal_kind: SignalKind,
    pub lot_buy: f64,
    pub lot_sell: f64,
    pub pt_buy_threshold: f64,
    pub pt_sell_threshold: f64,
    /// Steps before sale proceeds settle.
    pub cash_delivery_period: usize,
    /// Steps before purchased units settle.
    pub stock_delivery_period: usize,
    pub allow_sell_short: bool,
    pub long_pos_limit: f64,
    pub short_pos_limit: f64,
    /// Spend same-step sale proceeds when cash settles immediately.
    pub max_cash_usage: bool,
    /// Score the trajectory expanded to every price date.
    pub full_history: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        let options = LoopOptions::default();
        Self {
            signal_kind: options.signal_kind,
            lot_buy: options.lot_buy,
            lot_sell: options.lot_sell,
            pt_buy_threshold: options.pt_buy_threshold,
            pt_sell_threshold: options.pt_sell_threshold,
            cash_delivery_period: options.cash_delivery_period,
            stock_delivery_period: options.stock_delivery_period,
            allow_sell_short: options.allow_sell_short,
            long_pos_limit: options.long_pos_limit,
            short_pos_limit: options.short_pos_limit,
            max_cash_usage: options.max_cash_usage,
            full_history: false,
        }
    }
}

impl TradingConfig {
    pub fn loop_options(&self) -> LoopOptions {
        LoopOptions {
            signal_kind: self.signal_kind,
            lot_buy: self.lot_buy,
            lot_sell: self.lot_sell,
            pt_buy_threshold: self.pt_buy_threshold,
            pt_sell_threshold: self.pt_sell_threshold,
            cash_delivery_period: self.cash_delivery_period,
            stock_delivery_period: self.stock_delivery_period,
            allow_sell_short: self.allow_sell_short,
            long_pos_limit: self.long_pos_limit,
            short_pos_limit: self.short_pos_limit,
            max_cash_usage: self.max_cash_usage,
        }
    }
}

/// One axis of an explicit search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Bounds for numeric axes, values for enumerated ones.
    pub bounds: Vec<ParamValue>,
    /// `int`/`discr`, `float`/`conti` or `enum`; inferred when absent.
    #[serde(default)]
    pub kind: Option<String>,
}

impl AxisConfig {
    pub fn build(&self) -> Result<Axis, ConfigError> {
        let kind = self
            .kind
            .as_deref()
            .map(str::parse::<AxisKind>)
            .transpose()?;
        Ok(Axis::new(&self.bounds, kind)?)
    }
}

impl SearchConfig {
    /// Parse and validate a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            field: "config",
            reason: e.to_string(),
        })
    }

    /// Reject invalid values eagerly, before any search work starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.method.validate()?;
        if self.output_count == 0 {
            return Err(ConfigError::Invalid {
                field: "output_count",
                reason: "must be at least 1".into(),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch_size",
                reason: "must be at least 1".into(),
            });
        }
        Cost::new(self.cost)?;
        self.trading.loop_options().validate()?;
        self.periods
            .validate()
            .map_err(|e| ConfigError::Invalid {
                field: "periods",
                reason: e.to_string(),
            })?;
        if !self.cash_plan.dates.is_empty() {
            CashPlan::new(
                self.cash_plan.dates.clone(),
                self.cash_plan.amounts.clone(),
                self.cash_plan.rate,
            )?;
        } else if let Some(&amount) = self.cash_plan.amounts.first() {
            if !(amount.is_finite() && amount > 0.0) {
                return Err(CashPlanError::NonPositiveAmount(amount).into());
            }
        }
        self.space()?;
        Ok(())
    }

    /// Deterministic hash of the full configuration.
    pub fn run_id(&self) -> RunId {
        let bytes = serde_json::to_vec(self).unwrap_or_else(|_| format!("{self:?}").into_bytes());
        blake3::hash(&bytes).to_hex().to_string()
    }

    pub fn cost_model(&self) -> Result<Cost, ConfigError> {
        Ok(Cost::new(self.cost)?)
    }

    pub fn loop_options(&self) -> LoopOptions {
        self.trading.loop_options()
    }

    pub fn build_cash_plan(&self, prices: &PriceTable) -> Result<CashPlan, ConfigError> {
        self.cash_plan.build(prices)
    }

    /// An evaluator wired with this config's cost, cash plan, trading
    /// options, objective, periods and search direction.
    pub fn evaluator(
        &self,
        generator: Arc<dyn SignalGenerator>,
        prices: Arc<PriceTable>,
    ) -> Result<Evaluator, ConfigError> {
        let cash_plan = self.build_cash_plan(&prices)?;
        Ok(Evaluator::new(generator, prices, self.cost_model()?, cash_plan)
            .with_options(self.loop_options())
            .with_objective(Arc::new(self.objective))
            .with_full_history(self.trading.full_history)
            .with_maximize(self.maximize)
            .with_periods(self.periods))
    }

    /// The explicit space, if one is configured.
    pub fn space(&self) -> Result<Option<Space>, ConfigError> {
        self.space
            .as_ref()
            .map(|axes| {
                axes.iter()
                    .map(AxisConfig::build)
                    .collect::<Result<Vec<_>, _>>()
                    .map(Space::from_axes)
            })
            .transpose()
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            output_count: self.output_count,
            maximize: self.maximize,
            seed: self.seed,
            run_id: self.run_id(),
            harness: HarnessOptions {
                parallel: self.parallel,
                threads: self.threads,
                batch_size: self.batch_size,
            },
        }
    }
}

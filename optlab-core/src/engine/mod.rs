//! Trade simulator: per-step cost-aware trade application and the full-run
//! driver.
//!
//! Each step:
//!
//! 1. Deliver sale proceeds and purchased units whose settlement period ended
//! 2. Value the portfolio (`cash + Σ holdings × price`)
//! 3. Sell on negative signals (settled units only), crediting net proceeds
//! 4. Cover short positions on positive signals when shorting is allowed
//! 5. Size buy budgets, capped by the long position limit and settled cash
//! 6. Buy, paying notional plus fees, then open any requested shorts
//! 7. Revalue and record holdings, cash, fee and value

pub mod loop_runner;
pub mod state;
pub mod step;
pub mod trajectory;

pub use loop_runner::{apply_loop, simulate, Simulation};
pub use state::{LoopOptions, PortfolioState, Settlement, SignalKind};
pub use step::{loop_step, throttle_purchases, StepOutcome};
pub use trajectory::{Trajectory, TrajectoryRow};

use chrono::NaiveDate;
use thiserror::Error;

/// Input-contract violations detected before any step runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoopError {
    #[error("signal matrix is empty")]
    EmptySignals,

    #[error("price table is empty")]
    EmptyPrices,

    #[error("no cost model supplied")]
    MissingCost,

    #[error("no cash plan supplied")]
    MissingCashPlan,

    #[error("signal assets {signals:?} do not match price assets {prices:?}")]
    AssetMismatch {
        signals: Vec<String>,
        prices: Vec<String>,
    },

    #[error("signal date {0} has no prices")]
    SignalDateNotInPrices(NaiveDate),

    #[error("cash injection on {0} falls after the last price date")]
    InjectionAfterHistory(NaiveDate),

    #[error("invalid loop option: {0}")]
    InvalidOption(String),
}

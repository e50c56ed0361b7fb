//! OptLab Runner — search orchestration on top of `optlab-core`.
//!
//! This crate provides:
//! - TOML search configuration with eager validation and run hashing
//! - The signal-generator seam, parameter binding and a reference SMA-cross generator
//! - Candidate evaluation over an immutable shared snapshot
//! - A parallel evaluation harness (rayon pool + completion channel)
//! - Exhaustive, Monte Carlo and incremental search
//! - CSV loading of price/signal tables and trajectory export

pub mod config;
pub mod data_loader;
pub mod evaluate;
pub mod harness;
pub mod progress;
pub mod search;
pub mod signal;

pub use config::{AxisConfig, CashPlanConfig, ConfigError, RunId, SearchConfig, TradingConfig};
pub use data_loader::{
    frame_hash, load_frame, read_frame, write_trajectory, write_trajectory_to, LoadError,
};
pub use evaluate::{EvalError, Evaluate, Evaluator, PeriodMode};
pub use harness::{Harness, HarnessOptions, RoundTracker};
pub use progress::{progress_bar, SearchProgress};
pub use search::{format_vector, search, SearchError, SearchMethod, SearchOptions, SearchOutcome};
pub use signal::{
    FnGenerator, ParamLayout, SignalError, SignalGenerator, SmaCross, StrategyParams,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn search_config_is_send_sync() {
        assert_send::<SearchConfig>();
        assert_sync::<SearchConfig>();
    }

    #[test]
    fn evaluator_is_send_sync() {
        assert_send::<Evaluator>();
        assert_sync::<Evaluator>();
    }

    #[test]
    fn generators_are_send_sync() {
        assert_send::<SmaCross>();
        assert_sync::<SmaCross>();
        assert_send::<FnGenerator>();
        assert_sync::<FnGenerator>();
    }

    #[test]
    fn strategy_params_is_send_sync() {
        assert_send::<StrategyParams>();
        assert_sync::<StrategyParams>();
    }

    #[test]
    fn harness_is_send_sync() {
        assert_send::<Harness>();
        assert_sync::<Harness>();
    }

    #[test]
    fn search_outcome_is_send_sync() {
        assert_send::<SearchOutcome>();
        assert_sync::<SearchOutcome>();
        assert_send::<SearchProgress>();
        assert_sync::<SearchProgress>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<SearchError>();
        assert_sync::<SearchError>();
        assert_send::<LoadError>();
        assert_sync::<LoadError>();
        assert_send::<EvalError>();
        assert_sync::<EvalError>();
    }
}

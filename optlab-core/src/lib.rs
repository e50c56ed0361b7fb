//! OptLab Core — parameter spaces, result pool, cost model and trade simulator.
//!
//! This crate contains the pure engine:
//! - Parameter spaces built from discrete, continuous and enumerated axes
//! - Grid and random candidate extraction, neighbourhood sub-spaces
//! - A bounded top-K result pool
//! - A cost model with fixed-fee and rate regimes, minimum fees and lot sizes
//! - Cash plans with scheduled injections and an accrual rate
//! - A step-by-step trade simulator producing a value trajectory
//! - Objectives that turn a trajectory into a score

pub mod cash_plan;
pub mod cost;
pub mod data;
pub mod engine;
pub mod objective;
pub mod pool;
pub mod rng;
pub mod space;

pub use cash_plan::{CashPlan, CashPlanError};
pub use cost::{Cost, CostError, CostParams, PurchaseOutcome, SaleOutcome};
pub use data::{DateFrame, FrameError, PriceTable, SignalMatrix};
pub use engine::{
    apply_loop, simulate, LoopError, LoopOptions, SignalKind, Simulation, Trajectory,
};
pub use objective::{Objective, ObjectiveKind};
pub use pool::ResultPool;
pub use rng::RngHierarchy;
pub use space::{Axis, AxisKind, Extraction, ParamValue, ParamVector, Space, SpaceError};

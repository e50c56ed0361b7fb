//! Objectives: map a finished trajectory to the score the search ranks by.

use serde::{Deserialize, Serialize};

use crate::engine::Trajectory;

/// Scores a completed trajectory. Degenerate trajectories must score
/// `f64::NEG_INFINITY` so they lose every cut.
pub trait Objective: Send + Sync {
    fn score(&self, trajectory: &Trajectory) -> f64;

    /// Whether larger scores are better.
    fn maximize(&self) -> bool {
        true
    }
}

/// Built-in objectives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectiveKind {
    /// Total value on the last step.
    #[default]
    FinalValue,
    /// Final value over total injected cash, minus one.
    TotalReturn,
    /// Total return annualised over the calendar span of the trajectory.
    AnnualReturn,
}

impl Objective for ObjectiveKind {
    fn score(&self, trajectory: &Trajectory) -> f64 {
        let Some(final_value) = trajectory.final_value() else {
            return f64::NEG_INFINITY;
        };
        let score = match self {
            Self::FinalValue => final_value,
            Self::TotalReturn => {
                let invested = trajectory.total_injected();
                if invested <= 0.0 {
                    return f64::NEG_INFINITY;
                }
                final_value / invested - 1.0
            }
            Self::AnnualReturn => {
                let invested = trajectory.total_injected();
                if invested <= 0.0 {
                    return f64::NEG_INFINITY;
                }
                let growth = final_value / invested;
                let rows = trajectory.rows();
                let days = (rows[rows.len() - 1].date - rows[0].date).num_days();
                if days <= 0 {
                    growth - 1.0
                } else {
                    growth.powf(365.0 / days as f64) - 1.0
                }
            }
        };
        if score.is_nan() {
            f64::NEG_INFINITY
        } else {
            score
        }
    }
}

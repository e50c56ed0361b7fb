//! Parameter spaces: axes, sampling, and neighbourhood derivation.

pub mod axis;
pub mod candidates;
pub mod param_space;
pub mod value;

pub use axis::{Axis, AxisKind};
pub use candidates::Candidates;
pub use param_space::Space;
pub use value::{ParamValue, ParamVector};

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// How [`Space::extract`] turns its argument into candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extraction {
    /// Step along every axis by a fixed interval.
    #[default]
    Interval,
    /// Draw a fixed number of uniform samples.
    Random,
}

impl FromStr for Extraction {
    type Err = SpaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interval" | "intv" | "step" => Ok(Self::Interval),
            "rand" | "random" => Ok(Self::Random),
            other => Err(SpaceError::UnknownExtraction(other.to_string())),
        }
    }
}

/// Errors raised while building or sampling a space.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpaceError {
    #[error("axis bounds or enumeration must not be empty")]
    EmptyAxis,

    #[error("unknown axis type '{0}'")]
    UnknownKind(String),

    #[error("{kind} axis needs numeric bounds, got [{found}]")]
    NonNumericBounds { kind: AxisKind, found: String },

    #[error("discrete axis bounds must be integral, got {0}")]
    NonIntegralBound(f64),

    #[error("axis bounds must be finite")]
    NonFiniteBound,

    #[error("lower bound {lower} exceeds upper bound {upper}")]
    InvertedBounds { lower: f64, upper: f64 },

    #[error("expected {expected} axis types, got {got}")]
    KindCountMismatch { expected: usize, got: usize },

    #[error("expected 1 or {expected} per-axis values, got {got}")]
    StepCountMismatch { expected: usize, got: usize },

    #[error("interval or quantity must be positive and finite, got {0}")]
    InvalidInterval(f64),

    #[error("distance must be non-negative and finite, got {0}")]
    InvalidDistance(f64),

    #[error("point has {got} coordinates but the space has {expected} axes")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("point {0} lies outside the space")]
    PointOutside(String),

    #[error("candidate count overflows")]
    TooManyCandidates,

    #[error("unknown extraction method '{0}'")]
    UnknownExtraction(String),
}

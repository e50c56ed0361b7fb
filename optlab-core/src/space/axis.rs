//! A single dimension of a parameter space.
//!
//! Three kinds of axis exist:
//! - discrete: integer bounds, both inclusive when sampling on a grid
//! - continuous: real bounds, the upper bound excluded from grid sampling
//! - enumerated: an ordered list of opaque values

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::value::ParamValue;
use super::{Extraction, SpaceError};

/// Axis type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    Discrete,
    Continuous,
    Enumerated,
}

impl FromStr for AxisKind {
    type Err = SpaceError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "int" | "discr" | "discrete" => Ok(Self::Discrete),
            "float" | "conti" | "continuous" => Ok(Self::Continuous),
            "enum" | "enumerate" | "enumerated" => Ok(Self::Enumerated),
            other => Err(SpaceError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for AxisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Discrete => "discr",
            Self::Continuous => "conti",
            Self::Enumerated => "enum",
        };
        f.write_str(tag)
    }
}

/// One dimension of a [`Space`](super::Space). Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub enum Axis {
    Discrete { lower: i64, upper: i64 },
    Continuous { lower: f64, upper: f64 },
    Enumerated(Vec<ParamValue>),
}

impl Axis {
    /// Build an axis from a bounds-or-enumeration list and an optional type tag.
    ///
    /// Without a tag the type is inferred: one or two numeric values give a
    /// numeric axis (continuous when any value is real, discrete otherwise),
    /// anything else gives an enumerated axis. A single numeric value `b`
    /// stands for the bounds `(0, b)`.
    pub fn new(boe: &[ParamValue], kind: Option<AxisKind>) -> Result<Self, SpaceError> {
        if boe.is_empty() {
            return Err(SpaceError::EmptyAxis);
        }
        let all_numeric = boe.iter().all(ParamValue::is_numeric);
        let kind = match kind {
            Some(kind) => kind,
            None if boe.len() <= 2 && all_numeric => {
                if boe.iter().any(|v| matches!(v, ParamValue::Float(_))) {
                    AxisKind::Continuous
                } else {
                    AxisKind::Discrete
                }
            }
            None => AxisKind::Enumerated,
        };

        match kind {
            AxisKind::Enumerated => Self::enumerated(boe.to_vec()),
            AxisKind::Discrete | AxisKind::Continuous => {
                let (lower, upper) = numeric_bounds(boe, kind)?;
                if kind == AxisKind::Discrete {
                    let lo = integral(lower)?;
                    let hi = integral(upper)?;
                    Self::discrete(lo, hi)
                } else {
                    Self::continuous(lower, upper)
                }
            }
        }
    }

    pub fn discrete(lower: i64, upper: i64) -> Result<Self, SpaceError> {
        if lower > upper {
            return Err(SpaceError::InvertedBounds {
                lower: lower as f64,
                upper: upper as f64,
            });
        }
        // The value count must fit an i64.
        upper
            .checked_sub(lower)
            .and_then(|width| width.checked_add(1))
            .ok_or(SpaceError::TooManyCandidates)?;
        Ok(Self::Discrete { lower, upper })
    }

    pub fn continuous(lower: f64, upper: f64) -> Result<Self, SpaceError> {
        if !lower.is_finite() || !upper.is_finite() {
            return Err(SpaceError::NonFiniteBound);
        }
        if lower > upper {
            return Err(SpaceError::InvertedBounds { lower, upper });
        }
        Ok(Self::Continuous { lower, upper })
    }

    pub fn enumerated(values: Vec<ParamValue>) -> Result<Self, SpaceError> {
        if values.is_empty() {
            return Err(SpaceError::EmptyAxis);
        }
        Ok(Self::Enumerated(values))
    }

    pub fn kind(&self) -> AxisKind {
        match self {
            Self::Discrete { .. } => AxisKind::Discrete,
            Self::Continuous { .. } => AxisKind::Continuous,
            Self::Enumerated(_) => AxisKind::Enumerated,
        }
    }

    /// Number of distinct values, `None` for a continuous axis.
    pub fn count(&self) -> Option<usize> {
        match self {
            Self::Discrete { lower, upper } => upper
                .checked_sub(*lower)
                .and_then(|width| width.checked_add(1))
                .and_then(|n| usize::try_from(n).ok()),
            Self::Continuous { .. } => None,
            Self::Enumerated(values) => Some(values.len()),
        }
    }

    /// Span of the axis: the bound difference for continuous axes, the
    /// element count otherwise.
    pub fn size(&self) -> f64 {
        match self {
            Self::Discrete { lower, upper } => {
                (i128::from(*upper) - i128::from(*lower) + 1) as f64
            }
            Self::Continuous { lower, upper } => upper - lower,
            Self::Enumerated(values) => values.len() as f64,
        }
    }

    /// Bounds (numeric axes) or the full enumeration.
    pub fn boe(&self) -> Vec<ParamValue> {
        match self {
            Self::Discrete { lower, upper } => vec![ParamValue::Int(*lower), ParamValue::Int(*upper)],
            Self::Continuous { lower, upper } => {
                vec![ParamValue::Float(*lower), ParamValue::Float(*upper)]
            }
            Self::Enumerated(values) => values.clone(),
        }
    }

    /// Produce a finite sequence of values along the axis.
    ///
    /// With [`Extraction::Interval`] the argument is a step: discrete axes
    /// step from `lower` to `upper` inclusive (fractional steps are floored,
    /// never below 1), continuous axes stop before `upper`, enumerated axes
    /// take every n-th value. With [`Extraction::Random`] the argument is a
    /// sample count and values are drawn uniformly with replacement.
    pub fn extract<R: Rng + ?Sized>(
        &self,
        interval_or_qty: f64,
        how: Extraction,
        rng: &mut R,
    ) -> Result<Vec<ParamValue>, SpaceError> {
        match how {
            Extraction::Interval => {
                if !(interval_or_qty.is_finite() && interval_or_qty > 0.0) {
                    return Err(SpaceError::InvalidInterval(interval_or_qty));
                }
                Ok(self.extract_interval(interval_or_qty))
            }
            Extraction::Random => {
                if !(interval_or_qty.is_finite() && interval_or_qty >= 0.0) {
                    return Err(SpaceError::InvalidInterval(interval_or_qty));
                }
                Ok(self.extract_random(interval_or_qty as usize, rng))
            }
        }
    }

    fn extract_interval(&self, step: f64) -> Vec<ParamValue> {
        match self {
            Self::Discrete { lower, upper } => {
                let step = (step.floor() as i64).max(1) as usize;
                (*lower..=*upper).step_by(step).map(ParamValue::Int).collect()
            }
            Self::Continuous { lower, upper } => {
                if lower == upper {
                    return vec![ParamValue::Float(*lower)];
                }
                // Multiply rather than accumulate so the grid does not drift.
                let mut values = Vec::new();
                let mut i = 0u64;
                loop {
                    let v = lower + i as f64 * step;
                    if v >= *upper {
                        break;
                    }
                    values.push(ParamValue::Float(v));
                    i += 1;
                }
                values
            }
            Self::Enumerated(values) => {
                let step = (step.floor() as usize).max(1);
                values.iter().step_by(step).cloned().collect()
            }
        }
    }

    fn extract_random<R: Rng + ?Sized>(&self, qty: usize, rng: &mut R) -> Vec<ParamValue> {
        match self {
            Self::Discrete { lower, upper } => (0..qty)
                .map(|_| ParamValue::Int(rng.gen_range(*lower..=*upper)))
                .collect(),
            Self::Continuous { lower, upper } => (0..qty)
                .map(|_| {
                    if lower == upper {
                        ParamValue::Float(*lower)
                    } else {
                        ParamValue::Float(rng.gen_range(*lower..*upper))
                    }
                })
                .collect(),
            Self::Enumerated(values) => (0..qty)
                .map(|_| values[rng.gen_range(0..values.len())].clone())
                .collect(),
        }
    }

    /// Strict membership: open interval for numeric axes.
    pub fn contains(&self, value: &ParamValue) -> bool {
        match self {
            Self::Discrete { lower, upper } => value
                .as_i64()
                .is_some_and(|v| *lower < v && v < *upper),
            Self::Continuous { lower, upper } => value
                .as_f64()
                .is_some_and(|v| *lower < v && v < *upper),
            Self::Enumerated(values) => values.contains(value),
        }
    }

    /// Closed membership: bounds count as inside.
    pub fn encloses(&self, value: &ParamValue) -> bool {
        match self {
            Self::Discrete { lower, upper } => value
                .as_i64()
                .is_some_and(|v| *lower <= v && v <= *upper),
            Self::Continuous { lower, upper } => value
                .as_f64()
                .is_some_and(|v| *lower <= v && v <= *upper),
            Self::Enumerated(values) => values.contains(value),
        }
    }

    /// A narrower axis centred on `centre`, clipped to this axis.
    ///
    /// Enumerated axes keep every value when `ignore_enums` is set, otherwise
    /// they keep the values at most `distance` positions away from `centre`.
    /// `centre` must be enclosed by this axis.
    pub fn neighbourhood(
        &self,
        centre: &ParamValue,
        distance: f64,
        ignore_enums: bool,
    ) -> Result<Self, SpaceError> {
        if !(distance.is_finite() && distance >= 0.0) {
            return Err(SpaceError::InvalidDistance(distance));
        }
        if !self.encloses(centre) {
            return Err(SpaceError::PointOutside(centre.to_string()));
        }
        match self {
            Self::Discrete { lower, upper } => {
                let c = centre.as_f64().unwrap_or(*lower as f64);
                let lo = ((c - distance).ceil() as i64).max(*lower);
                let hi = ((c + distance).floor() as i64).min(*upper);
                Self::discrete(lo, hi)
            }
            Self::Continuous { lower, upper } => {
                let c = centre.as_f64().unwrap_or(*lower);
                Self::continuous((c - distance).max(*lower), (c + distance).min(*upper))
            }
            Self::Enumerated(values) => {
                if ignore_enums {
                    return Ok(self.clone());
                }
                let pos = values.iter().position(|v| v == centre).unwrap_or(0);
                let reach = distance.floor() as usize;
                let lo = pos.saturating_sub(reach);
                let hi = pos.saturating_add(reach).min(values.len() - 1);
                Self::enumerated(values[lo..=hi].to_vec())
            }
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discrete { lower, upper } => write!(f, "({lower}, {upper})"),
            Self::Continuous { lower, upper } => write!(f, "({lower}, {upper})"),
            Self::Enumerated(values) => {
                f.write_str("{")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

fn numeric_bounds(boe: &[ParamValue], kind: AxisKind) -> Result<(f64, f64), SpaceError> {
    let numbers: Option<Vec<f64>> = boe.iter().take(2).map(ParamValue::as_f64).collect();
    let numbers = numbers.ok_or_else(|| SpaceError::NonNumericBounds {
        kind,
        found: boe.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "),
    })?;
    match numbers.as_slice() {
        [b] => Ok((0.0, *b)),
        [lo, hi] => Ok((*lo, *hi)),
        _ => Err(SpaceError::EmptyAxis),
    }
}

fn integral(v: f64) -> Result<i64, SpaceError> {
    if !v.is_finite() {
        return Err(SpaceError::NonFiniteBound);
    }
    if v.fract() != 0.0 {
        return Err(SpaceError::NonIntegralBound(v));
    }
    Ok(v as i64)
}

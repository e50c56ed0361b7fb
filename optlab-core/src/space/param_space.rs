//! Multi-dimensional parameter space.

use rand::Rng;
use std::fmt;

use super::axis::{Axis, AxisKind};
use super::candidates::Candidates;
use super::value::ParamValue;
use super::{Extraction, SpaceError};

/// An ordered collection of axes.
///
/// Spaces are never mutated after construction; refinement derives a new,
/// smaller space through [`Space::from_point`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Space {
    axes: Vec<Axis>,
}

impl Space {
    /// Build a space from per-axis bounds-or-enumerations and type tags.
    ///
    /// `kinds` is either empty (infer every axis) or exactly one entry per
    /// axis, where `None` asks for inference on that axis.
    pub fn new(boes: &[Vec<ParamValue>], kinds: &[Option<AxisKind>]) -> Result<Self, SpaceError> {
        if !kinds.is_empty() && kinds.len() != boes.len() {
            return Err(SpaceError::KindCountMismatch {
                expected: boes.len(),
                got: kinds.len(),
            });
        }
        let axes = boes
            .iter()
            .enumerate()
            .map(|(i, boe)| Axis::new(boe, kinds.get(i).copied().flatten()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { axes })
    }

    pub fn from_axes(axes: Vec<Axis>) -> Self {
        Self { axes }
    }

    pub fn dim(&self) -> usize {
        self.axes.len()
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn types(&self) -> Vec<AxisKind> {
        self.axes.iter().map(Axis::kind).collect()
    }

    pub fn boes(&self) -> Vec<Vec<ParamValue>> {
        self.axes.iter().map(Axis::boe).collect()
    }

    /// Per-axis element counts, `None` for continuous axes.
    pub fn shape(&self) -> Vec<Option<usize>> {
        self.axes.iter().map(Axis::count).collect()
    }

    /// Per-axis spans.
    pub fn size(&self) -> Vec<f64> {
        self.axes.iter().map(Axis::size).collect()
    }

    /// Product of the per-axis spans.
    pub fn volume(&self) -> f64 {
        self.axes.iter().map(Axis::size).product()
    }

    /// Number of distinct points, `None` when any axis is continuous or the
    /// count overflows.
    pub fn count(&self) -> Option<usize> {
        self.axes
            .iter()
            .try_fold(1usize, |acc, axis| acc.checked_mul(axis.count()?))
    }

    /// Sample candidate vectors.
    ///
    /// `interval_or_qty` holds either one value shared by every axis or one
    /// value per axis. Interval extraction yields the Cartesian product of
    /// the per-axis grids; random extraction zips per-axis samples, so the
    /// sample count should be shared (the shortest axis sample bounds the
    /// total otherwise).
    pub fn extract<R: Rng + ?Sized>(
        &self,
        interval_or_qty: &[f64],
        how: Extraction,
        rng: &mut R,
    ) -> Result<Candidates, SpaceError> {
        let per_axis = self.broadcast(interval_or_qty)?;
        let columns = self
            .axes
            .iter()
            .zip(per_axis)
            .map(|(axis, step)| axis.extract(step, how, rng))
            .collect::<Result<Vec<_>, _>>()?;
        match how {
            Extraction::Interval => {
                Candidates::product(columns).ok_or(SpaceError::TooManyCandidates)
            }
            Extraction::Random => Ok(Candidates::zipped(columns)),
        }
    }

    /// Strict membership: every coordinate inside its axis (open numeric bounds).
    pub fn contains(&self, point: &[ParamValue]) -> bool {
        point.len() == self.dim() && self.axes.iter().zip(point).all(|(a, c)| a.contains(c))
    }

    /// Closed membership: bounds count as inside.
    pub fn encloses(&self, point: &[ParamValue]) -> bool {
        point.len() == self.dim() && self.axes.iter().zip(point).all(|(a, c)| a.encloses(c))
    }

    /// Derive the sub-space within `distance` of `point`.
    ///
    /// `distance` is one value shared by every axis or one value per axis.
    /// Numeric axes are clipped to `[c - d, c + d]` intersected with this
    /// space's bounds; enumerated axes are kept whole when `ignore_enums` is
    /// set and windowed around the point otherwise.
    pub fn from_point(
        &self,
        point: &[ParamValue],
        distance: &[f64],
        ignore_enums: bool,
    ) -> Result<Self, SpaceError> {
        if point.len() != self.dim() {
            return Err(SpaceError::DimensionMismatch {
                expected: self.dim(),
                got: point.len(),
            });
        }
        if !self.encloses(point) {
            return Err(SpaceError::PointOutside(format_point(point)));
        }
        let distances = self.broadcast(distance)?;
        let axes = self
            .axes
            .iter()
            .zip(point)
            .zip(distances)
            .map(|((axis, centre), d)| axis.neighbourhood(centre, d, ignore_enums))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { axes })
    }

    fn broadcast(&self, values: &[f64]) -> Result<Vec<f64>, SpaceError> {
        match values.len() {
            1 => Ok(vec![values[0]; self.dim()]),
            n if n == self.dim() => Ok(values.to_vec()),
            n => Err(SpaceError::StepCountMismatch {
                expected: self.dim(),
                got: n,
            }),
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<")?;
        for (i, axis) in self.axes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{axis}")?;
        }
        f.write_str(">")
    }
}

pub(crate) fn format_point(point: &[ParamValue]) -> String {
    let parts: Vec<String> = point.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}

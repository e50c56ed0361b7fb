//! Search progress snapshots and a pure text progress bar.

use serde::{Deserialize, Serialize};

/// Progress update emitted while a search round is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchProgress {
    /// Zero-based round index (always 0 for single-round methods).
    pub round: usize,
    pub completed: usize,
    pub total: usize,
    /// Best score seen so far in this round, if any finite score arrived.
    pub best_score: Option<f64>,
}

impl SearchProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Render `fraction` as a fixed-width bar followed by a percentage,
/// e.g. `[#####-----]  50.0%`.
///
/// Out-of-range fractions are clamped; NaN renders as an empty bar.
pub fn progress_bar(fraction: f64, width: usize) -> String {
    let f = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };
    let filled = ((f * width as f64).round() as usize).min(width);
    format!(
        "[{}{}] {:>5.1}%",
        "#".repeat(filled),
        "-".repeat(width - filled),
        f * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_renders_fill_and_percentage() {
        assert_eq!(progress_bar(0.5, 10), "[#####-----]  50.0%");
        assert_eq!(progress_bar(0.0, 4), "[----]   0.0%");
        assert_eq!(progress_bar(1.0, 4), "[####] 100.0%");
    }

    #[test]
    fn bar_clamps_out_of_range() {
        assert_eq!(progress_bar(1.7, 4), progress_bar(1.0, 4));
        assert_eq!(progress_bar(-0.2, 4), progress_bar(0.0, 4));
        assert_eq!(progress_bar(f64::NAN, 4), progress_bar(0.0, 4));
    }

    #[test]
    fn zero_width_bar_keeps_percentage() {
        assert_eq!(progress_bar(0.25, 0), "[]  25.0%");
    }

    #[test]
    fn fraction_of_empty_round_is_complete() {
        let p = SearchProgress {
            round: 0,
            completed: 0,
            total: 0,
            best_score: None,
        };
        assert_eq!(p.fraction(), 1.0);
    }
}

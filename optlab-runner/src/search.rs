//! Parameter search strategies.
//!
//! Every method follows the same shape: sample candidate vectors from a
//! [`Space`], evaluate each one through the [`Harness`], push the scores into
//! a [`ResultPool`], and cut the pool to the best `output_count` entries.
//!
//! - **Exhaustive**: one grid pass at a fixed step.
//! - **MonteCarlo**: a fixed number of uniform random samples.
//! - **Incremental**: coarse grid first, then finer grids around every
//!   retained point, dividing the step by `inc_step` each round.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, Level};

use optlab_core::{Extraction, ParamValue, ParamVector, ResultPool, RngHierarchy, Space, SpaceError};

use crate::config::ConfigError;
use crate::evaluate::{EvalError, Evaluate};
use crate::harness::{Harness, HarnessOptions, RoundTracker};
use crate::progress::SearchProgress;

/// Errors that stop a search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("space error: {0}")]
    Space(#[from] SpaceError),

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),
}

fn default_step() -> f64 {
    1.0
}

fn default_samples() -> usize {
    1000
}

fn default_init_step() -> f64 {
    16.0
}

fn default_inc_step() -> f64 {
    2.0
}

fn default_min_step() -> f64 {
    1.0
}

/// Search method and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchMethod {
    /// Visit every grid point at `step`.
    Exhaustive {
        #[serde(default = "default_step")]
        step: f64,
    },

    /// Evaluate `samples` uniformly drawn points.
    MonteCarlo {
        #[serde(default = "default_samples")]
        samples: usize,
    },

    /// Coarse-to-fine grid refinement.
    Incremental {
        #[serde(default = "default_init_step")]
        init_step: f64,
        #[serde(default = "default_inc_step")]
        inc_step: f64,
        #[serde(default = "default_min_step")]
        min_step: f64,
    },
}

impl Default for SearchMethod {
    fn default() -> Self {
        Self::Exhaustive {
            step: default_step(),
        }
    }
}

impl SearchMethod {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Exhaustive { .. } => "exhaustive",
            Self::MonteCarlo { .. } => "monte_carlo",
            Self::Incremental { .. } => "incremental",
        }
    }

    /// Reject parameters that cannot terminate or sample nothing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: String| ConfigError::Invalid { field, reason };
        match *self {
            Self::Exhaustive { step } => {
                if !(step.is_finite() && step > 0.0) {
                    return Err(invalid("method.step", format!("must be positive, got {step}")));
                }
            }
            Self::MonteCarlo { samples } => {
                if samples == 0 {
                    return Err(invalid("method.samples", "must be at least 1".into()));
                }
            }
            Self::Incremental {
                init_step,
                inc_step,
                min_step,
            } => {
                if !(inc_step.is_finite() && inc_step > 1.0) {
                    return Err(invalid(
                        "method.inc_step",
                        format!("must be greater than 1, got {inc_step}"),
                    ));
                }
                if !(min_step.is_finite() && min_step > 0.0) {
                    return Err(invalid(
                        "method.min_step",
                        format!("must be positive, got {min_step}"),
                    ));
                }
                if !(init_step.is_finite() && init_step > min_step) {
                    return Err(invalid(
                        "method.init_step",
                        format!("must exceed min_step {min_step}, got {init_step}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Step sizes the incremental method will use, in order. Other methods
    /// use a single step (exhaustive) or none (Monte Carlo).
    pub fn step_schedule(&self) -> Vec<f64> {
        match *self {
            Self::Exhaustive { step } => vec![step],
            Self::MonteCarlo { .. } => Vec::new(),
            Self::Incremental {
                init_step,
                inc_step,
                min_step,
            } => {
                let mut steps = Vec::new();
                let mut step = init_step;
                while step > min_step {
                    steps.push(step);
                    step /= inc_step;
                }
                steps
            }
        }
    }
}

impl FromStr for SearchMethod {
    type Err = ConfigError;

    /// Parse a method name into that method with default parameters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exhaustive" | "grid" | "1" => Ok(Self::default()),
            "monte_carlo" | "montecarlo" | "mc" | "2" => Ok(Self::MonteCarlo {
                samples: default_samples(),
            }),
            "incremental" | "inc" | "3" => Ok(Self::Incremental {
                init_step: default_init_step(),
                inc_step: default_inc_step(),
                min_step: default_min_step(),
            }),
            other => Err(ConfigError::Invalid {
                field: "method",
                reason: format!("unknown search method '{other}'"),
            }),
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhaustive { step } => write!(f, "exhaustive(step={step})"),
            Self::MonteCarlo { samples } => write!(f, "monte_carlo(samples={samples})"),
            Self::Incremental {
                init_step,
                inc_step,
                min_step,
            } => write!(
                f,
                "incremental(init_step={init_step}, inc_step={inc_step}, min_step={min_step})"
            ),
        }
    }
}

/// Options shared by every search method.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Pool capacity: how many ranked results to keep.
    pub output_count: usize,
    /// Keep the largest scores when true, the smallest otherwise.
    pub maximize: bool,
    pub seed: u64,
    /// Tag mixed into the RNG derivation and log lines.
    pub run_id: String,
    pub harness: HarnessOptions,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            output_count: 50,
            maximize: true,
            seed: 42,
            run_id: String::new(),
            harness: HarnessOptions::default(),
        }
    }
}

/// Ranked search results.
///
/// `params` and `scores` are parallel and sorted ascending by score, so the
/// best entry is last when maximizing and first when minimizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub params: Vec<ParamVector>,
    pub scores: Vec<f64>,
    pub maximize: bool,
    /// Evaluations performed across all rounds.
    pub evaluations: usize,
    pub rounds: usize,
    /// Grid step used in each round (empty for random sampling).
    pub steps: Vec<f64>,
}

impl SearchOutcome {
    fn from_pool(pool: ResultPool<ParamVector>, maximize: bool) -> Self {
        let (params, scores) = pool.into_parts();
        Self {
            params,
            scores,
            maximize,
            evaluations: 0,
            rounds: 0,
            steps: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn best(&self) -> Option<(&ParamVector, f64)> {
        let idx = if self.maximize {
            self.params.len().checked_sub(1)?
        } else if self.params.is_empty() {
            return None;
        } else {
            0
        };
        Some((&self.params[idx], self.scores[idx]))
    }

    /// Entries from best to worst.
    pub fn ranked(&self) -> Vec<(&ParamVector, f64)> {
        let mut entries: Vec<_> = self.params.iter().zip(self.scores.iter().copied()).collect();
        if self.maximize {
            entries.reverse();
        }
        entries
    }
}

// ─── Entry point ─────────────────────────────────────────────────────

/// Run `method` over `space`, scoring candidates with `evaluator`.
///
/// A space with no axes is evaluated once with an empty vector (the
/// evaluator's defaults) and returns that single result.
pub fn search<E>(
    method: &SearchMethod,
    space: &Space,
    evaluator: &E,
    options: &SearchOptions,
    progress: Option<&dyn Fn(&SearchProgress)>,
) -> Result<SearchOutcome, SearchError>
where
    E: Evaluate + ?Sized,
{
    method.validate()?;
    if options.output_count == 0 {
        return Err(ConfigError::Invalid {
            field: "output_count",
            reason: "must be at least 1".into(),
        }
        .into());
    }

    let ctx = SearchContext {
        harness: Harness::new(options.harness)?,
        rng: RngHierarchy::new(options.seed),
        options,
        progress,
    };
    info!(
        run_id = %options.run_id,
        method = %method,
        space = %space,
        output_count = options.output_count,
        threads = ctx.harness.threads(),
        "search started"
    );

    let outcome = if space.dim() == 0 {
        ctx.single_default(evaluator)?
    } else {
        match *method {
            SearchMethod::Exhaustive { step } => ctx.exhaustive(space, step, evaluator)?,
            SearchMethod::MonteCarlo { samples } => ctx.monte_carlo(space, samples, evaluator)?,
            SearchMethod::Incremental {
                init_step,
                inc_step,
                min_step,
            } => ctx.incremental(space, init_step, inc_step, min_step, evaluator)?,
        }
    };

    match outcome.best() {
        Some((params, score)) => info!(
            evaluations = outcome.evaluations,
            rounds = outcome.rounds,
            best_score = score,
            best_params = %format_vector(params),
            "search finished"
        ),
        None => info!(evaluations = outcome.evaluations, "search finished with no results"),
    }
    Ok(outcome)
}

struct SearchContext<'a> {
    harness: Harness,
    rng: RngHierarchy,
    options: &'a SearchOptions,
    progress: Option<&'a dyn Fn(&SearchProgress)>,
}

impl SearchContext<'_> {
    fn pool(&self) -> ResultPool<ParamVector> {
        ResultPool::new(self.options.output_count)
    }

    fn tracker(&self, round: usize, total: usize) -> RoundTracker<'_> {
        RoundTracker::new(round, total, self.options.maximize, self.progress)
    }

    fn single_default<E: Evaluate + ?Sized>(
        &self,
        evaluator: &E,
    ) -> Result<SearchOutcome, SearchError> {
        debug!("space has no axes, evaluating default parameters once");
        let mut pool = self.pool();
        let mut tracker = self.tracker(0, 1);
        self.harness
            .run_round(std::iter::once(Vec::new()), evaluator, &mut pool, &mut tracker)?;
        pool.cut(self.options.maximize);
        let mut outcome = SearchOutcome::from_pool(pool, self.options.maximize);
        outcome.evaluations = tracker.completed();
        outcome.rounds = 1;
        Ok(outcome)
    }

    fn exhaustive<E: Evaluate + ?Sized>(
        &self,
        space: &Space,
        step: f64,
        evaluator: &E,
    ) -> Result<SearchOutcome, SearchError> {
        let mut rng = self.rng.rng_for(&self.options.run_id, "exhaustive", 0);
        let candidates = space.extract(&[step], Extraction::Interval, &mut rng)?;
        let total = candidates.total();
        info!(step, total, "exhaustive grid extracted");

        let mut pool = self.pool();
        let mut tracker = self.tracker(0, total);
        self.harness
            .run_round(candidates, evaluator, &mut pool, &mut tracker)?;
        pool.cut(self.options.maximize);

        let mut outcome = SearchOutcome::from_pool(pool, self.options.maximize);
        outcome.evaluations = tracker.completed();
        outcome.rounds = 1;
        outcome.steps = vec![step];
        Ok(outcome)
    }

    fn monte_carlo<E: Evaluate + ?Sized>(
        &self,
        space: &Space,
        samples: usize,
        evaluator: &E,
    ) -> Result<SearchOutcome, SearchError> {
        // Sampling happens on the driver, so results do not depend on the
        // number of workers.
        let mut rng = self.rng.rng_for(&self.options.run_id, "monte_carlo", 0);
        let candidates = space.extract(&[samples as f64], Extraction::Random, &mut rng)?;
        let total = candidates.total();
        info!(samples, "monte carlo samples drawn");

        let mut pool = self.pool();
        let mut tracker = self.tracker(0, total);
        self.harness
            .run_round(candidates, evaluator, &mut pool, &mut tracker)?;
        pool.cut(self.options.maximize);

        let mut outcome = SearchOutcome::from_pool(pool, self.options.maximize);
        outcome.evaluations = tracker.completed();
        outcome.rounds = 1;
        Ok(outcome)
    }

    /// Coarse-to-fine refinement.
    ///
    /// The pool persists across rounds, so a point found early survives as
    /// long as nothing better replaces it. Sub-spaces are always derived from
    /// the base space and may overlap; overlapping points are evaluated once
    /// per sub-space.
    fn incremental<E: Evaluate + ?Sized>(
        &self,
        space: &Space,
        init_step: f64,
        inc_step: f64,
        min_step: f64,
        evaluator: &E,
    ) -> Result<SearchOutcome, SearchError> {
        let maximize = self.options.maximize;
        let mut pool = self.pool();
        let mut subspaces = vec![space.clone()];
        let mut steps = Vec::new();
        let mut evaluations = 0usize;
        let mut step = init_step;

        while step > min_step {
            let round = steps.len();
            let mut rng = self
                .rng
                .rng_for(&self.options.run_id, "incremental", round as u64);
            let mut grids = Vec::with_capacity(subspaces.len());
            let mut total = 0usize;
            for sub in &subspaces {
                let grid = sub.extract(&[step], Extraction::Interval, &mut rng)?;
                total = total
                    .checked_add(grid.total())
                    .ok_or(SpaceError::TooManyCandidates)?;
                grids.push(grid);
            }
            info!(
                round,
                step,
                subspaces = subspaces.len(),
                total,
                "incremental round started"
            );

            let track_overlap = subspaces.len() > 1 && tracing::enabled!(Level::DEBUG);
            let mut seen: HashSet<String> = HashSet::new();
            let mut repeated = 0usize;
            let candidates = grids.into_iter().flatten().inspect(|p| {
                if track_overlap && !seen.insert(format_vector(p)) {
                    repeated += 1;
                }
            });

            let mut tracker = self.tracker(round, total);
            self.harness
                .run_round(candidates, evaluator, &mut pool, &mut tracker)?;
            evaluations += tracker.completed();
            if repeated > 0 {
                debug!(round, repeated, "overlapping sub-spaces re-evaluated points");
            }

            pool.cut(maximize);
            steps.push(step);
            subspaces = pool
                .items()
                .iter()
                .map(|point| space.from_point(point, &[step], true))
                .collect::<Result<Vec<_>, _>>()?;
            step /= inc_step;
        }

        let mut outcome = SearchOutcome::from_pool(pool, maximize);
        outcome.evaluations = evaluations;
        outcome.rounds = steps.len();
        outcome.steps = steps;
        Ok(outcome)
    }
}

/// Compact rendering of a vector for log lines, e.g. `(3, 0.5, fast)`.
pub fn format_vector(params: &[ParamValue]) -> String {
    let parts: Vec<String> = params.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}

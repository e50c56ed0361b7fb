//! Parallel evaluation harness.
//!
//! The search driver owns the candidate sequence and the result pool. The
//! harness pulls candidates in batches, fans each batch out to a fixed
//! rayon pool, and feeds completions back to the driver over an mpsc
//! channel in whatever order they finish. A round ends only when every
//! dispatched evaluation has reported; the first failure fails the round
//! once the in-flight batch has drained.

use std::sync::mpsc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use optlab_core::{ParamVector, ResultPool};

use crate::evaluate::{EvalError, Evaluate};
use crate::progress::{progress_bar, SearchProgress};
use crate::search::SearchError;

const BAR_WIDTH: usize = 30;

/// Threading and batching knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessOptions {
    pub parallel: bool,
    /// Worker count; 0 lets rayon decide.
    pub threads: usize,
    /// Candidates dispatched per batch.
    pub batch_size: usize,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            threads: 0,
            batch_size: 1024,
        }
    }
}

/// Dispatches evaluations, sequentially or over a dedicated thread pool.
pub struct Harness {
    options: HarnessOptions,
    workers: Option<rayon::ThreadPool>,
}

impl Harness {
    pub fn new(options: HarnessOptions) -> Result<Self, SearchError> {
        let workers = if options.parallel {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(options.threads)
                .thread_name(|i| format!("optlab-eval-{i}"))
                .build()
                .map_err(|e| SearchError::ThreadPool(e.to_string()))?;
            debug!(threads = pool.current_num_threads(), "evaluation pool ready");
            Some(pool)
        } else {
            None
        };
        Ok(Self { options, workers })
    }

    pub fn sequential() -> Self {
        Self {
            options: HarnessOptions {
                parallel: false,
                ..HarnessOptions::default()
            },
            workers: None,
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.workers.is_some()
    }

    /// Number of threads evaluating candidates.
    pub fn threads(&self) -> usize {
        self.workers.as_ref().map_or(1, |w| w.current_num_threads())
    }

    /// Evaluate every candidate and push each `(vector, score)` into `results`.
    ///
    /// `results` is compacted with a cut whenever it grows well past its
    /// capacity, which keeps memory bounded without changing which entries
    /// survive the final cut.
    pub fn run_round<E, I>(
        &self,
        candidates: I,
        evaluator: &E,
        results: &mut ResultPool<ParamVector>,
        tracker: &mut RoundTracker<'_>,
    ) -> Result<(), EvalError>
    where
        E: Evaluate + ?Sized,
        I: Iterator<Item = ParamVector>,
    {
        match &self.workers {
            Some(workers) => self.run_parallel(workers, candidates, evaluator, results, tracker),
            None => {
                for params in candidates {
                    let score = evaluator.evaluate(&params)?;
                    tracker.record(score);
                    results.in_pool(params, score);
                    compact(results, tracker.maximize);
                }
                Ok(())
            }
        }
    }

    fn run_parallel<E, I>(
        &self,
        workers: &rayon::ThreadPool,
        mut candidates: I,
        evaluator: &E,
        results: &mut ResultPool<ParamVector>,
        tracker: &mut RoundTracker<'_>,
    ) -> Result<(), EvalError>
    where
        E: Evaluate + ?Sized,
        I: Iterator<Item = ParamVector>,
    {
        let batch_size = self.options.batch_size.max(1);
        loop {
            let batch: Vec<ParamVector> = candidates.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                return Ok(());
            }
            let mut first_error = None;
            let (tx, rx) = mpsc::channel::<(ParamVector, Result<f64, EvalError>)>();

            workers.in_place_scope(|scope| {
                for params in batch {
                    let tx = tx.clone();
                    scope.spawn(move |_| {
                        let score = evaluator.evaluate(&params);
                        // The driver drains until every sender is gone.
                        let _ = tx.send((params, score));
                    });
                }
                drop(tx);
                for (params, score) in rx {
                    match score {
                        Ok(score) => {
                            tracker.record(score);
                            results.in_pool(params, score);
                        }
                        Err(e) => {
                            first_error.get_or_insert(e);
                        }
                    }
                }
            });

            if let Some(e) = first_error {
                return Err(e);
            }
            compact(results, tracker.maximize);
        }
    }
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("options", &self.options)
            .field("threads", &self.threads())
            .finish()
    }
}

fn compact(results: &mut ResultPool<ParamVector>, maximize: bool) {
    if results.len() >= results.capacity().saturating_mul(2).max(4096) {
        results.cut(maximize);
    }
}

/// Per-round completion counter that logs and reports progress.
pub struct RoundTracker<'a> {
    round: usize,
    total: usize,
    completed: usize,
    best: Option<f64>,
    maximize: bool,
    log_every: usize,
    callback: Option<&'a dyn Fn(&SearchProgress)>,
}

impl<'a> RoundTracker<'a> {
    pub fn new(
        round: usize,
        total: usize,
        maximize: bool,
        callback: Option<&'a dyn Fn(&SearchProgress)>,
    ) -> Self {
        Self {
            round,
            total,
            completed: 0,
            best: None,
            maximize,
            log_every: (total / 10).max(1),
            callback,
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn snapshot(&self) -> SearchProgress {
        SearchProgress {
            round: self.round,
            completed: self.completed,
            total: self.total,
            best_score: self.best,
        }
    }

    fn record(&mut self, score: f64) {
        self.completed += 1;
        if score.is_finite() {
            let better = match self.best {
                None => true,
                Some(b) if self.maximize => score > b,
                Some(b) => score < b,
            };
            if better {
                self.best = Some(score);
            }
        }
        if self.completed % self.log_every == 0 || self.completed == self.total {
            let progress = self.snapshot();
            info!(
                round = self.round,
                completed = self.completed,
                total = self.total,
                best = ?self.best,
                "{}",
                progress_bar(progress.fraction(), BAR_WIDTH)
            );
            if let Some(cb) = self.callback {
                cb(&progress);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optlab_core::ParamValue;
    use std::cell::RefCell;

    fn points(n: i64) -> impl Iterator<Item = ParamVector> {
        (0..n).map(|i| vec![ParamValue::Int(i)])
    }

    fn square(p: &[ParamValue]) -> Result<f64, EvalError> {
        let x = p[0].as_f64().unwrap_or(0.0);
        Ok(x * x)
    }

    #[test]
    fn sequential_round_pushes_every_candidate() {
        let harness = Harness::sequential();
        let mut pool = ResultPool::new(100);
        let mut tracker = RoundTracker::new(0, 10, true, None);
        harness
            .run_round(points(10), &square, &mut pool, &mut tracker)
            .unwrap();
        assert_eq!(pool.len(), 10);
        assert_eq!(tracker.completed(), 10);
        assert_eq!(tracker.best(), Some(81.0));
    }

    #[test]
    fn parallel_round_matches_sequential() {
        let options = HarnessOptions {
            parallel: true,
            threads: 4,
            batch_size: 7,
        };
        let harness = Harness::new(options).unwrap();
        assert!(harness.is_parallel());
        assert_eq!(harness.threads(), 4);

        let mut par = ResultPool::new(5);
        let mut tracker = RoundTracker::new(0, 50, true, None);
        harness
            .run_round(points(50), &square, &mut par, &mut tracker)
            .unwrap();
        par.cut(true);

        let mut seq = ResultPool::new(5);
        let mut tracker = RoundTracker::new(0, 50, true, None);
        Harness::sequential()
            .run_round(points(50), &square, &mut seq, &mut tracker)
            .unwrap();
        seq.cut(true);

        assert_eq!(par.items(), seq.items());
        assert_eq!(par.scores(), seq.scores());
    }

    #[test]
    fn failure_aborts_round() {
        let fail_on_three = |p: &[ParamValue]| -> Result<f64, EvalError> {
            if p[0] == ParamValue::Int(3) {
                Err(EvalError::Failed("boom".into()))
            } else {
                Ok(0.0)
            }
        };
        for harness in [
            Harness::sequential(),
            Harness::new(HarnessOptions {
                parallel: true,
                threads: 2,
                batch_size: 4,
            })
            .unwrap(),
        ] {
            let mut pool = ResultPool::new(10);
            let mut tracker = RoundTracker::new(0, 10, true, None);
            let err = harness
                .run_round(points(10), &fail_on_three, &mut pool, &mut tracker)
                .unwrap_err();
            assert_eq!(err, EvalError::Failed("boom".into()));
            // Later batches are never dispatched.
            assert!(tracker.completed() < 10);
        }
    }

    #[test]
    fn tracker_reports_every_tenth() {
        let seen = RefCell::new(Vec::new());
        let cb = |p: &SearchProgress| seen.borrow_mut().push(p.completed);
        let mut tracker = RoundTracker::new(2, 20, false, Some(&cb));
        for i in 0..20 {
            tracker.record(20.0 - i as f64);
        }
        assert_eq!(*seen.borrow(), vec![2, 4, 6, 8, 10, 12, 14, 16, 18, 20]);
        assert_eq!(tracker.best(), Some(1.0));
        assert_eq!(tracker.snapshot().round, 2);
    }

    #[test]
    fn nan_scores_never_become_best() {
        let mut tracker = RoundTracker::new(0, 3, true, None);
        tracker.record(f64::NAN);
        assert_eq!(tracker.best(), None);
        tracker.record(1.0);
        tracker.record(f64::NEG_INFINITY);
        assert_eq!(tracker.best(), Some(1.0));
    }
}

//! Random swapping optimizer.
//!
//! Each iteration exchanges the values of one targeted column between two
//! distinct random rows. A swap is kept only if the candidate satisfies every
//! compiled condition and strictly lowers the criterion. The targeted column
//! stays put after a successful swap and is redrawn at random after a failed
//! one. The search stops when any configured limit is reached.

use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use nalgebra::DMatrix;
use rand::seq::index;
use rand::Rng;
use serde::Serialize;

use crate::conditions::ConditionSet;
use crate::criterion::DesignCriterion;
use crate::error::{DesignError, Result};

/// Minimum spacing between progress reports.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Stopping rules and reporting for a swap search. `None` means unbounded.
#[derive(Clone, Debug, Default)]
pub struct SwapOptions {
    /// Maximum number of iterations.
    pub iteration_limit: Option<usize>,
    /// Maximum number of consecutive iterations without improvement.
    pub no_improvement_limit: Option<usize>,
    /// Maximum wall-clock time.
    pub time_limit: Option<Duration>,
    /// Emit rate-limited progress at `info` level.
    pub report_progress: bool,
}

impl SwapOptions {
    /// Overrides the iteration limit.
    pub fn with_iteration_limit(mut self, limit: usize) -> Self {
        self.iteration_limit = Some(limit);
        self
    }

    /// Overrides the no-improvement limit.
    pub fn with_no_improvement_limit(mut self, limit: usize) -> Self {
        self.no_improvement_limit = Some(limit);
        self
    }

    /// Overrides the time limit.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Enables or disables progress reporting.
    pub fn with_progress(mut self, report: bool) -> Self {
        self.report_progress = report;
        self
    }

    /// True when at least one limit is set.
    pub fn is_bounded(&self) -> bool {
        self.iteration_limit.is_some()
            || self.no_improvement_limit.is_some()
            || self.time_limit.is_some()
    }

    fn stop_reason(
        &self,
        iterations: usize,
        without_improvement: usize,
        elapsed: Duration,
    ) -> Option<StopReason> {
        if self.iteration_limit.is_some_and(|limit| iterations >= limit) {
            Some(StopReason::IterationLimit)
        } else if self
            .no_improvement_limit
            .is_some_and(|limit| without_improvement >= limit)
        {
            Some(StopReason::NoImprovementLimit)
        } else if self.time_limit.is_some_and(|limit| elapsed >= limit) {
            Some(StopReason::TimeLimit)
        } else {
            None
        }
    }
}

/// Why a search stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StopReason {
    IterationLimit,
    NoImprovementLimit,
    TimeLimit,
}

/// Outcome of a swap search.
#[derive(Clone, Debug)]
pub struct SwapSummary {
    /// Best design found.
    pub design: DMatrix<f64>,
    /// Criterion value of `design`; never above the initial score.
    pub score: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Swaps that were accepted.
    pub accepted_swaps: usize,
    /// Wall-clock time spent searching.
    pub elapsed: Duration,
    /// Limit that ended the search.
    pub stop_reason: StopReason,
}

/// Mutable state of one run; dropped when the run ends.
struct SearchState {
    design: DMatrix<f64>,
    score: f64,
    iterations: usize,
    without_improvement: usize,
    accepted_swaps: usize,
    column: usize,
    started: Instant,
    last_report: Instant,
}

/// Swapping optimizer over a criterion and a set of conditions.
pub struct SwapSearch<'a, C: ?Sized> {
    criterion: &'a C,
    conditions: &'a ConditionSet,
    options: SwapOptions,
}

impl<'a, C: DesignCriterion + ?Sized> SwapSearch<'a, C> {
    /// Prepares a search; nothing runs until [`run`](Self::run).
    pub fn new(criterion: &'a C, conditions: &'a ConditionSet, options: SwapOptions) -> Self {
        Self {
            criterion,
            conditions,
            options,
        }
    }

    /// Options the search was configured with.
    pub fn options(&self) -> &SwapOptions {
        &self.options
    }

    /// Refines `design`, whose criterion value is `initial_score`.
    pub fn run<R: Rng + ?Sized>(
        &self,
        design: DMatrix<f64>,
        initial_score: f64,
        rng: &mut R,
    ) -> Result<SwapSummary> {
        let (rows, columns) = design.shape();
        if rows < 2 {
            return Err(DesignError::dimension_mismatch("swap rows", 2, rows));
        }
        if columns == 0 {
            return Err(DesignError::dimension_mismatch("swap columns", 1, 0));
        }
        if !self.options.is_bounded() {
            warn!("swap search started without any stopping limit; it will not terminate");
        }

        let started = Instant::now();
        let mut state = SearchState {
            design,
            score: initial_score,
            iterations: 0,
            without_improvement: 0,
            accepted_swaps: 0,
            column: rng.gen_range(0..columns),
            started,
            last_report: started,
        };
        debug!("swap search starting from score {initial_score:.6}");

        let stop_reason = loop {
            let elapsed = state.started.elapsed();
            if let Some(reason) =
                self.options
                    .stop_reason(state.iterations, state.without_improvement, elapsed)
            {
                break reason;
            }

            let pair = index::sample(rng, rows, 2);
            let (first, second) = (pair.index(0), pair.index(1));
            let candidate = self.candidate(&state, first, second)?;

            match candidate {
                Some((design, score)) if score < state.score => {
                    trace!(
                        "swap rows {first}/{second} in column {} improved {:.6} -> {score:.6}",
                        state.column,
                        state.score
                    );
                    state.design = design;
                    state.score = score;
                    state.without_improvement = 0;
                    state.accepted_swaps += 1;
                }
                _ => {
                    state.without_improvement += 1;
                    state.column = rng.gen_range(0..columns);
                }
            }

            state.iterations += 1;
            self.report(&mut state);
        };

        let elapsed = state.started.elapsed();
        debug!(
            "swap search stopped ({stop_reason:?}) after {} iterations, score {:.6}",
            state.iterations, state.score
        );

        Ok(SwapSummary {
            design: state.design,
            score: state.score,
            iterations: state.iterations,
            accepted_swaps: state.accepted_swaps,
            elapsed,
            stop_reason,
        })
    }

    /// Builds and scores the swapped candidate, or `None` when the swap is a
    /// no-op or violates a condition.
    fn candidate(
        &self,
        state: &SearchState,
        first: usize,
        second: usize,
    ) -> Result<Option<(DMatrix<f64>, f64)>> {
        let column = state.column;
        if state.design[(first, column)] == state.design[(second, column)] {
            return Ok(None);
        }

        let mut candidate = state.design.clone();
        candidate.swap((first, column), (second, column));
        if !self.conditions.design_satisfied(&candidate) {
            return Ok(None);
        }

        let score = self.criterion.score(&candidate)?;
        Ok(Some((candidate, score)))
    }

    fn report(&self, state: &mut SearchState) {
        if !self.options.report_progress || state.last_report.elapsed() < PROGRESS_INTERVAL {
            return;
        }
        state.last_report = Instant::now();
        info!(
            "optimizing: elapsed {:.1}s, iteration {}, D-error {:.6}",
            state.started.elapsed().as_secs_f64(),
            state.iterations,
            state.score
        );
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;
    use crate::attributes::{Attribute, DesignLayout};
    use crate::generation::initial_design;
    use crate::model::MnlModel;

    fn model() -> MnlModel {
        let attributes = vec![
            Attribute::numeric("price", vec![1.0, 2.0, 3.0], -0.4),
            Attribute::dummy("comfort", Attribute::levels(3), vec![0.3, 0.6]),
        ];
        MnlModel::new(DesignLayout::new(attributes, 2).unwrap())
    }

    #[test]
    fn never_worsens_the_initial_design() {
        let model = model();
        let conditions = ConditionSet::default();
        let mut rng = SmallRng::seed_from_u64(21);
        let levels = model.layout().column_levels();
        let design = initial_design(&levels, 12, &conditions, &mut rng).unwrap();
        let initial = model.score(&design).unwrap();

        let options = SwapOptions::default().with_iteration_limit(300);
        let summary = SwapSearch::new(&model, &conditions, options)
            .run(design, initial, &mut rng)
            .unwrap();

        assert_eq!(summary.iterations, 300);
        assert_eq!(summary.stop_reason, StopReason::IterationLimit);
        assert!(summary.score <= initial);
        assert_eq!(model.score(&summary.design).unwrap(), summary.score);
    }

    #[test]
    fn zero_iteration_limit_returns_input() {
        let attributes = vec![
            Attribute::numeric("a", Attribute::levels(2), 0.5),
            Attribute::numeric("b", Attribute::levels(2), -0.5),
        ];
        let model = MnlModel::new(DesignLayout::new(attributes, 1).unwrap());
        let conditions = ConditionSet::default();
        let design = DMatrix::from_row_slice(4, 2, &[0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0]);
        let initial = model.score(&design).unwrap();

        let options = SwapOptions::default().with_iteration_limit(0);
        let mut rng = SmallRng::seed_from_u64(1);
        let summary = SwapSearch::new(&model, &conditions, options)
            .run(design.clone(), initial, &mut rng)
            .unwrap();

        assert_eq!(summary.iterations, 0);
        assert_eq!(summary.design, design);
        assert_eq!(summary.accepted_swaps, 0);
    }

    #[test]
    fn no_op_swaps_leave_state_untouched() {
        let model = model();
        let conditions = ConditionSet::default();
        // Every column is constant, so every swap is a no-op.
        let design = DMatrix::from_element(6, 4, 1.0);
        let initial = model.score(&design).unwrap();

        let options = SwapOptions::default().with_no_improvement_limit(25);
        let mut rng = SmallRng::seed_from_u64(9);
        let summary = SwapSearch::new(&model, &conditions, options)
            .run(design.clone(), initial, &mut rng)
            .unwrap();

        assert_eq!(summary.stop_reason, StopReason::NoImprovementLimit);
        assert_eq!(summary.iterations, 25);
        assert_eq!(summary.design, design);
        assert_eq!(summary.score, initial);
    }

    #[test]
    fn swaps_violating_conditions_are_rejected() {
        let model = model();
        let names = model.layout().column_names();
        let conditions = ConditionSet::compile(&["alt1_price >= alt2_price"], &names).unwrap();
        let mut rng = SmallRng::seed_from_u64(33);
        let levels = model.layout().column_levels();
        let design = initial_design(&levels, 9, &conditions, &mut rng).unwrap();
        let initial = model.score(&design).unwrap();

        let options = SwapOptions::default().with_iteration_limit(200);
        let summary = SwapSearch::new(&model, &conditions, options)
            .run(design, initial, &mut rng)
            .unwrap();

        assert!(conditions.design_satisfied(&summary.design));
        assert!(summary.score <= initial);
    }

    #[test]
    fn zero_time_limit_stops_immediately() {
        let model = model();
        let conditions = ConditionSet::default();
        let design = DMatrix::from_element(4, 4, 1.0);
        let options = SwapOptions::default().with_time_limit(Duration::ZERO);
        let mut rng = SmallRng::seed_from_u64(2);
        let summary = SwapSearch::new(&model, &conditions, options)
            .run(design, f64::INFINITY, &mut rng)
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::TimeLimit);
        assert_eq!(summary.iterations, 0);
    }

    /// Scores every design as degenerate.
    struct Degenerate;

    impl DesignCriterion for Degenerate {
        fn score(&self, _design: &DMatrix<f64>) -> Result<f64> {
            Ok(f64::INFINITY)
        }
    }

    /// Degenerate only at the starting design.
    struct DegenerateAt(DMatrix<f64>);

    impl DesignCriterion for DegenerateAt {
        fn score(&self, design: &DMatrix<f64>) -> Result<f64> {
            Ok(if *design == self.0 { f64::INFINITY } else { 1.0 })
        }
    }

    fn distinct_columns() -> DMatrix<f64> {
        DMatrix::from_row_slice(4, 2, &[0.0, 10.0, 1.0, 11.0, 2.0, 12.0, 3.0, 13.0])
    }

    #[test]
    fn infinite_candidates_count_as_non_improving() {
        let conditions = ConditionSet::default();
        let design = distinct_columns();
        let options = SwapOptions::default().with_no_improvement_limit(30);
        let mut rng = SmallRng::seed_from_u64(12);
        let summary = SwapSearch::new(&Degenerate, &conditions, options)
            .run(design.clone(), f64::INFINITY, &mut rng)
            .unwrap();

        assert_eq!(summary.stop_reason, StopReason::NoImprovementLimit);
        assert_eq!(summary.iterations, 30);
        assert_eq!(summary.accepted_swaps, 0);
        assert_eq!(summary.design, design);
        assert_eq!(summary.score, f64::INFINITY);
    }

    #[test]
    fn finite_candidate_replaces_infinite_start() {
        let conditions = ConditionSet::default();
        let design = distinct_columns();
        let criterion = DegenerateAt(design.clone());
        let options = SwapOptions::default().with_iteration_limit(10);
        let mut rng = SmallRng::seed_from_u64(12);
        let summary = SwapSearch::new(&criterion, &conditions, options)
            .run(design.clone(), f64::INFINITY, &mut rng)
            .unwrap();

        // Every swap changes a column with distinct values, so the first one
        // is accepted and no later candidate is strictly better.
        assert_eq!(summary.accepted_swaps, 1);
        assert_eq!(summary.score, 1.0);
        assert_ne!(summary.design, design);
        assert_eq!(summary.iterations, 10);
    }
}

//! Run configuration for [`RumDesign::optimise`](crate::RumDesign::optimise).

use std::time::Duration;

use crate::error::{DesignError, Result};
use crate::swapping::SwapOptions;

/// Number of random initial designs scored before the swap search starts.
pub const DEFAULT_INITIAL_CANDIDATES: usize = 10;

/// Conditions, blocking, stopping rules and reproducibility knobs for one run.
#[derive(Clone, Debug)]
pub struct DesignOptions {
    /// Row conditions every design must satisfy, e.g. `alt1_price > alt2_price`.
    pub conditions: Vec<String>,
    /// Number of blocks; must evenly divide the number of choice situations.
    pub n_blocks: Option<usize>,
    /// Maximum swap iterations.
    pub iteration_limit: Option<usize>,
    /// Maximum consecutive iterations without improvement.
    pub no_improvement_limit: Option<usize>,
    /// Maximum search time in minutes.
    pub time_limit_minutes: Option<f64>,
    /// Seed for the session random source; entropy when unset.
    pub seed: Option<u64>,
    /// Emit progress and a final summary through `log`.
    pub verbose: bool,
    /// Random initial designs generated; the best one seeds the search.
    pub initial_candidates: usize,
    /// Independent swap searches run from the initial design; the best result wins.
    pub independent_searches: usize,
}

impl Default for DesignOptions {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            n_blocks: None,
            iteration_limit: None,
            no_improvement_limit: None,
            time_limit_minutes: None,
            seed: None,
            verbose: false,
            initial_candidates: DEFAULT_INITIAL_CANDIDATES,
            independent_searches: 1,
        }
    }
}

impl DesignOptions {
    /// Adds a row condition.
    pub fn with_condition<S: Into<String>>(mut self, condition: S) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// Requests block assignment.
    pub fn with_blocks(mut self, blocks: usize) -> Self {
        self.n_blocks = Some(blocks);
        self
    }

    /// Bounds the number of swap iterations.
    pub fn with_iteration_limit(mut self, limit: usize) -> Self {
        self.iteration_limit = Some(limit);
        self
    }

    /// Bounds the number of consecutive non-improving iterations.
    pub fn with_no_improvement_limit(mut self, limit: usize) -> Self {
        self.no_improvement_limit = Some(limit);
        self
    }

    /// Bounds the search time in minutes.
    pub fn with_time_limit_minutes(mut self, minutes: f64) -> Self {
        self.time_limit_minutes = Some(minutes);
        self
    }

    /// Fixes the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Enables progress reporting.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sets how many random initial designs are compared.
    pub fn with_initial_candidates(mut self, candidates: usize) -> Self {
        self.initial_candidates = candidates;
        self
    }

    /// Sets how many independent searches are run.
    pub fn with_independent_searches(mut self, searches: usize) -> Self {
        self.independent_searches = searches;
        self
    }

    /// Checks values that do not depend on the layout.
    pub fn validate(&self) -> Result<()> {
        if self.initial_candidates == 0 {
            return Err(DesignError::invalid_option(
                "initial_candidates",
                "at least one initial design is required",
            ));
        }
        if self.independent_searches == 0 {
            return Err(DesignError::invalid_option(
                "independent_searches",
                "at least one search is required",
            ));
        }
        if let Some(minutes) = self.time_limit_minutes {
            if minutes_to_duration(minutes).is_none() {
                return Err(DesignError::invalid_option(
                    "time_limit_minutes",
                    format!("expected a non-negative, representable number of minutes, found {minutes}"),
                ));
            }
        }
        Ok(())
    }

    /// Stopping rules for the swap search.
    pub fn swap_options(&self) -> SwapOptions {
        SwapOptions {
            iteration_limit: self.iteration_limit,
            no_improvement_limit: self.no_improvement_limit,
            time_limit: self.time_limit_minutes.and_then(minutes_to_duration),
            report_progress: self.verbose,
        }
    }
}

fn minutes_to_duration(minutes: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(minutes * 60.0).ok()
}

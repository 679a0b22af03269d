//! Design session: initial design selection, swap search and post-processing.

use std::time::Duration;

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;

use crate::attributes::DesignLayout;
use crate::balance::utility_balance_of;
use crate::blocking::{assign_blocks, validate_blocks};
use crate::conditions::ConditionSet;
use crate::criterion::DesignCriterion;
use crate::error::{DesignError, Result};
use crate::generation::initial_design;
use crate::integration::{BayesianMnl, PriorDraws};
use crate::model::MnlModel;
use crate::options::DesignOptions;
use crate::swapping::{StopReason, SwapSearch};

/// Efficient design for a RUM (MNL) choice model.
#[derive(Clone, Debug)]
pub struct RumDesign {
    model: MnlModel,
    choice_situations: usize,
    uncertainty: Option<PriorUncertainty>,
}

#[derive(Clone, Debug)]
struct PriorUncertainty {
    std_devs: DVector<f64>,
    draws: usize,
}

impl RumDesign {
    /// Creates a session for `choice_situations` rows.
    pub fn new(layout: DesignLayout, choice_situations: usize) -> Result<Self> {
        if choice_situations < 2 {
            return Err(DesignError::dimension_mismatch(
                "choice situations",
                2,
                choice_situations,
            ));
        }
        Ok(Self {
            model: MnlModel::new(layout),
            choice_situations,
            uncertainty: None,
        })
    }

    /// Switches the criterion to the Bayesian D-error with independent normal
    /// priors centred on the declared values.
    pub fn with_prior_uncertainty(mut self, std_devs: Vec<f64>, draws: usize) -> Result<Self> {
        let expected = self.model.parameter_count();
        if std_devs.len() != expected {
            return Err(DesignError::dimension_mismatch(
                "prior standard deviations",
                expected,
                std_devs.len(),
            ));
        }
        if draws == 0 {
            return Err(DesignError::dimension_mismatch("prior draws", 1, 0));
        }
        self.uncertainty = Some(PriorUncertainty {
            std_devs: DVector::from_vec(std_devs),
            draws,
        });
        Ok(self)
    }

    /// Column and parameter layout.
    pub fn layout(&self) -> &DesignLayout {
        self.model.layout()
    }

    /// Model used for scoring and utility balance.
    pub fn model(&self) -> &MnlModel {
        &self.model
    }

    /// Number of choice situations (design rows).
    pub fn choice_situations(&self) -> usize {
        self.choice_situations
    }

    /// Runs the full pipeline: compile conditions, pick the best of several
    /// random initial designs, refine it by swapping, then number the choice
    /// situations and assign blocks.
    pub fn optimise(&self, options: &DesignOptions) -> Result<DesignResult> {
        options.validate()?;
        if let Some(blocks) = options.n_blocks {
            validate_blocks(blocks, self.choice_situations)?;
        }

        let names = self.layout().column_names();
        let conditions = ConditionSet::compile(&options.conditions, &names)?;
        let mut rng = match options.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        let bayesian;
        let criterion: &dyn DesignCriterion = match &self.uncertainty {
            None => &self.model,
            Some(uncertainty) => {
                let draws = PriorDraws::normal(
                    self.model.priors(),
                    &uncertainty.std_devs,
                    uncertainty.draws,
                    rng.gen(),
                )?;
                bayesian = BayesianMnl::new(self.model.clone(), draws)?;
                &bayesian
            }
        };

        debug!(
            "generating {} initial designs with {} conditions",
            options.initial_candidates,
            conditions.len()
        );
        let levels = self.layout().column_levels();
        let seeds: Vec<u64> = (0..options.initial_candidates).map(|_| rng.gen()).collect();
        let candidates = seeds
            .par_iter()
            .map(|seed| -> Result<(DMatrix<f64>, f64)> {
                let mut rng = SmallRng::seed_from_u64(*seed);
                let design =
                    initial_design(&levels, self.choice_situations, &conditions, &mut rng)?;
                let score = criterion.score(&design)?;
                Ok((design, score))
            })
            .collect::<Result<Vec<_>>>()?;
        let (initial, initial_score) = first_best(candidates, |(_, score)| *score)
            .ok_or_else(|| DesignError::invalid_option("initial_candidates", "no candidates"))?;
        debug!("initial design D-error {initial_score:.6}");

        let search = SwapSearch::new(criterion, &conditions, options.swap_options());
        let seeds: Vec<u64> = (0..options.independent_searches).map(|_| rng.gen()).collect();
        let summaries = seeds
            .par_iter()
            .map(|seed| {
                let mut rng = SmallRng::seed_from_u64(*seed);
                search.run(initial.clone(), initial_score, &mut rng)
            })
            .collect::<Result<Vec<_>>>()?;
        let best = first_best(summaries, |summary| summary.score).ok_or_else(|| {
            DesignError::invalid_option("independent_searches", "no searches were run")
        })?;

        let utility_balance = utility_balance_of(&self.model, &best.design)?;

        let blocks = match options.n_blocks {
            Some(blocks) => Some(assign_blocks(self.choice_situations, blocks, &mut rng)?),
            None => None,
        };
        let table = DesignTable::new(&names, &best.design, blocks.as_deref());

        let result = DesignResult {
            table,
            design: best.design,
            initial_d_error: initial_score,
            final_d_error: best.score,
            iterations: best.iterations,
            accepted_swaps: best.accepted_swaps,
            elapsed: best.elapsed,
            stop_reason: best.stop_reason,
            utility_balance,
        };
        if options.verbose {
            result.log_summary();
        }
        Ok(result)
    }
}

/// First element with the strictly lowest score; NaN ranks last.
fn first_best<T, F: Fn(&T) -> f64>(items: Vec<T>, score: F) -> Option<T> {
    let rank = |value: f64| if value.is_nan() { f64::INFINITY } else { value };
    let mut best: Option<(T, f64)> = None;
    for item in items {
        let value = rank(score(&item));
        if best.as_ref().map_or(true, |(_, current)| value < *current) {
            best = Some((item, value));
        }
    }
    best.map(|(item, _)| item)
}

/// Tabular design: `CS`, one column per design column, and optionally `Block`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DesignTable {
    columns: Vec<String>,
    values: DMatrix<f64>,
}

impl DesignTable {
    fn new(names: &[String], design: &DMatrix<f64>, blocks: Option<&[usize]>) -> Self {
        let rows = design.nrows();
        let extra = usize::from(blocks.is_some());
        let mut columns = Vec::with_capacity(names.len() + 1 + extra);
        columns.push("CS".to_string());
        columns.extend(names.iter().cloned());

        let mut values = DMatrix::zeros(rows, design.ncols() + 1 + extra);
        for row in 0..rows {
            values[(row, 0)] = (row + 1) as f64;
        }
        values.columns_mut(1, design.ncols()).copy_from(design);
        if let Some(blocks) = blocks {
            columns.push("Block".to_string());
            let last = values.ncols() - 1;
            for (row, block) in blocks.iter().enumerate() {
                values[(row, last)] = *block as f64;
            }
        }

        Self { columns, values }
    }

    /// Column headers.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Table body, one row per choice situation.
    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// Number of choice situations.
    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    /// Values of the named column.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.values.column(index).iter().copied().collect())
    }
}

/// Outcome of [`RumDesign::optimise`].
#[derive(Clone, Debug, Serialize)]
pub struct DesignResult {
    /// Final design with choice-situation numbers and optional blocks.
    pub table: DesignTable,
    /// Final design matrix without the bookkeeping columns.
    pub design: DMatrix<f64>,
    /// Criterion value of the best initial design.
    pub initial_d_error: f64,
    /// Criterion value of the returned design.
    pub final_d_error: f64,
    /// Swap iterations performed by the winning search.
    pub iterations: usize,
    /// Swaps accepted by the winning search.
    pub accepted_swaps: usize,
    /// Search time of the winning search.
    pub elapsed: Duration,
    /// Limit that ended the winning search.
    pub stop_reason: StopReason,
    /// Utility-balance ratio of the returned design, in percent.
    pub utility_balance: f64,
}

impl DesignResult {
    /// Search time in seconds.
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    fn log_summary(&self) {
        info!("optimization complete ({:?})", self.stop_reason);
        info!("elapsed time: {:.1}s", self.elapsed_seconds());
        info!("D-error of initial design: {:.6}", self.initial_d_error);
        info!("D-error of last stored design: {:.6}", self.final_d_error);
        info!("utility balance ratio: {:.2}%", self.utility_balance);
        info!("algorithm iterations: {}", self.iterations);
    }
}

//! Monte Carlo integration over uncertain priors (Bayesian D-error).

use nalgebra::{DMatrix, DVector};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use crate::criterion::{d_error_from_information, DesignCriterion};
use crate::error::{DesignError, Result};
use crate::model::MnlModel;

/// Parameter vectors drawn from the prior distribution, one per row.
#[derive(Clone, Debug)]
pub struct PriorDraws {
    draws: DMatrix<f64>,
    weights: DVector<f64>,
}

impl PriorDraws {
    /// Wraps explicit parameter draws (one per row) and their quadrature
    /// weights, which must be positive and sum to one.
    pub fn new(draws: DMatrix<f64>, weights: DVector<f64>) -> Result<Self> {
        match (draws.nrows(), weights.len()) {
            (0, _) => return Err(DesignError::dimension_mismatch("prior draws", 1, 0)),
            (rows, len) if rows != len => {
                return Err(DesignError::dimension_mismatch("prior weights", rows, len));
            }
            _ => {}
        }
        if let Some(weight) = weights.iter().find(|weight| weight.is_nan() || **weight <= 0.0) {
            return Err(DesignError::InvalidWeights { slack: *weight });
        }
        let slack = (weights.sum() - 1.0).abs();
        if slack > 1e-8 {
            return Err(DesignError::InvalidWeights { slack });
        }
        if !draws.iter().all(|value| value.is_finite()) {
            return Err(DesignError::NumericalError {
                context: "prior draws",
            });
        }

        Ok(Self { draws, weights })
    }

    /// Independent normal draws around `means` with uniform weights.
    ///
    /// A zero standard deviation keeps that parameter fixed at its mean.
    pub fn normal(
        means: &DVector<f64>,
        std_devs: &DVector<f64>,
        draws: usize,
        seed: u64,
    ) -> Result<Self> {
        if draws == 0 {
            return Err(DesignError::dimension_mismatch("prior draws", 1, 0));
        }
        if means.len() != std_devs.len() {
            return Err(DesignError::dimension_mismatch(
                "prior standard deviations",
                means.len(),
                std_devs.len(),
            ));
        }
        if std_devs.iter().any(|sd| !sd.is_finite() || *sd < 0.0) {
            return Err(DesignError::invalid_option(
                "prior standard deviations",
                "must be finite and non-negative",
            ));
        }

        let mut rng = SmallRng::seed_from_u64(seed);
        let dimension = means.len();
        let matrix = DMatrix::from_fn(draws, dimension, |_, k| {
            let z: f64 = StandardNormal.sample(&mut rng);
            means[k] + std_devs[k] * z
        });
        let weights = DVector::from_element(draws, 1.0 / draws as f64);
        Self::new(matrix, weights)
    }

    /// Number of Monte Carlo draws.
    pub fn draw_count(&self) -> usize {
        self.draws.nrows()
    }

    /// Length of each parameter vector.
    pub fn dimension(&self) -> usize {
        self.draws.ncols()
    }

    /// Returns a view of the draw matrix.
    pub fn draws(&self) -> &DMatrix<f64> {
        &self.draws
    }

    /// Returns the associated integration weights (normalized to sum to one).
    pub fn weights(&self) -> &DVector<f64> {
        &self.weights
    }
}

/// MNL model scored by the expected D-error over prior draws.
#[derive(Clone, Debug)]
pub struct BayesianMnl {
    model: MnlModel,
    draws: PriorDraws,
}

impl BayesianMnl {
    /// Pairs a model with draws of its parameter vector.
    pub fn new(model: MnlModel, draws: PriorDraws) -> Result<Self> {
        if draws.dimension() != model.parameter_count() {
            return Err(DesignError::dimension_mismatch(
                "prior draw dimension",
                model.parameter_count(),
                draws.dimension(),
            ));
        }
        Ok(Self { model, draws })
    }

    /// Underlying MNL model.
    pub fn model(&self) -> &MnlModel {
        &self.model
    }

    /// Prior draws being integrated over.
    pub fn draws(&self) -> &PriorDraws {
        &self.draws
    }
}

impl DesignCriterion for BayesianMnl {
    fn score(&self, design: &DMatrix<f64>) -> Result<f64> {
        let marginalized = self.model.layout().asc_count();
        let mut expected = 0.0;
        for (draw, weight) in self.draws.draws.row_iter().zip(self.draws.weights.iter()) {
            let parameters = draw.transpose();
            let information = self.model.information_at(design, &parameters)?;
            let local = d_error_from_information(&information, marginalized);
            if local.is_infinite() {
                return Ok(f64::INFINITY);
            }
            expected += weight * local;
        }
        Ok(expected)
    }
}

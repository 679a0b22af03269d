//! Multinomial logit evaluator: coding, choice probabilities and the Fisher information matrix.

use nalgebra::{DMatrix, DVector};

use crate::attributes::{Coding, ColumnKind, DesignLayout};
use crate::criterion::{d_error, DesignCriterion, ModelEvaluator};
use crate::error::{DesignError, Result};

/// MNL model whose utilities share one parameter vector across alternatives.
#[derive(Clone, Debug)]
pub struct MnlModel {
    layout: DesignLayout,
}

impl MnlModel {
    /// Wraps a validated layout.
    pub fn new(layout: DesignLayout) -> Self {
        Self { layout }
    }

    /// Layout the model was built from.
    pub fn layout(&self) -> &DesignLayout {
        &self.layout
    }

    /// Prior parameter vector, ASCs first.
    pub fn priors(&self) -> &DVector<f64> {
        self.layout.priors()
    }

    /// Number of parameters.
    pub fn parameter_count(&self) -> usize {
        self.layout.parameter_count()
    }

    /// Codes a design into a `(rows * alternatives) x parameters` matrix.
    ///
    /// Row `s * J + j` holds the regressors of alternative `j` in choice
    /// situation `s`. Dummy-coded columns expand into one indicator per
    /// non-baseline level; the opt-out rows only carry ASC indicators.
    pub fn coded_design(&self, design: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let columns = self.layout.columns();
        if design.ncols() != columns.len() {
            return Err(DesignError::dimension_mismatch(
                "design columns",
                columns.len(),
                design.ncols(),
            ));
        }

        let alternatives = self.layout.total_alternatives();
        let mut coded = DMatrix::zeros(design.nrows() * alternatives, self.parameter_count());

        for situation in 0..design.nrows() {
            for (index, column) in columns.iter().enumerate() {
                let value = design[(situation, index)];
                let row = situation * alternatives + column.alternative();
                match (column.kind(), column.coding()) {
                    (ColumnKind::Asc { .. }, _) | (_, Coding::Numeric) => {
                        coded[(row, column.offset())] = value;
                    }
                    (ColumnKind::Attribute { .. }, Coding::Dummy) => {
                        for (contrast, level) in column.levels().iter().skip(1).enumerate() {
                            if value == *level {
                                coded[(row, column.offset() + contrast)] = 1.0;
                            }
                        }
                    }
                }
            }
        }

        Ok(coded)
    }

    /// Choice probabilities at an arbitrary parameter vector.
    pub fn probabilities_at(
        &self,
        design: &DMatrix<f64>,
        parameters: &DVector<f64>,
    ) -> Result<DMatrix<f64>> {
        let coded = self.coded_design(design)?;
        self.probabilities_from_coded(&coded, design.nrows(), parameters)
    }

    /// Information matrix at an arbitrary parameter vector.
    ///
    /// Sums `X_s' diag(p_s) X_s - (X_s' p_s)(X_s' p_s)'` over choice situations.
    pub fn information_at(
        &self,
        design: &DMatrix<f64>,
        parameters: &DVector<f64>,
    ) -> Result<DMatrix<f64>> {
        let coded = self.coded_design(design)?;
        let probabilities = self.probabilities_from_coded(&coded, design.nrows(), parameters)?;
        let alternatives = self.layout.total_alternatives();
        let k = self.parameter_count();
        let mut information = DMatrix::zeros(k, k);

        for situation in 0..design.nrows() {
            let block = coded.rows(situation * alternatives, alternatives);
            let p = probabilities.row(situation).transpose();

            let mut weighted = block.transpose();
            for (alternative, mut column) in weighted.column_iter_mut().enumerate() {
                column *= p[alternative];
            }
            information += &weighted * &block;

            let mean = block.transpose() * &p;
            information -= &mean * mean.transpose();
        }

        Ok(information)
    }

    fn probabilities_from_coded(
        &self,
        coded: &DMatrix<f64>,
        rows: usize,
        parameters: &DVector<f64>,
    ) -> Result<DMatrix<f64>> {
        if parameters.len() != self.parameter_count() {
            return Err(DesignError::dimension_mismatch(
                "parameter vector",
                self.parameter_count(),
                parameters.len(),
            ));
        }

        let alternatives = self.layout.total_alternatives();
        let utilities = coded * parameters;
        let mut probabilities = DMatrix::zeros(rows, alternatives);

        for situation in 0..rows {
            let block = utilities.rows(situation * alternatives, alternatives);
            // Shift by the maximum so the exponentials cannot overflow.
            let max = block.max();
            let mut denominator = 0.0_f64;
            for alternative in 0..alternatives {
                let exp_u = (block[alternative] - max).exp();
                probabilities[(situation, alternative)] = exp_u;
                denominator += exp_u;
            }
            for alternative in 0..alternatives {
                probabilities[(situation, alternative)] /= denominator;
            }
        }

        Ok(probabilities)
    }
}

impl ModelEvaluator for MnlModel {
    fn information_matrix(&self, design: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.information_at(design, self.priors())
    }

    fn choice_probabilities(&self, design: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.probabilities_at(design, self.priors())
    }

    fn marginalized_parameters(&self) -> usize {
        self.layout.asc_count()
    }
}

impl DesignCriterion for MnlModel {
    fn score(&self, design: &DMatrix<f64>) -> Result<f64> {
        d_error(self, design)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::attributes::{Asc, Attribute, DesignLayoutBuilder};

    fn single_attribute_model() -> MnlModel {
        let attributes = vec![Attribute::numeric("x", Attribute::levels(3), 0.0)];
        MnlModel::new(DesignLayout::new(attributes, 2).unwrap())
    }

    #[test]
    fn closed_form_two_alternative_information() {
        let model = single_attribute_model();
        // With beta = 0 each situation contributes (x1 - x2)^2 / 4.
        let design = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
        let information = model.information_matrix(&design).unwrap();
        assert_relative_eq!(information[(0, 0)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(model.score(&design).unwrap(), 2.0, epsilon = 1e-12);

        let flat = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 2.0, 2.0]);
        assert_eq!(model.score(&flat).unwrap(), f64::INFINITY);
    }

    #[test]
    fn asc_parameters_are_marginalized() {
        let attributes = vec![Attribute::numeric("x", Attribute::levels(3), 0.0)];
        let layout = DesignLayoutBuilder::new(attributes, 2)
            .asc(Asc::new(1, 0.0))
            .build()
            .unwrap();
        let model = MnlModel::new(layout);
        // Columns: alt1_asc1, alt1_x, alt2_asc1, alt2_x.
        let design = DMatrix::from_row_slice(2, 4, &[1.0, 1.0, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0]);
        let information = model.information_matrix(&design).unwrap();
        let expected = DMatrix::from_row_slice(2, 2, &[0.5, 0.75, 0.75, 1.25]);
        assert_relative_eq!(information, expected, epsilon = 1e-12);
        assert_relative_eq!(model.score(&design).unwrap(), 8.0, epsilon = 1e-9);
    }

    #[test]
    fn rescaled_levels_give_rescaled_d_error() {
        use rand::rngs::SmallRng;
        use rand::SeedableRng;

        use crate::conditions::ConditionSet;
        use crate::generation::initial_design;

        let build = |scale: f64| {
            let levels: Vec<f64> = [1.0, 2.0, 3.0].iter().map(|l| l * scale).collect();
            let attributes = vec![
                Attribute::numeric("risk", levels.clone(), 0.3 / scale),
                Attribute::numeric("delay", levels.clone(), -0.3 / scale),
                Attribute::numeric("cost", levels, 0.15 / scale),
            ];
            MnlModel::new(DesignLayout::new(attributes, 2).unwrap())
        };
        let model = build(1.0);
        let scaled_model = build(0.001);

        let mut rng = SmallRng::seed_from_u64(5);
        let levels = model.layout().column_levels();
        let design = initial_design(&levels, 12, &ConditionSet::default(), &mut rng).unwrap();
        let scaled_design = &design * 0.001;

        let score = model.score(&design).unwrap();
        let scaled_score = scaled_model.score(&scaled_design).unwrap();
        assert!(score.is_finite());
        // Information shrinks by 1e-6, so each variance grows by 1e6.
        assert_relative_eq!(scaled_score, score * 1e6, max_relative = 1e-6);
    }

    #[test]
    fn dummy_coding_uses_first_level_as_baseline() {
        let attributes = vec![Attribute::dummy("c", vec![10.0, 20.0, 30.0], vec![0.5, 1.0])];
        let model = MnlModel::new(DesignLayout::new(attributes, 2).unwrap());
        let design = DMatrix::from_row_slice(1, 2, &[30.0, 10.0]);
        let coded = model.coded_design(&design).unwrap();
        let expected = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(coded, expected);

        let probabilities = model.choice_probabilities(&design).unwrap();
        let e = 1.0_f64.exp();
        assert_relative_eq!(probabilities[(0, 0)], e / (e + 1.0), epsilon = 1e-12);
    }

    #[test]
    fn optout_rows_carry_only_constants() {
        let attributes = vec![Attribute::numeric("x", Attribute::levels(2), 1.0)];
        let layout = DesignLayoutBuilder::new(attributes, 1)
            .optout(true)
            .asc(Asc::new(2, 0.5))
            .build()
            .unwrap();
        let model = MnlModel::new(layout);
        // Columns: alt1_asc2, alt1_x, optout_asc2.
        let design = DMatrix::from_row_slice(1, 3, &[0.0, 1.0, 1.0]);
        let probabilities = model.choice_probabilities(&design).unwrap();
        assert_eq!(probabilities.ncols(), 2);
        let (u1, u0) = (1.0_f64.exp(), 0.5_f64.exp());
        assert_relative_eq!(probabilities[(0, 1)], u0 / (u0 + u1), epsilon = 1e-12);
    }
}

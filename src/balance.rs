//! Utility-balance diagnostic.

use nalgebra::DMatrix;

use crate::criterion::ModelEvaluator;
use crate::error::{DesignError, Result};

/// Utility-balance ratio (percent) of a probability matrix.
///
/// For each choice situation the ratios `p_j / (1 / J)` are multiplied
/// together; the result is averaged over situations and scaled by 100. A
/// design whose alternatives are always equally likely scores exactly 100.
pub fn utility_balance(probabilities: &DMatrix<f64>) -> Result<f64> {
    let (rows, alternatives) = probabilities.shape();
    if rows == 0 || alternatives == 0 {
        return Err(DesignError::dimension_mismatch(
            "choice probabilities",
            1,
            rows.min(alternatives),
        ));
    }

    let uniform = alternatives as f64;
    let total: f64 = probabilities
        .row_iter()
        .map(|row| row.iter().map(|p| p * uniform).product::<f64>())
        .sum();
    let ratio = 100.0 * total / rows as f64;
    if ratio.is_nan() {
        return Err(DesignError::NumericalError {
            context: "utility balance",
        });
    }
    Ok(ratio)
}

/// Utility-balance ratio of `design` under `model`'s priors.
pub fn utility_balance_of<M: ModelEvaluator + ?Sized>(
    model: &M,
    design: &DMatrix<f64>,
) -> Result<f64> {
    utility_balance(&model.choice_probabilities(design)?)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn uniform_probabilities_are_fully_balanced() {
        for alternatives in 1..=4 {
            for rows in [1, 5, 12] {
                let p = DMatrix::from_element(rows, alternatives, 1.0 / alternatives as f64);
                assert_relative_eq!(utility_balance(&p).unwrap(), 100.0, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn dominated_alternatives_lower_the_ratio() {
        let p = DMatrix::from_row_slice(2, 2, &[0.9, 0.1, 0.5, 0.5]);
        // (1.8 * 0.2 + 1.0) / 2 * 100
        assert_relative_eq!(utility_balance(&p).unwrap(), 68.0, epsilon = 1e-10);
    }
}

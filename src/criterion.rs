//! Efficiency criteria: reduction of an information matrix to a D-error.

use nalgebra::DMatrix;

use crate::error::Result;

/// Smallest LU pivot, relative to the largest, for which an information
/// matrix is still treated as invertible.
pub const SINGULARITY_TOLERANCE: f64 = 64.0 * f64::EPSILON;

/// Choice model consulted by the criteria.
///
/// Implementors compute the Fisher information of their parameters for a
/// design matrix, and the implied choice probabilities (one row per choice
/// situation, one column per alternative).
pub trait ModelEvaluator: Sync {
    /// Information matrix evaluated at the model's priors.
    fn information_matrix(&self, design: &DMatrix<f64>) -> Result<DMatrix<f64>>;

    /// Choice probabilities evaluated at the model's priors.
    fn choice_probabilities(&self, design: &DMatrix<f64>) -> Result<DMatrix<f64>>;

    /// Number of leading parameters (ASCs) marginalized out before reduction.
    fn marginalized_parameters(&self) -> usize {
        0
    }
}

/// Scalar design score minimized by the swapping optimizer; lower is better.
pub trait DesignCriterion: Sync {
    /// Scores a design. Degenerate designs score `f64::INFINITY` rather than failing.
    fn score(&self, design: &DMatrix<f64>) -> Result<f64>;
}

/// D-error of a design under `model`.
pub fn d_error<M: ModelEvaluator + ?Sized>(model: &M, design: &DMatrix<f64>) -> Result<f64> {
    let information = model.information_matrix(design)?;
    Ok(d_error_from_information(
        &information,
        model.marginalized_parameters(),
    ))
}

/// Reduces an information matrix to a D-error.
///
/// The matrix is inverted, the leading `marginalized` rows and columns of
/// the inverse are dropped, and the determinant of the remainder is raised to
/// `1 / size`. Singularity is judged on the LU pivots relative to the
/// largest one, so rescaling the attribute levels does not change the
/// verdict. Singular matrices and non-positive determinants yield
/// `f64::INFINITY`.
pub fn d_error_from_information(information: &DMatrix<f64>, marginalized: usize) -> f64 {
    let size = information.nrows();
    if size == 0 || size != information.ncols() || marginalized >= size {
        return f64::INFINITY;
    }

    let lu = information.clone().lu();
    if is_singular(&lu.u()) {
        return f64::INFINITY;
    }
    let Some(covariance) = lu.try_inverse() else {
        return f64::INFINITY;
    };

    let kept = size - marginalized;
    let covariance = covariance
        .view((marginalized, marginalized), (kept, kept))
        .into_owned();
    let determinant = covariance.determinant();
    if !determinant.is_finite() || determinant <= 0.0 {
        return f64::INFINITY;
    }

    determinant.powf(1.0 / kept as f64)
}

fn is_singular(upper: &DMatrix<f64>) -> bool {
    let pivots = upper.diagonal().abs();
    if pivots.iter().any(|pivot| !pivot.is_finite()) {
        return true;
    }
    let largest = pivots.max();
    largest == 0.0 || pivots.min() <= SINGULARITY_TOLERANCE * largest
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn reduces_diagonal_information() {
        let information = DMatrix::from_row_slice(2, 2, &[0.5, 0.0, 0.0, 2.0]);
        // det(inverse) = 2 * 0.5 = 1.
        assert_relative_eq!(d_error_from_information(&information, 0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn marginalizes_leading_parameters() {
        let information = DMatrix::from_row_slice(2, 2, &[0.5, 0.75, 0.75, 1.25]);
        assert_relative_eq!(d_error_from_information(&information, 0), 4.0, epsilon = 1e-9);
        assert_relative_eq!(d_error_from_information(&information, 1), 8.0, epsilon = 1e-9);
    }

    #[test]
    fn singular_information_is_infinite() {
        let zero = DMatrix::<f64>::zeros(2, 2);
        assert_eq!(d_error_from_information(&zero, 0), f64::INFINITY);

        let rank_one = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert_eq!(d_error_from_information(&rank_one, 0), f64::INFINITY);
    }

    #[test]
    fn singularity_does_not_depend_on_units() {
        let tiny = DMatrix::from_row_slice(2, 2, &[1e-8, 0.0, 0.0, 1e-8]);
        assert_relative_eq!(d_error_from_information(&tiny, 0), 1e8, max_relative = 1e-9);

        let scaled = DMatrix::from_row_slice(2, 2, &[0.5, 0.75, 0.75, 1.25]) * 1e-9;
        assert_relative_eq!(d_error_from_information(&scaled, 0), 4e9, max_relative = 1e-9);
        assert_relative_eq!(d_error_from_information(&scaled, 1), 8e9, max_relative = 1e-9);

        let rank_one = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]) * 1e-9;
        assert_eq!(d_error_from_information(&rank_one, 0), f64::INFINITY);
    }

    #[test]
    fn non_positive_determinant_is_infinite() {
        // Indefinite: inverse determinant is negative.
        let indefinite = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1.0]);
        assert_eq!(d_error_from_information(&indefinite, 0), f64::INFINITY);
    }
}

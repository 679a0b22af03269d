//! Initial design generation: level-balanced random columns with an optional
//! row repair pass driven by compiled conditions.

use nalgebra::{DMatrix, DVector};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::conditions::ConditionSet;
use crate::error::{DesignError, Result};

/// Random re-draws attempted per row before the conditions are declared unsatisfiable.
pub const ROW_REPAIR_ATTEMPTS: usize = 10_000;

/// Builds one column of length `rows` in which each level appears
/// `ceil(rows / L)` or `floor(rows / L)` times, in random order.
pub fn balanced_column<R: Rng + ?Sized>(levels: &[f64], rows: usize, rng: &mut R) -> Vec<f64> {
    let mut column: Vec<f64> = levels.iter().copied().cycle().take(rows).collect();
    column.shuffle(rng);
    column
}

/// Generates a candidate design with independently shuffled, level-balanced columns.
///
/// When `conditions` is non-empty, rows that violate any condition are
/// re-drawn uniformly from the level sets up to [`ROW_REPAIR_ATTEMPTS`] times.
pub fn initial_design<R: Rng + ?Sized>(
    levels: &[Vec<f64>],
    rows: usize,
    conditions: &ConditionSet,
    rng: &mut R,
) -> Result<DMatrix<f64>> {
    if rows == 0 {
        return Err(DesignError::dimension_mismatch("choice situations", 1, 0));
    }
    if let Some(empty) = levels.iter().position(Vec::is_empty) {
        return Err(DesignError::dimension_mismatch("column levels", empty + 1, 0));
    }

    let mut design = DMatrix::zeros(rows, levels.len());
    for (column, column_levels) in levels.iter().enumerate() {
        let values = balanced_column(column_levels, rows, rng);
        design.set_column(column, &DVector::from_vec(values));
    }

    if conditions.is_empty() {
        return Ok(design);
    }

    for row in 0..rows {
        if conditions.row_satisfied(&design, row) {
            continue;
        }
        let mut repaired = false;
        for _ in 0..ROW_REPAIR_ATTEMPTS {
            for (column, column_levels) in levels.iter().enumerate() {
                if let Some(level) = column_levels.choose(rng) {
                    design[(row, column)] = *level;
                }
            }
            if conditions.row_satisfied(&design, row) {
                repaired = true;
                break;
            }
        }
        if !repaired {
            return Err(DesignError::UnsatisfiableConditions {
                row,
                attempts: ROW_REPAIR_ATTEMPTS,
            });
        }
    }

    Ok(design)
}

//! Assignment of choice situations to blocks.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{DesignError, Result};

/// Checks that `blocks` evenly partitions `rows` choice situations.
pub fn validate_blocks(blocks: usize, rows: usize) -> Result<()> {
    if blocks == 0 || blocks > rows || rows % blocks != 0 {
        return Err(DesignError::InvalidBlocks { blocks, rows });
    }
    Ok(())
}

/// Returns a block label in `1..=blocks` for each row; every block receives
/// `rows / blocks` rows in random order.
pub fn assign_blocks<R: Rng + ?Sized>(
    rows: usize,
    blocks: usize,
    rng: &mut R,
) -> Result<Vec<usize>> {
    validate_blocks(blocks, rows)?;
    let per_block = rows / blocks;
    let mut labels: Vec<usize> = (1..=blocks)
        .flat_map(|block| std::iter::repeat(block).take(per_block))
        .collect();
    labels.shuffle(rng);
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn blocks_have_equal_sizes() {
        let mut rng = SmallRng::seed_from_u64(4);
        let labels = assign_blocks(12, 3, &mut rng).unwrap();
        assert_eq!(labels.len(), 12);
        for block in 1..=3 {
            assert_eq!(labels.iter().filter(|b| **b == block).count(), 4);
        }
    }

    #[test]
    fn uneven_blocks_are_rejected() {
        let mut rng = SmallRng::seed_from_u64(4);
        assert!(matches!(
            assign_blocks(12, 5, &mut rng),
            Err(DesignError::InvalidBlocks { blocks: 5, rows: 12 })
        ));
        assert!(validate_blocks(0, 12).is_err());
    }
}

//! # BreedStrategy
//!
//! The `BreedStrategy` trait defines how the fittest weight tensors of a
//! generation produce offspring. [`BlockSwapBreeding`] crosses the two best
//! parents into five offspring, mutates them by random cell swaps and repairs
//! every weight row back into a probability distribution.
use std::fmt::Debug;
use tracing::debug;

use super::options::OptimizerOptions;
use crate::error::{Result, VaxError};
use crate::process::PolicyWeights;
use crate::rng::RandomNumberGenerator;

/// Mutation keeps swapping while a uniform draw exceeds this.
const MUTATION_STOP: f64 = 0.1;

pub trait BreedStrategy
where
    Self: Debug + Clone + Send + Sync,
{
    /// Breeds offspring from parents ranked best first.
    ///
    /// ## Errors
    ///
    /// Fails when there are too few parents or their shapes disagree.
    fn breed(
        &self,
        parents: &[PolicyWeights],
        options: &OptimizerOptions,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Vec<PolicyWeights>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BlockSwapBreeding;

impl BreedStrategy for BlockSwapBreeding {
    fn breed(
        &self,
        parents: &[PolicyWeights],
        _options: &OptimizerOptions,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Vec<PolicyWeights>> {
        let (p1, p2) = match parents {
            [p1, p2, ..] => (p1, p2),
            _ => {
                return Err(VaxError::Configuration(
                    "crossover needs two parents".to_string(),
                ))
            }
        };
        let reset_row = default_row(p1.slots());
        let mut offspring = crossover(p1, p2, rng)?;
        for child in offspring.iter_mut() {
            mutate(child, rng);
            repair(child, &reset_row);
        }
        Ok(offspring)
    }
}

/// The distribution a zero weight row is reset to: all weight on the first slot.
pub fn default_row(slots: usize) -> Vec<f64> {
    let mut row = vec![0.0; slots];
    if let Some(first) = row.first_mut() {
        *first = 1.0;
    }
    row
}

/// Two block swaps followed by the 50/50, 25/75 and 75/25 blends.
pub fn crossover(
    p1: &PolicyWeights,
    p2: &PolicyWeights,
    rng: &mut RandomNumberGenerator,
) -> Result<Vec<PolicyWeights>> {
    if p1.shape() != p2.shape() {
        return Err(VaxError::Configuration(format!(
            "parents have shapes {:?} and {:?}",
            p1.shape(),
            p2.shape()
        )));
    }
    let (_, occurrences, slots) = p1.shape();
    let cut_row = rng.gen_range(0..occurrences);
    let cut_col = rng.gen_range(0..slots);
    let vertical = rng.uniform() <= 0.5;
    let (o1, o2) = block_swap(p1, p2, cut_row, cut_col, vertical);
    Ok(vec![
        o1,
        o2,
        p1.blend(0.5, p2, 0.5),
        p1.blend(0.25, p2, 0.75),
        p1.blend(0.75, p2, 0.25),
    ])
}

/// Splits both parents at (`cut_row`, `cut_col`) and exchanges the tails.
///
/// A vertical cut walks the slot axis: slots before `cut_col` come from the
/// first parent, slots after it from the second, and the cut slot itself
/// switches parent at occurrence `cut_row`. A horizontal cut walks the
/// occurrence axis the same way with the roles of the axes exchanged.
pub fn block_swap(
    p1: &PolicyWeights,
    p2: &PolicyWeights,
    cut_row: usize,
    cut_col: usize,
    vertical: bool,
) -> (PolicyWeights, PolicyWeights) {
    let (wave_states, occurrences, slots) = p1.shape();
    let mut o1 = PolicyWeights::zeros(wave_states, occurrences, slots);
    let mut o2 = PolicyWeights::zeros(wave_states, occurrences, slots);
    for i in 0..wave_states {
        for j in 0..occurrences {
            for k in 0..slots {
                let from_first = if vertical {
                    k < cut_col || (k == cut_col && j < cut_row)
                } else {
                    j < cut_row || (j == cut_row && k < cut_col)
                };
                let (a, b) = if from_first { (p1, p2) } else { (p2, p1) };
                o1.set(i, j, k, a.get(i, j, k));
                o2.set(i, j, k, b.get(i, j, k));
            }
        }
    }
    (o1, o2)
}

/// Swaps pairs of cells while a uniform draw exceeds 0.1.
///
/// The two cells differ on every axis that has more than one index.
pub fn mutate(genes: &mut PolicyWeights, rng: &mut RandomNumberGenerator) {
    let (wave_states, occurrences, slots) = genes.shape();
    while rng.uniform() > MUTATION_STOP {
        let first = (
            rng.gen_range(0..wave_states),
            rng.gen_range(0..occurrences),
            rng.gen_range(0..slots),
        );
        let second = (
            distinct_index(first.0, wave_states, rng),
            distinct_index(first.1, occurrences, rng),
            distinct_index(first.2, slots, rng),
        );
        genes.swap(first, second);
    }
}

fn distinct_index(other: usize, len: usize, rng: &mut RandomNumberGenerator) -> usize {
    if len < 2 {
        return 0;
    }
    // Draw from the remaining len - 1 indices and skip over `other`.
    let idx = rng.gen_range(0..len - 1);
    if idx >= other {
        idx + 1
    } else {
        idx
    }
}

/// Normalises every weight row to sum to one.
///
/// Rows summing to zero are reset to `default_row` first.
pub fn repair(genes: &mut PolicyWeights, default_row: &[f64]) {
    let (wave_states, occurrences, _) = genes.shape();
    for i in 0..wave_states {
        for j in 0..occurrences {
            let row = genes.row_mut(i, j);
            let mut total: f64 = row.iter().sum();
            if total <= 0.0 || !total.is_finite() {
                let reason = VaxError::NumericDegeneracy(format!(
                    "weight row ({}, {}) sums to {}",
                    i, j, total
                ));
                debug!(%reason, "resetting weight row to the default distribution");
                row.copy_from_slice(default_row);
                total = row.iter().sum();
            }
            row.iter_mut().for_each(|w| *w /= total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent(offset: f64) -> PolicyWeights {
        let values = (0..48).map(|v| v as f64 + offset).collect();
        PolicyWeights::from_values(3, 4, 4, values).unwrap()
    }

    #[test]
    fn test_vertical_block_swap_layout() {
        let p1 = parent(0.0);
        let p2 = parent(100.0);
        let (o1, o2) = block_swap(&p1, &p2, 2, 1, true);
        // Slot 0 from the first parent everywhere.
        assert_eq!(o1.get(2, 3, 0), p1.get(2, 3, 0));
        // Cut slot switches at occurrence 2.
        assert_eq!(o1.get(0, 1, 1), p1.get(0, 1, 1));
        assert_eq!(o1.get(0, 2, 1), p2.get(0, 2, 1));
        // Later slots from the second parent.
        assert_eq!(o1.get(1, 0, 3), p2.get(1, 0, 3));
        assert_eq!(o2.get(1, 0, 3), p1.get(1, 0, 3));
    }

    #[test]
    fn test_horizontal_block_swap_layout() {
        let p1 = parent(0.0);
        let p2 = parent(100.0);
        let (o1, _) = block_swap(&p1, &p2, 1, 2, false);
        assert_eq!(o1.get(0, 0, 3), p1.get(0, 0, 3));
        assert_eq!(o1.get(0, 1, 1), p1.get(0, 1, 1));
        assert_eq!(o1.get(0, 1, 2), p2.get(0, 1, 2));
        assert_eq!(o1.get(2, 3, 0), p2.get(2, 3, 0));
    }

    #[test]
    fn test_crossover_produces_five_offspring() {
        let mut rng = RandomNumberGenerator::from_seed(4);
        let offspring = crossover(&parent(0.0), &parent(4.0), &mut rng).unwrap();
        assert_eq!(offspring.len(), 5);
        assert_eq!(offspring[2].get(0, 0, 0), 2.0);
        assert_eq!(offspring[3].get(0, 0, 0), 3.0);
        assert_eq!(offspring[4].get(0, 0, 0), 1.0);
    }

    #[test]
    fn test_mutation_preserves_values() {
        let mut rng = RandomNumberGenerator::from_seed(11);
        let original = parent(0.0);
        let mut genes = original.clone();
        for _ in 0..20 {
            mutate(&mut genes, &mut rng);
        }
        let mut before = original.values().to_vec();
        let mut after = genes.values().to_vec();
        before.sort_by(|a, b| a.partial_cmp(b).unwrap());
        after.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(before, after);
    }

    #[test]
    fn test_repair_resets_zero_rows() {
        let mut genes = PolicyWeights::zeros(3, 4, 4);
        genes.row_mut(1, 2).copy_from_slice(&[2.0, 2.0, 0.0, 4.0]);
        repair(&mut genes, &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(genes.row(1, 2), &[0.25, 0.25, 0.0, 0.5]);
        assert_eq!(genes.row(0, 0), &[1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_breed_requires_two_parents() {
        let mut rng = RandomNumberGenerator::from_seed(1);
        let options = OptimizerOptions::default();
        assert!(BlockSwapBreeding
            .breed(&[parent(0.0)], &options, &mut rng)
            .is_err());
    }
}

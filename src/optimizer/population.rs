//! The current generation, its offspring and the identifier source they share.

use std::cmp::Ordering;

use tracing::debug;

use super::breeding::default_row;
use super::individual::{random_genes, seeded_genes, IdGenerator, Individual};
use super::options::OptimizerOptions;
use crate::error::{Result, VaxError};
use crate::process::PolicyWeights;
use crate::rng::RandomNumberGenerator;

/// The population never shrinks below this many individuals.
const MIN_POPULATION: usize = 2;

#[derive(Debug, Clone)]
pub struct Population {
    pub individuals: Vec<Individual>,
    pub offspring: Vec<Individual>,
    ids: IdGenerator,
}

impl Population {
    /// Creates generation zero, structured or fully random per the options,
    /// with weight rows over `slots` base policies.
    pub fn initial(
        options: &OptimizerOptions,
        slots: usize,
        rng: &mut RandomNumberGenerator,
    ) -> Self {
        let mut ids = IdGenerator::new();
        let default_row = default_row(slots);
        let occurrences = options.get_occurrences();
        let individuals = (0..options.get_population_size())
            .map(|i| {
                let genes = if options.get_random_individuals() {
                    random_genes(occurrences, &default_row, rng)
                } else {
                    seeded_genes(i, occurrences, &default_row, rng)
                };
                Individual::new(ids.next_id(), genes)
            })
            .collect();
        Self {
            individuals,
            offspring: Vec::new(),
            ids,
        }
    }

    pub fn from_individuals(individuals: Vec<Individual>) -> Self {
        Self {
            individuals,
            offspring: Vec::new(),
            ids: IdGenerator::new(),
        }
    }

    /// Replaces the offspring with fresh individuals of `generation + 1`.
    pub fn set_offspring(&mut self, generation: usize, genes: Vec<PolicyWeights>) {
        self.ids.start_generation(generation + 1);
        self.offspring = genes
            .into_iter()
            .map(|g| Individual::new(self.ids.next_id(), g))
            .collect();
    }

    pub fn best(&self) -> Result<&Individual> {
        self.individuals.first().ok_or(VaxError::EmptyPopulation)
    }

    /// Drops the worst members on the generation's schedule and admits the
    /// best offspring.
    ///
    /// Expects both cohorts sorted best first.
    pub fn new_generation(&mut self, generation: usize) -> Result<()> {
        let best_offspring = self
            .offspring
            .first()
            .cloned()
            .ok_or(VaxError::EmptyPopulation)?;
        let drop = if generation > 10 && generation <= 20 {
            2
        } else {
            1
        };
        let keep = self
            .individuals
            .len()
            .saturating_sub(drop)
            .max(MIN_POPULATION - 1);
        self.individuals.truncate(keep);
        debug!(
            generation,
            admitted = %best_offspring.id,
            size = keep + 1,
            "new generation"
        );
        self.individuals.push(best_offspring);
        self.offspring.clear();
        Ok(())
    }
}

/// Sorts ascending by mean score; NaN scores go last.
pub fn sort_by_mean(individuals: &mut [Individual]) {
    individuals.sort_by(|a, b| {
        a.mean_score.partial_cmp(&b.mean_score).unwrap_or_else(|| {
            if a.mean_score.is_nan() && !b.mean_score.is_nan() {
                Ordering::Greater
            } else if b.mean_score.is_nan() && !a.mean_score.is_nan() {
                Ordering::Less
            } else {
                Ordering::Equal
            }
        })
    });
}

//! # OptimizerOptions
//!
//! Configuration of the genetic policy search: how many rollouts estimate a
//! fitness, how large the population is and how strict the significance gate
//! is. The objective and the base policies blended by the weight tensor
//! belong to the [`Challenge`](super::Challenge) being optimised.
//!
//! ## Example
//!
//! ```rust
//! use vaxopt::optimizer::OptimizerOptions;
//!
//! let options = OptimizerOptions::builder()
//!     .simulations(40)
//!     .population_size(6)
//!     .occurrences(3)
//!     .parallel_threshold(16)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(options.get_simulations(), 40);
//! assert_eq!(options.get_extra_simulations(), 20);
//! assert_eq!(options.get_significance(), 0.1);
//! assert_eq!(options.get_occurrences(), 3);
//! ```

use crate::error::{Result, VaxError};

#[derive(Debug, Clone)]
pub struct OptimizerOptions {
    simulations: usize,
    population_size: usize,
    significance: f64,
    max_extra_rounds: usize,
    max_generations: usize,
    /// Minimum number of rollouts in a batch before it is run in parallel
    parallel_threshold: usize,
    random_individuals: bool,
    occurrences: usize,
}

impl OptimizerOptions {
    pub fn get_simulations(&self) -> usize {
        self.simulations
    }

    /// Rollouts appended per extra significance round.
    pub fn get_extra_simulations(&self) -> usize {
        (self.simulations / 2).max(1)
    }

    pub fn get_population_size(&self) -> usize {
        self.population_size
    }

    pub fn get_significance(&self) -> f64 {
        self.significance
    }

    pub fn get_max_extra_rounds(&self) -> usize {
        self.max_extra_rounds
    }

    pub fn get_max_generations(&self) -> usize {
        self.max_generations
    }

    /// Returns the minimum number of rollouts to run in parallel.
    pub fn get_parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }

    pub fn get_random_individuals(&self) -> bool {
        self.random_individuals
    }

    /// Wave occurrences distinguished by the policy-weight tensor.
    pub fn get_occurrences(&self) -> usize {
        self.occurrences
    }

    /// Sets the number of rollouts per fitness estimate.
    pub fn set_simulations(&mut self, simulations: usize) {
        self.simulations = simulations;
    }

    /// Sets the parallel threshold.
    pub fn set_parallel_threshold(&mut self, threshold: usize) {
        self.parallel_threshold = threshold;
    }

    pub fn validate(&self) -> Result<()> {
        if self.simulations < 2 {
            return Err(VaxError::Configuration(
                "at least two simulations are needed for the significance test".to_string(),
            ));
        }
        if self.population_size < 2 {
            return Err(VaxError::Configuration(
                "population size must be at least 2".to_string(),
            ));
        }
        if !(self.significance > 0.0 && self.significance < 1.0) {
            return Err(VaxError::Configuration(format!(
                "significance must lie in (0, 1), got {}",
                self.significance
            )));
        }
        if self.max_generations == 0 {
            return Err(VaxError::Configuration(
                "max_generations cannot be zero".to_string(),
            ));
        }
        if self.occurrences == 0 {
            return Err(VaxError::Configuration(
                "policy weights need at least one wave occurrence".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns a builder for creating an `OptimizerOptions` instance.
    pub fn builder() -> OptimizerOptionsBuilder {
        OptimizerOptionsBuilder::default()
    }
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            simulations: 100,
            population_size: 10,
            significance: 0.1,
            max_extra_rounds: 3,
            max_generations: 100,
            parallel_threshold: 8,
            random_individuals: false,
            occurrences: 4,
        }
    }
}

/// Builder for `OptimizerOptions`.
///
/// Unset values fall back to [`OptimizerOptions::default`].
#[derive(Debug, Clone, Default)]
pub struct OptimizerOptionsBuilder {
    simulations: Option<usize>,
    population_size: Option<usize>,
    significance: Option<f64>,
    max_extra_rounds: Option<usize>,
    max_generations: Option<usize>,
    parallel_threshold: Option<usize>,
    random_individuals: Option<bool>,
    occurrences: Option<usize>,
}

impl OptimizerOptionsBuilder {
    pub fn simulations(mut self, value: usize) -> Self {
        self.simulations = Some(value);
        self
    }

    pub fn population_size(mut self, value: usize) -> Self {
        self.population_size = Some(value);
        self
    }

    pub fn significance(mut self, value: f64) -> Self {
        self.significance = Some(value);
        self
    }

    pub fn max_extra_rounds(mut self, value: usize) -> Self {
        self.max_extra_rounds = Some(value);
        self
    }

    pub fn max_generations(mut self, value: usize) -> Self {
        self.max_generations = Some(value);
        self
    }

    /// Sets the parallel threshold.
    pub fn parallel_threshold(mut self, value: usize) -> Self {
        self.parallel_threshold = Some(value);
        self
    }

    /// Starts from fully random weight tensors instead of the structured seeds.
    pub fn random_individuals(mut self, value: bool) -> Self {
        self.random_individuals = Some(value);
        self
    }

    pub fn occurrences(mut self, value: usize) -> Self {
        self.occurrences = Some(value);
        self
    }

    /// Builds and validates the options.
    pub fn build(self) -> Result<OptimizerOptions> {
        let defaults = OptimizerOptions::default();
        let options = OptimizerOptions {
            simulations: self.simulations.unwrap_or(defaults.simulations),
            population_size: self.population_size.unwrap_or(defaults.population_size),
            significance: self.significance.unwrap_or(defaults.significance),
            max_extra_rounds: self.max_extra_rounds.unwrap_or(defaults.max_extra_rounds),
            max_generations: self.max_generations.unwrap_or(defaults.max_generations),
            parallel_threshold: self
                .parallel_threshold
                .unwrap_or(defaults.parallel_threshold),
            random_individuals: self
                .random_individuals
                .unwrap_or(defaults.random_individuals),
            occurrences: self.occurrences.unwrap_or(defaults.occurrences),
        };
        options.validate()?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = OptimizerOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.get_max_extra_rounds(), 3);
        assert_eq!(options.get_occurrences(), 4);
    }

    #[test]
    fn test_builder_rejects_tiny_population() {
        let err = OptimizerOptions::builder().population_size(1).build();
        assert!(matches!(err, Err(VaxError::Configuration(_))));
    }

    #[test]
    fn test_builder_rejects_single_simulation() {
        assert!(OptimizerOptions::builder().simulations(1).build().is_err());
        assert!(OptimizerOptions::builder().significance(1.5).build().is_err());
        assert!(OptimizerOptions::builder().occurrences(0).build().is_err());
    }
}

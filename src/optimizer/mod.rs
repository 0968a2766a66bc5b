//! Genetic search over policy-weight tensors with significance-gated ranking.
pub mod breeding;
pub mod challenge;
pub mod individual;
pub mod launcher;
pub mod options;
pub mod population;
pub mod significance;

pub use breeding::{BlockSwapBreeding, BreedStrategy};
pub use challenge::{Challenge, Objective, ProcessChallenge, RolloutScore, WaveSource};
pub use individual::{IdGenerator, Individual};
pub use launcher::{GeneticOptimizer, GenerationSummary, OptimizationResult};
pub use options::{OptimizerOptions, OptimizerOptionsBuilder};
pub use population::Population;
pub use significance::t_test;

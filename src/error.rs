//! # Error Types
//!
//! This module defines the error taxonomy shared by the epidemic model, the
//! decision process and the genetic optimizer.
//!
//! Not every variant travels to the caller. `DataGap` and `NumericDegeneracy`
//! describe conditions that are recovered where they occur (zero supply, a
//! default weight distribution); they exist so the recovery sites can log a
//! typed reason. `Configuration` and `NegativeCompartment` are fatal.
//!
//! ## Examples
//!
//! ```rust
//! use vaxopt::error::{Result, VaxError};
//! use vaxopt::process::PolicyKind;
//!
//! fn parse(name: &str) -> Result<PolicyKind> {
//!     name.parse()
//! }
//!
//! match parse("tallest_first") {
//!     Err(VaxError::Configuration(msg)) => assert!(msg.contains("tallest_first")),
//!     _ => panic!("expected a configuration error"),
//! }
//! ```
//!
//! Using the `OptionExt` trait to convert `Option` to `Result`:
//!
//! ```rust
//! use vaxopt::error::{OptionExt, VaxError};
//!
//! fn lowest(scores: &[f64]) -> vaxopt::error::Result<f64> {
//!     scores
//!         .iter()
//!         .cloned()
//!         .reduce(f64::min)
//!         .ok_or_else_vax(|| VaxError::EmptyPopulation)
//! }
//!
//! assert_eq!(lowest(&[3.0, 1.0]).unwrap(), 1.0);
//! ```

use thiserror::Error;

/// Errors raised while simulating the epidemic or searching for allocation policies.
#[derive(Error, Debug)]
pub enum VaxError {
    /// Unknown policy or objective name, inconsistent dimensions or invalid options.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Historical exogenous data is missing for the requested date range.
    #[error("Data gap: {0}")]
    DataGap(String),

    /// A normalisation denominator was zero.
    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    /// A compartment dropped below zero beyond the clipping tolerance.
    #[error("Negative compartment {compartment} at region {region}, age group {age_group}: {value}")]
    NegativeCompartment {
        compartment: &'static str,
        region: usize,
        age_group: usize,
        value: f64,
    },

    /// A rollout produced a NaN or infinite score.
    #[error("Invalid numeric value: {0}")]
    InvalidNumericValue(String),

    /// The optimizer was asked to work on an empty population.
    #[error("Empty population error: Cannot operate on an empty population")]
    EmptyPopulation,

    /// A Monte-Carlo rollout failed; the whole fitness batch is discarded.
    #[error("Simulation error: {0}")]
    Simulation(String),
}

/// A specialized Result type for simulation and optimization operations.
pub type Result<T> = std::result::Result<T, VaxError>;

/// Extension trait for Option to convert to Result with a custom error.
pub trait OptionExt<T> {
    /// Converts an `Option<T>` to a `Result<T, VaxError>` using `err_fn` for `None`.
    fn ok_or_else_vax<F>(self, err_fn: F) -> Result<T>
    where
        F: FnOnce() -> VaxError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_else_vax<F>(self, err_fn: F) -> Result<T>
    where
        F: FnOnce() -> VaxError,
    {
        self.ok_or_else(err_fn)
    }
}

impl VaxError {
    /// Wraps a rollout failure with the seed that produced it.
    pub fn rollout(seed: u64, source: VaxError) -> Self {
        VaxError::Simulation(format!("rollout with seed {} failed: {}", seed, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_compartment_message() {
        let err = VaxError::NegativeCompartment {
            compartment: "S",
            region: 2,
            age_group: 5,
            value: -0.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("S"));
        assert!(msg.contains("region 2"));
        assert!(msg.contains("age group 5"));
    }

    #[test]
    fn test_missing_value_becomes_typed_error() {
        let none: Option<f64> = None;
        assert!(matches!(
            none.ok_or_else_vax(|| VaxError::EmptyPopulation),
            Err(VaxError::EmptyPopulation)
        ));
        assert_eq!(Some(2.5).ok_or_else_vax(|| VaxError::EmptyPopulation).unwrap(), 2.5);
    }

    #[test]
    fn test_rollout_error_mentions_seed() {
        let err = VaxError::rollout(42, VaxError::Configuration("bad".to_string()));
        assert!(err.to_string().contains("seed 42"));
    }
}

//! # ModelConfig
//!
//! Disease and control-measure parameters shared by the epidemic model, the
//! decision process and the allocation policies.
//!
//! Periods are given in days and converted to per-sub-step rates using
//! `periods_per_day`.
//!
//! ## Example
//!
//! ```rust
//! use vaxopt::config::ModelConfig;
//!
//! let config = ModelConfig::builder()
//!     .r0(3.0)
//!     .efficacy(0.9)
//!     .fatality_rates(vec![0.0, 0.001])
//!     .life_years_remaining(vec![70.0, 20.0])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.age_groups(), 2);
//! assert_eq!(config.decision_period(), 28);
//! ```

use crate::error::{Result, VaxError};

/// Number of social contexts (home, school, work, public) in the default setup.
pub const DEFAULT_CONTACT_CONTEXTS: usize = 4;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub periods_per_day: usize,
    /// Sub-step of a weekday on which commuters mix at their destination.
    pub working_hour_step: usize,
    pub r0: f64,
    pub efficacy: f64,
    pub proportion_symptomatic: f64,
    pub presymptomatic_infectiousness: f64,
    pub asymptomatic_infectiousness: f64,
    pub latent_period: f64,
    pub presymptomatic_period: f64,
    pub postsymptomatic_period: f64,
    /// Probability that a resolving symptomatic case dies, per age group.
    pub fatality_rates: Vec<f64>,
    /// Remaining life expectancy per age group, for years-of-life-lost.
    pub life_years_remaining: Vec<f64>,
    pub initial_contact_weights: Vec<f64>,
    pub min_contact_weights: Vec<f64>,
    /// Infectiousness multipliers for E2, A and I.
    pub initial_alphas: Vec<f64>,
    pub min_alphas: Vec<f64>,
}

impl ModelConfig {
    pub fn builder() -> ModelConfigBuilder {
        ModelConfigBuilder::default()
    }

    pub fn age_groups(&self) -> usize {
        self.fatality_rates.len()
    }

    /// Sub-steps in one week.
    pub fn decision_period(&self) -> usize {
        7 * self.periods_per_day
    }

    pub fn recovery_period(&self) -> f64 {
        self.presymptomatic_period + self.postsymptomatic_period
    }

    /// Mean infectious duration in sub-steps.
    pub fn infectious_duration(&self) -> f64 {
        self.recovery_period() * self.periods_per_day as f64
    }

    /// Checks value ranges and that every per-age and per-context vector agrees in length.
    pub fn validate(&self) -> Result<()> {
        if self.periods_per_day == 0 {
            return Err(VaxError::Configuration(
                "periods_per_day must be greater than 0".to_string(),
            ));
        }
        if self.working_hour_step >= self.periods_per_day {
            return Err(VaxError::Configuration(format!(
                "working_hour_step {} must be below periods_per_day {}",
                self.working_hour_step, self.periods_per_day
            )));
        }
        for (name, value) in [
            ("latent_period", self.latent_period),
            ("presymptomatic_period", self.presymptomatic_period),
            ("postsymptomatic_period", self.postsymptomatic_period),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(VaxError::Configuration(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        for (name, value) in [
            ("efficacy", self.efficacy),
            ("proportion_symptomatic", self.proportion_symptomatic),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(VaxError::Configuration(format!(
                    "{} must lie in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.r0 < 0.0 {
            return Err(VaxError::Configuration("r0 cannot be negative".to_string()));
        }
        if self.fatality_rates.iter().any(|d| !(0.0..=1.0).contains(d)) {
            return Err(VaxError::Configuration(
                "fatality rates must lie in [0, 1]".to_string(),
            ));
        }
        if self.life_years_remaining.len() != self.fatality_rates.len() {
            return Err(VaxError::Configuration(format!(
                "life_years_remaining has {} entries but there are {} age groups",
                self.life_years_remaining.len(),
                self.fatality_rates.len()
            )));
        }
        check_bounds(
            "contact weights",
            &self.min_contact_weights,
            &self.initial_contact_weights,
        )?;
        check_bounds("alphas", &self.min_alphas, &self.initial_alphas)?;
        if self.initial_alphas.len() != 3 {
            return Err(VaxError::Configuration(format!(
                "expected 3 alphas (E2, A, I), got {}",
                self.initial_alphas.len()
            )));
        }
        Ok(())
    }
}

fn check_bounds(name: &str, min: &[f64], max: &[f64]) -> Result<()> {
    if min.len() != max.len() {
        return Err(VaxError::Configuration(format!(
            "{}: {} minimum values but {} initial values",
            name,
            min.len(),
            max.len()
        )));
    }
    if min.iter().zip(max).any(|(lo, hi)| lo > hi || *lo < 0.0) {
        return Err(VaxError::Configuration(format!(
            "{}: minimum must be non-negative and not exceed the initial value",
            name
        )));
    }
    Ok(())
}

impl Default for ModelConfig {
    /// Eight age groups, four contact contexts, weekly decisions at four sub-steps a day.
    fn default() -> Self {
        Self {
            periods_per_day: 4,
            working_hour_step: 2,
            r0: 2.4,
            efficacy: 0.95,
            proportion_symptomatic: 0.8,
            presymptomatic_infectiousness: 1.25,
            asymptomatic_infectiousness: 0.1,
            latent_period: 3.0,
            presymptomatic_period: 2.0,
            postsymptomatic_period: 3.2,
            fatality_rates: vec![
                0.000_01, 0.000_01, 0.000_07, 0.000_2, 0.000_6, 0.002, 0.006, 0.05,
            ],
            life_years_remaining: vec![78.0, 68.0, 61.0, 52.0, 40.0, 30.0, 20.0, 9.0],
            initial_contact_weights: vec![1.0; DEFAULT_CONTACT_CONTEXTS],
            min_contact_weights: vec![1.0, 0.4, 0.4, 0.4],
            initial_alphas: vec![1.0; 3],
            min_alphas: vec![0.5; 3],
        }
    }
}

/// Fluent builder starting from [`ModelConfig::default`].
#[derive(Debug, Clone, Default)]
pub struct ModelConfigBuilder {
    config: ModelConfig,
}

impl ModelConfigBuilder {
    pub fn periods_per_day(mut self, value: usize) -> Self {
        self.config.periods_per_day = value;
        self
    }

    pub fn working_hour_step(mut self, value: usize) -> Self {
        self.config.working_hour_step = value;
        self
    }

    pub fn r0(mut self, value: f64) -> Self {
        self.config.r0 = value;
        self
    }

    pub fn efficacy(mut self, value: f64) -> Self {
        self.config.efficacy = value;
        self
    }

    pub fn proportion_symptomatic(mut self, value: f64) -> Self {
        self.config.proportion_symptomatic = value;
        self
    }

    pub fn infectiousness(mut self, presymptomatic: f64, asymptomatic: f64) -> Self {
        self.config.presymptomatic_infectiousness = presymptomatic;
        self.config.asymptomatic_infectiousness = asymptomatic;
        self
    }

    /// Sets the latent, presymptomatic and postsymptomatic periods, in days.
    pub fn periods(mut self, latent: f64, presymptomatic: f64, postsymptomatic: f64) -> Self {
        self.config.latent_period = latent;
        self.config.presymptomatic_period = presymptomatic;
        self.config.postsymptomatic_period = postsymptomatic;
        self
    }

    pub fn fatality_rates(mut self, value: Vec<f64>) -> Self {
        self.config.fatality_rates = value;
        self
    }

    pub fn life_years_remaining(mut self, value: Vec<f64>) -> Self {
        self.config.life_years_remaining = value;
        self
    }

    pub fn contact_weight_bounds(mut self, min: Vec<f64>, initial: Vec<f64>) -> Self {
        self.config.min_contact_weights = min;
        self.config.initial_contact_weights = initial;
        self
    }

    pub fn alpha_bounds(mut self, min: Vec<f64>, initial: Vec<f64>) -> Self {
        self.config.min_alphas = min;
        self.config.initial_alphas = initial;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<ModelConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

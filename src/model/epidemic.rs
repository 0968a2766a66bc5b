//! # EpidemicModel
//!
//! Age- and region-structured SEAIR model with two exposed stages, integrated
//! in fixed sub-day steps. One call to [`EpidemicModel::simulate`] covers a
//! whole decision period.
//!
//! Each sub-step:
//!
//! 1. administers a pro-rated share of the period's doses; the protected
//!    fraction moves straight from S to R,
//! 2. recomputes the living population N (everything but D and V),
//! 3. on weekday working-hour steps, adds exposures among commuters at their
//!    destination region,
//! 4. adds local exposures through the contact-weighted age mixing matrix,
//! 5. optionally replaces both exposure means by Poisson draws,
//! 6. advances S → E1 → E2/A → I → R/D with fixed rates.

use chrono::Datelike;
use std::sync::Arc;

use super::mobility::Mobility;
use super::state::{Compartments, State, WaveContext};
use crate::config::ModelConfig;
use crate::error::{Result, VaxError};
use crate::grid::Grid;
use crate::rng::RandomNumberGenerator;

/// Exogenous inputs for one decision period.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ExogenousInfo {
    pub r_eff: f64,
    pub contact_weights: Vec<f64>,
    /// Infectiousness multipliers for E2, A and I.
    pub alphas: Vec<f64>,
    pub flow_scale: f64,
    /// Doses delivered during the period, allocatable from the next decision on.
    pub vaccine_supply: f64,
    pub wave: WaveContext,
}

impl ExogenousInfo {
    /// Information that leaves the epidemic uncontrolled at the configured R0.
    pub fn baseline(config: &ModelConfig) -> Self {
        Self {
            r_eff: config.r0,
            contact_weights: config.initial_contact_weights.clone(),
            alphas: config.initial_alphas.clone(),
            flow_scale: 1.0,
            vaccine_supply: 0.0,
            wave: WaveContext::default(),
        }
    }
}

/// Compartments after a decision period plus the period's flows.
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub compartments: Compartments,
    pub new_infected: Grid,
    pub new_deaths: Grid,
}

#[derive(Debug, Clone)]
pub struct EpidemicModel {
    config: Arc<ModelConfig>,
    mobility: Arc<Mobility>,
    regions: usize,
    stochastic: bool,
    include_flow: bool,
}

/// Per-sub-step transition rates.
#[derive(Debug, Clone, Copy)]
struct Rates {
    beta: f64,
    sigma: f64,
    alpha: f64,
    omega: f64,
    gamma: f64,
}

impl EpidemicModel {
    /// Creates a model, checking that the mobility inputs agree with the config.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for inconsistent dimensions or for periods
    /// shorter than one sub-step (rates above one would empty a compartment in
    /// a single step).
    pub fn new(
        config: Arc<ModelConfig>,
        mobility: Arc<Mobility>,
        regions: usize,
        stochastic: bool,
    ) -> Result<Self> {
        config.validate()?;
        mobility.validate(
            regions,
            config.age_groups(),
            config.initial_contact_weights.len(),
        )?;
        let ppd = config.periods_per_day as f64;
        for (name, days) in [
            ("latent_period", config.latent_period),
            ("presymptomatic_period", config.presymptomatic_period),
            ("postsymptomatic_period", config.postsymptomatic_period),
        ] {
            if days * ppd < 1.0 {
                return Err(VaxError::Configuration(format!(
                    "{} of {} days is shorter than one sub-step",
                    name, days
                )));
            }
        }
        Ok(Self {
            config,
            mobility,
            regions,
            stochastic,
            include_flow: true,
        })
    }

    /// Disables the commuter term entirely.
    pub fn without_flow(mut self) -> Self {
        self.include_flow = false;
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn mobility(&self) -> &Mobility {
        &self.mobility
    }

    /// Regions and age groups every state simulated by this model must have.
    pub fn shape(&self) -> (usize, usize) {
        (self.regions, self.config.age_groups())
    }

    /// Fails when `compartments` were not laid out for this model.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on a shape mismatch.
    pub fn check_shape(&self, compartments: &Compartments) -> Result<()> {
        if compartments.shape() != self.shape() {
            return Err(VaxError::Configuration(format!(
                "compartments have shape {:?}, model expects {:?}",
                compartments.shape(),
                self.shape()
            )));
        }
        Ok(())
    }

    pub fn is_stochastic(&self) -> bool {
        self.stochastic
    }

    fn rates(&self, r_eff: f64) -> Rates {
        let c = &self.config;
        let ppd = c.periods_per_day as f64;
        Rates {
            beta: r_eff / c.infectious_duration(),
            sigma: 1.0 / (c.latent_period * ppd),
            alpha: 1.0 / (c.presymptomatic_period * ppd),
            omega: 1.0 / (c.postsymptomatic_period * ppd),
            gamma: 1.0 / c.infectious_duration(),
        }
    }

    /// Whether sub-step `step` of the period falls in weekday working hours.
    pub fn is_working_hour(&self, weekday: usize, step: usize) -> bool {
        let ppd = self.config.periods_per_day;
        let week_step = (weekday * ppd + step) % (7 * ppd);
        week_step < 5 * ppd && week_step % ppd == self.config.working_hour_step
    }

    /// Simulates `decision_period` sub-steps from `state`.
    ///
    /// `decision` holds the doses for the whole period per region and age group.
    pub fn simulate(
        &self,
        state: &State,
        decision: &Grid,
        information: &ExogenousInfo,
        decision_period: usize,
        rng: &mut RandomNumberGenerator,
    ) -> Result<SimulationOutcome> {
        self.check_shape(&state.compartments)?;
        let shape = state.compartments.shape();
        if decision.shape() != shape {
            return Err(VaxError::Configuration(format!(
                "decision has shape {:?}, compartments have {:?}",
                decision.shape(),
                shape
            )));
        }
        if information.alphas.len() != 3 {
            return Err(VaxError::Configuration(format!(
                "expected 3 alphas, got {}",
                information.alphas.len()
            )));
        }

        let (regions, age_groups) = shape;
        let cfg = &self.config;
        let rates = self.rates(information.r_eff);
        let contact = self.mobility.contacts.weighted(&information.contact_weights);
        let weekday = state.date.weekday().num_days_from_monday() as usize;
        let doses_per_step = if decision_period > 0 {
            decision.scale(1.0 / decision_period as f64)
        } else {
            Grid::zeros(regions, age_groups)
        };

        let mut c = state.compartments.clone();
        let mut new_infected = Grid::zeros(regions, age_groups);
        let mut new_deaths = Grid::zeros(regions, age_groups);

        for step in 0..decision_period {
            for (r, a, doses) in doses_per_step.indexed() {
                let protected = (cfg.efficacy * doses).min(c.s[(r, a)]);
                c.s[(r, a)] -= protected;
                c.r[(r, a)] += protected;
                c.v[(r, a)] += doses;
            }

            let living = c.living();

            let commuter_cases = if self.include_flow && self.is_working_hour(weekday, step) {
                self.commuter_exposures(&c, &living, rates.beta, information.flow_scale, rng)
            } else {
                Grid::zeros(regions, age_groups)
            };
            let contact_cases =
                self.contact_exposures(&c, &living, &contact, &information.alphas, rates.beta, rng);

            for r in 0..regions {
                for a in 0..age_groups {
                    let delta = cfg.fatality_rates[a];
                    let p = cfg.proportion_symptomatic;
                    let (e1, e2, asym, inf) =
                        (c.e1[(r, a)], c.e2[(r, a)], c.a[(r, a)], c.i[(r, a)]);

                    let new_e1 =
                        (contact_cases[(r, a)] + commuter_cases[(r, a)]).min(c.s[(r, a)]);
                    let new_e2 = e1 * rates.sigma * p;
                    let new_a = e1 * rates.sigma * (1.0 - p);
                    let new_i = e2 * rates.alpha;
                    let new_r_a = asym * rates.gamma;
                    let new_r_i = inf * (1.0 - delta) * rates.omega;
                    let new_d = inf * delta * rates.omega;

                    c.s[(r, a)] -= new_e1;
                    c.e1[(r, a)] = e1 + new_e1 - new_e2 - new_a;
                    c.e2[(r, a)] = e2 + new_e2 - new_i;
                    c.a[(r, a)] = asym + new_a - new_r_a;
                    c.i[(r, a)] = inf + new_i - new_r_i - new_d;
                    c.r[(r, a)] += new_r_i + new_r_a;
                    c.d[(r, a)] += new_d;

                    new_infected[(r, a)] += new_i;
                    new_deaths[(r, a)] += new_d;
                }
            }

            c.enforce_non_negative()?;
        }

        Ok(SimulationOutcome {
            compartments: c,
            new_infected,
            new_deaths,
        })
    }

    /// Within-region exposures through age mixing.
    fn contact_exposures(
        &self,
        c: &Compartments,
        living: &Grid,
        contact: &[Vec<f64>],
        alphas: &[f64],
        beta: f64,
        rng: &mut RandomNumberGenerator,
    ) -> Grid {
        let (regions, age_groups) = c.shape();
        let r_e = self.config.presymptomatic_infectiousness;
        let r_a = self.config.asymptomatic_infectiousness;
        let mut cases = Grid::zeros(regions, age_groups);
        for r in 0..regions {
            let force: Vec<f64> = (0..age_groups)
                .map(|b| {
                    let weighted = alphas[0] * r_e * c.e2[(r, b)]
                        + alphas[1] * r_a * c.a[(r, b)]
                        + alphas[2] * c.i[(r, b)];
                    (beta * weighted).clamp(0.0, 1.0)
                })
                .collect();
            for a in 0..age_groups {
                let n = living[(r, a)];
                if n <= 0.0 {
                    continue;
                }
                let mixing: f64 = (0..age_groups).map(|b| force[b] * contact[b][a]).sum();
                let mean = c.s[(r, a)] / n * mixing;
                cases[(r, a)] = if self.stochastic { rng.poisson(mean) } else { mean };
            }
        }
        cases
    }

    /// Exposures of commuters from each origin region at their destinations.
    fn commuter_exposures(
        &self,
        c: &Compartments,
        living: &Grid,
        beta: f64,
        flow_scale: f64,
        rng: &mut RandomNumberGenerator,
    ) -> Grid {
        let (regions, age_groups) = c.shape();
        let flows = &self.mobility.commuters;
        let r_e = self.config.presymptomatic_infectiousness;
        let r_a = self.config.asymptomatic_infectiousness;

        let mut destination_force = Grid::zeros(regions, age_groups);
        for (j, a, visitors) in flows.visitors.indexed() {
            let visitors = visitors * flow_scale;
            if visitors <= 0.0 {
                continue;
            }
            let infectious = r_e * c.e2[(j, a)] + r_a * c.a[(j, a)] + c.i[(j, a)];
            destination_force[(j, a)] = (beta * infectious / visitors).clamp(0.0, 1.0);
        }

        let mut cases = Grid::zeros(regions, age_groups);
        for (i, od_row) in flows.od.iter().enumerate() {
            for a in 0..age_groups {
                let n = living[(i, a)];
                if n <= 0.0 {
                    continue;
                }
                let scaling = flow_scale * self.mobility.age_flow_scaling[a];
                let exposure: f64 = od_row
                    .iter()
                    .enumerate()
                    .map(|(j, &flow)| flow * scaling * destination_force[(j, a)])
                    .sum();
                let mean = c.s[(i, a)] / n * exposure;
                cases[(i, a)] = if self.stochastic { rng.poisson(mean) } else { mean };
            }
        }
        cases
    }
}

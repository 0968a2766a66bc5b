//! # State
//!
//! An immutable snapshot of the epidemic at the start of a decision period.
//! `State::transition` never mutates the receiver; it runs the epidemic model
//! and packages the outcome into a new `State`, so a path of states can be
//! shared freely between rollouts and inspected afterwards.

use chrono::{Duration, NaiveDate};
use std::fmt;

use super::epidemic::{EpidemicModel, ExogenousInfo};
use crate::config::ModelConfig;
use crate::error::{Result, VaxError};
use crate::grid::Grid;
use crate::rng::RandomNumberGenerator;

/// Values below zero but above `-NEGATIVE_TOLERANCE` are numerical noise and get clipped.
pub const NEGATIVE_TOLERANCE: f64 = 1e-6;

/// Upper bound on the effective reproduction number estimate.
const MAX_R_EFF_ESTIMATE: f64 = 10.0;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compartment {
    S,
    E1,
    E2,
    A,
    I,
    R,
    D,
    V,
}

impl Compartment {
    pub const ALL: [Compartment; 8] = [
        Compartment::S,
        Compartment::E1,
        Compartment::E2,
        Compartment::A,
        Compartment::I,
        Compartment::R,
        Compartment::D,
        Compartment::V,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Compartment::S => "S",
            Compartment::E1 => "E1",
            Compartment::E2 => "E2",
            Compartment::A => "A",
            Compartment::I => "I",
            Compartment::R => "R",
            Compartment::D => "D",
            Compartment::V => "V",
        }
    }
}

/// The eight compartment grids.
///
/// `v` counts everyone who has received a dose. Protected doses have already
/// moved their recipient from `s` to `r`, so `v` overlaps the other
/// compartments and is not part of the population mass.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Compartments {
    pub s: Grid,
    pub e1: Grid,
    pub e2: Grid,
    pub a: Grid,
    pub i: Grid,
    pub r: Grid,
    pub d: Grid,
    pub v: Grid,
}

impl Compartments {
    /// Everyone susceptible.
    pub fn susceptible(population: &Grid) -> Self {
        let (regions, age_groups) = population.shape();
        let zeros = Grid::zeros(regions, age_groups);
        Self {
            s: population.clone(),
            e1: zeros.clone(),
            e2: zeros.clone(),
            a: zeros.clone(),
            i: zeros.clone(),
            r: zeros.clone(),
            d: zeros.clone(),
            v: zeros,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.s.shape()
    }

    pub fn get(&self, compartment: Compartment) -> &Grid {
        match compartment {
            Compartment::S => &self.s,
            Compartment::E1 => &self.e1,
            Compartment::E2 => &self.e2,
            Compartment::A => &self.a,
            Compartment::I => &self.i,
            Compartment::R => &self.r,
            Compartment::D => &self.d,
            Compartment::V => &self.v,
        }
    }

    pub fn get_mut(&mut self, compartment: Compartment) -> &mut Grid {
        match compartment {
            Compartment::S => &mut self.s,
            Compartment::E1 => &mut self.e1,
            Compartment::E2 => &mut self.e2,
            Compartment::A => &mut self.a,
            Compartment::I => &mut self.i,
            Compartment::R => &mut self.r,
            Compartment::D => &mut self.d,
            Compartment::V => &mut self.v,
        }
    }

    /// Moves `count` people of one cell from `S` into `compartment`, e.g. to seed an outbreak.
    pub fn seed(&mut self, compartment: Compartment, region: usize, age_group: usize, count: f64) {
        let moved = count.min(self.s[(region, age_group)]);
        self.s[(region, age_group)] -= moved;
        self.get_mut(compartment)[(region, age_group)] += moved;
    }

    /// Effective population per cell: all compartments except deceased and vaccinated.
    pub fn living(&self) -> Grid {
        let mut n = self.s.clone();
        for g in [&self.e1, &self.e2, &self.a, &self.i, &self.r] {
            n.add_assign_scaled(g, 1.0);
        }
        n
    }

    /// Total mass in S, E1, E2, A, I, R and D.
    pub fn mass(&self) -> f64 {
        self.living().sum() + self.d.sum()
    }

    /// E1 + E2 + A + I over all cells.
    pub fn infectious_total(&self) -> f64 {
        self.e1.sum() + self.e2.sum() + self.a.sum() + self.i.sum()
    }

    /// Clips numerical noise below zero and fails on genuine negative values.
    ///
    /// # Errors
    ///
    /// Returns `VaxError::NegativeCompartment` for the first value below
    /// `-NEGATIVE_TOLERANCE`.
    pub fn enforce_non_negative(&mut self) -> Result<()> {
        for compartment in Compartment::ALL {
            let grid = self.get_mut(compartment);
            for (region, age_group, value) in grid.indexed().collect::<Vec<_>>() {
                if value < -NEGATIVE_TOLERANCE || value.is_nan() {
                    return Err(VaxError::NegativeCompartment {
                        compartment: compartment.name(),
                        region,
                        age_group,
                        value,
                    });
                }
                if value < 0.0 {
                    grid[(region, age_group)] = 0.0;
                }
            }
        }
        Ok(())
    }
}

/// Trend of the epidemic as classified by the control-measure feedback.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WaveState {
    Up,
    Down,
    Neutral,
}

impl WaveState {
    pub const ALL: [WaveState; 3] = [WaveState::Up, WaveState::Down, WaveState::Neutral];

    /// Row index in the policy-weight tensor.
    pub fn index(&self) -> usize {
        match self {
            WaveState::Up => 0,
            WaveState::Down => 1,
            WaveState::Neutral => 2,
        }
    }
}

/// Current wave state and how many times it has been entered (1-based).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaveContext {
    pub state: WaveState,
    pub occurrence: usize,
}

impl Default for WaveContext {
    fn default() -> Self {
        Self {
            state: WaveState::Neutral,
            occurrence: 1,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub compartments: Compartments,
    /// Sub-steps simulated since the start of the run.
    pub time_step: usize,
    pub date: NaiveDate,
    pub contact_weights: Vec<f64>,
    pub alphas: Vec<f64>,
    /// Newly symptomatic cases during the period that produced this state.
    pub new_infected: Grid,
    pub new_deaths: Grid,
    pub total_infected: Grid,
    pub total_vaccinated: Grid,
    pub r_eff: f64,
    /// Doses that may be allocated in the upcoming period.
    pub vaccines_available: f64,
    /// Wave context that was in force when this state was produced.
    pub wave: WaveContext,
}

impl State {
    /// The initial condition of a run.
    pub fn initial(
        compartments: Compartments,
        date: NaiveDate,
        config: &ModelConfig,
        vaccines_available: f64,
    ) -> Self {
        let (regions, age_groups) = compartments.shape();
        let zeros = Grid::zeros(regions, age_groups);
        Self {
            compartments,
            time_step: 0,
            date,
            contact_weights: config.initial_contact_weights.clone(),
            alphas: config.initial_alphas.clone(),
            new_infected: zeros.clone(),
            new_deaths: zeros.clone(),
            total_infected: zeros.clone(),
            total_vaccinated: zeros,
            r_eff: config.r0,
            vaccines_available,
            wave: WaveContext::default(),
        }
    }

    /// Produces the state one decision period later.
    ///
    /// `self` is left untouched; all randomness comes from `rng` and is only
    /// consumed when the model runs in stochastic mode.
    pub fn transition(
        &self,
        decision: &Grid,
        information: &ExogenousInfo,
        model: &EpidemicModel,
        decision_period: usize,
        rng: &mut RandomNumberGenerator,
    ) -> Result<State> {
        let outcome = model.simulate(self, decision, information, decision_period, rng)?;

        let previous_new = self.new_infected.sum();
        let current_new = outcome.new_infected.sum();
        let r_eff = if previous_new > 0.0 {
            (self.r_eff * current_new / previous_new).clamp(0.0, MAX_R_EFF_ESTIMATE)
        } else {
            self.r_eff
        };

        let days = (decision_period / model.config().periods_per_day) as i64;
        Ok(State {
            compartments: outcome.compartments,
            time_step: self.time_step + decision_period,
            date: self.date + Duration::days(days),
            contact_weights: information.contact_weights.clone(),
            alphas: information.alphas.clone(),
            total_infected: self.total_infected.plus(&outcome.new_infected),
            total_vaccinated: self.total_vaccinated.plus(decision),
            new_infected: outcome.new_infected,
            new_deaths: outcome.new_deaths,
            r_eff,
            vaccines_available: information.vaccine_supply,
            wave: information.wave,
        })
    }

    pub fn population_total(&self) -> f64 {
        self.compartments.living().sum()
    }

    pub fn infectious_total(&self) -> f64 {
        self.compartments.infectious_total()
    }

    pub fn deaths_total(&self) -> f64 {
        self.compartments.d.sum()
    }

    /// Years of life lost given remaining life expectancy per age group.
    pub fn yll(&self, life_years_remaining: &[f64]) -> f64 {
        self.compartments
            .d
            .indexed()
            .map(|(_, a, deaths)| deaths * life_years_remaining.get(a).copied().unwrap_or(0.0))
            .sum()
    }

    /// Doses still useful per cell: susceptibles minus those vaccinated without protection.
    pub fn vaccination_demand(&self, efficacy: f64) -> Grid {
        self.compartments
            .s
            .zip_map(&self.compartments.v, |s, v| (s - (1.0 - efficacy) * v).max(0.0))
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.compartments;
        write!(
            f,
            "Date: {} (step {})\nS: {:.0} E1: {:.0} E2: {:.0} A: {:.0} I: {:.0} R: {:.0} D: {:.0} V: {:.0}\nNew infected: {:.0}, new deaths: {:.0}, R_eff: {:.2}, vaccines available: {:.0}",
            self.date,
            self.time_step,
            c.s.sum(),
            c.e1.sum(),
            c.e2.sum(),
            c.a.sum(),
            c.i.sum(),
            c.r.sum(),
            c.d.sum(),
            c.v.sum(),
            self.new_infected.sum(),
            self.new_deaths.sum(),
            self.r_eff,
            self.vaccines_available
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Compartments {
        Compartments::susceptible(&Grid::filled(2, 2, 100.0))
    }

    #[test]
    fn test_seed_moves_mass() {
        let mut c = small();
        c.seed(Compartment::A, 1, 0, 5.0);
        assert_eq!(c.s[(1, 0)], 95.0);
        assert_eq!(c.a[(1, 0)], 5.0);
        assert_eq!(c.mass(), 400.0);
        assert_eq!(c.infectious_total(), 5.0);
    }

    #[test]
    fn test_seed_is_capped_by_susceptibles() {
        let mut c = small();
        c.seed(Compartment::I, 0, 0, 500.0);
        assert_eq!(c.s[(0, 0)], 0.0);
        assert_eq!(c.i[(0, 0)], 100.0);
    }

    #[test]
    fn test_enforce_non_negative_clips_noise() {
        let mut c = small();
        c.e1[(0, 1)] = -1e-9;
        c.enforce_non_negative().unwrap();
        assert_eq!(c.e1[(0, 1)], 0.0);
    }

    #[test]
    fn test_enforce_non_negative_rejects_real_negatives() {
        let mut c = small();
        c.i[(1, 1)] = -2.0;
        match c.enforce_non_negative() {
            Err(VaxError::NegativeCompartment {
                compartment,
                region,
                age_group,
                ..
            }) => {
                assert_eq!(compartment, "I");
                assert_eq!((region, age_group), (1, 1));
            }
            other => panic!("Expected NegativeCompartment, got {:?}", other),
        }
    }

    #[test]
    fn test_demand_excludes_unprotected_vaccinated() {
        let config = ModelConfig::default();
        let mut c = small();
        c.v[(0, 0)] = 40.0;
        let date = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
        let state = State::initial(c, date, &config, 0.0);
        let demand = state.vaccination_demand(0.9);
        assert!((demand[(0, 0)] - 96.0).abs() < 1e-9);
        assert_eq!(demand[(1, 1)], 100.0);
    }

    #[test]
    fn test_yll_weights_deaths_by_age() {
        let config = ModelConfig::default();
        let mut c = small();
        c.d[(0, 0)] = 2.0;
        c.d[(1, 1)] = 1.0;
        let date = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
        let state = State::initial(c, date, &config, 0.0);
        assert_eq!(state.yll(&[50.0, 10.0]), 110.0);
    }
}

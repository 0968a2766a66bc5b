//! # Exogenous Information
//!
//! Inputs to each decision period that no policy controls: vaccine supply,
//! scheduled infection waves, and the control measures (contact weights and
//! infectiousness alphas) fed back from the observed trend of new cases.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Bound::{Excluded, Included};
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::{Result, VaxError};
use crate::model::{State, WaveContext, WaveState};
use crate::rng::RandomNumberGenerator;

/// Mean and deviation of the contact multiplier during a wave week.
const WAVE_STRENGTH_MEAN: f64 = 2.0;
const WAVE_STRENGTH_SD: f64 = 0.1;

/// Period-over-period growth above which the trend counts as increasing.
const INCREASING_RATE: f64 = 1.15;
/// Growth below which the trend counts as decreasing.
const DECREASING_RATE: f64 = 0.85;
/// An increasing trend also needs this share of the peak new cases.
const PEAK_SHARE: f64 = 0.1;

pub const DEFAULT_WAVE_DURATION: usize = 3;

/// Doses delivered between two dates.
pub trait VaccineSupply: fmt::Debug + Send + Sync {
    /// Doses delivered in the date range `(from, to]`.
    fn doses(&self, from: NaiveDate, to: NaiveDate) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoSupply;

impl VaccineSupply for NoSupply {
    fn doses(&self, _from: NaiveDate, _to: NaiveDate) -> f64 {
        0.0
    }
}

/// The same number of doses every decision period.
#[derive(Debug, Clone, Copy)]
pub struct ConstantSupply {
    pub doses_per_period: f64,
}

impl ConstantSupply {
    pub fn new(doses_per_period: f64) -> Self {
        Self { doses_per_period }
    }
}

impl VaccineSupply for ConstantSupply {
    fn doses(&self, _from: NaiveDate, _to: NaiveDate) -> f64 {
        self.doses_per_period.max(0.0)
    }
}

/// Dated delivery series. Each person needs two doses, so only half of the
/// delivered doses count towards single-dose allocation.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct HistoricSupply {
    deliveries: BTreeMap<NaiveDate, f64>,
}

impl HistoricSupply {
    pub fn new<I>(deliveries: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let mut series = BTreeMap::new();
        for (date, doses) in deliveries {
            *series.entry(date).or_insert(0.0) += doses;
        }
        Self {
            deliveries: series,
        }
    }

    /// Persons that can be vaccinated from deliveries in `(from, to]`.
    ///
    /// # Errors
    ///
    /// Returns `VaxError::DataGap` when the series has no entry in the range.
    pub fn lookup(&self, from: NaiveDate, to: NaiveDate) -> Result<f64> {
        if to <= from {
            return Ok(0.0);
        }
        let mut entries = self
            .deliveries
            .range((Excluded(from), Included(to)))
            .peekable();
        if entries.peek().is_none() {
            return Err(VaxError::DataGap(format!(
                "no vaccine deliveries recorded between {} and {}",
                from, to
            )));
        }
        let doses: f64 = entries.map(|(_, &d)| d).sum();
        Ok((doses / 2.0).floor())
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }
}

impl VaccineSupply for HistoricSupply {
    fn doses(&self, from: NaiveDate, to: NaiveDate) -> f64 {
        match self.lookup(from, to) {
            Ok(doses) => doses,
            Err(e) => {
                debug!(error = %e, "treating missing supply data as zero");
                0.0
            }
        }
    }
}

/// Decision periods (weeks) during which an infection wave pushes contacts up.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaveSchedule {
    weeks: BTreeSet<usize>,
}

impl WaveSchedule {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn explicit<I: IntoIterator<Item = usize>>(weeks: I) -> Self {
        Self {
            weeks: weeks.into_iter().collect(),
        }
    }

    /// One to three waves with uniformly placed starts, each lasting
    /// `wave_duration` weeks and truncated at the horizon.
    pub fn random(horizon: usize, wave_duration: usize, rng: &mut RandomNumberGenerator) -> Self {
        let mut weeks = BTreeSet::new();
        if horizon == 0 {
            return Self { weeks };
        }
        let waves: usize = rng.gen_range(1..=3);
        for _ in 0..waves {
            let start = rng.gen_range(0..horizon);
            weeks.extend(start..(start + wave_duration).min(horizon));
        }
        Self { weeks }
    }

    pub fn is_wave_week(&self, week: usize) -> bool {
        self.weeks.contains(&week)
    }

    pub fn weeks(&self) -> impl Iterator<Item = usize> + '_ {
        self.weeks.iter().copied()
    }
}

/// How contact weights and alphas respond to the epidemic.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// Waves and the feedback law move weights within their bounds.
    Adaptive,
    /// Weights and alphas stay at their initial values.
    Fixed,
}

/// Contact weights, alphas and wave context for the coming period.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlUpdate {
    pub contact_weights: Vec<f64>,
    pub alphas: Vec<f64>,
    pub wave: WaveContext,
}

/// Tracks the trend of new cases and derives the control measures from it.
#[derive(Debug, Clone)]
pub struct ControlMeasures {
    mode: ControlMode,
    schedule: WaveSchedule,
    min_weights: Vec<f64>,
    max_weights: Vec<f64>,
    min_alphas: Vec<f64>,
    max_alphas: Vec<f64>,
    occurrences: [usize; 3],
    current: WaveContext,
}

impl ControlMeasures {
    pub fn new(config: &ModelConfig, mode: ControlMode, schedule: WaveSchedule) -> Self {
        let current = WaveContext::default();
        let mut occurrences = [0; 3];
        occurrences[current.state.index()] = current.occurrence;
        Self {
            mode,
            schedule,
            min_weights: config.min_contact_weights.clone(),
            max_weights: config.initial_contact_weights.clone(),
            min_alphas: config.min_alphas.clone(),
            max_alphas: config.initial_alphas.clone(),
            occurrences,
            current,
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn schedule(&self) -> &WaveSchedule {
        &self.schedule
    }

    pub fn wave(&self) -> WaveContext {
        self.current
    }

    /// Classifies the trend at the end of `path` and returns the measures
    /// for the next period.
    ///
    /// `path` must hold at least the current state; the trend needs three.
    pub fn update(
        &mut self,
        path: &[State],
        population_total: f64,
        decision_period: usize,
        periods_per_day: usize,
        rng: &mut RandomNumberGenerator,
    ) -> Result<ControlUpdate> {
        let state = path.last().ok_or_else(|| {
            VaxError::Simulation("control measures need at least one state".to_string())
        })?;
        let mut weights = state.contact_weights.clone();
        let mut alphas = state.alphas.clone();

        let week = state.time_step / decision_period.max(1);
        if self.mode == ControlMode::Adaptive && self.schedule.is_wave_week(week) {
            let strength = rng.normal(WAVE_STRENGTH_MEAN, WAVE_STRENGTH_SD);
            debug!(week, strength, "infection wave");
            scale(&mut weights, strength);
            scale(&mut alphas, strength);
        }

        let mut trend = WaveState::Neutral;
        if path.len() > 2 {
            let current = state.new_infected.sum();
            let historic = path[path.len() - 3].new_infected.sum();
            let days = decision_period as f64 / periods_per_day.max(1) as f64;
            let rate = if historic > 0.0 {
                current / historic
            } else {
                0.0
            };
            let peak = path
                .iter()
                .map(|s| s.new_infected.sum())
                .fold(0.0, f64::max);
            let per_100k = if population_total > 0.0 {
                state.compartments.i.sum() / (population_total / 1e5)
            } else {
                0.0
            };
            let slope = (current - historic) / days;
            let factor = 4.0 / ((1.0 + (0.005 * slope).exp()) * (1.0 + (0.01 * per_100k).exp()));

            if rate > INCREASING_RATE && current > PEAK_SHARE * peak {
                trend = WaveState::Up;
            } else if rate < DECREASING_RATE {
                trend = WaveState::Down;
            }
            debug!(
                ?trend,
                rate, slope, per_100k, factor, "control measure feedback"
            );
            if self.mode == ControlMode::Adaptive && trend != WaveState::Neutral {
                scale(&mut weights, factor);
                scale(&mut alphas, factor);
            }
        }

        match self.mode {
            ControlMode::Adaptive => {
                clip(&mut weights, &self.min_weights, &self.max_weights);
                clip(&mut alphas, &self.min_alphas, &self.max_alphas);
            }
            ControlMode::Fixed => {
                weights = self.max_weights.clone();
                alphas = self.max_alphas.clone();
            }
        }

        self.enter(trend);
        Ok(ControlUpdate {
            contact_weights: weights,
            alphas,
            wave: self.current,
        })
    }

    fn enter(&mut self, trend: WaveState) {
        if trend != self.current.state {
            self.occurrences[trend.index()] += 1;
            self.current = WaveContext {
                state: trend,
                occurrence: self.occurrences[trend.index()],
            };
        }
    }
}

fn scale(values: &mut [f64], factor: f64) {
    values.iter_mut().for_each(|v| *v *= factor);
}

fn clip(values: &mut [f64], min: &[f64], max: &[f64]) {
    for ((v, &lo), &hi) in values.iter_mut().zip(min).zip(max) {
        *v = v.clamp(lo, hi);
    }
}

//! Fitness estimation: one stochastic rollout of the decision process per seed.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{Result, VaxError};
use crate::model::{Compartments, EpidemicModel, PopulationTable, State};
use crate::process::{
    DecisionProcess, NoSupply, PolicyKind, PolicyWeights, ProcessVariant, StrategyUsage,
    VaccineSupply, WaveSchedule, WeightedPolicy, DEFAULT_WAVE_DURATION,
};
use crate::rng::RandomNumberGenerator;

/// Share of cumulative infections counted by the weighted objective.
const INFECTION_WEIGHT: f64 = 0.01;

/// Epidemiological cost to minimise, evaluated on the final state of a rollout.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Objective {
    /// Total deaths.
    Deaths,
    /// Deaths plus 1% of cumulative infections.
    Weighted,
    /// Years of life lost.
    Yll,
}

impl Objective {
    pub const ALL: [Objective; 3] = [Objective::Deaths, Objective::Weighted, Objective::Yll];

    pub fn name(&self) -> &'static str {
        match self {
            Objective::Deaths => "deaths",
            Objective::Weighted => "weighted",
            Objective::Yll => "yll",
        }
    }

    pub fn evaluate(&self, state: &State, life_years_remaining: &[f64]) -> f64 {
        match self {
            Objective::Deaths => state.deaths_total(),
            Objective::Weighted => {
                INFECTION_WEIGHT * state.total_infected.sum() + state.deaths_total()
            }
            Objective::Yll => state.yll(life_years_remaining),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Objective {
    type Err = VaxError;

    fn from_str(s: &str) -> Result<Self> {
        Objective::ALL
            .iter()
            .find(|o| o.name() == s)
            .copied()
            .ok_or_else(|| {
                VaxError::Configuration(format!(
                    "unknown objective '{}', expected deaths, weighted or yll",
                    s
                ))
            })
    }
}

/// Score of a single rollout and the decisions it made per wave context.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutScore {
    pub score: f64,
    pub strategy_usage: StrategyUsage,
}

impl RolloutScore {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            strategy_usage: StrategyUsage::new(),
        }
    }
}

/// Evaluates a weight tensor once for a given seed.
///
/// The same `(genes, seed)` pair must always give the same score.
pub trait Challenge {
    fn score(&self, genes: &PolicyWeights, seed: u64) -> Result<RolloutScore>;

    /// Number of base policies a weight row blends.
    fn slots(&self) -> usize {
        PolicyKind::DEFAULT_SLOTS.len()
    }
}

/// Where a rollout's infection waves come from.
#[derive(Debug, Clone)]
pub enum WaveSource {
    /// Drawn from the rollout's own random source.
    Random { duration: usize },
    Fixed(WaveSchedule),
}

impl Default for WaveSource {
    fn default() -> Self {
        WaveSource::Random {
            duration: DEFAULT_WAVE_DURATION,
        }
    }
}

/// Runs a fresh [`DecisionProcess`] driven by a [`WeightedPolicy`] per rollout.
#[derive(Debug, Clone)]
pub struct ProcessChallenge {
    model: EpidemicModel,
    population: Arc<PopulationTable>,
    initial_compartments: Compartments,
    start_date: NaiveDate,
    initial_supply: f64,
    horizon: usize,
    decision_period: Option<usize>,
    supply: Arc<dyn VaccineSupply>,
    variant: ProcessVariant,
    waves: WaveSource,
    slots: Vec<PolicyKind>,
    objective: Objective,
}

impl ProcessChallenge {
    /// # Errors
    ///
    /// Returns a configuration error when the model, the compartments and
    /// the population disagree in shape.
    pub fn new(
        model: EpidemicModel,
        population: Arc<PopulationTable>,
        initial_compartments: Compartments,
        start_date: NaiveDate,
        horizon: usize,
        objective: Objective,
    ) -> Result<Self> {
        model.check_shape(&initial_compartments)?;
        if population.shape() != initial_compartments.shape() {
            return Err(VaxError::Configuration(format!(
                "population has shape {:?}, initial compartments have {:?}",
                population.shape(),
                initial_compartments.shape()
            )));
        }
        Ok(Self {
            model,
            population,
            initial_compartments,
            start_date,
            initial_supply: 0.0,
            horizon,
            decision_period: None,
            supply: Arc::new(NoSupply),
            variant: ProcessVariant::default(),
            waves: WaveSource::default(),
            slots: PolicyKind::DEFAULT_SLOTS.to_vec(),
            objective,
        })
    }

    pub fn with_supply(mut self, supply: Arc<dyn VaccineSupply>, initial_supply: f64) -> Self {
        self.supply = supply;
        self.initial_supply = initial_supply;
        self
    }

    pub fn with_variant(mut self, variant: ProcessVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_waves(mut self, waves: WaveSource) -> Self {
        self.waves = waves;
        self
    }

    pub fn with_slots(mut self, slots: Vec<PolicyKind>) -> Self {
        self.slots = slots;
        self
    }

    pub fn with_decision_period(mut self, decision_period: usize) -> Self {
        self.decision_period = Some(decision_period);
        self
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Builds the process a rollout with `genes` would run.
    pub fn process(
        &self,
        genes: &PolicyWeights,
        rng: &mut RandomNumberGenerator,
    ) -> Result<DecisionProcess> {
        let policy = WeightedPolicy::new(self.slots.clone(), Arc::new(genes.clone()))?;
        let initial_state = State::initial(
            self.initial_compartments.clone(),
            self.start_date,
            self.model.config(),
            self.initial_supply,
        );
        let schedule = match &self.waves {
            WaveSource::Random { duration } => WaveSchedule::random(self.horizon, *duration, rng),
            WaveSource::Fixed(schedule) => schedule.clone(),
        };
        let mut process = DecisionProcess::new(
            self.model.clone(),
            self.population.clone(),
            initial_state,
            self.horizon,
            Box::new(policy),
        )?
        .with_supply(self.supply.clone())
        .with_variant(self.variant)
        .with_wave_schedule(schedule);
        if let Some(period) = self.decision_period {
            process = process.with_decision_period(period)?;
        }
        Ok(process)
    }
}

impl Challenge for ProcessChallenge {
    fn score(&self, genes: &PolicyWeights, seed: u64) -> Result<RolloutScore> {
        let mut rng = RandomNumberGenerator::from_seed(seed);
        let mut process = self.process(genes, &mut rng)?;
        process.run(&mut rng)?;
        let score = self
            .objective
            .evaluate(process.state(), &self.model.config().life_years_remaining);
        Ok(RolloutScore {
            score,
            strategy_usage: process.strategy_usage().clone(),
        })
    }

    fn slots(&self) -> usize {
        self.slots.len()
    }
}

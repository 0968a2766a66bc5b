//! # DecisionProcess
//!
//! The controlled Markov chain over decision periods. Each step asks the
//! allocation policy for a decision, gathers the exogenous information for
//! the period and advances the `State` through the epidemic model. The run
//! ends at the horizon or as soon as a stopping criterion holds; the
//! traversed path of states is the observable output.

use chrono::Duration;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::exogenous::{ControlMeasures, ControlMode, NoSupply, VaccineSupply, WaveSchedule};
use super::policy::{enforce_feasibility, AllocationContext, AllocationPolicy, PolicyKind};
use crate::error::{Result, VaxError};
use crate::model::{EpidemicModel, ExogenousInfo, PopulationTable, State, WaveState};
use crate::rng::RandomNumberGenerator;

/// Conditions under which a run ends before the horizon.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoppingCriteria {
    /// Stop once recovered people exceed this share of the population.
    pub recovered_fraction: f64,
    /// Stop once E1 + E2 + A + I falls below this count.
    pub infectious_epsilon: f64,
}

impl StoppingCriteria {
    /// Thresholds of the multi-policy process: 90% recovered.
    pub fn extended() -> Self {
        Self {
            recovered_fraction: 0.9,
            infectious_epsilon: 0.1,
        }
    }

    /// Thresholds of the process driven by historic data: 70% recovered.
    pub fn historic() -> Self {
        Self {
            recovered_fraction: 0.7,
            infectious_epsilon: 0.1,
        }
    }

    pub fn check(&self, state: &State, population_total: f64) -> Option<StopReason> {
        if population_total > 0.0
            && state.compartments.r.sum() / population_total > self.recovered_fraction
        {
            return Some(StopReason::RecoveredThreshold);
        }
        if state.infectious_total() < self.infectious_epsilon {
            return Some(StopReason::NoInfections);
        }
        None
    }
}

impl Default for StoppingCriteria {
    fn default() -> Self {
        Self::extended()
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    RecoveredThreshold,
    NoInfections,
    Horizon,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::RecoveredThreshold => write!(f, "recovered population above threshold"),
            StopReason::NoInfections => write!(f, "infected population is zero"),
            StopReason::Horizon => write!(f, "horizon reached"),
        }
    }
}

/// Stopping thresholds and control-measure behaviour of one process flavour.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessVariant {
    pub stopping: StoppingCriteria,
    pub control: ControlMode,
}

impl ProcessVariant {
    /// Adaptive control measures, stop at 90% recovered.
    pub fn extended() -> Self {
        Self {
            stopping: StoppingCriteria::extended(),
            control: ControlMode::Adaptive,
        }
    }

    /// Fixed control measures, stop at 70% recovered.
    pub fn historic() -> Self {
        Self {
            stopping: StoppingCriteria::historic(),
            control: ControlMode::Fixed,
        }
    }
}

impl Default for ProcessVariant {
    fn default() -> Self {
        Self::extended()
    }
}

/// Decisions made per (wave state, occurrence).
pub type StrategyUsage = BTreeMap<(WaveState, usize), usize>;

#[derive(Debug)]
pub struct DecisionProcess {
    model: EpidemicModel,
    population: Arc<PopulationTable>,
    horizon: usize,
    decision_period: usize,
    policy: Box<dyn AllocationPolicy>,
    supply: Arc<dyn VaccineSupply>,
    variant: ProcessVariant,
    control: ControlMeasures,
    flow_scale: f64,
    path: Vec<State>,
    strategy_usage: StrategyUsage,
    stop_reason: Option<StopReason>,
}

impl DecisionProcess {
    /// Creates a process that runs for `horizon` decision periods.
    ///
    /// The decision period defaults to one week of sub-steps, supply to none,
    /// and the variant to [`ProcessVariant::extended`] without waves.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the model, the population and the
    /// initial state disagree on the number of regions or age groups.
    pub fn new(
        model: EpidemicModel,
        population: Arc<PopulationTable>,
        initial_state: State,
        horizon: usize,
        policy: Box<dyn AllocationPolicy>,
    ) -> Result<Self> {
        model.check_shape(&initial_state.compartments)?;
        if population.shape() != initial_state.compartments.shape() {
            return Err(VaxError::Configuration(format!(
                "population has shape {:?}, initial state has {:?}",
                population.shape(),
                initial_state.compartments.shape()
            )));
        }
        let variant = ProcessVariant::default();
        let control = ControlMeasures::new(model.config(), variant.control, WaveSchedule::none());
        Ok(Self {
            decision_period: model.config().decision_period(),
            model,
            population,
            horizon,
            policy,
            supply: Arc::new(NoSupply),
            variant,
            control,
            flow_scale: 1.0,
            path: vec![initial_state],
            strategy_usage: StrategyUsage::new(),
            stop_reason: None,
        })
    }

    /// Like [`DecisionProcess::new`] with a base policy given by name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown policy name.
    pub fn with_policy_name(
        model: EpidemicModel,
        population: Arc<PopulationTable>,
        initial_state: State,
        horizon: usize,
        policy: &str,
    ) -> Result<Self> {
        let kind: PolicyKind = policy.parse()?;
        Self::new(model, population, initial_state, horizon, kind.build())
    }

    /// # Errors
    ///
    /// Returns a configuration error for a zero-length period.
    pub fn with_decision_period(mut self, decision_period: usize) -> Result<Self> {
        if decision_period == 0 {
            return Err(VaxError::Configuration(
                "decision period must be at least one sub-step".to_string(),
            ));
        }
        self.decision_period = decision_period;
        Ok(self)
    }

    pub fn with_supply(mut self, supply: Arc<dyn VaccineSupply>) -> Self {
        self.supply = supply;
        self
    }

    pub fn with_variant(mut self, variant: ProcessVariant) -> Self {
        self.variant = variant;
        self.control = ControlMeasures::new(
            self.model.config(),
            variant.control,
            self.control.schedule().clone(),
        );
        self
    }

    pub fn with_wave_schedule(mut self, schedule: WaveSchedule) -> Self {
        self.control = ControlMeasures::new(self.model.config(), self.variant.control, schedule);
        self
    }

    pub fn with_flow_scale(mut self, flow_scale: f64) -> Self {
        self.flow_scale = flow_scale;
        self
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn decision_period(&self) -> usize {
        self.decision_period
    }

    pub fn variant(&self) -> ProcessVariant {
        self.variant
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn state(&self) -> &State {
        // The path always holds the initial state.
        &self.path[self.path.len() - 1]
    }

    pub fn path(&self) -> &[State] {
        &self.path
    }

    pub fn strategy_usage(&self) -> &StrategyUsage {
        &self.strategy_usage
    }

    /// Why the last run ended, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Advances decision periods until the horizon or a stopping criterion.
    ///
    /// # Errors
    ///
    /// Propagates policy and simulation errors; a negative compartment aborts
    /// the run.
    pub fn run(&mut self, rng: &mut RandomNumberGenerator) -> Result<&[State]> {
        info!(
            policy = self.policy.name(),
            horizon = self.horizon,
            "running decision process"
        );
        let population_total = self.population.total();
        let start = self.state().time_step / self.decision_period;
        self.stop_reason = Some(StopReason::Horizon);
        for week in start..self.horizon {
            if let Some(reason) = self.variant.stopping.check(self.state(), population_total) {
                info!(week, %reason, "reached stopping criterion");
                self.stop_reason = Some(reason);
                break;
            }
            self.update_state(rng)?;
        }
        Ok(&self.path)
    }

    /// Decides, gathers exogenous information and transitions one period.
    pub fn update_state(&mut self, rng: &mut RandomNumberGenerator) -> Result<&State> {
        let state = &self.path[self.path.len() - 1];
        let config = self.model.config();

        let context = AllocationContext::new(state, &self.population, config.efficacy);
        let proposal = self.policy.allocate(&context, rng)?;
        let decision = enforce_feasibility(&proposal, &context.demand(), context.supply());
        *self
            .strategy_usage
            .entry((state.wave.state, state.wave.occurrence))
            .or_insert(0) += 1;

        let control = self.control.update(
            &self.path,
            self.population.total(),
            self.decision_period,
            config.periods_per_day,
            rng,
        )?;
        let days = (self.decision_period / config.periods_per_day) as i64;
        let vaccine_supply = self
            .supply
            .doses(state.date, state.date + Duration::days(days));
        debug!(
            date = %state.date,
            doses = decision.sum(),
            vaccine_supply,
            wave = ?control.wave,
            "decision period"
        );
        let information = ExogenousInfo {
            r_eff: config.r0,
            contact_weights: control.contact_weights,
            alphas: control.alphas,
            flow_scale: self.flow_scale,
            vaccine_supply,
            wave: control.wave,
        };
        let next = state.transition(
            &decision,
            &information,
            &self.model,
            self.decision_period,
            rng,
        )?;
        self.path.push(next);
        Ok(self.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::grid::Grid;
    use crate::model::{
        CommuterFlows, Compartment, Compartments, ContactMatrices, ContactMatrix, Mobility,
    };
    use chrono::NaiveDate;

    fn single_cell_process(policy: &str) -> Result<DecisionProcess> {
        let config = Arc::new(
            ModelConfig::builder()
                .fatality_rates(vec![0.01])
                .life_years_remaining(vec![40.0])
                .build()?,
        );
        let contexts = (0..4)
            .map(|i| ContactMatrix {
                context: format!("context_{}", i),
                matrix: vec![vec![0.25]],
            })
            .collect();
        let mobility = Arc::new(Mobility::new(
            CommuterFlows::none(1, 1),
            ContactMatrices::new(contexts),
            vec![1.0],
        ));
        let model = EpidemicModel::new(config.clone(), mobility, 1, false)?;
        let counts = Grid::filled(1, 1, 1000.0);
        let population = Arc::new(PopulationTable::from_counts(counts.clone())?);
        let mut compartments = Compartments::susceptible(&counts);
        compartments.seed(Compartment::A, 0, 0, 1.0);
        let date = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
        let state = State::initial(compartments, date, &config, 0.0);
        DecisionProcess::with_policy_name(model, population, state, 10, policy)
    }

    #[test]
    fn test_unknown_policy_is_configuration_error() {
        match single_cell_process("tallest_first") {
            Err(VaxError::Configuration(msg)) => assert!(msg.contains("tallest_first")),
            other => panic!("Expected configuration error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_run_advances_weekly() {
        let mut process = single_cell_process("no_vaccines").unwrap();
        let mut rng = RandomNumberGenerator::from_seed(5);
        let path = process.run(&mut rng).unwrap();
        assert!(path.len() > 1);
        let first = &path[0];
        let second = &path[1];
        assert_eq!(second.time_step, 28);
        assert_eq!(second.date - first.date, Duration::days(7));
        let decisions: usize = process.strategy_usage().values().sum();
        assert_eq!(decisions, process.path().len() - 1);
    }

    #[test]
    fn test_stopping_criteria_thresholds() {
        let config = ModelConfig::default();
        let mut compartments = Compartments::susceptible(&Grid::filled(1, 8, 100.0));
        for a in 0..8 {
            compartments.s[(0, a)] = 20.0;
            compartments.r[(0, a)] = 80.0;
        }
        compartments.i[(0, 0)] = 5.0;
        let date = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
        let state = State::initial(compartments, date, &config, 0.0);
        assert_eq!(
            StoppingCriteria::historic().check(&state, 800.0),
            Some(StopReason::RecoveredThreshold)
        );
        assert_eq!(StoppingCriteria::extended().check(&state, 800.0), None);
    }
}

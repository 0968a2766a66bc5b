//! # Allocation Policies
//!
//! A policy turns the current `State` into a vaccine decision: doses per
//! region and age group for the coming period. Every policy implements
//! [`AllocationPolicy`]; the named base policies are selected through
//! [`PolicyKind`], and [`WeightedPolicy`] blends base policies with a row of
//! the policy-weight tensor chosen by the current wave context.
//!
//! Whatever a policy computes, [`enforce_feasibility`] is applied last: no
//! cell receives more than its demand and the total never exceeds supply.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::weights::PolicyWeights;
use crate::error::{Result, VaxError};
use crate::grid::Grid;
use crate::model::{PopulationTable, State, WaveState};
use crate::rng::RandomNumberGenerator;

/// Number of chunks the random policy splits the supply into.
const RANDOM_ALLOCATION_CHUNKS: f64 = 1000.0;

/// Amounts below this are treated as exhausted.
const ALLOCATION_EPSILON: f64 = 1e-9;

/// Age-group priority of the adults-first policy for the standard eight groups.
pub const ADULTS_FIRST_ORDER: [usize; 8] = [3, 4, 5, 6, 7, 2, 1, 0];

/// Everything a policy may look at when deciding.
#[derive(Debug, Clone, Copy)]
pub struct AllocationContext<'a> {
    pub state: &'a State,
    pub population: &'a PopulationTable,
    pub efficacy: f64,
}

impl<'a> AllocationContext<'a> {
    pub fn new(state: &'a State, population: &'a PopulationTable, efficacy: f64) -> Self {
        Self {
            state,
            population,
            efficacy,
        }
    }

    /// Doses that can still be put to use per cell.
    pub fn demand(&self) -> Grid {
        self.state.vaccination_demand(self.efficacy)
    }

    pub fn supply(&self) -> f64 {
        self.state.vaccines_available.max(0.0)
    }
}

/// Produces a vaccine decision from the current state.
pub trait AllocationPolicy: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Computes doses per region and age group.
    ///
    /// Implementations may return an infeasible grid; callers pass the result
    /// through [`enforce_feasibility`].
    fn allocate(
        &self,
        context: &AllocationContext<'_>,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Grid>;
}

/// Clamps `decision` to `demand` cell by cell and scales it down to `supply`.
pub fn enforce_feasibility(decision: &Grid, demand: &Grid, supply: f64) -> Grid {
    let clamped = decision.minimum(demand).clip_min(0.0);
    let total = clamped.sum();
    let supply = supply.max(0.0);
    if total > supply && total > 0.0 {
        clamped.scale(supply / total)
    } else {
        clamped
    }
}

/// The named base policies.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    NoVaccines,
    Random,
    SusceptibleBased,
    InfectionBased,
    OldestFirst,
    AdultsFirst,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 6] = [
        PolicyKind::NoVaccines,
        PolicyKind::Random,
        PolicyKind::SusceptibleBased,
        PolicyKind::InfectionBased,
        PolicyKind::OldestFirst,
        PolicyKind::AdultsFirst,
    ];

    /// Weight slots of the default policy-weight tensor.
    pub const DEFAULT_SLOTS: [PolicyKind; 4] = [
        PolicyKind::SusceptibleBased,
        PolicyKind::InfectionBased,
        PolicyKind::OldestFirst,
        PolicyKind::AdultsFirst,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::NoVaccines => "no_vaccines",
            PolicyKind::Random => "random",
            PolicyKind::SusceptibleBased => "susceptible_based",
            PolicyKind::InfectionBased => "infection_based",
            PolicyKind::OldestFirst => "oldest_first",
            PolicyKind::AdultsFirst => "adults_first",
        }
    }

    pub fn build(&self) -> Box<dyn AllocationPolicy> {
        match self {
            PolicyKind::NoVaccines => Box::new(NoVaccines),
            PolicyKind::Random => Box::new(RandomAllocation),
            PolicyKind::SusceptibleBased => Box::new(SusceptibleBased),
            PolicyKind::InfectionBased => Box::new(InfectionBased),
            PolicyKind::OldestFirst => Box::new(OldestFirst),
            PolicyKind::AdultsFirst => Box::new(AdultsFirst::default()),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolicyKind {
    type Err = VaxError;

    fn from_str(s: &str) -> Result<Self> {
        PolicyKind::ALL
            .iter()
            .find(|kind| kind.name() == s)
            .copied()
            .ok_or_else(|| {
                VaxError::Configuration(format!(
                    "unknown policy '{}', expected one of: {}",
                    s,
                    PolicyKind::ALL
                        .iter()
                        .map(|k| k.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoVaccines;

impl AllocationPolicy for NoVaccines {
    fn name(&self) -> &str {
        PolicyKind::NoVaccines.name()
    }

    fn allocate(
        &self,
        context: &AllocationContext<'_>,
        _rng: &mut RandomNumberGenerator,
    ) -> Result<Grid> {
        let (regions, age_groups) = context.state.compartments.shape();
        Ok(Grid::zeros(regions, age_groups))
    }
}

/// Hands out the supply in small chunks to uniformly drawn cells with demand left.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomAllocation;

impl AllocationPolicy for RandomAllocation {
    fn name(&self) -> &str {
        PolicyKind::Random.name()
    }

    fn allocate(
        &self,
        context: &AllocationContext<'_>,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Grid> {
        let demand = context.demand();
        let mut remaining_demand = demand.clone();
        let mut decision = Grid::zeros(demand.regions(), demand.age_groups());
        let mut remaining = context.supply();
        let chunk = (remaining / RANDOM_ALLOCATION_CHUNKS).max(1.0);

        while remaining > ALLOCATION_EPSILON {
            let open: Vec<(usize, usize)> = remaining_demand
                .indexed()
                .filter(|&(_, _, d)| d > ALLOCATION_EPSILON)
                .map(|(r, a, _)| (r, a))
                .collect();
            if open.is_empty() {
                break;
            }
            let (r, a) = open[rng.gen_range(0..open.len())];
            let amount = chunk.min(remaining).min(remaining_demand[(r, a)]);
            decision[(r, a)] += amount;
            remaining_demand[(r, a)] -= amount;
            remaining -= amount;
        }
        Ok(decision)
    }
}

/// Supply split in proportion to each cell's vaccination demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct SusceptibleBased;

impl AllocationPolicy for SusceptibleBased {
    fn name(&self) -> &str {
        PolicyKind::SusceptibleBased.name()
    }

    fn allocate(
        &self,
        context: &AllocationContext<'_>,
        _rng: &mut RandomNumberGenerator,
    ) -> Result<Grid> {
        let demand = context.demand();
        Ok(proportional(&demand, &demand, context.supply()))
    }
}

/// Supply split across regions by their share of all symptomatic cases, then
/// by demand within a region.
///
/// Falls back to [`SusceptibleBased`] when nobody is symptomatic.
#[derive(Debug, Clone, Copy, Default)]
pub struct InfectionBased;

impl AllocationPolicy for InfectionBased {
    fn name(&self) -> &str {
        PolicyKind::InfectionBased.name()
    }

    fn allocate(
        &self,
        context: &AllocationContext<'_>,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Grid> {
        let infected = &context.state.compartments.i;
        let total_infected = infected.sum();
        if total_infected <= 0.0 {
            return SusceptibleBased.allocate(context, rng);
        }
        let demand = context.demand();
        let supply = context.supply();

        let mut decision = Grid::zeros(demand.regions(), demand.age_groups());
        for (r, region_infected) in infected.region_totals().into_iter().enumerate() {
            let region_supply = supply * region_infected / total_infected;
            let region_demand = demand.region_total(r);
            if region_demand <= 0.0 {
                continue;
            }
            for a in 0..demand.age_groups() {
                decision[(r, a)] = region_supply * demand[(r, a)] / region_demand;
            }
        }
        Ok(decision)
    }
}

/// Serves age groups from the oldest down.
#[derive(Debug, Clone, Copy, Default)]
pub struct OldestFirst;

impl AllocationPolicy for OldestFirst {
    fn name(&self) -> &str {
        PolicyKind::OldestFirst.name()
    }

    fn allocate(
        &self,
        context: &AllocationContext<'_>,
        _rng: &mut RandomNumberGenerator,
    ) -> Result<Grid> {
        let demand = context.demand();
        let order: Vec<usize> = (0..demand.age_groups()).rev().collect();
        Ok(by_age_priority(&order, &demand, context.supply()))
    }
}

/// Serves the age groups that drive transmission first.
#[derive(Debug, Clone)]
pub struct AdultsFirst {
    priority: Vec<usize>,
}

impl AdultsFirst {
    pub fn with_priority(priority: Vec<usize>) -> Self {
        Self { priority }
    }

    /// The priority restricted to existing groups, followed by any group it
    /// leaves out, oldest first.
    fn order(&self, age_groups: usize) -> Vec<usize> {
        let mut order: Vec<usize> = Vec::with_capacity(age_groups);
        for &a in &self.priority {
            if a < age_groups && !order.contains(&a) {
                order.push(a);
            }
        }
        for a in (0..age_groups).rev() {
            if !order.contains(&a) {
                order.push(a);
            }
        }
        order
    }
}

impl Default for AdultsFirst {
    fn default() -> Self {
        Self::with_priority(ADULTS_FIRST_ORDER.to_vec())
    }
}

impl AllocationPolicy for AdultsFirst {
    fn name(&self) -> &str {
        PolicyKind::AdultsFirst.name()
    }

    fn allocate(
        &self,
        context: &AllocationContext<'_>,
        _rng: &mut RandomNumberGenerator,
    ) -> Result<Grid> {
        let demand = context.demand();
        let order = self.order(demand.age_groups());
        Ok(by_age_priority(&order, &demand, context.supply()))
    }
}

/// Blends base policies with the weight row of the current wave context.
#[derive(Debug, Clone)]
pub struct WeightedPolicy {
    slots: Vec<PolicyKind>,
    policies: Arc<Vec<Box<dyn AllocationPolicy>>>,
    weights: Arc<PolicyWeights>,
}

impl WeightedPolicy {
    /// # Errors
    ///
    /// Returns a configuration error when the tensor does not have one row
    /// block per wave state or one slot per base policy.
    pub fn new(slots: Vec<PolicyKind>, weights: Arc<PolicyWeights>) -> Result<Self> {
        if weights.wave_states() != WaveState::ALL.len() {
            return Err(VaxError::Configuration(format!(
                "policy weights need {} wave-state rows, got {}",
                WaveState::ALL.len(),
                weights.wave_states()
            )));
        }
        if weights.slots() != slots.len() || slots.is_empty() {
            return Err(VaxError::Configuration(format!(
                "policy weights have {} slots for {} base policies",
                weights.slots(),
                slots.len()
            )));
        }
        if weights.occurrences() == 0 {
            return Err(VaxError::Configuration(
                "policy weights need at least one occurrence row".to_string(),
            ));
        }
        let policies = slots.iter().map(|kind| kind.build()).collect();
        Ok(Self {
            slots,
            policies: Arc::new(policies),
            weights,
        })
    }

    pub fn slots(&self) -> &[PolicyKind] {
        &self.slots
    }

    pub fn weights(&self) -> &PolicyWeights {
        &self.weights
    }

    /// Weight row for a wave state and 1-based occurrence count.
    pub fn row_for(&self, state: WaveState, occurrence: usize) -> &[f64] {
        let j = occurrence.saturating_sub(1).min(self.weights.occurrences() - 1);
        self.weights.row(state.index(), j)
    }
}

impl AllocationPolicy for WeightedPolicy {
    fn name(&self) -> &str {
        "weighted"
    }

    fn allocate(
        &self,
        context: &AllocationContext<'_>,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Grid> {
        let wave = context.state.wave;
        let row = self.row_for(wave.state, wave.occurrence);
        let demand = context.demand();
        let supply = context.supply();
        let mut decision = Grid::zeros(demand.regions(), demand.age_groups());
        for (policy, &weight) in self.policies.iter().zip(row) {
            if weight <= 0.0 {
                continue;
            }
            let part = policy.allocate(context, rng)?;
            decision.add_assign_scaled(&enforce_feasibility(&part, &demand, supply), weight);
        }
        Ok(decision)
    }
}

/// Splits `supply` over cells in proportion to `weights`, clamped by `demand`.
fn proportional(weights: &Grid, demand: &Grid, supply: f64) -> Grid {
    let total = weights.sum();
    if total <= 0.0 {
        return Grid::zeros(weights.regions(), weights.age_groups());
    }
    weights.map(|w| supply * w / total).minimum(demand)
}

/// Walks `order`, filling each age group's demand until the supply runs out.
///
/// A partially served age group gets the remainder split across regions in
/// proportion to their demand.
fn by_age_priority(order: &[usize], demand: &Grid, supply: f64) -> Grid {
    let mut decision = Grid::zeros(demand.regions(), demand.age_groups());
    let mut remaining = supply;
    for &a in order {
        if remaining <= ALLOCATION_EPSILON {
            break;
        }
        let age_demand = demand.age_total(a);
        if age_demand <= 0.0 {
            continue;
        }
        let share = (remaining / age_demand).min(1.0);
        for r in 0..demand.regions() {
            decision[(r, a)] = demand[(r, a)] * share;
        }
        remaining -= age_demand * share;
    }
    decision
}

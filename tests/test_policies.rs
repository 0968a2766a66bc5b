use std::sync::Arc;

use chrono::NaiveDate;
use vaxopt::{
    config::ModelConfig,
    error::VaxError,
    grid::Grid,
    model::{Compartments, PopulationTable, State, WaveContext, WaveState},
    process::{
        enforce_feasibility, AdultsFirst, AllocationContext, AllocationPolicy, PolicyKind,
        PolicyWeights, WeightedPolicy,
    },
    rng::RandomNumberGenerator,
};

const TOLERANCE: f64 = 1e-6;

/// Three regions with uneven populations, some of them already vaccinated or infected.
fn scenario(seed: u64, supply: f64) -> (State, PopulationTable) {
    let mut rng = RandomNumberGenerator::from_seed(seed);
    let rows = (0..3)
        .map(|_| (0..8).map(|_| rng.gen_range(0..2000) as f64).collect())
        .collect();
    let counts = Grid::from_rows(rows).unwrap();
    let population = PopulationTable::from_counts(counts.clone()).unwrap();
    let mut compartments = Compartments::susceptible(&counts);
    for (r, a, n) in counts.indexed() {
        let infected = (n * rng.uniform() * 0.05).floor();
        let vaccinated = (n * rng.uniform() * 0.2).floor();
        compartments.s[(r, a)] -= infected + vaccinated;
        compartments.i[(r, a)] = infected;
        compartments.r[(r, a)] = vaccinated;
        compartments.v[(r, a)] = vaccinated;
    }
    let date = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
    let state = State::initial(compartments, date, &ModelConfig::default(), supply);
    (state, population)
}

fn assert_feasible(decision: &Grid, demand: &Grid, supply: f64, label: &str) {
    assert!(
        decision.min_value() >= 0.0,
        "{}: negative allocation",
        label
    );
    assert!(
        decision.sum() <= supply + TOLERANCE,
        "{}: allocated {} of {} doses",
        label,
        decision.sum(),
        supply
    );
    for (r, a, doses) in decision.indexed() {
        assert!(
            doses <= demand[(r, a)] + TOLERANCE,
            "{}: cell ({}, {}) got {} for a demand of {}",
            label,
            r,
            a,
            doses,
            demand[(r, a)]
        );
    }
}

#[test]
fn test_every_policy_respects_supply_and_demand() {
    let config = ModelConfig::default();
    for seed in 0..5 {
        for supply in [0.0, 150.0, 2500.0, 1e7] {
            let (state, population) = scenario(seed, supply);
            let context = AllocationContext::new(&state, &population, config.efficacy);
            let demand = context.demand();
            for kind in PolicyKind::ALL {
                let mut rng = RandomNumberGenerator::from_seed(seed);
                let proposal = kind.build().allocate(&context, &mut rng).unwrap();
                assert!(proposal.min_value() >= 0.0, "{}: negative proposal", kind);
                let decision = enforce_feasibility(&proposal, &demand, supply);
                assert_feasible(&decision, &demand, supply, kind.name());
            }
        }
    }
}

#[test]
fn test_abundant_supply_covers_demand() {
    let config = ModelConfig::default();
    let (state, population) = scenario(7, 1e9);
    let context = AllocationContext::new(&state, &population, config.efficacy);
    let demand = context.demand();
    for kind in [
        PolicyKind::SusceptibleBased,
        PolicyKind::OldestFirst,
        PolicyKind::AdultsFirst,
    ] {
        let mut rng = RandomNumberGenerator::from_seed(1);
        let proposal = kind.build().allocate(&context, &mut rng).unwrap();
        let decision = enforce_feasibility(&proposal, &demand, context.supply());
        assert!(
            decision.approx_eq(&demand, 1e-6),
            "{} should vaccinate everyone still in demand",
            kind
        );
    }
}

#[test]
fn test_scarce_supply_is_used_up() {
    let config = ModelConfig::default();
    let (state, population) = scenario(3, 500.0);
    let context = AllocationContext::new(&state, &population, config.efficacy);
    let demand = context.demand();
    assert!(demand.sum() > 500.0);
    for kind in [
        PolicyKind::Random,
        PolicyKind::SusceptibleBased,
        PolicyKind::OldestFirst,
        PolicyKind::AdultsFirst,
    ] {
        let mut rng = RandomNumberGenerator::from_seed(1);
        let proposal = kind.build().allocate(&context, &mut rng).unwrap();
        let decision = enforce_feasibility(&proposal, &demand, 500.0);
        assert!(
            (decision.sum() - 500.0).abs() < 1e-6,
            "{} allocated {}",
            kind,
            decision.sum()
        );
    }
}

#[test]
fn test_infection_based_follows_share_of_cases_not_density() {
    // A small region with a high attack rate next to a large one holding
    // most of the cases.
    let counts = Grid::from_rows(vec![vec![100.0], vec![10_000.0]]).unwrap();
    let population = PopulationTable::from_counts(counts.clone()).unwrap();
    let mut compartments = Compartments::susceptible(&counts);
    compartments.s[(0, 0)] = 90.0;
    compartments.i[(0, 0)] = 10.0;
    compartments.s[(1, 0)] = 9_900.0;
    compartments.i[(1, 0)] = 100.0;
    let date = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
    let state = State::initial(compartments, date, &ModelConfig::default(), 55.0);
    let context = AllocationContext::new(&state, &population, 0.95);

    let mut rng = RandomNumberGenerator::from_seed(1);
    let decision = PolicyKind::InfectionBased
        .build()
        .allocate(&context, &mut rng)
        .unwrap();
    assert!((decision[(0, 0)] - 5.0).abs() < TOLERANCE);
    assert!((decision[(1, 0)] - 50.0).abs() < TOLERANCE);
}

#[test]
fn test_oldest_first_serves_the_last_age_group_first() {
    let config = ModelConfig::default();
    let (state, population) = scenario(4, 1.0);
    let context = AllocationContext::new(&state, &population, config.efficacy);
    let demand = context.demand();
    let supply = (demand.age_total(7) / 2.0).max(1.0);
    let (state, population) = scenario(4, supply);
    let context = AllocationContext::new(&state, &population, config.efficacy);
    let mut rng = RandomNumberGenerator::from_seed(1);
    let decision = PolicyKind::OldestFirst
        .build()
        .allocate(&context, &mut rng)
        .unwrap();
    assert!((decision.age_total(7) - supply).abs() < 1e-6);
    for a in 0..7 {
        assert_eq!(decision.age_total(a), 0.0);
    }
}

#[test]
fn test_adults_first_custom_priority() {
    let config = ModelConfig::default();
    let (state, population) = scenario(9, 1e9);
    let context = AllocationContext::new(&state, &population, config.efficacy);
    let demand = context.demand();
    let supply = demand.age_total(2) + demand.age_total(5);
    let (state, population) = scenario(9, supply);
    let context = AllocationContext::new(&state, &population, config.efficacy);
    let policy = AdultsFirst::with_priority(vec![2, 5]);
    let mut rng = RandomNumberGenerator::from_seed(1);
    let decision = policy.allocate(&context, &mut rng).unwrap();
    assert!((decision.age_total(2) - demand.age_total(2)).abs() < 1e-6);
    assert!((decision.age_total(5) - demand.age_total(5)).abs() < 1e-6);
    assert!(decision.sum() <= supply + TOLERANCE);
}

#[test]
fn test_weighted_policy_follows_the_wave_context() {
    let config = ModelConfig::default();
    // Oldest-first while the wave rises, susceptible-based otherwise.
    let mut weights = PolicyWeights::uniform_rows(3, 2, &[1.0, 0.0, 0.0, 0.0]);
    for j in 0..2 {
        weights.row_mut(WaveState::Up.index(), j).copy_from_slice(&[0.0, 0.0, 1.0, 0.0]);
    }
    let policy =
        WeightedPolicy::new(PolicyKind::DEFAULT_SLOTS.to_vec(), Arc::new(weights)).unwrap();

    let (mut state, population) = scenario(5, 300.0);
    let demand = state.vaccination_demand(config.efficacy);
    let mut rng = RandomNumberGenerator::from_seed(1);

    state.wave = WaveContext {
        state: WaveState::Up,
        occurrence: 5,
    };
    let context = AllocationContext::new(&state, &population, config.efficacy);
    let rising = policy.allocate(&context, &mut rng).unwrap();
    assert_feasible(&rising, &demand, 300.0, "weighted");
    let oldest = PolicyKind::OldestFirst
        .build()
        .allocate(&context, &mut rng)
        .unwrap();
    assert!(rising.approx_eq(&enforce_feasibility(&oldest, &demand, 300.0), 1e-9));

    state.wave = WaveContext::default();
    let context = AllocationContext::new(&state, &population, config.efficacy);
    let neutral = policy.allocate(&context, &mut rng).unwrap();
    assert_feasible(&neutral, &demand, 300.0, "weighted");
    let susceptible = PolicyKind::SusceptibleBased
        .build()
        .allocate(&context, &mut rng)
        .unwrap();
    assert!(neutral.approx_eq(&enforce_feasibility(&susceptible, &demand, 300.0), 1e-9));
}

#[test]
fn test_weighted_policy_rejects_mismatched_slots() {
    let weights = Arc::new(PolicyWeights::uniform_rows(3, 4, &[0.5, 0.5]));
    let result = WeightedPolicy::new(PolicyKind::DEFAULT_SLOTS.to_vec(), weights);
    assert!(matches!(result, Err(VaxError::Configuration(_))));
}

#[test]
fn test_unknown_policy_name() {
    match "youngest_first".parse::<PolicyKind>() {
        Err(VaxError::Configuration(msg)) => {
            assert!(msg.contains("youngest_first"));
            assert!(msg.contains("oldest_first"));
        }
        other => panic!("Expected configuration error, got {:?}", other),
    }
    for kind in PolicyKind::ALL {
        assert_eq!(kind.name().parse::<PolicyKind>().unwrap(), kind);
    }
}

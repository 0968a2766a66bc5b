use std::sync::Arc;

use chrono::NaiveDate;
use vaxopt::{
    config::ModelConfig,
    error::{Result, VaxError},
    grid::Grid,
    model::{
        CommuterFlows, Compartment, Compartments, ContactMatrices, ContactMatrix, EpidemicModel,
        Mobility, PopulationTable,
    },
    optimizer::{
        breeding::{block_swap, mutate},
        BlockSwapBreeding, BreedStrategy, Challenge, GeneticOptimizer, Individual, Objective,
        OptimizerOptions, Population, ProcessChallenge, RolloutScore, WaveSource,
    },
    process::{ConstantSupply, PolicyKind, PolicyWeights, WaveSchedule},
    rng::RandomNumberGenerator,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn random_weights(rng: &mut RandomNumberGenerator) -> PolicyWeights {
    let values = (0..3 * 4 * 4)
        .map(|_| rng.gen_range(0..100) as f64)
        .collect();
    PolicyWeights::from_values(3, 4, 4, values).unwrap()
}

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    values
}

#[test]
fn test_offspring_rows_are_distributions() {
    let mut rng = RandomNumberGenerator::from_seed(21);
    let options = OptimizerOptions::default();
    for _ in 0..20 {
        let mut parents = vec![random_weights(&mut rng), random_weights(&mut rng)];
        // An all-zero row must come back as the default distribution.
        parents[0].row_mut(1, 2).iter_mut().for_each(|w| *w = 0.0);
        parents[1].row_mut(1, 2).iter_mut().for_each(|w| *w = 0.0);
        let offspring = BlockSwapBreeding.breed(&parents, &options, &mut rng).unwrap();
        assert_eq!(offspring.len(), 5);
        for child in &offspring {
            assert_eq!(child.shape(), (3, 4, 4));
            assert!(child.values().iter().all(|&w| (0.0..=1.0).contains(&w)));
            for sum in child.row_sums() {
                assert!((sum - 1.0).abs() < 1e-9, "row sums to {}", sum);
            }
        }
    }
}

#[test]
fn test_block_swap_preserves_parent_values() {
    let mut rng = RandomNumberGenerator::from_seed(5);
    let p1 = random_weights(&mut rng);
    let p2 = random_weights(&mut rng);
    for vertical in [true, false] {
        for cut_row in 0..4 {
            for cut_col in 0..4 {
                let (o1, o2) = block_swap(&p1, &p2, cut_row, cut_col, vertical);
                for i in 0..3 {
                    for j in 0..4 {
                        for k in 0..4 {
                            let parents = sorted(vec![p1.get(i, j, k), p2.get(i, j, k)]);
                            let children = sorted(vec![o1.get(i, j, k), o2.get(i, j, k)]);
                            assert_eq!(parents, children);
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn test_mutation_only_moves_values() {
    let mut rng = RandomNumberGenerator::from_seed(13);
    for _ in 0..10 {
        let original = random_weights(&mut rng);
        let mut mutated = original.clone();
        mutate(&mut mutated, &mut rng);
        assert_eq!(
            sorted(original.values().to_vec()),
            sorted(mutated.values().to_vec())
        );
    }
}

/// Scores depend on the seed only, so every individual looks the same.
#[derive(Debug)]
struct SeedOnlyChallenge;

impl Challenge for SeedOnlyChallenge {
    fn score(&self, _genes: &PolicyWeights, seed: u64) -> Result<RolloutScore> {
        Ok(RolloutScore::new((seed % 100) as f64))
    }
}

#[test]
fn test_identical_individuals_are_never_significant() {
    init_tracing();
    let optimizer = GeneticOptimizer::new(BlockSwapBreeding, SeedOnlyChallenge);
    let options = OptimizerOptions::builder()
        .simulations(4)
        .population_size(4)
        .max_extra_rounds(3)
        .build()
        .unwrap();
    let mut rng = RandomNumberGenerator::from_seed(3);
    let result = optimizer.run(&options, &mut rng).unwrap();

    // Every cohort exhausts its extra rounds: 4 + 3 * 2 rollouts.
    assert!(result.runs_per_generation.iter().all(|&runs| runs == 10));
    for summary in &result.generations {
        assert!(!summary.population_significant);
        assert_ne!(summary.offspring_significant, Some(true));
    }
    // Nobody ever beats the first all-time best, so the search stops after
    // three generations without a new best.
    assert!(result.converged);
    assert_eq!(result.generations.len(), 4);
    assert_eq!(result.best.id, "gen_0_001");
    assert_eq!(result.best_scores.len(), 10);
}

fn tiny_challenge(objective: Objective) -> ProcessChallenge {
    let config = Arc::new(ModelConfig::default());
    let contexts = (0..4)
        .map(|k| ContactMatrix {
            context: format!("context_{}", k),
            matrix: vec![vec![0.1; 8]; 8],
        })
        .collect();
    let mobility = Arc::new(Mobility::new(
        CommuterFlows::none(1, 8),
        ContactMatrices::new(contexts),
        vec![1.0; 8],
    ));
    let model = EpidemicModel::new(config, mobility, 1, true).unwrap();
    let counts = Grid::filled(1, 8, 1500.0);
    let population = Arc::new(PopulationTable::from_counts(counts.clone()).unwrap());
    let mut compartments = Compartments::susceptible(&counts);
    for a in 0..8 {
        compartments.seed(Compartment::I, 0, a, 15.0);
    }
    let start = NaiveDate::from_ymd_opt(2021, 2, 1).unwrap();
    ProcessChallenge::new(model, population, compartments, start, 8, objective)
        .unwrap()
        .with_supply(Arc::new(ConstantSupply::new(600.0)), 600.0)
}

#[test]
fn test_identical_tensors_under_the_deaths_objective_are_never_significant() {
    init_tracing();
    let optimizer = GeneticOptimizer::new(BlockSwapBreeding, tiny_challenge(Objective::Deaths));
    let genes = PolicyWeights::uniform_rows(3, 4, &[0.4, 0.3, 0.2, 0.1]);
    let population = Population::from_individuals(vec![
        Individual::new("twin_a".to_string(), genes.clone()),
        Individual::new("twin_b".to_string(), genes),
    ]);
    let options = OptimizerOptions::builder()
        .simulations(4)
        .population_size(2)
        .max_extra_rounds(2)
        .max_generations(1)
        .build()
        .unwrap();
    let mut rng = RandomNumberGenerator::from_seed(17);
    let result = optimizer.run_from(population, &options, &mut rng).unwrap();

    let summary = &result.generations[0];
    assert!(!summary.population_significant);
    // Both extra rounds were spent: 4 + 2 * 2 paired rollouts each.
    assert_eq!(summary.population_runs, 8);
    assert_eq!(
        result.score_history["twin_a"],
        result.score_history["twin_b"]
    );
}

#[test]
fn test_weight_rows_follow_the_challenge_slots() {
    let slots = vec![
        PolicyKind::OldestFirst,
        PolicyKind::AdultsFirst,
        PolicyKind::SusceptibleBased,
    ];
    let challenge = tiny_challenge(Objective::Yll).with_slots(slots);
    assert_eq!(challenge.slots(), 3);
    let optimizer = GeneticOptimizer::new(BlockSwapBreeding, challenge);
    let options = OptimizerOptions::builder()
        .simulations(2)
        .population_size(3)
        .max_extra_rounds(0)
        .max_generations(1)
        .build()
        .unwrap();
    let mut rng = RandomNumberGenerator::from_seed(4);
    let result = optimizer.run(&options, &mut rng).unwrap();
    for individual in &result.population {
        assert_eq!(individual.genes.shape(), (3, 4, 3));
    }

    // A population bred for the four default policies does not fit.
    let four_slots = PolicyWeights::uniform_rows(3, 4, &[0.25; 4]);
    let population = Population::from_individuals(vec![
        Individual::new("a".to_string(), four_slots.clone()),
        Individual::new("b".to_string(), four_slots),
    ]);
    match optimizer.run_from(population, &options, &mut rng) {
        Err(VaxError::Configuration(msg)) => assert!(msg.contains("blends 4 policies")),
        other => panic!("Expected Configuration error, got {:?}", other.map(|r| r.converged)),
    }
}

#[test]
fn test_challenge_rejects_compartments_for_another_model() {
    let config = Arc::new(ModelConfig::default());
    let contexts = (0..4)
        .map(|k| ContactMatrix {
            context: format!("context_{}", k),
            matrix: vec![vec![0.1; 8]; 8],
        })
        .collect();
    let mobility = Arc::new(Mobility::new(
        CommuterFlows::none(1, 8),
        ContactMatrices::new(contexts),
        vec![1.0; 8],
    ));
    let model = EpidemicModel::new(config, mobility, 1, true).unwrap();
    let counts = Grid::filled(2, 8, 1500.0);
    let population = Arc::new(PopulationTable::from_counts(counts.clone()).unwrap());
    let start = NaiveDate::from_ymd_opt(2021, 2, 1).unwrap();
    let result = ProcessChallenge::new(
        model,
        population,
        Compartments::susceptible(&counts),
        start,
        8,
        Objective::Deaths,
    );
    assert!(matches!(result, Err(VaxError::Configuration(_))));
}

#[test]
fn test_process_challenge_is_reproducible_per_seed() {
    let challenge = tiny_challenge(Objective::Yll);
    let genes = PolicyWeights::uniform_rows(3, 4, &[0.25; 4]);
    let first = challenge.score(&genes, 77).unwrap();
    let second = challenge.score(&genes, 77).unwrap();
    assert_eq!(first, second);
    assert!(first.score.is_finite() && first.score >= 0.0);
    let decisions: usize = first.strategy_usage.values().sum();
    assert!(decisions >= 1 && decisions <= 8);
}

#[test]
fn test_fixed_waves_and_objectives() {
    let genes = PolicyWeights::uniform_rows(3, 4, &[0.0, 0.0, 1.0, 0.0]);
    let deaths = tiny_challenge(Objective::Deaths)
        .with_waves(WaveSource::Fixed(WaveSchedule::explicit([1, 2, 3])))
        .score(&genes, 5)
        .unwrap();
    let weighted = tiny_challenge(Objective::Weighted)
        .with_waves(WaveSource::Fixed(WaveSchedule::explicit([1, 2, 3])))
        .score(&genes, 5)
        .unwrap();
    // Same rollout, the weighted objective only adds a share of the infections.
    assert!(weighted.score >= deaths.score);
    assert_eq!(weighted.strategy_usage, deaths.strategy_usage);
}

#[test]
fn test_search_on_a_small_scenario() {
    init_tracing();
    let optimizer = GeneticOptimizer::new(BlockSwapBreeding, tiny_challenge(Objective::Deaths));
    let options = OptimizerOptions::builder()
        .simulations(4)
        .population_size(4)
        .max_extra_rounds(1)
        .max_generations(3)
        .parallel_threshold(2)
        .build()
        .unwrap();
    let mut rng = RandomNumberGenerator::from_seed(8);
    let result = optimizer.run(&options, &mut rng).unwrap();

    assert!(!result.generations.is_empty() && result.generations.len() <= 3);
    assert!(result.population.len() >= 2);
    assert!(result.best.mean_score.is_finite());
    for sum in result.best.genes.row_sums() {
        assert!((sum - 1.0).abs() < 1e-9);
    }
    for individual in &result.population {
        let runs = &result.score_history[&individual.id];
        assert!(runs.len() >= 4);
        assert!(!individual.strategy_usage.is_empty());
    }
    let summary = &result.generations[0];
    assert_eq!(summary.ranking.len(), 4);
    assert!(summary
        .ranking
        .windows(2)
        .all(|pair| pair[0].1 <= pair[1].1));
}

#[test]
fn test_invalid_options_are_rejected() {
    let result = OptimizerOptions::builder().simulations(1).build();
    assert!(result.is_err());
    let result = OptimizerOptions::builder().significance(1.5).build();
    assert!(result.is_err());
}

#[cfg(feature = "serde")]
#[test]
fn test_result_serializes_to_json() {
    let optimizer = GeneticOptimizer::new(BlockSwapBreeding, SeedOnlyChallenge);
    let options = OptimizerOptions::builder()
        .simulations(2)
        .population_size(2)
        .max_extra_rounds(0)
        .max_generations(1)
        .build()
        .unwrap();
    let mut rng = RandomNumberGenerator::from_seed(1);
    let result = optimizer.run(&options, &mut rng).unwrap();

    let json = serde_json::to_string(&result.best).unwrap();
    let best: vaxopt::optimizer::Individual = serde_json::from_str(&json).unwrap();
    assert_eq!(best.id, result.best.id);
    assert_eq!(best.genes.shape(), result.best.genes.shape());
    for (a, b) in best.genes.values().iter().zip(result.best.genes.values()) {
        assert!((a - b).abs() < 1e-12);
    }

    let json = serde_json::to_string(&result.generations).unwrap();
    assert!(json.contains("gen_0_001"));
}

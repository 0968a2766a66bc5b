use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::{
    breeding::BreedStrategy,
    challenge::{Challenge, RolloutScore},
    individual::Individual,
    options::OptimizerOptions,
    population::{sort_by_mean, Population},
    significance::t_test,
};
use crate::{
    error::{OptionExt, Result, VaxError},
    process::PolicyWeights,
    rng::RandomNumberGenerator,
};

/// Rollout scores per individual id for the batch being evaluated.
type ScoreBook = HashMap<String, Vec<f64>>;

/// What happened in one generation.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSummary {
    pub generation: usize,
    /// Individual ids and mean scores, best first.
    pub ranking: Vec<(String, f64)>,
    pub population_significant: bool,
    pub population_runs: usize,
    pub offspring_significant: Option<bool>,
    pub offspring_runs: Option<usize>,
    /// All-time best after this generation's convergence check.
    pub best_id: String,
    pub best_mean: f64,
}

/// Outcome of a search.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub best: Individual,
    /// Rollout scores that made `best` the all-time best.
    pub best_scores: Vec<f64>,
    /// Final population, best first.
    pub population: Vec<Individual>,
    /// Every rollout score ever recorded, per individual id.
    pub score_history: BTreeMap<String, Vec<f64>>,
    pub generations: Vec<GenerationSummary>,
    /// Rollouts per evaluated cohort, in evaluation order.
    pub runs_per_generation: Vec<usize>,
    pub converged: bool,
}

/// Which leaders of a sorted cohort must beat everyone ranked below them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Population,
    Offspring,
}

impl Gate {
    fn leaders(self) -> usize {
        match self {
            Gate::Population => 2,
            Gate::Offspring => 1,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Gate::Population => "individual",
            Gate::Offspring => "offspring",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CohortOutcome {
    significant: bool,
    runs: usize,
}

#[derive(Debug, Default)]
struct Convergence {
    best: Option<Individual>,
    best_scores: Vec<f64>,
    generations_since_new_best: usize,
}

/// Searches policy-weight space with a breeding strategy and a fitness challenge.
#[derive(Debug, Clone)]
pub struct GeneticOptimizer<Strategy, Chall>
where
    Chall: Challenge,
    Strategy: BreedStrategy,
{
    strategy: Strategy,
    challenge: Chall,
}

impl<Strategy, Chall> GeneticOptimizer<Strategy, Chall>
where
    Chall: Challenge + Send + Sync,
    Strategy: BreedStrategy,
{
    /// Creates a new `GeneticOptimizer` with the specified breeding strategy and challenge.
    pub fn new(strategy: Strategy, challenge: Chall) -> Self {
        Self {
            strategy,
            challenge,
        }
    }

    pub fn challenge(&self) -> &Chall {
        &self.challenge
    }

    /// Runs the search from a freshly created generation zero.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid options, and aborts with the
    /// first failing rollout: a fitness estimate is never built from a partial
    /// batch.
    ///
    /// # Performance
    ///
    /// Batches of at least `parallel_threshold` rollouts are spread over the
    /// rayon thread pool. Scores are collected in seed order, so the outcome
    /// does not depend on the threshold.
    pub fn run(
        &self,
        options: &OptimizerOptions,
        rng: &mut RandomNumberGenerator,
    ) -> Result<OptimizationResult> {
        options.validate()?;
        let population = Population::initial(options, self.challenge.slots(), rng);
        self.run_from(population, options, rng)
    }

    /// Runs the search from the given population.
    ///
    /// # Errors
    ///
    /// Besides the failures of [`GeneticOptimizer::run`], returns a
    /// configuration error when an individual's weight rows do not cover the
    /// challenge's base policies.
    pub fn run_from(
        &self,
        mut population: Population,
        options: &OptimizerOptions,
        rng: &mut RandomNumberGenerator,
    ) -> Result<OptimizationResult> {
        if population.individuals.len() < 2 {
            return Err(VaxError::Configuration(
                "the search needs at least two individuals".to_string(),
            ));
        }
        let slots = self.challenge.slots();
        if let Some(individual) = population
            .individuals
            .iter()
            .find(|individual| individual.genes.slots() != slots)
        {
            return Err(VaxError::Configuration(format!(
                "{} blends {} policies, the challenge scores {}",
                individual.id,
                individual.genes.slots(),
                slots
            )));
        }
        let mut history = BTreeMap::new();
        let mut generations = Vec::new();
        let mut runs_per_generation = Vec::new();
        let mut convergence = Convergence::default();
        let mut converged = false;

        for generation in 0..options.get_max_generations() {
            info!(
                generation,
                size = population.individuals.len(),
                "evaluating generation"
            );
            let mut scores = ScoreBook::new();
            let outcome = self.evaluate_cohort(
                &mut population.individuals,
                Gate::Population,
                generation,
                options,
                rng,
                &mut scores,
                &mut history,
            )?;
            runs_per_generation.push(outcome.runs);

            converged = self.check_convergence(
                &population.individuals,
                &scores,
                generation,
                options,
                rng,
                &mut convergence,
                &mut history,
            )?;
            let best = convergence
                .best
                .as_ref()
                .ok_or_else_vax(|| VaxError::EmptyPopulation)?;
            let mut summary = GenerationSummary {
                generation,
                ranking: population
                    .individuals
                    .iter()
                    .map(|i| (i.id.clone(), i.mean_score))
                    .collect(),
                population_significant: outcome.significant,
                population_runs: outcome.runs,
                offspring_significant: None,
                offspring_runs: None,
                best_id: best.id.clone(),
                best_mean: best.mean_score,
            };
            info!(
                generation,
                best = %summary.best_id,
                mean = summary.best_mean,
                "generation evaluated"
            );
            if converged {
                generations.push(summary);
                break;
            }

            let parents: Vec<PolicyWeights> = population
                .individuals
                .iter()
                .take(2)
                .map(|i| i.genes.clone())
                .collect();
            let offspring = self.strategy.breed(&parents, options, rng)?;
            population.set_offspring(generation, offspring);
            let mut offspring_scores = ScoreBook::new();
            let outcome = self.evaluate_cohort(
                &mut population.offspring,
                Gate::Offspring,
                generation,
                options,
                rng,
                &mut offspring_scores,
                &mut history,
            )?;
            runs_per_generation.push(outcome.runs);
            summary.offspring_significant = Some(outcome.significant);
            summary.offspring_runs = Some(outcome.runs);
            generations.push(summary);

            population.new_generation(generation)?;
        }

        if !converged {
            warn!(
                max_generations = options.get_max_generations(),
                "stopped at the generation cap without converging"
            );
        }
        let best = convergence
            .best
            .ok_or_else_vax(|| VaxError::EmptyPopulation)?;
        Ok(OptimizationResult {
            best,
            best_scores: convergence.best_scores,
            population: population.individuals,
            score_history: history,
            generations,
            runs_per_generation,
            converged,
        })
    }

    /// Estimates fitness for a cohort and retries until its leaders are
    /// significantly better or the extra rounds run out.
    #[allow(clippy::too_many_arguments)]
    fn evaluate_cohort(
        &self,
        cohort: &mut [Individual],
        gate: Gate,
        generation: usize,
        options: &OptimizerOptions,
        rng: &mut RandomNumberGenerator,
        scores: &mut ScoreBook,
        history: &mut BTreeMap<String, Vec<f64>>,
    ) -> Result<CohortOutcome> {
        if cohort.is_empty() {
            return Err(VaxError::EmptyPopulation);
        }
        let simulations = options.get_simulations();
        self.find_fitness(cohort, simulations, generation, options, rng, scores, history)?;
        let mut significant = find_best(cohort, gate, scores, options.get_significance());
        let mut rounds = 0;
        while !significant && rounds < options.get_max_extra_rounds() {
            rounds += 1;
            info!(
                cohort = gate.label(),
                round = rounds,
                runs = options.get_extra_simulations(),
                "running more simulations"
            );
            self.find_fitness(
                cohort,
                options.get_extra_simulations(),
                generation,
                options,
                rng,
                scores,
                history,
            )?;
            significant = find_best(cohort, gate, scores, options.get_significance());
        }
        if significant {
            info!(
                cohort = gate.label(),
                best = %cohort[0].id,
                mean = cohort[0].mean_score,
                "significant best found"
            );
        } else {
            warn!(
                cohort = gate.label(),
                best = %cohort[0].id,
                "significant best not found"
            );
        }
        Ok(CohortOutcome {
            significant,
            runs: simulations + rounds * options.get_extra_simulations(),
        })
    }

    /// Appends `runs` rollouts per individual, all on one shared seed list.
    #[allow(clippy::too_many_arguments)]
    fn find_fitness(
        &self,
        cohort: &mut [Individual],
        runs: usize,
        generation: usize,
        options: &OptimizerOptions,
        rng: &mut RandomNumberGenerator,
        scores: &mut ScoreBook,
        history: &mut BTreeMap<String, Vec<f64>>,
    ) -> Result<()> {
        let seeds = rng.seed_list(runs);
        for individual in cohort.iter_mut() {
            let batch = self.rollouts(&individual.genes, &seeds, options)?;
            let sample = scores.entry(individual.id.clone()).or_default();
            let recorded = history.entry(individual.id.clone()).or_default();
            for rollout in &batch {
                sample.push(rollout.score);
                recorded.push(rollout.score);
                individual.record_usage(generation, &rollout.strategy_usage);
            }
            individual.mean_score = sample.iter().sum::<f64>() / sample.len() as f64;
            debug!(
                individual = %individual.id,
                runs = sample.len(),
                mean = individual.mean_score,
                "fitness estimated"
            );
        }
        Ok(())
    }

    fn rollouts(
        &self,
        genes: &PolicyWeights,
        seeds: &[u64],
        options: &OptimizerOptions,
    ) -> Result<Vec<RolloutScore>> {
        let run = |&seed: &u64| -> Result<RolloutScore> {
            let rollout = self
                .challenge
                .score(genes, seed)
                .map_err(|e| VaxError::rollout(seed, e))?;
            if !rollout.score.is_finite() {
                return Err(VaxError::InvalidNumericValue(format!(
                    "rollout with seed {} scored {}",
                    seed, rollout.score
                )));
            }
            Ok(rollout)
        };
        if seeds.len() >= options.get_parallel_threshold() {
            seeds.par_iter().map(run).collect()
        } else {
            seeds.iter().map(run).collect()
        }
    }

    /// Compares the generation's best against the all-time best.
    ///
    /// A challenger replaces the all-time best only after winning a fresh
    /// paired head-to-head batch with significance.
    #[allow(clippy::too_many_arguments)]
    fn check_convergence(
        &self,
        individuals: &[Individual],
        scores: &ScoreBook,
        generation: usize,
        options: &OptimizerOptions,
        rng: &mut RandomNumberGenerator,
        convergence: &mut Convergence,
        history: &mut BTreeMap<String, Vec<f64>>,
    ) -> Result<bool> {
        let candidate = individuals.first().ok_or(VaxError::EmptyPopulation)?;
        let best = match convergence.best.clone() {
            None => {
                convergence.best = Some(candidate.clone());
                convergence.best_scores = scores.get(&candidate.id).cloned().unwrap_or_default();
                return Ok(false);
            }
            Some(best) => best,
        };

        if candidate.id == best.id {
            convergence.generations_since_new_best += 1;
        } else {
            info!(
                generation,
                candidate = %candidate.id,
                best = %best.id,
                "testing generation best against all-time best"
            );
            let mut duel = vec![candidate.clone(), best];
            let mut duel_scores = ScoreBook::new();
            let outcome = self.evaluate_cohort(
                &mut duel,
                Gate::Offspring,
                generation,
                options,
                rng,
                &mut duel_scores,
                history,
            )?;
            if outcome.significant && duel[0].id == candidate.id {
                info!(generation, best = %candidate.id, "new all-time best");
                convergence.best_scores = duel_scores.remove(&candidate.id).unwrap_or_default();
                convergence.best = Some(duel.swap_remove(0));
                convergence.generations_since_new_best = 0;
            } else {
                convergence.generations_since_new_best += 1;
            }
        }

        let converged = convergence.generations_since_new_best > 2;
        if converged {
            if let Some(best) = &convergence.best {
                info!(
                    generation,
                    best = %best.id,
                    mean = best.mean_score,
                    "converged"
                );
            }
        }
        Ok(converged)
    }
}

/// Sorts the cohort and checks that each leader beats everyone ranked below it.
fn find_best(cohort: &mut [Individual], gate: Gate, scores: &ScoreBook, significance: f64) -> bool {
    sort_by_mean(cohort);
    let leaders = gate.leaders().min(cohort.len());
    for i in 0..leaders {
        for j in i + 1..cohort.len() {
            let s1 = scores.get(&cohort[i].id).map_or(&[][..], Vec::as_slice);
            let s2 = scores.get(&cohort[j].id).map_or(&[][..], Vec::as_slice);
            if !t_test(s1, s2, significance) {
                debug!(
                    first = %cohort[i].id,
                    second = %cohort[j].id,
                    "significance not fulfilled"
                );
                return false;
            }
        }
    }
    true
}

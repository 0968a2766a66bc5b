//! Candidate solutions of the genetic search and their identifiers.

use std::collections::BTreeMap;
use std::fmt;

use super::breeding::repair;
use crate::model::WaveState;
use crate::process::{PolicyWeights, StrategyUsage};
use crate::rng::RandomNumberGenerator;

/// Hands out `gen_{generation}_{nnn}` identifiers.
///
/// The counter restarts at 1 whenever a later generation begins.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    generation: usize,
    counter: usize,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            generation: 0,
            counter: 1,
        }
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn start_generation(&mut self, generation: usize) {
        if generation > self.generation {
            self.generation = generation;
            self.counter = 1;
        }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("gen_{}_{:03}", self.generation, self.counter);
        self.counter += 1;
        id
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Individual {
    pub id: String,
    pub genes: PolicyWeights,
    pub mean_score: f64,
    /// Decisions per wave context, keyed by the generation the rollouts ran in.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub strategy_usage: BTreeMap<usize, StrategyUsage>,
}

impl Individual {
    pub fn new(id: String, genes: PolicyWeights) -> Self {
        Self {
            id,
            genes,
            mean_score: 0.0,
            strategy_usage: BTreeMap::new(),
        }
    }

    /// Adds the decisions of one rollout to the tally of `generation`.
    pub fn record_usage(&mut self, generation: usize, usage: &StrategyUsage) {
        let tally = self.strategy_usage.entry(generation).or_default();
        for (context, count) in usage {
            *tally.entry(*context).or_insert(0) += count;
        }
    }
}

impl PartialEq for Individual {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Structured starting tensors for the initial population.
///
/// With four slots, individual `i` gets: all weight on slot `i` (i < 4),
/// an even split between two slots (4 ≤ i < 7), a three-way split (7),
/// uniform weights (8), and one random row shared by every wave context
/// (9). Later individuals, and any pattern that needs four slots when
/// there are fewer, are fully random.
pub fn seeded_genes(
    index: usize,
    occurrences: usize,
    default_row: &[f64],
    rng: &mut RandomNumberGenerator,
) -> PolicyWeights {
    let slots = default_row.len();
    let wave_states = WaveState::ALL.len();
    let mut row = vec![0.0; slots];
    match index {
        i if i < slots => row[i] = 1.0,
        4..=6 if slots == 4 => {
            let j = (index + 1) % 4;
            let k = if index == 6 {
                (index + 3) % 4
            } else {
                (index + 2) % 4
            };
            row[j] = 0.5;
            row[k] = 0.5;
        }
        7 if slots == 4 => {
            row[1] = 0.33;
            row[2] = 0.33;
            row[3] = 0.34;
        }
        8 => row.iter_mut().for_each(|w| *w = 1.0 / slots as f64),
        9 => {
            for (j, w) in row.iter_mut().enumerate() {
                let high = if j > 0 { 100 } else { 50 };
                *w = rng.gen_range(0..high) as f64;
            }
        }
        _ => return random_genes(occurrences, default_row, rng),
    }
    let mut genes = PolicyWeights::uniform_rows(wave_states, occurrences, &row);
    repair(&mut genes, default_row);
    genes
}

/// Independent random integer weights in `[0, 100)` per cell, normalised per row.
pub fn random_genes(
    occurrences: usize,
    default_row: &[f64],
    rng: &mut RandomNumberGenerator,
) -> PolicyWeights {
    let wave_states = WaveState::ALL.len();
    let mut genes = PolicyWeights::zeros(wave_states, occurrences, default_row.len());
    for i in 0..wave_states {
        for j in 0..occurrences {
            for w in genes.row_mut(i, j) {
                *w = rng.gen_range(0..100) as f64;
            }
        }
    }
    repair(&mut genes, default_row);
    genes
}

//! Genetic UTXO selection strategy
//!
//! Large-set stand-in for branch-and-bound. An individual is an include mask
//! over the candidates (largest first). Feasible individuals rank by change,
//! then by input count; infeasible ones rank behind every feasible one, by
//! shortfall. Each generation keeps the two best individuals and breeds the
//! rest by tournament, uniform crossover and swap mutation.
//!
//! The initial population contains the greedy prefix and the full candidate
//! set, so the best feasible individual is never worse than greedy selection
//! and a feasible individual exists whenever the candidates can pay at all.
//! The run length is fixed by `generations`.

use bitcoin::Amount;
use crate::error::SelectionError;
use crate::fee_model;
use crate::logging::{log_selection, LogLevel};
use crate::utxo_selection::strategies::{base, utils, Strategy};
use crate::utxo_selection::types::Utxo;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::cmp::Ordering;

const ELITE: usize = 2;
const TOURNAMENT_SIZE: usize = 3;
const MUTATION_PERCENT: u32 = 20;

/// Evolutionary least-change search with a fixed generation budget
#[derive(Debug, Clone)]
pub struct GeneticStrategy {
    population: usize,
    generations: usize,
    seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fitness {
    feasible: bool,
    /// Change when feasible, shortfall otherwise
    distance: u64,
    inputs: usize,
    total: u64,
}

impl Fitness {
    fn rank(&self, other: &Fitness) -> Ordering {
        other
            .feasible
            .cmp(&self.feasible)
            .then(self.distance.cmp(&other.distance))
            .then(self.inputs.cmp(&other.inputs))
    }
}

#[derive(Debug, Clone)]
struct Individual {
    genes: Vec<bool>,
    fitness: Fitness,
}

struct Evaluator<'a> {
    values: &'a [u64],
    target: Amount,
    fee_rate: u64,
}

impl Evaluator<'_> {
    fn evaluate(&self, genes: Vec<bool>) -> Individual {
        let (inputs, total) = genes
            .iter()
            .zip(self.values)
            .filter(|(included, _)| **included)
            .fold((0usize, 0u64), |(n, sum), (_, v)| (n + 1, sum.saturating_add(*v)));

        let required = fee_model::required_amount(self.target, inputs, self.fee_rate).to_sat();
        let feasible = inputs > 0 && total >= required;
        let distance = if feasible {
            total - required
        } else {
            required.saturating_sub(total)
        };

        Individual {
            genes,
            fitness: Fitness {
                feasible,
                distance,
                inputs,
                total,
            },
        }
    }
}

impl GeneticStrategy {
    /// # Arguments
    /// * `population` - Individuals per generation (at least 4)
    /// * `generations` - Number of generations to breed
    /// * `seed` - RNG seed
    pub fn new(population: usize, generations: usize, seed: u64) -> Self {
        Self {
            population: population.max(ELITE + 2),
            generations,
            seed,
        }
    }

    fn initial_population(&self, eval: &Evaluator<'_>, rng: &mut StdRng) -> Vec<Individual> {
        let n = eval.values.len();
        let mut population = Vec::with_capacity(self.population);

        let mut greedy = vec![false; n];
        let mut total = 0u64;
        for (i, value) in eval.values.iter().enumerate() {
            greedy[i] = true;
            total = total.saturating_add(*value);
            if base::covers(total, i + 1, eval.target, eval.fee_rate) {
                break;
            }
        }
        population.push(eval.evaluate(greedy));
        population.push(eval.evaluate(vec![true; n]));

        while population.len() < self.population {
            let genes = (0..n).map(|_| rng.random_bool(0.5)).collect();
            population.push(eval.evaluate(genes));
        }
        population
    }

    fn tournament<'p>(&self, population: &'p [Individual], rng: &mut StdRng) -> &'p Individual {
        let mut best = &population[rng.random_range(0..population.len())];
        for _ in 1..TOURNAMENT_SIZE {
            let challenger = &population[rng.random_range(0..population.len())];
            if challenger.fitness.rank(&best.fitness) == Ordering::Less {
                best = challenger;
            }
        }
        best
    }

    /// Move one input out of the selection and another one in
    fn mutate(genes: &mut [bool], rng: &mut StdRng) {
        let included: Vec<usize> = (0..genes.len()).filter(|&i| genes[i]).collect();
        let excluded: Vec<usize> = (0..genes.len()).filter(|&i| !genes[i]).collect();

        match (included.is_empty(), excluded.is_empty()) {
            (false, false) => {
                genes[included[rng.random_range(0..included.len())]] = false;
                genes[excluded[rng.random_range(0..excluded.len())]] = true;
            }
            (true, false) => genes[excluded[rng.random_range(0..excluded.len())]] = true,
            (false, true) => genes[included[rng.random_range(0..included.len())]] = false,
            (true, true) => {}
        }
    }
}

impl Strategy for GeneticStrategy {
    fn name(&self) -> &'static str {
        "genetic"
    }

    fn select(
        &self,
        candidates: &[Utxo],
        target: Amount,
        fee_rate: u64,
    ) -> Result<Vec<Utxo>, SelectionError> {
        let pool = utils::positive_effective_desc(candidates, fee_rate);
        if pool.is_empty() {
            return Err(base::insufficient_funds(candidates, target, fee_rate));
        }

        let values: Vec<u64> = pool.iter().map(|u| u.value.to_sat()).collect();
        let eval = Evaluator {
            values: &values,
            target,
            fee_rate,
        };
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut population = self.initial_population(&eval, &mut rng);
        population.sort_by(|a, b| a.fitness.rank(&b.fitness));
        let mut best = population[0].clone();

        for _ in 0..self.generations {
            let mut next: Vec<Individual> = population.iter().take(ELITE).cloned().collect();

            while next.len() < self.population {
                let mother = self.tournament(&population, &mut rng);
                let father = self.tournament(&population, &mut rng);
                let mut genes: Vec<bool> = mother
                    .genes
                    .iter()
                    .zip(&father.genes)
                    .map(|(m, f)| if rng.random_bool(0.5) { *m } else { *f })
                    .collect();
                if rng.random_range(0..100) < MUTATION_PERCENT {
                    Self::mutate(&mut genes, &mut rng);
                }
                next.push(eval.evaluate(genes));
            }

            next.sort_by(|a, b| a.fitness.rank(&b.fitness));
            if next[0].fitness.rank(&best.fitness) == Ordering::Less {
                best = next[0].clone();
            }
            population = next;
        }

        log_selection(
            LogLevel::Debug,
            "Genetic search finished",
            Some(json!({
                "candidates": pool.len(),
                "generations": self.generations,
                "feasible": best.fitness.feasible,
                "distance": best.fitness.distance,
                "inputs": best.fitness.inputs,
            })),
        );

        if !best.fitness.feasible {
            let required = fee_model::required_amount(target, best.fitness.inputs.max(1), fee_rate);
            return Err(SelectionError::insufficient_funds(
                required,
                Amount::from_sat(best.fitness.total),
            ));
        }

        Ok(best
            .genes
            .iter()
            .zip(&pool)
            .filter(|(included, _)| **included)
            .map(|(_, utxo)| utxo.clone())
            .collect())
    }
}

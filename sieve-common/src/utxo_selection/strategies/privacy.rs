//! Privacy UTXO selection strategy
//!
//! Minimises change, like branch-and-bound, but collects every subset that
//! ties for the least change (up to `max_ties`) and picks one of them with a
//! seeded RNG. The chosen inputs are shuffled with the same RNG, so neither
//! the input count nor the input order is a fixed function of the UTXO set.
//! The same seed over the same candidates always yields the same result.

use bitcoin::Amount;
use crate::error::SelectionError;
use crate::fee_model;
use crate::logging::{log_selection, LogLevel};
use crate::utxo_selection::strategies::search::{self, SearchMode};
use crate::utxo_selection::strategies::{base, utils, Strategy};
use crate::utxo_selection::types::Utxo;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;

/// Least-change selection with a seeded tie-break
#[derive(Debug, Clone)]
pub struct PrivacyStrategy {
    max_nodes: usize,
    max_ties: usize,
    seed: u64,
}

impl PrivacyStrategy {
    /// # Arguments
    /// * `max_nodes` - Node budget of the subset search
    /// * `max_ties` - Maximum number of equally good subsets to choose from
    /// * `seed` - Seed for the tie-break and the input shuffle
    pub fn new(max_nodes: usize, max_ties: usize, seed: u64) -> Self {
        Self {
            max_nodes,
            max_ties: max_ties.max(1),
            seed,
        }
    }
}

impl Strategy for PrivacyStrategy {
    fn name(&self) -> &'static str {
        "privacy"
    }

    fn select(
        &self,
        candidates: &[Utxo],
        target: Amount,
        fee_rate: u64,
    ) -> Result<Vec<Utxo>, SelectionError> {
        let pool = utils::positive_effective_desc(candidates, fee_rate);
        let effective = utils::effective_values(&pool, fee_rate);
        let effective_target = i64::try_from(
            target
                .to_sat()
                .saturating_add(fee_model::fixed_fee(fee_rate)),
        )
        .unwrap_or(i64::MAX);

        let outcome = search::minimal_excess(
            &effective,
            effective_target,
            self.max_nodes,
            SearchMode::Ties { max: self.max_ties },
        );

        log_selection(
            LogLevel::Debug,
            "Privacy search finished",
            Some(json!({
                "candidates": pool.len(),
                "explored": outcome.explored,
                "complete": outcome.complete,
                "ties": outcome.solutions.len(),
                "best_change": outcome.best_excess,
            })),
        );

        if outcome.solutions.is_empty() {
            if !outcome.complete {
                return Err(SelectionError::SearchBudgetExceeded {
                    strategy: self.name(),
                    explored: outcome.explored,
                });
            }
            return Err(base::insufficient_funds(candidates, target, fee_rate));
        }

        // An unfinished search still holds feasible subsets; use the best of them
        let mut rng = StdRng::seed_from_u64(self.seed);
        let pick = rng.random_range(0..outcome.solutions.len());
        let mut selected: Vec<Utxo> = outcome.solutions[pick]
            .iter()
            .map(|&i| pool[i].clone())
            .collect();
        selected.shuffle(&mut rng);
        Ok(selected)
    }
}

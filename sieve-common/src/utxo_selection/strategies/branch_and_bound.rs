//! Branch-and-bound UTXO selection strategy
//!
//! Depth-first include/exclude search for the subset with the least change.
//! Candidates are ordered by descending value; a branch is cut as soon as it
//! cannot reach the target or already leaves more change than the best
//! subset found so far. The search stops on an exact match.
//!
//! The node budget bounds the running time. A search that runs out of budget
//! reports [`SelectionError::SearchBudgetExceeded`] and the selector falls
//! back to greedy selection.

use bitcoin::Amount;
use crate::error::SelectionError;
use crate::fee_model;
use crate::logging::{log_selection, LogLevel};
use crate::utxo_selection::strategies::search::{self, SearchMode};
use crate::utxo_selection::strategies::{base, utils, Strategy};
use crate::utxo_selection::types::Utxo;
use serde_json::json;

/// Least-change search with a node budget
#[derive(Debug, Clone)]
pub struct BranchAndBoundStrategy {
    max_nodes: usize,
}

impl BranchAndBoundStrategy {
    /// Create a strategy that visits at most `max_nodes` nodes
    pub fn new(max_nodes: usize) -> Self {
        Self { max_nodes }
    }
}

impl Strategy for BranchAndBoundStrategy {
    fn name(&self) -> &'static str {
        "branch_and_bound"
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

        let outcome =
            search::minimal_excess(&effective, effective_target, self.max_nodes, SearchMode::Best);

        log_selection(
            LogLevel::Debug,
            "Branch-and-bound finished",
            Some(json!({
                "candidates": pool.len(),
                "explored": outcome.explored,
                "complete": outcome.complete,
                "best_change": outcome.best_excess,
            })),
        );

        if !outcome.complete {
            return Err(SelectionError::SearchBudgetExceeded {
                strategy: self.name(),
                explored: outcome.explored,
            });
        }

        match outcome.solutions.into_iter().next() {
            Some(chosen) => Ok(chosen.into_iter().map(|i| pool[i].clone()).collect()),
            None => Err(base::insufficient_funds(candidates, target, fee_rate)),
        }
    }
}

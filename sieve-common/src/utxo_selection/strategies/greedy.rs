//! Greedy UTXO selection strategy
//!
//! Spends the largest outputs first, stopping as soon as the running total
//! covers the target plus the fee for the inputs picked so far. This yields
//! the fewest inputs of any strategy and is the fallback when a bounded
//! search gives up.

use bitcoin::Amount;
use crate::error::SelectionError;
use crate::utxo_selection::strategies::{base, utils, Strategy};
use crate::utxo_selection::types::Utxo;

/// Largest-first selection
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyStrategy;

impl GreedyStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for GreedyStrategy {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn select(
        &self,
        candidates: &[Utxo],
        target: Amount,
        fee_rate: u64,
    ) -> Result<Vec<Utxo>, SelectionError> {
        let mut selected = Vec::new();
        let mut total = 0u64;

        for utxo in utils::sort_by_value_desc(candidates) {
            total = total.saturating_add(utxo.value.to_sat());
            selected.push(utxo);
            if base::covers(total, selected.len(), target, fee_rate) {
                return Ok(selected);
            }
        }

        Err(base::insufficient_funds(candidates, target, fee_rate))
    }
}

//! Consolidation UTXO selection strategy
//!
//! Walks the candidates smallest first so that each payment sweeps up small
//! outputs and the address's UTXO set shrinks over time. The walk stops at
//! `max_inputs`; if the target is still not paid by then, the largest
//! remaining outputs are added greedily until it is.

use bitcoin::Amount;
use crate::error::SelectionError;
use crate::logging::{log_selection, LogLevel};
use crate::utxo_selection::strategies::{base, utils, Strategy};
use crate::utxo_selection::types::Utxo;
use serde_json::json;

/// Smallest-first selection with an input cap
#[derive(Debug, Clone)]
pub struct ConsolidationStrategy {
    max_inputs: usize,
}

impl ConsolidationStrategy {
    /// Create a strategy that takes at most `max_inputs` outputs smallest first
    pub fn new(max_inputs: usize) -> Self {
        Self {
            max_inputs: max_inputs.max(1),
        }
    }
}

impl Strategy for ConsolidationStrategy {
    fn name(&self) -> &'static str {
        "consolidation"
    }

    fn select(
        &self,
        candidates: &[Utxo],
        target: Amount,
        fee_rate: u64,
    ) -> Result<Vec<Utxo>, SelectionError> {
        let mut ascending = utils::positive_effective_desc(candidates, fee_rate);
        ascending.reverse();

        let mut selected = Vec::new();
        let mut total = 0u64;
        let mut rest = ascending.into_iter();

        for utxo in rest.by_ref() {
            total = total.saturating_add(utxo.value.to_sat());
            selected.push(utxo);
            if base::covers(total, selected.len(), target, fee_rate) {
                return Ok(selected);
            }
            if selected.len() >= self.max_inputs {
                break;
            }
        }

        log_selection(
            LogLevel::Debug,
            "Consolidation cap reached, finishing largest first",
            Some(json!({ "inputs": selected.len(), "total": total })),
        );

        // What is left is ascending; walk it from the top
        let remaining: Vec<Utxo> = rest.collect();
        for utxo in remaining.into_iter().rev() {
            total = total.saturating_add(utxo.value.to_sat());
            selected.push(utxo);
            if base::covers(total, selected.len(), target, fee_rate) {
                return Ok(selected);
            }
        }

        Err(base::insufficient_funds(candidates, target, fee_rate))
    }
}

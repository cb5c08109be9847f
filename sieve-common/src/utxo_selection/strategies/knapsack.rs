//! Knapsack UTXO selection strategy
//!
//! 0/1 subset-sum dynamic programming. For every achievable total up to a
//! ceiling the table keeps the smallest number of inputs reaching it, then
//! the smallest total that pays the target plus the fee for that many inputs
//! wins.
//!
//! The table is sparse (a `BTreeMap` keyed by total), so the cost depends on
//! the number of distinct sums, not on their magnitude. Each entry points at
//! an immutable node; nodes form parent chains that rebuild the chosen set,
//! and overwriting an entry never disturbs a chain already built on it.
//!
//! The greedy selection's total is always achievable with no more inputs,
//! so whenever greedy's total lies under the ceiling the knapsack total is
//! at most the greedy total. Above the ceiling the selector falls back to
//! greedy, so the same bound holds for the engine as a whole.

use bitcoin::Amount;
use crate::error::SelectionError;
use crate::fee_model;
use crate::logging::{log_selection, LogLevel};
use crate::utxo_selection::strategies::{base, utils, Strategy};
use crate::utxo_selection::types::Utxo;
use serde_json::json;
use std::collections::BTreeMap;

/// Smallest-sufficient-total selection
#[derive(Debug, Clone)]
pub struct KnapsackStrategy {
    ceiling_factor: u64,
    max_states: usize,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    parent: Option<usize>,
    item: usize,
}

#[derive(Debug, Clone, Copy)]
struct State {
    node: Option<usize>,
    inputs: usize,
}

impl KnapsackStrategy {
    /// # Arguments
    /// * `ceiling_factor` - Sums above `target * ceiling_factor + fee(all)` are not tracked
    /// * `max_states` - Maximum number of distinct sums
    pub fn new(ceiling_factor: u64, max_states: usize) -> Self {
        Self {
            ceiling_factor,
            max_states,
        }
    }

    fn ceiling(&self, target: Amount, inputs: usize, fee_rate: u64) -> u64 {
        target
            .to_sat()
            .saturating_mul(self.ceiling_factor)
            .saturating_add(fee_model::selection_fee(inputs, fee_rate).to_sat())
    }
}

impl Strategy for KnapsackStrategy {
    fn name(&self) -> &'static str {
        "knapsack"
    }

    fn select(
        &self,
        candidates: &[Utxo],
        target: Amount,
        fee_rate: u64,
    ) -> Result<Vec<Utxo>, SelectionError> {
        let pool = utils::positive_effective_desc(candidates, fee_rate);
        let ceiling = self.ceiling(target, pool.len(), fee_rate);

        let mut nodes: Vec<Node> = Vec::new();
        let mut table: BTreeMap<u64, State> = BTreeMap::new();
        table.insert(0, State { node: None, inputs: 0 });

        for (item, utxo) in pool.iter().enumerate() {
            let value = utxo.value.to_sat();
            let before: Vec<(u64, State)> =
                table.iter().map(|(sum, state)| (*sum, *state)).collect();

            for (sum, state) in before {
                let next_sum = sum.saturating_add(value);
                if next_sum > ceiling {
                    // `before` is ascending, so every later sum overshoots too
                    break;
                }
                let next_inputs = state.inputs + 1;
                if let Some(existing) = table.get(&next_sum) {
                    if existing.inputs <= next_inputs {
                        continue;
                    }
                }

                nodes.push(Node {
                    parent: state.node,
                    item,
                });
                table.insert(
                    next_sum,
                    State {
                        node: Some(nodes.len() - 1),
                        inputs: next_inputs,
                    },
                );

                if table.len() > self.max_states {
                    log_selection(
                        LogLevel::Debug,
                        "Knapsack state budget exhausted",
                        Some(json!({ "states": table.len(), "items_done": item })),
                    );
                    return Err(SelectionError::SearchBudgetExceeded {
                        strategy: self.name(),
                        explored: table.len(),
                    });
                }
            }
        }

        let best = table
            .iter()
            .find(|(sum, state)| {
                state.inputs > 0 && base::covers(**sum, state.inputs, target, fee_rate)
            })
            .map(|(_, state)| *state);

        let Some(State { node: Some(mut cursor), .. }) = best else {
            return Err(base::insufficient_funds(candidates, target, fee_rate));
        };

        let mut selected = Vec::new();
        loop {
            let node = nodes[cursor];
            selected.push(pool[node.item].clone());
            match node.parent {
                Some(parent) => cursor = parent,
                None => break,
            }
        }
        selected.reverse();
        Ok(selected)
    }
}

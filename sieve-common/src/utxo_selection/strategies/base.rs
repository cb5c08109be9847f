//! Base utilities for UTXO selection strategies
//!
//! Post-condition checks and result construction shared by the selector
//! and the individual strategies.

use bitcoin::Amount;
use crate::error::SelectionError;
use crate::fee_model;
use crate::utxo_selection::types::{SelectionResult, SelectionStrategy, Utxo};

/// Total value of a set of outputs in satoshis, saturating
pub fn total_value(utxos: &[Utxo]) -> u64 {
    utxos
        .iter()
        .fold(0u64, |acc, u| acc.saturating_add(u.value.to_sat()))
}

/// Whether `total` sats spread over `inputs` inputs pays `target` plus fee
pub fn covers(total: u64, inputs: usize, target: Amount, fee_rate: u64) -> bool {
    total >= fee_model::required_amount(target, inputs, fee_rate).to_sat()
}

/// Whether a selection satisfies the funding post-condition
pub fn satisfies(selected: &[Utxo], target: Amount, fee_rate: u64) -> bool {
    !selected.is_empty() && covers(total_value(selected), selected.len(), target, fee_rate)
}

/// Insufficient funds over `candidates`
///
/// `required` prices at least one input so that an empty candidate set
/// still reports a realistic fee.
pub fn insufficient_funds(candidates: &[Utxo], target: Amount, fee_rate: u64) -> SelectionError {
    let required = fee_model::required_amount(target, candidates.len().max(1), fee_rate);
    SelectionError::insufficient_funds(required, Amount::from_sat(total_value(candidates)))
}

/// Build the final result for a selection known to satisfy the post-condition
///
/// # Arguments
/// * `selected` - Chosen outputs
/// * `target` - Requested payment amount
/// * `fee_rate` - Fee rate in satoshis per estimated byte
/// * `requested` - Strategy the caller asked for
/// * `used` - Strategy that produced `selected`
pub fn create_success_result(
    selected: Vec<Utxo>,
    target: Amount,
    fee_rate: u64,
    requested: SelectionStrategy,
    used: SelectionStrategy,
) -> SelectionResult {
    let total = total_value(&selected);
    let estimated_fee = fee_model::selection_fee(selected.len(), fee_rate);
    let change = total
        .saturating_sub(target.to_sat())
        .saturating_sub(estimated_fee.to_sat());

    SelectionResult {
        selected,
        total_input_value: Amount::from_sat(total),
        estimated_fee,
        change: Amount::from_sat(change),
        strategy_requested: requested,
        strategy_used: used,
    }
}

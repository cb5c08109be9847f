//! Utility functions for UTXO selection
//!
//! Deterministic orderings used by the strategies. Equal values are always
//! ordered by identity (smaller displayed txid, then smaller vout) so that a
//! strategy's output never depends on snapshot order.

use crate::fee_model;
use crate::utxo_selection::types::Utxo;

/// Sort UTXOs by value in descending order
pub fn sort_by_value_desc(utxos: &[Utxo]) -> Vec<Utxo> {
    let mut sorted = utxos.to_vec();
    sorted.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.cmp_identity(b)));
    sorted
}

/// Sort UTXOs by value in ascending order
pub fn sort_by_value_asc(utxos: &[Utxo]) -> Vec<Utxo> {
    let mut sorted = utxos.to_vec();
    sorted.sort_by(|a, b| a.value.cmp(&b.value).then_with(|| a.cmp_identity(b)));
    sorted
}

/// Outputs worth more than the fee to spend them, largest first
///
/// Adding an output whose effective value is not positive can never help a
/// selection cover its target, so the searching strategies drop them.
pub fn positive_effective_desc(utxos: &[Utxo], fee_rate: u64) -> Vec<Utxo> {
    sort_by_value_desc(utxos)
        .into_iter()
        .filter(|u| fee_model::effective_value(u.value, fee_rate) > 0)
        .collect()
}

/// Effective values of `utxos`, in order
pub fn effective_values(utxos: &[Utxo], fee_rate: u64) -> Vec<i64> {
    utxos
        .iter()
        .map(|u| fee_model::effective_value(u.value, fee_rate))
        .collect()
}

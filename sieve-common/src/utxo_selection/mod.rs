//! UTXO selection module
//!
//! Chooses which unspent outputs fund a payment. The choice trades off fee,
//! change size, privacy and long-term fragmentation of the address's UTXO set.
//!
//! # Module Structure
//!
//! - `types.rs` - UTXO records, requests, results and the strategy tag
//! - `selector.rs` - `UtxoSelector`, which filters, dispatches and falls back
//! - `strategies/` - one file per algorithm
//!   - `greedy.rs` - largest first
//!   - `knapsack.rs` - smallest sufficient total (subset-sum DP)
//!   - `branch_and_bound.rs` - least change (bounded DFS)
//!   - `privacy.rs` - least change with a seeded tie-break
//!   - `consolidate.rs` - smallest first, capped
//!   - `genetic.rs` - evolutionary search for large sets
//!
//! Every strategy is judged by the same post-condition: the selected total
//! pays the target plus `fee_model::selection_fee(inputs, fee_rate)`.
//!
//! Selection never mutates the store. Callers that go on to spend the
//! chosen outputs mark them spent afterwards and must re-check that they
//! are still unspent before broadcasting.

pub mod types;
pub mod selector;
pub mod strategies;

//! UTXO selection strategies
//!
//! Each strategy receives the eligible candidates (unspent, above dust) and
//! returns the outputs it wants to spend, or an error. Fee and change are
//! computed once by the selector from the returned outputs, so every
//! strategy is judged by the same fee model.

use bitcoin::Amount;
use crate::error::SelectionError;
use crate::utxo_selection::types::Utxo;

pub mod base;
pub mod branch_and_bound;
pub mod consolidate;
pub mod genetic;
pub mod greedy;
pub mod knapsack;
pub mod privacy;
pub mod search;
pub mod utils;

// Re-export implementations
pub use branch_and_bound::BranchAndBoundStrategy;
pub use consolidate::ConsolidationStrategy;
pub use genetic::GeneticStrategy;
pub use greedy::GreedyStrategy;
pub use knapsack::KnapsackStrategy;
pub use privacy::PrivacyStrategy;

/// Trait defining a UTXO selection strategy
pub trait Strategy {
    /// Name of this strategy
    fn name(&self) -> &'static str;

    /// Select outputs funding `target` at `fee_rate`
    ///
    /// # Arguments
    /// * `candidates` - Eligible outputs, in snapshot order
    /// * `target` - Amount to pay, excluding fee
    /// * `fee_rate` - Fee rate in satoshis per estimated byte
    ///
    /// # Returns
    /// * The chosen outputs, satisfying `total >= target + fee(len, 2)`
    fn select(
        &self,
        candidates: &[Utxo],
        target: Amount,
        fee_rate: u64,
    ) -> Result<Vec<Utxo>, SelectionError>;
}

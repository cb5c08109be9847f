//! Main UTXO selector implementation
//!
//! `UtxoSelector` is the entry point of the selection engine. It filters the
//! snapshot once (spent records and dust go), checks that the remaining
//! outputs can pay at all, and hands the rest to the strategy named by the
//! request.
//!
//! # Fallbacks
//!
//! Strategies with a work budget may give up. Whenever a strategy other than
//! greedy fails on a request the eligible outputs can fund, the selector
//! retries with greedy selection and reports `strategy_used = greedy`. A
//! branch-and-bound request over more than `large_set_threshold` candidates
//! runs the genetic search instead.
//!
//! # Usage
//!
//! ```no_run
//! use sieve_common::config::SelectionConfig;
//! use sieve_common::utxo_selection::selector::UtxoSelector;
//! use sieve_common::utxo_selection::types::{SelectionRequest, SelectionStrategy, Utxo};
//! use bitcoin::Amount;
//!
//! let utxos: Vec<Utxo> = Vec::new();
//! let selector = UtxoSelector::new(SelectionConfig::default());
//! let request = SelectionRequest::new("bcrt1qtest1", Amount::from_sat(50_000), 2)
//!     .with_strategy(SelectionStrategy::Privacy)
//!     .with_seed(7);
//!
//! match selector.select(&utxos, &request) {
//!     Ok(result) => println!("fee {} change {}", result.estimated_fee, result.change),
//!     Err(e) => println!("selection failed: {}", e),
//! }
//! ```
//!
//! # Events
//!
//! With an attached [`UtxoEventBus`] the selector publishes
//! `UtxoEvent::Selected` on success and `UtxoEvent::SelectionFailed` on
//! failure.

use bitcoin::Amount;
use crate::config::SelectionConfig;
use crate::error::SelectionError;
use crate::events::{OutPointInfo, UtxoEvent, UtxoEventBus};
use crate::fee_model;
use crate::logging::{log_selection, sanitize_for_logging, LogLevel};
use crate::utxo_cache::CachedUtxoStore;
use crate::utxo_selection::strategies::{
    base, utils, BranchAndBoundStrategy, ConsolidationStrategy, GeneticStrategy, GreedyStrategy,
    KnapsackStrategy, PrivacyStrategy, Strategy,
};
use crate::utxo_selection::types::{SelectionRequest, SelectionResult, SelectionStrategy, Utxo};
use serde_json::json;
use std::sync::Arc;

/// UTXO selector that dispatches to the selection strategies
#[derive(Debug, Clone)]
pub struct UtxoSelector {
    config: SelectionConfig,
    event_bus: Option<Arc<UtxoEventBus>>,
}

impl Default for UtxoSelector {
    fn default() -> Self {
        Self::new(SelectionConfig::default())
    }
}

impl UtxoSelector {
    /// Create a selector with the given tuning
    pub fn new(config: SelectionConfig) -> Self {
        Self {
            config,
            event_bus: None,
        }
    }

    /// Attach an event bus for selection events
    pub fn with_event_bus(mut self, event_bus: Arc<UtxoEventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Selection tuning in use
    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Unspent outputs at or above the dust threshold
    ///
    /// Records claiming more than the total money supply are never spendable.
    pub fn eligible(&self, utxos: &[Utxo]) -> Vec<Utxo> {
        utxos
            .iter()
            .filter(|u| !u.spent && u.value <= Amount::MAX_MONEY)
            .filter(|u| !fee_model::is_dust(u.value, self.config.dust_threshold))
            .cloned()
            .collect()
    }

    /// Select outputs from `utxos` for `request`
    ///
    /// # Arguments
    /// * `utxos` - Snapshot of the address (or union of addresses)
    /// * `request` - Target, fee rate, strategy and optional seed
    ///
    /// # Returns
    /// * `Ok(SelectionResult)` satisfying `total >= target + fee(len, 2)`
    /// * `Err(SelectionError::InsufficientFunds)` when the eligible outputs cannot pay
    /// * `Err(SelectionError::InvalidTarget)` for a zero target or one above
    ///   the total money supply
    pub fn select(
        &self,
        utxos: &[Utxo],
        request: &SelectionRequest,
    ) -> Result<SelectionResult, SelectionError> {
        let outcome = self.run(utxos, request);
        self.publish_outcome(request, utxos, &outcome);
        outcome
    }

    /// Select for `request.address` from the cached store
    ///
    /// Fails with `AddressNotFound` when the source never reported any output
    /// for the address.
    pub fn select_from(
        &self,
        cache: &CachedUtxoStore,
        request: &SelectionRequest,
    ) -> Result<SelectionResult, SelectionError> {
        let snapshot = cache.snapshot(&request.address)?;
        if cache.store().stats(&request.address)?.total_utxos == 0 {
            return Err(SelectionError::AddressNotFound(request.address.clone()));
        }
        self.select(snapshot.as_slice(), request)
    }

    /// Select over the union of several addresses' snapshots
    ///
    /// Fails with `AddressNotFound` only if none of the addresses has any record.
    pub fn select_multi(
        &self,
        cache: &CachedUtxoStore,
        addresses: &[String],
        target: Amount,
        fee_rate: u64,
        strategy: SelectionStrategy,
        seed: Option<u64>,
    ) -> Result<SelectionResult, SelectionError> {
        let union = cache.union_snapshot(addresses)?;

        let mut known = false;
        for address in addresses {
            if cache.store().stats(address)?.total_utxos > 0 {
                known = true;
                break;
            }
        }
        if !known {
            return Err(SelectionError::AddressNotFound(addresses.join(",")));
        }

        let mut request = SelectionRequest::new(addresses.join(","), target, fee_rate)
            .with_strategy(strategy);
        request.seed = seed;
        self.select(union.as_slice(), &request)
    }

    fn run(
        &self,
        utxos: &[Utxo],
        request: &SelectionRequest,
    ) -> Result<SelectionResult, SelectionError> {
        if request.target == Amount::ZERO {
            return Err(SelectionError::InvalidTarget(
                "target amount must be greater than zero".to_string(),
            ));
        }
        if request.target > Amount::MAX_MONEY {
            return Err(SelectionError::InvalidTarget(format!(
                "target amount {} sat exceeds the money supply",
                request.target.to_sat()
            )));
        }

        let candidates = self.eligible(utxos);
        let target = request.target;
        let fee_rate = request.fee_rate;

        // Spending every positive-effective output is the best any strategy can do
        let pool = utils::positive_effective_desc(&candidates, fee_rate);
        let funded = base::covers(base::total_value(&pool), pool.len(), target, fee_rate);
        if pool.is_empty() || !funded {
            return Err(base::insufficient_funds(&candidates, target, fee_rate));
        }

        let seed = request
            .seed
            .or(self.config.seed)
            .unwrap_or_else(rand::random::<u64>);

        let (attempt, used) =
            self.dispatch(request.strategy, &candidates, target, fee_rate, seed);

        let (selected, used) = match attempt {
            Ok(selected) if base::satisfies(&selected, target, fee_rate) => (selected, used),
            Ok(_) => {
                log_selection(
                    LogLevel::Warn,
                    "Strategy returned an underfunded selection, using greedy",
                    Some(json!({ "strategy": used.as_str() })),
                );
                self.greedy(&candidates, target, fee_rate)?
            }
            Err(e) if used == SelectionStrategy::Greedy => return Err(e),
            Err(e) => {
                log_selection(
                    LogLevel::Info,
                    "Strategy gave up, falling back to greedy",
                    Some(json!({ "strategy": used.as_str(), "reason": e.to_string() })),
                );
                self.greedy(&candidates, target, fee_rate)?
            }
        };

        let result =
            base::create_success_result(selected, target, fee_rate, request.strategy, used);

        log_selection(
            LogLevel::Debug,
            "Selection complete",
            Some(json!({
                "address": sanitize_for_logging(&request.address),
                "candidates": candidates.len(),
                "inputs": result.selected.len(),
                "fee": result.estimated_fee.to_sat(),
                "change": result.change.to_sat(),
                "requested": request.strategy.as_str(),
                "used": result.strategy_used.as_str(),
            })),
        );

        Ok(result)
    }

    /// Run the strategy for `strategy`, reporting which one actually ran
    fn dispatch(
        &self,
        strategy: SelectionStrategy,
        candidates: &[Utxo],
        target: Amount,
        fee_rate: u64,
        seed: u64,
    ) -> (Result<Vec<Utxo>, SelectionError>, SelectionStrategy) {
        let config = &self.config;
        match strategy {
            SelectionStrategy::Greedy => {
                (GreedyStrategy.select(candidates, target, fee_rate), strategy)
            }
            SelectionStrategy::Knapsack => (
                KnapsackStrategy::new(config.knapsack_ceiling_factor, config.knapsack_max_states)
                    .select(candidates, target, fee_rate),
                strategy,
            ),
            SelectionStrategy::BranchAndBound if candidates.len() > config.large_set_threshold => {
                log_selection(
                    LogLevel::Debug,
                    "Large candidate set, using genetic search",
                    Some(json!({ "candidates": candidates.len() })),
                );
                self.dispatch(SelectionStrategy::Genetic, candidates, target, fee_rate, seed)
            }
            SelectionStrategy::BranchAndBound => (
                BranchAndBoundStrategy::new(config.bnb_max_nodes)
                    .select(candidates, target, fee_rate),
                strategy,
            ),
            SelectionStrategy::Privacy => (
                PrivacyStrategy::new(config.bnb_max_nodes, config.privacy_max_ties, seed)
                    .select(candidates, target, fee_rate),
                strategy,
            ),
            SelectionStrategy::Consolidation => (
                ConsolidationStrategy::new(config.consolidation_max_inputs)
                    .select(candidates, target, fee_rate),
                strategy,
            ),
            SelectionStrategy::Genetic => (
                GeneticStrategy::new(config.genetic_population, config.genetic_generations, seed)
                    .select(candidates, target, fee_rate),
                strategy,
            ),
        }
    }

    fn greedy(
        &self,
        candidates: &[Utxo],
        target: Amount,
        fee_rate: u64,
    ) -> Result<(Vec<Utxo>, SelectionStrategy), SelectionError> {
        GreedyStrategy
            .select(candidates, target, fee_rate)
            .map(|selected| (selected, SelectionStrategy::Greedy))
    }

    fn publish_outcome(
        &self,
        request: &SelectionRequest,
        utxos: &[Utxo],
        outcome: &Result<SelectionResult, SelectionError>,
    ) {
        let Some(bus) = &self.event_bus else {
            return;
        };

        let event = match outcome {
            Ok(result) => UtxoEvent::Selected {
                utxos: result
                    .selected
                    .iter()
                    .map(|u| OutPointInfo::from(&u.outpoint))
                    .collect(),
                strategy_requested: result.strategy_requested.as_str().to_string(),
                strategy_used: result.strategy_used.as_str().to_string(),
                target_amount: request.target.to_sat(),
                fee_amount: result.estimated_fee.to_sat(),
                change_amount: result.change.to_sat(),
            },
            Err(e) => {
                let available = match e {
                    SelectionError::InsufficientFunds { available, .. } => available.to_sat(),
                    _ => base::total_value(&self.eligible(utxos)),
                };
                UtxoEvent::SelectionFailed {
                    reason: e.kind().to_string(),
                    strategy: request.strategy.as_str().to_string(),
                    target_amount: request.target.to_sat(),
                    available_amount: available,
                }
            }
        };
        bus.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::{OutPoint, Txid};
    use std::str::FromStr;

    fn utxo(tag: u8, vout: u32, sats: u64) -> Utxo {
        let txid = Txid::from_str(&format!("{:02x}", tag).repeat(32)).unwrap();
        Utxo::new(OutPoint::new(txid, vout), "bcrt1qtest1", Amount::from_sat(sats), 100)
    }

    fn three() -> Vec<Utxo> {
        vec![utxo(0xaa, 0, 100_000), utxo(0xaa, 1, 50_000), utxo(0xaa, 2, 25_000)]
    }

    #[test]
    fn test_default_selection() {
        let selector = UtxoSelector::default();
        let request = SelectionRequest::new("bcrt1qtest1", Amount::from_sat(120_000), 1);
        let result = selector.select(&three(), &request).unwrap();

        assert_eq!(result.total_input_value, Amount::from_sat(150_000));
        assert_eq!(result.estimated_fee, Amount::from_sat(374));
        assert_eq!(result.change, Amount::from_sat(150_000 - 120_000 - 374));
        assert_eq!(result.strategy_used, SelectionStrategy::Greedy);
    }

    #[test]
    fn test_zero_target_rejected() {
        let selector = UtxoSelector::default();
        let request = SelectionRequest::new("bcrt1qtest1", Amount::ZERO, 1);
        assert!(matches!(
            selector.select(&three(), &request),
            Err(SelectionError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_target_above_money_supply_rejected() {
        let selector = UtxoSelector::default();
        let utxos = vec![utxo(0xaa, 0, u64::MAX)];
        let request = SelectionRequest::new("bcrt1qtest1", Amount::from_sat(u64::MAX - 10), 1);
        assert!(matches!(
            selector.select(&utxos, &request),
            Err(SelectionError::InvalidTarget(_))
        ));

        let at_limit = SelectionRequest::new("bcrt1qtest1", Amount::MAX_MONEY, 1);
        assert!(matches!(
            selector.select(&three(), &at_limit),
            Err(SelectionError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_records_above_money_supply_are_not_spendable() {
        let selector = UtxoSelector::default();
        let utxos = vec![utxo(0xaa, 0, u64::MAX), utxo(0xbb, 0, 20_000)];
        assert_eq!(selector.eligible(&utxos).len(), 1);

        let request = SelectionRequest::new("bcrt1qtest1", Amount::from_sat(1_000_000), 1);
        match selector.select(&utxos, &request) {
            Err(SelectionError::InsufficientFunds { available, .. }) => {
                assert_eq!(available, Amount::from_sat(20_000));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let small = SelectionRequest::new("bcrt1qtest1", Amount::from_sat(10_000), 1);
        let result = selector.select(&utxos, &small).unwrap();
        assert_eq!(result.total_input_value, Amount::from_sat(20_000));
    }

    #[test]
    fn test_spent_and_dust_are_filtered() {
        let mut utxos = three();
        utxos[0].spent = true;
        utxos.push(utxo(0xbb, 0, 500));

        let config = SelectionConfig {
            dust_threshold: 1_000,
            ..SelectionConfig::default()
        };
        let eligible = UtxoSelector::new(config).eligible(&utxos);
        assert_eq!(eligible.len(), 2);
        assert!(eligible.iter().all(|u| !u.spent && u.value.to_sat() >= 1_000));
    }

    #[test]
    fn test_budget_exhaustion_falls_back_to_greedy() {
        let config = SelectionConfig {
            bnb_max_nodes: 3,
            ..SelectionConfig::default()
        };
        let utxos: Vec<Utxo> = (0..30u8).map(|i| utxo(i + 1, 0, 10_000 + 2 * i as u64)).collect();
        let request = SelectionRequest::new("bcrt1qtest1", Amount::from_sat(100_001), 0)
            .with_strategy(SelectionStrategy::BranchAndBound);

        let result = UtxoSelector::new(config).select(&utxos, &request).unwrap();
        assert_eq!(result.strategy_requested, SelectionStrategy::BranchAndBound);
        assert_eq!(result.strategy_used, SelectionStrategy::Greedy);
        assert!(result.fell_back());
    }

    #[test]
    fn test_large_set_routes_to_genetic() {
        let config = SelectionConfig {
            large_set_threshold: 4,
            seed: Some(3),
            ..SelectionConfig::default()
        };
        let utxos: Vec<Utxo> = (0..10u8)
            .map(|i| utxo(i + 1, 0, 5_000 + 1_000 * i as u64))
            .collect();
        let request = SelectionRequest::new("bcrt1qtest1", Amount::from_sat(20_000), 1)
            .with_strategy(SelectionStrategy::BranchAndBound);

        let result = UtxoSelector::new(config).select(&utxos, &request).unwrap();
        assert_eq!(result.strategy_used, SelectionStrategy::Genetic);
    }

    #[test]
    fn test_events_published() {
        let bus = Arc::new(UtxoEventBus::new());
        let selected = bus.subscribe("selected");
        let failed = bus.subscribe("selection_failed");
        let selector = UtxoSelector::default().with_event_bus(bus);

        let ok = SelectionRequest::new("bcrt1qtest1", Amount::from_sat(10_000), 1);
        selector.select(&three(), &ok).unwrap();
        assert!(matches!(selected.try_recv(), Ok(UtxoEvent::Selected { .. })));

        let too_much = SelectionRequest::new("bcrt1qtest1", Amount::from_sat(1_000_000_000), 1);
        selector.select(&three(), &too_much).unwrap_err();
        match failed.try_recv() {
            Ok(UtxoEvent::SelectionFailed { reason, available_amount, .. }) => {
                assert_eq!(reason, "insufficient_funds");
                assert_eq!(available_amount, 175_000);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}

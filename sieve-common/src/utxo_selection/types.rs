//! Core types for UTXO selection
//!
//! # Key Types
//!
//! - [`Utxo`]: One indexed output of an address
//! - [`UtxoSet`]: An ordered collection of outputs with helper methods
//! - [`SelectionStrategy`]: The closed set of selection algorithms
//! - [`SelectionRequest`]: What a caller asks the engine for
//! - [`SelectionResult`]: What a successful selection returns
//!
//! # Example
//!
//! ```
//! use sieve_common::utxo_selection::types::{Utxo, UtxoSet};
//! use bitcoin::{Amount, OutPoint, Txid};
//! use std::str::FromStr;
//!
//! let utxo = Utxo::new(
//!     OutPoint::new(
//!         Txid::from_str("7967a5185e907a25225574544c31f7b059c1a191d65b53dcc1554d339c4f9efc").unwrap(),
//!         0,
//!     ),
//!     "bcrt1qtest1",
//!     Amount::from_sat(10_000),
//!     101,
//! );
//!
//! let mut utxo_set = UtxoSet::new();
//! utxo_set.add(utxo);
//! assert_eq!(utxo_set.total_value(), Amount::from_sat(10_000));
//! ```

use crate::error::SelectionError;
use bitcoin::hashes::Hash;
use bitcoin::{Amount, OutPoint, Txid};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// One unspent (or formerly unspent) output indexed for an address
///
/// Identity is the outpoint; it is unique within a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Utxo {
    /// Reference to the transaction output (txid and vout)
    pub outpoint: OutPoint,

    /// Address the output pays to
    pub address: String,

    /// Value of the output
    pub value: Amount,

    /// Block height that confirmed the output, 0 if unconfirmed
    pub confirmation_height: u32,

    /// Set once the output has been spent; never cleared
    pub spent: bool,
}

impl Serialize for Utxo {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Utxo", 6)?;
        state.serialize_field("txid", &self.outpoint.txid.to_string())?;
        state.serialize_field("vout", &self.outpoint.vout)?;
        state.serialize_field("address", &self.address)?;
        state.serialize_field("value_sats", &self.value.to_sat())?;
        state.serialize_field("confirmation_height", &self.confirmation_height)?;
        state.serialize_field("spent", &self.spent)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Utxo {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de;

        #[derive(Deserialize)]
        struct UtxoHelper {
            txid: String,
            vout: u32,
            address: String,
            value_sats: u64,
            #[serde(default)]
            confirmation_height: u32,
            #[serde(default)]
            spent: bool,
        }

        let helper = UtxoHelper::deserialize(deserializer)?;
        let txid = Txid::from_str(&helper.txid)
            .map_err(|_| de::Error::custom(format!("Invalid txid: {}", helper.txid)))?;

        Ok(Utxo {
            outpoint: OutPoint::new(txid, helper.vout),
            address: helper.address,
            value: Amount::from_sat(helper.value_sats),
            confirmation_height: helper.confirmation_height,
            spent: helper.spent,
        })
    }
}

impl Utxo {
    /// Create a new unspent record
    ///
    /// # Arguments
    /// * `outpoint` - The transaction outpoint (txid and vout)
    /// * `address` - Address the output pays to
    /// * `value` - The value of the output
    /// * `confirmation_height` - Confirming block height, 0 for unconfirmed
    pub fn new(
        outpoint: OutPoint,
        address: impl Into<String>,
        value: Amount,
        confirmation_height: u32,
    ) -> Self {
        Self {
            outpoint,
            address: address.into(),
            value,
            confirmation_height,
            spent: false,
        }
    }

    /// Whether the output has been confirmed in a block
    pub fn is_confirmed(&self) -> bool {
        self.confirmation_height > 0
    }

    /// Transaction id bytes in the order the id is displayed
    ///
    /// Comparing these arrays orders txids the same way as comparing
    /// their hex strings.
    pub fn display_txid(&self) -> [u8; 32] {
        let mut bytes = *self.outpoint.txid.as_byte_array();
        bytes.reverse();
        bytes
    }

    /// Ordering by identity: smaller displayed txid first, then smaller vout
    pub fn cmp_identity(&self, other: &Utxo) -> Ordering {
        self.display_txid()
            .cmp(&other.display_txid())
            .then(self.outpoint.vout.cmp(&other.outpoint.vout))
    }
}

/// Ordered collection of UTXOs
///
/// Order is arrival order; strategies impose their own ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    utxos: Vec<Utxo>,
}

impl UtxoSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an output
    pub fn add(&mut self, utxo: Utxo) {
        self.utxos.push(utxo);
    }

    /// Find an output by outpoint
    pub fn get(&self, outpoint: &OutPoint) -> Option<&Utxo> {
        self.utxos.iter().find(|u| &u.outpoint == outpoint)
    }

    /// Whether an output with this outpoint is present
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.get(outpoint).is_some()
    }

    /// Number of outputs
    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    /// Iterate in arrival order
    pub fn iter(&self) -> std::slice::Iter<'_, Utxo> {
        self.utxos.iter()
    }

    /// Borrow the outputs as a slice
    pub fn as_slice(&self) -> &[Utxo] {
        &self.utxos
    }

    /// Take ownership of the outputs
    pub fn into_vec(self) -> Vec<Utxo> {
        self.utxos
    }

    /// Sum of the values of all outputs in the set
    pub fn total_value(&self) -> Amount {
        Amount::from_sat(
            self.utxos
                .iter()
                .fold(0u64, |acc, u| acc.saturating_add(u.value.to_sat())),
        )
    }
}

impl From<Vec<Utxo>> for UtxoSet {
    fn from(utxos: Vec<Utxo>) -> Self {
        Self { utxos }
    }
}

impl IntoIterator for UtxoSet {
    type Item = Utxo;
    type IntoIter = std::vec::IntoIter<Utxo>;

    fn into_iter(self) -> Self::IntoIter {
        self.utxos.into_iter()
    }
}

impl<'a> IntoIterator for &'a UtxoSet {
    type Item = &'a Utxo;
    type IntoIter = std::slice::Iter<'a, Utxo>;

    fn into_iter(self) -> Self::IntoIter {
        self.utxos.iter()
    }
}

/// Selection algorithms supported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Largest outputs first
    Greedy,
    /// Subset-sum dynamic programming for the smallest sufficient total
    Knapsack,
    /// Depth-first search for the least change
    BranchAndBound,
    /// Least change with randomized tie-breaking and input order
    Privacy,
    /// Spend many small outputs
    Consolidation,
    /// Evolutionary search for the least change
    Genetic,
}

impl SelectionStrategy {
    /// Every strategy, in tag-number order
    pub const ALL: [SelectionStrategy; 6] = [
        SelectionStrategy::Greedy,
        SelectionStrategy::Knapsack,
        SelectionStrategy::BranchAndBound,
        SelectionStrategy::Privacy,
        SelectionStrategy::Consolidation,
        SelectionStrategy::Genetic,
    ];

    /// Canonical tag
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategy::Greedy => "greedy",
            SelectionStrategy::Knapsack => "knapsack",
            SelectionStrategy::BranchAndBound => "branch_and_bound",
            SelectionStrategy::Privacy => "privacy",
            SelectionStrategy::Consolidation => "consolidation",
            SelectionStrategy::Genetic => "genetic",
        }
    }
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        SelectionStrategy::Greedy
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionStrategy {
    type Err = SelectionError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "default" | "greedy" | "optimize_fee" | "optimize_fee_1" => {
                Ok(SelectionStrategy::Greedy)
            }
            "knapsack" | "optimize_fee_2" => Ok(SelectionStrategy::Knapsack),
            "branch_and_bound" | "bnb" | "optimize_fee_3" => Ok(SelectionStrategy::BranchAndBound),
            "privacy" | "optimize_fee_4" => Ok(SelectionStrategy::Privacy),
            "consolidation" | "consolidate" | "optimize_fee_5" => {
                Ok(SelectionStrategy::Consolidation)
            }
            "genetic" | "optimize_fee_6" => Ok(SelectionStrategy::Genetic),
            _ => Err(SelectionError::InvalidStrategy(tag.to_string())),
        }
    }
}

/// A request to fund `target` from the outputs of `address`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    pub address: String,
    pub target: Amount,
    /// Satoshis per estimated byte
    pub fee_rate: u64,
    pub strategy: SelectionStrategy,
    /// Seed for the randomized strategies
    pub seed: Option<u64>,
}

impl SelectionRequest {
    /// Greedy request without a seed
    pub fn new(address: impl Into<String>, target: Amount, fee_rate: u64) -> Self {
        Self {
            address: address.into(),
            target,
            fee_rate,
            strategy: SelectionStrategy::default(),
            seed: None,
        }
    }

    /// Use the given strategy
    pub fn with_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Seed the randomized strategies
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// A successful selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionResult {
    /// Chosen outputs, in the order the strategy produced them
    pub selected: Vec<Utxo>,
    pub total_input_value: Amount,
    pub estimated_fee: Amount,
    /// `total_input_value - target - estimated_fee`
    pub change: Amount,
    pub strategy_requested: SelectionStrategy,
    /// Differs from `strategy_requested` when the engine fell back
    pub strategy_used: SelectionStrategy,
}

impl SelectionResult {
    /// Whether the engine used a different algorithm than requested
    pub fn fell_back(&self) -> bool {
        self.strategy_requested != self.strategy_used
    }

    /// Outpoints of the chosen outputs
    pub fn outpoints(&self) -> Vec<OutPoint> {
        self.selected.iter().map(|u| u.outpoint).collect()
    }
}

impl Serialize for SelectionResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("SelectionResult", 6)?;
        state.serialize_field("selected", &self.selected)?;
        state.serialize_field("total_input_value", &self.total_input_value.to_sat())?;
        state.serialize_field("estimated_fee", &self.estimated_fee.to_sat())?;
        state.serialize_field("change", &self.change.to_sat())?;
        state.serialize_field("strategy_requested", &self.strategy_requested)?;
        state.serialize_field("strategy_used", &self.strategy_used)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txid(byte: u8) -> Txid {
        Txid::from_str(&format!("{:02x}", byte).repeat(32)).unwrap()
    }

    #[test]
    fn test_strategy_tags() {
        assert_eq!("default".parse::<SelectionStrategy>().unwrap(), SelectionStrategy::Greedy);
        assert_eq!("BnB".parse::<SelectionStrategy>().unwrap(), SelectionStrategy::BranchAndBound);
        assert_eq!(
            "consolidate".parse::<SelectionStrategy>().unwrap(),
            SelectionStrategy::Consolidation
        );
        for (i, strategy) in SelectionStrategy::ALL.iter().enumerate() {
            let tag = format!("optimize_fee_{}", i + 1);
            assert_eq!(tag.parse::<SelectionStrategy>().unwrap(), *strategy);
            assert_eq!(strategy.as_str().parse::<SelectionStrategy>().unwrap(), *strategy);
        }
        assert_eq!(
            "fastest".parse::<SelectionStrategy>(),
            Err(SelectionError::InvalidStrategy("fastest".to_string()))
        );
        assert!("".parse::<SelectionStrategy>().is_err());
        assert!("  ".parse::<SelectionStrategy>().is_err());
    }

    #[test]
    fn test_identity_order_follows_display() {
        let low = Utxo::new(OutPoint::new(txid(0x01), 5), "a", Amount::ONE_SAT, 0);
        let high = Utxo::new(OutPoint::new(txid(0xf0), 0), "a", Amount::ONE_SAT, 0);
        assert_eq!(low.cmp_identity(&high), Ordering::Less);
        assert!(low.outpoint.txid.to_string() < high.outpoint.txid.to_string());

        let low_vout = Utxo::new(OutPoint::new(txid(0x01), 1), "a", Amount::ONE_SAT, 0);
        assert_eq!(low_vout.cmp_identity(&low), Ordering::Less);
    }

    #[test]
    fn test_utxo_serde_shape() {
        let utxo = Utxo::new(OutPoint::new(txid(0xab), 3), "bcrt1qtest1", Amount::from_sat(42), 7);
        let value = serde_json::to_value(&utxo).unwrap();
        assert_eq!(value["value_sats"], 42);
        assert_eq!(value["vout"], 3);
        assert_eq!(value["txid"], "ab".repeat(32));

        let back: Utxo = serde_json::from_value(value).unwrap();
        assert_eq!(back, utxo);
    }

    #[test]
    fn test_bad_txid_is_rejected() {
        let json = r#"{"txid":"zz","vout":0,"address":"a","value_sats":1}"#;
        assert!(serde_json::from_str::<Utxo>(json).is_err());
    }

    #[test]
    fn test_set_helpers() {
        let a = Utxo::new(OutPoint::new(txid(1), 0), "a", Amount::from_sat(10), 1);
        let b = Utxo::new(OutPoint::new(txid(2), 0), "a", Amount::from_sat(32), 0);
        let set = UtxoSet::from(vec![a.clone(), b.clone()]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.total_value(), Amount::from_sat(42));
        assert!(set.contains(&b.outpoint));
        assert_eq!(set.get(&a.outpoint), Some(&a));
        assert!(!b.is_confirmed());
    }
}

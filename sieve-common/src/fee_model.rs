//! Transaction size and fee model shared by every selection strategy
//!
//! The model is deliberately coarse: every input is priced as a legacy
//! P2PKH input and every output as a P2PKH output, on top of a fixed
//! transaction overhead. All arithmetic is integer satoshis and saturates
//! instead of wrapping, so absurd fee rates produce absurd (but ordered)
//! fees rather than panics.
//!
//! ```
//! use sieve_common::fee_model::{estimate_fee, estimate_tx_size};
//!
//! assert_eq!(estimate_tx_size(1, 2), 10 + 148 + 68);
//! assert_eq!(estimate_fee(2, 2, 3).to_sat(), (10 + 296 + 68) * 3);
//! ```

use bitcoin::Amount;

/// Fixed per-transaction overhead in bytes
pub const TX_OVERHEAD_BYTES: u64 = 10;

/// Estimated size of one spent input in bytes
pub const INPUT_BYTES: u64 = 148;

/// Estimated size of one output in bytes
pub const OUTPUT_BYTES: u64 = 34;

/// Every selection prices a payment output plus a change output
pub const DEFAULT_OUTPUTS: usize = 2;

/// Estimates the serialized size of a transaction
///
/// # Arguments
/// * `inputs` - Number of inputs
/// * `outputs` - Number of outputs
///
/// # Returns
/// Estimated size in bytes
pub fn estimate_tx_size(inputs: usize, outputs: usize) -> u64 {
    TX_OVERHEAD_BYTES
        .saturating_add(INPUT_BYTES.saturating_mul(inputs as u64))
        .saturating_add(OUTPUT_BYTES.saturating_mul(outputs as u64))
}

/// Estimates the fee for a transaction of the given shape
///
/// # Arguments
/// * `inputs` - Number of inputs
/// * `outputs` - Number of outputs
/// * `fee_rate` - Fee rate in satoshis per estimated byte
///
/// # Returns
/// The fee as an `Amount`
pub fn estimate_fee(inputs: usize, outputs: usize, fee_rate: u64) -> Amount {
    Amount::from_sat(estimate_tx_size(inputs, outputs).saturating_mul(fee_rate))
}

/// Fee for a selection of `inputs` inputs paying to the default two outputs
pub fn selection_fee(inputs: usize, fee_rate: u64) -> Amount {
    estimate_fee(inputs, DEFAULT_OUTPUTS, fee_rate)
}

/// Fee that does not depend on the number of inputs (overhead plus outputs)
pub fn fixed_fee(fee_rate: u64) -> u64 {
    selection_fee(0, fee_rate).to_sat()
}

/// Marginal fee paid for one additional input
pub fn input_fee(fee_rate: u64) -> u64 {
    INPUT_BYTES.saturating_mul(fee_rate)
}

/// Value an output contributes once the cost of spending it is paid
///
/// May be negative for outputs that cost more to spend than they hold.
pub fn effective_value(value: Amount, fee_rate: u64) -> i64 {
    let value = i64::try_from(value.to_sat()).unwrap_or(i64::MAX);
    let cost = i64::try_from(input_fee(fee_rate)).unwrap_or(i64::MAX);
    value.saturating_sub(cost)
}

/// Amount a selection of `inputs` inputs must cover to pay `target`
pub fn required_amount(target: Amount, inputs: usize, fee_rate: u64) -> Amount {
    Amount::from_sat(
        target
            .to_sat()
            .saturating_add(selection_fee(inputs, fee_rate).to_sat()),
    )
}

/// Whether an output is below the dust threshold
pub fn is_dust(value: Amount, dust_threshold: u64) -> bool {
    value.to_sat() < dust_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_model() {
        assert_eq!(estimate_tx_size(0, 0), 10);
        assert_eq!(estimate_tx_size(3, 2), 10 + 3 * 148 + 2 * 34);
    }

    #[test]
    fn test_fee_is_monotonic_in_inputs() {
        let mut last = Amount::ZERO;
        for inputs in 0..20 {
            let fee = selection_fee(inputs, 5);
            assert!(fee > last || inputs == 0);
            last = fee;
        }
    }

    #[test]
    fn test_zero_rate_is_free() {
        assert_eq!(selection_fee(10, 0), Amount::ZERO);
        assert_eq!(effective_value(Amount::from_sat(700), 0), 700);
    }

    #[test]
    fn test_fee_saturates() {
        assert_eq!(estimate_fee(usize::MAX, 2, u64::MAX).to_sat(), u64::MAX);
        assert_eq!(
            required_amount(Amount::from_sat(u64::MAX), 1, 1).to_sat(),
            u64::MAX
        );
    }

    #[test]
    fn test_fee_decomposition() {
        for rate in [0u64, 1, 7, 250] {
            for inputs in 0..5usize {
                assert_eq!(
                    selection_fee(inputs, rate).to_sat(),
                    fixed_fee(rate) + inputs as u64 * input_fee(rate)
                );
            }
        }
    }

    #[test]
    fn test_dust() {
        assert!(is_dust(Amount::from_sat(545), 546));
        assert!(!is_dust(Amount::from_sat(546), 546));
        assert!(!is_dust(Amount::ZERO, 0));
    }
}

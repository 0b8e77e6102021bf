//! Transaction validation: structural checks and lock-time rules.
//!
//! Two families of checks live here:
//!
//! - **Structural** ([`check_transaction`]): context-free checks on
//!   transaction format and value ranges. No external state required.
//! - **Lock-time** ([`is_final_tx`], [`calculate_sequence_locks`]):
//!   absolute lock-time finality and relative sequence locks, evaluated
//!   against a prospective block height and median-time-past.
//!
//! UTXO-aware validation (missing inputs, maturity, fees, scripts) is
//! behind the [`Validator`](crate::traits::Validator) seam.

use std::collections::HashSet;

use crate::amount::{money_range, Amount};
use crate::error::TransactionError;
use crate::params::LOCKTIME_THRESHOLD;
use crate::types::{Transaction, TxInput};

/// Validate transaction structure (context-free).
///
/// - Non-empty inputs and outputs
/// - Every output value within the money range
/// - Total output value within the money range
/// - No duplicate input outpoints
/// - No null outpoints outside coinbase transactions
pub fn check_transaction(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(TransactionError::EmptyInputsOrOutputs);
    }

    let mut total: Amount = 0;
    for (i, output) in tx.outputs.iter().enumerate() {
        if !money_range(output.value) {
            return Err(TransactionError::ValueOutOfRange(i));
        }
        total = total
            .checked_add(output.value)
            .ok_or(TransactionError::ValueOverflow)?;
        if !money_range(total) {
            return Err(TransactionError::ValueOverflow);
        }
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.previous_output) {
            return Err(TransactionError::DuplicateInput(
                input.previous_output.to_string(),
            ));
        }
    }

    if !tx.is_coinbase() {
        for (i, input) in tx.inputs.iter().enumerate() {
            if input.previous_output.is_null() {
                return Err(TransactionError::NullOutpointInRegularTx(i));
            }
        }
    }

    Ok(())
}

/// Check absolute lock-time finality for inclusion in a block at
/// `block_height` whose median-time-past is `block_time`.
///
/// A lock-time below [`LOCKTIME_THRESHOLD`] is a block height, otherwise a
/// Unix timestamp. A transaction with a pending lock-time is still final
/// when every input opted out via [`TxInput::SEQUENCE_FINAL`].
pub fn is_final_tx(tx: &Transaction, block_height: u64, block_time: u64) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let cutoff = if tx.lock_time < LOCKTIME_THRESHOLD {
        block_height
    } else {
        block_time
    };
    if tx.lock_time < cutoff {
        return true;
    }
    tx.inputs
        .iter()
        .all(|input| input.sequence == TxInput::SEQUENCE_FINAL)
}

/// Earliest block a transaction's relative sequence locks allow it into.
///
/// Produced by [`calculate_sequence_locks`]; a default value carries no
/// constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceLocks {
    /// Inclusion height must be strictly greater than this.
    pub min_height: u64,
    /// Median-time-past must be strictly greater than this, if set.
    pub min_time: Option<u64>,
}

impl SequenceLocks {
    /// Check whether the locks permit inclusion in a block at `height`
    /// whose chain tip has the given `median_time_past`.
    pub fn satisfied_at(&self, height: u64, median_time_past: u64) -> bool {
        self.min_height < height && self.min_time.is_none_or(|t| t < median_time_past)
    }
}

/// Compute relative sequence locks per BIP 68.
///
/// `prev_heights[i]` is the height of the coin spent by input `i`; for
/// unconfirmed parents callers pass the height of the block being built.
/// `median_time_at(h)` must return the median-time-past of the chain as of
/// height `h`. Transactions below version 2 carry no relative locks, as do
/// inputs with [`TxInput::SEQUENCE_LOCKTIME_DISABLE_FLAG`] set.
///
/// Time-type locks measure from the median-time-past just before the coin's
/// block, so a coin at height `h` uses `median_time_at(h - 1)` as its basis.
pub fn calculate_sequence_locks<F>(
    tx: &Transaction,
    prev_heights: &[u64],
    median_time_at: F,
) -> SequenceLocks
where
    F: Fn(u64) -> u64,
{
    let mut locks = SequenceLocks::default();
    if tx.version < 2 {
        return locks;
    }

    for (input, &coin_height) in tx.inputs.iter().zip(prev_heights) {
        if input.sequence & TxInput::SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            continue;
        }
        let masked = u64::from(input.sequence & TxInput::SEQUENCE_LOCKTIME_MASK);
        if input.sequence & TxInput::SEQUENCE_LOCKTIME_TYPE_FLAG != 0 {
            let basis = median_time_at(coin_height.saturating_sub(1));
            let candidate =
                (basis + (masked << TxInput::SEQUENCE_LOCKTIME_GRANULARITY)).saturating_sub(1);
            locks.min_time = Some(locks.min_time.map_or(candidate, |t| t.max(candidate)));
        } else {
            let candidate = (coin_height + masked).saturating_sub(1);
            locks.min_height = locks.min_height.max(candidate);
        }
    }
    locks
}

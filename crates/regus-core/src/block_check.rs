//! Full block checking against chain state.
//!
//! [`check_block`] runs every consensus rule a block template must satisfy:
//! coinbase placement, weight and sigop limits, txid uniqueness, merkle
//! commitment, per-transaction validity (structure, lock-times, input
//! resolution with intra-block spending, value conservation, scripts), and
//! the coinbase amount. Errors display the consensus reject code for the
//! first rule violated.
//!
//! Header linkage and proof-of-work are outside this module; callers check
//! those where the header is produced or received.

use std::collections::{HashMap, HashSet};

use crate::amount::{money_range, Amount};
use crate::chain::ChainView;
use crate::error::{BlockError, TransactionError};
use crate::merkle;
use crate::params::{block_subsidy, ChainParams, MAX_BLOCK_SIGOPS_COST, MAX_BLOCK_WEIGHT};
use crate::script::transaction_sigop_cost;
use crate::traits::ScriptVerifier;
use crate::types::{Block, OutPoint, UtxoEntry};
use crate::validation::{calculate_sequence_locks, check_transaction, is_final_tx};

/// Chain position a block is checked at.
///
/// `height` is the height the block would occupy; `median_time_past` is the
/// median-time-past of the current tip, the cutoff for time-based locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    /// Height of the block being checked.
    pub height: u64,
    /// Median-time-past of the tip the block builds on.
    pub median_time_past: u64,
}

/// Totals computed while checking a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSummary {
    /// Sum of non-coinbase transaction fees in satoshis.
    pub total_fees: Amount,
    /// Total block weight.
    pub total_weight: u64,
    /// Total signature-operation cost.
    pub sigop_cost: i64,
}

/// Check a complete block against the chain state.
///
/// Coins are resolved against `chain` and against outputs created earlier
/// in the same block; spending a later transaction's output fails. The
/// block's own coinbase outputs are visible but immature, so spending them
/// is rejected.
pub fn check_block(
    block: &Block,
    context: &BlockContext,
    params: &ChainParams,
    chain: &dyn ChainView,
    scripts: &dyn ScriptVerifier,
) -> Result<BlockSummary, BlockError> {
    // --- Coinbase placement and transaction structure ---

    let Some(first) = block.transactions.first() else {
        return Err(BlockError::CoinbaseMissing);
    };
    if !first.is_coinbase() {
        return Err(BlockError::CoinbaseMissing);
    }
    if block.transactions[1..].iter().any(|tx| tx.is_coinbase()) {
        return Err(BlockError::CoinbaseMultiple);
    }
    for tx in &block.transactions {
        check_transaction(tx)?;
    }

    // --- Weight ---

    let mut total_weight = 0u64;
    for tx in &block.transactions {
        total_weight += tx.weight()?;
    }
    if total_weight > MAX_BLOCK_WEIGHT {
        return Err(BlockError::WeightExceeded);
    }

    // --- Sigop cost, recounted from the scripts themselves ---

    let sigop_cost: i64 = block.transactions.iter().map(transaction_sigop_cost).sum();
    if sigop_cost > MAX_BLOCK_SIGOPS_COST {
        return Err(BlockError::SigopsExceeded);
    }

    // --- Unique txids and merkle commitment ---

    let mut txids = Vec::with_capacity(block.transactions.len());
    let mut seen_txids = HashSet::with_capacity(block.transactions.len());
    for tx in &block.transactions {
        let txid = tx.txid()?;
        if !seen_txids.insert(txid) {
            return Err(BlockError::DuplicateTxid);
        }
        txids.push(txid);
    }
    if merkle::merkle_root(&txids) != block.header.merkle_root {
        return Err(BlockError::MerkleRootMismatch);
    }

    // --- Per-transaction contextual checks ---

    let mut created: HashMap<OutPoint, UtxoEntry> = HashMap::new();
    for (i, output) in first.outputs.iter().enumerate() {
        created.insert(
            OutPoint {
                txid: txids[0],
                index: i as u64,
            },
            UtxoEntry {
                output: output.clone(),
                block_height: context.height,
                is_coinbase: true,
            },
        );
    }

    let mut spent: HashSet<OutPoint> = HashSet::new();
    let mut total_fees: Amount = 0;

    for (i, tx) in block.transactions.iter().enumerate().skip(1) {
        if !is_final_tx(tx, context.height, context.median_time_past) {
            return Err(BlockError::NonFinal);
        }

        let mut total_in: Amount = 0;
        let mut prev_heights = Vec::with_capacity(tx.inputs.len());
        let mut spent_scripts = Vec::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            let outpoint = input.previous_output;
            if spent.contains(&outpoint) {
                return Err(BlockError::InputsMissingOrSpent);
            }
            let entry = if let Some(entry) = created.get(&outpoint) {
                entry.clone()
            } else if let Some(entry) = chain.get_utxo(&outpoint) {
                entry
            } else {
                return Err(BlockError::InputsMissingOrSpent);
            };
            if !entry.is_mature(context.height) {
                return Err(BlockError::PrematureCoinbaseSpend);
            }
            total_in = total_in
                .checked_add(entry.output.value)
                .filter(|v| money_range(*v))
                .ok_or(TransactionError::ValueOverflow)?;
            prev_heights.push(entry.block_height);
            spent_scripts.push(entry.output.script_pubkey);
        }

        let locks = calculate_sequence_locks(tx, &prev_heights, |h| {
            chain.median_time_past_at(h)
        });
        if !locks.satisfied_at(context.height, context.median_time_past) {
            return Err(BlockError::NonFinal);
        }

        let total_out = tx
            .total_output_value()
            .ok_or(TransactionError::ValueOverflow)?;
        if total_in < total_out {
            return Err(BlockError::InputsBelowOutputs);
        }
        total_fees += total_in - total_out;
        if !money_range(total_fees) {
            return Err(BlockError::FeeOutOfRange);
        }

        for (input_index, script) in spent_scripts.iter().enumerate() {
            if !scripts.verify(tx, input_index, script) {
                return Err(BlockError::ScriptVerification);
            }
        }

        for input in &tx.inputs {
            spent.insert(input.previous_output);
        }
        for (output_index, output) in tx.outputs.iter().enumerate() {
            created.insert(
                OutPoint {
                    txid: txids[i],
                    index: output_index as u64,
                },
                UtxoEntry {
                    output: output.clone(),
                    block_height: context.height,
                    is_coinbase: false,
                },
            );
        }
    }

    // --- Coinbase amount ---

    let coinbase_value = first
        .total_output_value()
        .ok_or(TransactionError::ValueOverflow)?;
    if coinbase_value > block_subsidy(context.height, params) + total_fees {
        return Err(BlockError::CoinbaseAmount);
    }

    Ok(BlockSummary {
        total_fees,
        total_weight,
        sigop_cost,
    })
}

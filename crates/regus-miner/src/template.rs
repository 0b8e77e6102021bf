//! Assembled block templates.

use regus_core::amount::Amount;
use regus_core::types::Block;

/// A block ready for proof-of-work, with per-transaction accounting.
///
/// Produced by [`BlockAssembler::create_new_block`]; the template owns a
/// copy of every transaction, so it stays valid after the mempool moves
/// on. Slot 0 of the block is the coinbase, which pays no fee, and the
/// fee and sigop vectors are aligned with `block.transactions`.
/// Proof-of-work fields in the header (target, nonce) are the caller's
/// concern.
///
/// [`BlockAssembler::create_new_block`]: crate::assembler::BlockAssembler::create_new_block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTemplate {
    /// The assembled block, coinbase first.
    pub block: Block,
    /// Fee paid by each transaction, aligned with `block.transactions`.
    pub tx_fees: Vec<Amount>,
    /// Sigop cost of each transaction, aligned with `block.transactions`.
    pub tx_sigop_costs: Vec<i64>,
    /// Sum of non-coinbase fees, already folded into the coinbase output.
    pub total_fees: Amount,
    /// Total block weight including the coinbase.
    pub total_weight: u64,
}

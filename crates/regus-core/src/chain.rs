//! Chain state access for admission and block assembly.
//!
//! The [`ChainView`] trait exposes the read side of the active chain:
//! tip position, UTXO lookups, and median-time-past. Admission and block
//! assembly only ever read the chain; connecting blocks is the caller's
//! concern. [`MemoryChainView`] is an in-memory implementation with no
//! persistence, suitable for tests and tools.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::TransactionError;
use crate::params::MEDIAN_TIME_SPAN;
use crate::types::{Block, Hash256, OutPoint, UtxoEntry};

/// Read access to the active chain.
///
/// Implementations must be internally synchronized; all methods take
/// `&self` so a shared handle can serve admission, assembly, and tests
/// concurrently.
pub trait ChainView: Send + Sync {
    /// Height of the chain tip. Zero for a chain holding only the genesis block.
    fn height(&self) -> u64;

    /// Hash of the tip block header. [`Hash256::ZERO`] when no blocks exist.
    fn tip_hash(&self) -> Hash256;

    /// Look up an unspent output. Returns `None` if spent or unknown.
    fn get_utxo(&self, outpoint: &OutPoint) -> Option<UtxoEntry>;

    /// Timestamp of the block at `height`, if the chain reaches it.
    fn block_time_at(&self, height: u64) -> Option<u64>;

    /// Median-time-past of the chain as of the block at `height`: the median
    /// of the last [`MEDIAN_TIME_SPAN`] block timestamps ending there.
    fn median_time_past_at(&self, height: u64) -> u64 {
        let start = height.saturating_sub(MEDIAN_TIME_SPAN as u64 - 1);
        let mut times: Vec<u64> = (start..=height)
            .filter_map(|h| self.block_time_at(h))
            .collect();
        if times.is_empty() {
            return 0;
        }
        times.sort_unstable();
        times[times.len() / 2]
    }

    /// Median-time-past at the current tip.
    fn median_time_past(&self) -> u64 {
        self.median_time_past_at(self.height())
    }
}

fn _assert_chain_view_object_safe(_: &dyn ChainView) {}

#[derive(Default)]
struct ChainInner {
    /// UTXO set: outpoint to entry.
    utxos: HashMap<OutPoint, UtxoEntry>,
    /// Block timestamps indexed by height.
    block_times: Vec<u64>,
    /// Block header hashes indexed by height.
    block_hashes: Vec<Hash256>,
}

/// In-memory chain state with no persistence.
///
/// Internally synchronized with a `RwLock`, so tests can mutate the chain
/// through a shared `Arc` while admission and assembly read it.
#[derive(Default)]
pub struct MemoryChainView {
    inner: RwLock<ChainInner>,
}

impl MemoryChainView {
    /// Create an empty chain with no blocks and no UTXOs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block to the chain: spend its non-coinbase inputs, add its
    /// outputs to the UTXO set, and record its header time and hash.
    ///
    /// The block is assumed valid; only serialization of its transactions
    /// can fail. Returns the height the block landed at.
    pub fn connect_block(&self, block: &Block) -> Result<u64, TransactionError> {
        let mut inner = self.inner.write();
        let height = inner.block_times.len() as u64;
        for tx in &block.transactions {
            let txid = tx.txid()?;
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    inner.utxos.remove(&input.previous_output);
                }
            }
            for (i, output) in tx.outputs.iter().enumerate() {
                inner.utxos.insert(
                    OutPoint {
                        txid,
                        index: i as u64,
                    },
                    UtxoEntry {
                        output: output.clone(),
                        block_height: height,
                        is_coinbase: tx.is_coinbase(),
                    },
                );
            }
        }
        inner.block_times.push(block.header.timestamp);
        inner.block_hashes.push(block.header.hash());
        Ok(height)
    }

    /// Insert a UTXO directly. Test seeding helper.
    pub fn add_utxo(&self, outpoint: OutPoint, entry: UtxoEntry) {
        self.inner.write().utxos.insert(outpoint, entry);
    }

    /// Remove a UTXO directly, returning it if present.
    pub fn remove_utxo(&self, outpoint: &OutPoint) -> Option<UtxoEntry> {
        self.inner.write().utxos.remove(outpoint)
    }

    /// Overwrite the timestamp of the block at `height`, if it exists.
    /// Lets tests steer median-time-past without mining.
    pub fn set_block_time(&self, height: u64, time: u64) {
        if let Some(slot) = self.inner.write().block_times.get_mut(height as usize) {
            *slot = time;
        }
    }

    /// Number of entries in the UTXO set.
    pub fn utxo_count(&self) -> usize {
        self.inner.read().utxos.len()
    }
}

impl ChainView for MemoryChainView {
    fn height(&self) -> u64 {
        (self.inner.read().block_times.len() as u64).saturating_sub(1)
    }

    fn tip_hash(&self) -> Hash256 {
        self.inner
            .read()
            .block_hashes
            .last()
            .copied()
            .unwrap_or(Hash256::ZERO)
    }

    fn get_utxo(&self, outpoint: &OutPoint) -> Option<UtxoEntry> {
        self.inner.read().utxos.get(outpoint).cloned()
    }

    fn block_time_at(&self, height: u64) -> Option<u64> {
        self.inner.read().block_times.get(height as usize).copied()
    }
}

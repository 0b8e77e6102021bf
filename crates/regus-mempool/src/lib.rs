//! # regus-mempool
//! Transaction admission for the Regus node: the candidate index of
//! accepted unconfirmed transactions, the bounded orphan cache, and the
//! lock-guarded [`Mempool`] facade tying them to the admission validator.
//!
//! All calls are ordinary blocking calls. The facade is the one handle
//! shared across threads (peer handlers, the chain-update path, and the
//! template builder); each pool sits behind its own `Mutex`, and the
//! candidate lock is always acquired before the orphan lock.

pub mod entry;
pub mod index;
pub mod orphan;

#[cfg(any(test, feature = "testing"))]
pub use entry::EntryBuilder;
pub use entry::{compare_feerates, AncestorScoreKey, CandidateEntry};
pub use index::{CandidateIndex, RemovalReason};
pub use orphan::OrphanPool;

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rand::Rng;
use regus_core::amount::Amount;
use regus_core::chain::ChainView;
use regus_core::error::MempoolError;
use regus_core::traits::{PeerId, TxVerdict, Validator};
use regus_core::types::{Block, Hash256, Transaction};
use tracing::debug;

/// Outcome of submitting a transaction for admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Entered the candidate index; `promoted` lists orphans that became
    /// connectable as a result, in promotion order.
    Accepted {
        txid: Hash256,
        promoted: Vec<Hash256>,
    },
    /// Inputs unknown. `stored` is false when the orphan cache declined
    /// the transaction (duplicate, oversized, or evicted on arrival).
    Orphaned { txid: Hash256, stored: bool },
}

/// Lock-guarded admission facade over [`CandidateIndex`] and [`OrphanPool`].
///
/// Peer handlers feed transactions through [`submit`](Self::submit); the
/// chain-update path applies connected blocks through
/// [`remove_for_block`](Self::remove_for_block); the template builder reads
/// a consistent snapshot by holding [`candidates`](Self::candidates) for
/// the duration of template construction.
pub struct Mempool {
    candidates: Mutex<CandidateIndex>,
    orphans: Mutex<OrphanPool>,
    chain: Arc<dyn ChainView>,
    validator: Arc<dyn Validator>,
    clock: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl Mempool {
    /// Create a facade with the system clock and default orphan capacity.
    pub fn new(chain: Arc<dyn ChainView>, validator: Arc<dyn Validator>) -> Self {
        Self::with_clock(chain, validator, || {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs()
        })
    }

    /// Create a facade with a custom clock for entry timestamps and orphan
    /// expiry.
    pub fn with_clock(
        chain: Arc<dyn ChainView>,
        validator: Arc<dyn Validator>,
        clock: impl Fn() -> u64 + Send + Sync + 'static,
    ) -> Self {
        let clock: Arc<dyn Fn() -> u64 + Send + Sync> = Arc::new(clock);
        let orphan_clock = Arc::clone(&clock);
        Self {
            candidates: Mutex::new(CandidateIndex::new()),
            orphans: Mutex::new(OrphanPool::with_clock(
                orphan::DEFAULT_MAX_ORPHAN_COUNT,
                move || orphan_clock(),
            )),
            chain,
            validator,
            clock,
        }
    }

    /// Submit a transaction received from `peer`.
    ///
    /// Duplicates and in-pool conflicts fail fast; otherwise the validator
    /// decides. A valid transaction enters the candidate index and triggers
    /// a re-validation pass over the orphans waiting on it, recursively, so
    /// one parent can unlock a whole stranded subtree. A transaction with
    /// missing inputs goes to the orphan cache. A hard rejection surfaces
    /// the validator's reason.
    pub fn submit(&self, tx: Transaction, peer: PeerId) -> Result<Submission, MempoolError> {
        let tx = Arc::new(tx);
        let txid = tx.txid()?;
        let mut candidates = self.candidates.lock();

        if candidates.contains(&txid) {
            return Err(MempoolError::AlreadyExists(txid.to_string()));
        }
        if let Some((outpoint, existing)) = candidates.conflict_for(&tx) {
            return Err(MempoolError::Conflict {
                new_txid: txid.to_string(),
                existing_txid: existing.to_string(),
                outpoint: outpoint.to_string(),
            });
        }

        match self.validator.check_admission(&tx, &*candidates) {
            TxVerdict::Valid { fee, sigop_cost } => {
                let weight = tx.weight()?;
                let entry = CandidateEntry::new(
                    Arc::clone(&tx),
                    txid,
                    fee,
                    weight,
                    sigop_cost,
                    self.chain.height(),
                    (self.clock)(),
                );
                candidates.add_unchecked(entry);
                debug!(%txid, peer, fee, "accepted transaction");
                let promoted = self.promote_children(&mut candidates, txid);
                Ok(Submission::Accepted { txid, promoted })
            }
            TxVerdict::MissingInputs(_) => {
                let stored = self.orphans.lock().add_tx(tx, peer);
                if stored {
                    debug!(%txid, peer, "stored orphan awaiting parents");
                }
                Ok(Submission::Orphaned { txid, stored })
            }
            TxVerdict::Invalid(reason) => {
                debug!(%txid, peer, %reason, "rejected transaction");
                Err(MempoolError::Rejected(reason))
            }
        }
    }

    /// Re-validate orphans waiting on `root` and every transaction promoted
    /// along the way. Called with the candidate lock already held.
    fn promote_children(&self, candidates: &mut CandidateIndex, root: Hash256) -> Vec<Hash256> {
        let mut orphans = self.orphans.lock();
        let mut promoted = Vec::new();
        let mut work = vec![root];
        while let Some(parent) = work.pop() {
            for child_id in orphans.children_of(&parent) {
                let Some(child_tx) = orphans.get(&child_id) else {
                    continue;
                };
                if candidates.conflict_for(&child_tx).is_some() {
                    orphans.erase_tx(&child_id);
                    debug!(txid = %child_id, "dropped conflicting orphan");
                    continue;
                }
                match self.validator.check_admission(&child_tx, &*candidates) {
                    TxVerdict::Valid { fee, sigop_cost } => {
                        let Ok(weight) = child_tx.weight() else {
                            orphans.erase_tx(&child_id);
                            continue;
                        };
                        orphans.erase_tx(&child_id);
                        let entry = CandidateEntry::new(
                            child_tx,
                            child_id,
                            fee,
                            weight,
                            sigop_cost,
                            self.chain.height(),
                            (self.clock)(),
                        );
                        candidates.add_unchecked(entry);
                        debug!(txid = %child_id, "promoted orphan");
                        promoted.push(child_id);
                        work.push(child_id);
                    }
                    // Still waiting on another parent.
                    TxVerdict::MissingInputs(_) => {}
                    TxVerdict::Invalid(reason) => {
                        orphans.erase_tx(&child_id);
                        debug!(txid = %child_id, %reason, "dropped invalid orphan");
                    }
                }
            }
        }
        promoted
    }

    /// Apply a connected block: confirmed transactions and conflicts leave
    /// the candidate index, and orphans that can no longer connect are
    /// dropped.
    pub fn remove_for_block(&self, block: &Block) {
        let mut candidates = self.candidates.lock();
        candidates.remove_for_block(&block.transactions);
        self.orphans.lock().erase_for_block(&block.transactions);
    }

    /// Add `fee_delta` to the prioritisation delta of `txid`.
    pub fn prioritise_transaction(&self, txid: &Hash256, fee_delta: Amount) {
        self.candidates.lock().prioritise_transaction(txid, fee_delta);
    }

    /// Remove `txid` and everything spending from it.
    pub fn remove_recursive(&self, txid: &Hash256, reason: RemovalReason) -> usize {
        self.candidates.lock().remove_recursive(txid, reason)
    }

    /// Drop every orphan attributed to a disconnected peer.
    pub fn peer_disconnected(&self, peer: PeerId) -> usize {
        self.orphans.lock().erase_for_peer(peer)
    }

    /// Shrink the orphan cache to at most `max_entries` survivors.
    pub fn limit_orphans<R: Rng>(&self, max_entries: usize, rng: &mut R) {
        self.orphans.lock().limit_orphans(max_entries, rng);
    }

    /// Lock and return the candidate index.
    ///
    /// The template builder holds this guard for the whole construction to
    /// get a consistent snapshot. Acquire it before the orphan lock.
    pub fn candidates(&self) -> MutexGuard<'_, CandidateIndex> {
        self.candidates.lock()
    }

    /// Lock and return the orphan pool.
    pub fn orphans(&self) -> MutexGuard<'_, OrphanPool> {
        self.orphans.lock()
    }

    /// Number of candidate entries.
    pub fn candidate_count(&self) -> usize {
        self.candidates.lock().len()
    }

    /// Number of cached orphans.
    pub fn orphan_count(&self) -> usize {
        self.orphans.lock().len()
    }
}

//! Candidate index: accepted unconfirmed transactions and their spend graph.
//!
//! The index stores [`CandidateEntry`] values keyed by txid, an outpoint
//! index for conflict detection, and an explicit parent/child adjacency so
//! recursive removal and aggregate maintenance never scan the whole pool.
//! It provides:
//! - O(1) lookup by txid
//! - O(1) conflict detection via the spent-outpoint index
//! - ancestor/descendant closure walks over the adjacency
//! - ancestor-feerate-ordered iteration for block template selection
//!
//! Transactions must be validated by the caller before insertion; the index
//! trusts admission verdicts and only maintains structure. Aggregate
//! statistics are updated transactionally with every structural change, so
//! any divergence from a from-scratch recomputation is a programming fault
//! (`assert_consistent` checks exactly that).

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use regus_core::amount::Amount;
use regus_core::traits::PoolView;
use regus_core::types::{Hash256, OutPoint, Transaction, TxOutput};
use tracing::debug;

use crate::entry::CandidateEntry;

/// Why an entry left the pool. Carried on removal tracing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Entry outlived its pool lifetime.
    Expiry,
    /// A conflicting spend of one of its inputs was confirmed.
    Conflict,
    /// Confirmed in a connected block.
    Block,
    /// Replaced by another transaction.
    Replaced,
    /// Operator request.
    Manual,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RemovalReason::Expiry => "expiry",
            RemovalReason::Conflict => "conflict",
            RemovalReason::Block => "block",
            RemovalReason::Replaced => "replaced",
            RemovalReason::Manual => "manual",
        };
        f.write_str(label)
    }
}

/// In-memory index of accepted unconfirmed transactions.
///
/// Not thread-safe; the [`Mempool`](crate::Mempool) facade wraps it in a
/// `Mutex` and is the handle shared across threads.
pub struct CandidateIndex {
    /// Primary storage: txid → entry.
    entries: HashMap<Hash256, CandidateEntry>,
    /// Spent outpoint → txid of the pool transaction that claimed it first.
    by_outpoint: HashMap<OutPoint, Hash256>,
    /// txid → direct in-pool parents (distinct txids its inputs spend from).
    parents: HashMap<Hash256, BTreeSet<Hash256>>,
    /// txid → direct in-pool children (entries spending one of its outputs).
    children: HashMap<Hash256, BTreeSet<Hash256>>,
    /// Prioritisation deltas, including for txids not currently in the pool.
    fee_deltas: HashMap<Hash256, Amount>,
    /// Next insertion ordinal.
    next_sequence: u64,
}

impl Default for CandidateIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            by_outpoint: HashMap::new(),
            parents: HashMap::new(),
            children: HashMap::new(),
            fee_deltas: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Number of entries in the pool.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `txid` is in the pool.
    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    /// Look up an entry by txid.
    pub fn get(&self, txid: &Hash256) -> Option<&CandidateEntry> {
        self.entries.get(txid)
    }

    /// Iterate over all entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &CandidateEntry> {
        self.entries.values()
    }

    /// Sum of base fees over the pool.
    pub fn total_fees(&self) -> Amount {
        self.entries.values().map(|e| e.fee()).sum()
    }

    /// Sum of transaction weights over the pool.
    pub fn total_weight(&self) -> u64 {
        self.entries.values().map(|e| e.weight()).sum()
    }

    /// Accumulated prioritisation delta registered for `txid`, pool member
    /// or not.
    pub fn registered_fee_delta(&self, txid: &Hash256) -> Amount {
        self.fee_deltas.get(txid).copied().unwrap_or(0)
    }

    /// First pool transaction spending one of `tx`'s inputs, if any.
    pub fn conflict_for(&self, tx: &Transaction) -> Option<(OutPoint, Hash256)> {
        for input in &tx.inputs {
            if let Some(spender) = self.by_outpoint.get(&input.previous_output) {
                return Some((input.previous_output, *spender));
            }
        }
        None
    }

    /// All in-pool ancestors of `txid`, the entry itself excluded.
    pub fn calculate_ancestors(&self, txid: &Hash256) -> BTreeSet<Hash256> {
        self.walk_closure(txid, &self.parents)
    }

    /// All in-pool descendants of `txid`, the entry itself excluded.
    pub fn calculate_descendants(&self, txid: &Hash256) -> BTreeSet<Hash256> {
        self.walk_closure(txid, &self.children)
    }

    fn walk_closure(
        &self,
        txid: &Hash256,
        adjacency: &HashMap<Hash256, BTreeSet<Hash256>>,
    ) -> BTreeSet<Hash256> {
        let mut closure = BTreeSet::new();
        let mut stack: Vec<Hash256> = match adjacency.get(txid) {
            Some(direct) => direct.iter().copied().collect(),
            None => return closure,
        };
        while let Some(current) = stack.pop() {
            if !closure.insert(current) {
                continue;
            }
            if let Some(next) = adjacency.get(&current) {
                stack.extend(next.iter().copied());
            }
        }
        closure
    }

    /// Insert a transaction already judged valid and conflict-free.
    ///
    /// Ancestors are always inserted before descendants, so the new entry
    /// has no in-pool descendants: its own aggregates are folded up from
    /// the ancestor set, and the entry is added to every ancestor's
    /// descendant aggregates. Any prioritisation delta registered for the
    /// txid beforehand is applied now. Returns the txid.
    pub fn add_unchecked(&mut self, mut entry: CandidateEntry) -> Hash256 {
        let txid = entry.txid();
        debug_assert!(!self.entries.contains_key(&txid), "duplicate insert");

        entry.set_sequence(self.next_sequence);
        self.next_sequence += 1;

        match self.fee_deltas.get(&txid) {
            Some(&delta) if delta != 0 => entry.update_fee_delta(delta),
            _ => {}
        }

        let mut parent_ids: BTreeSet<Hash256> = BTreeSet::new();
        for input in &entry.tx().inputs {
            let prev = input.previous_output;
            if self.entries.contains_key(&prev.txid) {
                parent_ids.insert(prev.txid);
            }
            // First spender keeps the claim; a conflicting insert is a
            // caller error surfaced by template self-validation.
            self.by_outpoint.entry(prev).or_insert(txid);
        }
        for parent in &parent_ids {
            self.children.entry(*parent).or_default().insert(txid);
        }
        self.parents.insert(txid, parent_ids);
        self.children.entry(txid).or_default();

        let entry_weight = entry.weight();
        let entry_fee = entry.modified_fee();
        let ancestors = self.calculate_ancestors(&txid);
        let mut count = 0i64;
        let mut weight = 0i64;
        let mut fees: Amount = 0;
        let mut sigops = 0i64;
        for ancestor_id in &ancestors {
            let Some(ancestor) = self.entries.get_mut(ancestor_id) else {
                debug_assert!(false, "ancestor missing from entries");
                continue;
            };
            count += 1;
            weight += ancestor.weight() as i64;
            fees += ancestor.modified_fee();
            sigops += ancestor.sigop_cost();
            ancestor.update_descendant_state(1, entry_weight as i64, entry_fee);
        }
        entry.update_ancestor_state(count, weight, fees, sigops);

        self.entries.insert(txid, entry);
        debug!(%txid, "added candidate");
        txid
    }

    /// Remove `txid` and every transaction transitively spending one of its
    /// outputs. Returns how many entries were removed.
    pub fn remove_recursive(&mut self, txid: &Hash256, reason: RemovalReason) -> usize {
        if !self.entries.contains_key(txid) {
            return 0;
        }
        let mut removal = self.calculate_descendants(txid);
        removal.insert(*txid);
        self.remove_staged(&removal, false, reason)
    }

    /// Apply a connected block to the pool.
    ///
    /// Confirmed transactions leave non-recursively (their remaining
    /// descendants' ancestor aggregates shrink accordingly), transactions
    /// conflicting with a confirmed spend are removed recursively, and any
    /// prioritisation delta for a confirmed txid is dropped.
    pub fn remove_for_block(&mut self, block_txs: &[Transaction]) {
        for tx in block_txs {
            let Ok(txid) = tx.txid() else { continue };
            if self.entries.contains_key(&txid) {
                let mut stage = BTreeSet::new();
                stage.insert(txid);
                self.remove_staged(&stage, true, RemovalReason::Block);
            }
            self.remove_conflicts(tx, &txid);
            self.fee_deltas.remove(&txid);
        }
    }

    fn remove_conflicts(&mut self, tx: &Transaction, confirmed_txid: &Hash256) {
        for input in &tx.inputs {
            let Some(spender) = self.by_outpoint.get(&input.previous_output).copied() else {
                continue;
            };
            if spender != *confirmed_txid {
                self.remove_recursive(&spender, RemovalReason::Conflict);
            }
        }
    }

    /// Add `fee_delta` to the prioritisation delta of `txid`.
    ///
    /// The delta belongs to the entry itself. If the transaction is in the
    /// pool, its own modified fee, its ancestors' descendant fees, and its
    /// descendants' ancestor fees all shift by the delta now; otherwise the
    /// delta is held and applied when the transaction arrives.
    pub fn prioritise_transaction(&mut self, txid: &Hash256, fee_delta: Amount) {
        *self.fee_deltas.entry(*txid).or_insert(0) += fee_delta;
        if self.entries.contains_key(txid) {
            let ancestors = self.calculate_ancestors(txid);
            let descendants = self.calculate_descendants(txid);
            if let Some(entry) = self.entries.get_mut(txid) {
                entry.update_fee_delta(fee_delta);
            }
            for ancestor_id in &ancestors {
                let Some(ancestor) = self.entries.get_mut(ancestor_id) else {
                    debug_assert!(false, "ancestor missing from entries");
                    continue;
                };
                ancestor.update_descendant_state(0, 0, fee_delta);
            }
            for descendant_id in &descendants {
                let Some(descendant) = self.entries.get_mut(descendant_id) else {
                    debug_assert!(false, "descendant missing from entries");
                    continue;
                };
                descendant.update_ancestor_state(0, 0, fee_delta, 0);
            }
        }
        debug!(%txid, delta = fee_delta, "prioritised transaction");
    }

    /// Entries ordered for selection: descending ancestor feerate, ties to
    /// the earlier insertion.
    pub fn ordered_by_ancestor_score(&self) -> Vec<&CandidateEntry> {
        let mut ordered: Vec<&CandidateEntry> = self.entries.values().collect();
        ordered.sort_by_key(|entry| entry.ancestor_score_key());
        ordered
    }

    /// Remove a pre-computed closed set of entries.
    ///
    /// `removal` must be closed under the descendant relation unless
    /// `update_descendants` is set, in which case survivors that counted a
    /// doomed entry among their ancestors get their ancestor aggregates
    /// reduced first. Either way, surviving ancestors of each doomed entry
    /// have it subtracted from their descendant aggregates. All closure
    /// walks run before the first entry is erased, while the adjacency
    /// still covers the whole set.
    fn remove_staged(
        &mut self,
        removal: &BTreeSet<Hash256>,
        update_descendants: bool,
        reason: RemovalReason,
    ) -> usize {
        if update_descendants {
            for doomed in removal {
                let Some((weight, fee, sigops)) = self
                    .entries
                    .get(doomed)
                    .map(|e| (e.weight(), e.modified_fee(), e.sigop_cost()))
                else {
                    continue;
                };
                for descendant_id in self.calculate_descendants(doomed) {
                    if removal.contains(&descendant_id) {
                        continue;
                    }
                    let Some(descendant) = self.entries.get_mut(&descendant_id) else {
                        debug_assert!(false, "descendant missing from entries");
                        continue;
                    };
                    descendant.update_ancestor_state(-1, -(weight as i64), -fee, -sigops);
                }
            }
        }

        for doomed in removal {
            let Some((weight, fee)) = self
                .entries
                .get(doomed)
                .map(|e| (e.weight(), e.modified_fee()))
            else {
                continue;
            };
            for ancestor_id in self.calculate_ancestors(doomed) {
                if removal.contains(&ancestor_id) {
                    continue;
                }
                let Some(ancestor) = self.entries.get_mut(&ancestor_id) else {
                    debug_assert!(false, "ancestor missing from entries");
                    continue;
                };
                ancestor.update_descendant_state(-1, -(weight as i64), -fee);
            }
        }

        let mut removed = 0;
        for doomed in removal {
            if self.remove_entry(doomed) {
                removed += 1;
                debug!(txid = %doomed, reason = %reason, "removed candidate");
            }
        }
        removed
    }

    /// Tear one entry out of every index. Aggregate fixups happen in
    /// `remove_staged` before this runs.
    fn remove_entry(&mut self, txid: &Hash256) -> bool {
        let Some(entry) = self.entries.remove(txid) else {
            return false;
        };
        for input in &entry.tx().inputs {
            if self.by_outpoint.get(&input.previous_output) == Some(txid) {
                self.by_outpoint.remove(&input.previous_output);
            }
        }
        if let Some(parent_ids) = self.parents.remove(txid) {
            for parent in &parent_ids {
                if let Some(set) = self.children.get_mut(parent) {
                    set.remove(txid);
                }
            }
        }
        if let Some(child_ids) = self.children.remove(txid) {
            for child in &child_ids {
                if let Some(set) = self.parents.get_mut(child) {
                    set.remove(txid);
                }
            }
        }
        true
    }

    /// Check every cached aggregate and index against a from-scratch
    /// recomputation over the spend graph.
    ///
    /// Panics on any divergence: aggregate bookkeeping is consensus-adjacent
    /// state and must never silently degrade. Used by tests and the
    /// property suite after mutation sequences.
    pub fn assert_consistent(&self) {
        assert_eq!(self.parents.len(), self.entries.len(), "parent map size");
        assert_eq!(self.children.len(), self.entries.len(), "child map size");

        for (txid, entry) in &self.entries {
            assert_eq!(entry.txid(), *txid, "entry keyed under wrong txid");

            let Some(parent_ids) = self.parents.get(txid) else {
                panic!("no parent set for {txid}");
            };
            for parent in parent_ids {
                assert!(
                    self.entries.contains_key(parent),
                    "dangling parent link {parent} on {txid}"
                );
                assert!(
                    self.children.get(parent).is_some_and(|c| c.contains(txid)),
                    "child link {txid} missing on {parent}"
                );
            }
            for input in &entry.tx().inputs {
                assert!(
                    self.by_outpoint.contains_key(&input.previous_output),
                    "input of {txid} missing from outpoint index"
                );
                if self.entries.contains_key(&input.previous_output.txid) {
                    assert!(
                        parent_ids.contains(&input.previous_output.txid),
                        "parent link missing on {txid}"
                    );
                }
            }

            let mut count = 1u64;
            let mut weight = entry.weight();
            let mut fees = entry.modified_fee();
            let mut sigops = entry.sigop_cost();
            for ancestor_id in self.calculate_ancestors(txid) {
                let Some(ancestor) = self.entries.get(&ancestor_id) else {
                    panic!("ancestor {ancestor_id} of {txid} not in pool");
                };
                count += 1;
                weight += ancestor.weight();
                fees += ancestor.modified_fee();
                sigops += ancestor.sigop_cost();
            }
            assert_eq!(entry.ancestor_count(), count, "ancestor count of {txid}");
            assert_eq!(entry.ancestor_weight(), weight, "ancestor weight of {txid}");
            assert_eq!(entry.ancestor_fees(), fees, "ancestor fees of {txid}");
            assert_eq!(
                entry.ancestor_sigop_cost(),
                sigops,
                "ancestor sigops of {txid}"
            );

            let mut count = 1u64;
            let mut weight = entry.weight();
            let mut fees = entry.modified_fee();
            for descendant_id in self.calculate_descendants(txid) {
                let Some(descendant) = self.entries.get(&descendant_id) else {
                    panic!("descendant {descendant_id} of {txid} not in pool");
                };
                count += 1;
                weight += descendant.weight();
                fees += descendant.modified_fee();
            }
            assert_eq!(entry.descendant_count(), count, "descendant count of {txid}");
            assert_eq!(
                entry.descendant_weight(),
                weight,
                "descendant weight of {txid}"
            );
            assert_eq!(entry.descendant_fees(), fees, "descendant fees of {txid}");
        }

        for (outpoint, spender) in &self.by_outpoint {
            let Some(entry) = self.entries.get(spender) else {
                panic!("outpoint index points at missing entry {spender}");
            };
            assert!(
                entry
                    .tx()
                    .inputs
                    .iter()
                    .any(|i| i.previous_output == *outpoint),
                "outpoint claim not backed by an input of {spender}"
            );
        }
    }
}

impl PoolView for CandidateIndex {
    fn unconfirmed_output(&self, outpoint: &OutPoint) -> Option<TxOutput> {
        let entry = self.entries.get(&outpoint.txid)?;
        let index = usize::try_from(outpoint.index).ok()?;
        entry.tx().outputs.get(index).cloned()
    }
}

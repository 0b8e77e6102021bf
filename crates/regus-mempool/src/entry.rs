//! Candidate entries and the ancestor-feerate ordering key.
//!
//! A [`CandidateEntry`] wraps an accepted unconfirmed transaction together
//! with its fee, weight, sigop cost, and cached aggregate statistics over
//! its unconfirmed ancestor and descendant sets. The aggregates are owned
//! and maintained by the candidate index; they must always equal the true
//! union over the current graph (see `CandidateIndex::assert_consistent`).

use std::cmp::Ordering;
use std::sync::Arc;

use regus_core::amount::Amount;
use regus_core::types::{Hash256, Transaction};

/// Compare two feerates given as (fees, weight) pairs without division.
///
/// Returns the ordering of `a_fees / a_weight` versus `b_fees / b_weight`,
/// computed by cross-multiplication in `i128` so no precision is lost and
/// no intermediate overflows.
pub fn compare_feerates(a_fees: Amount, a_weight: u64, b_fees: Amount, b_weight: u64) -> Ordering {
    let lhs = a_fees as i128 * b_weight as i128;
    let rhs = b_fees as i128 * a_weight as i128;
    lhs.cmp(&rhs)
}

/// Ordering key for block-template selection.
///
/// Sorts highest ancestor feerate first; ties go to the earlier-inserted
/// entry (lower `sequence`), then to the lower txid, which keeps the order
/// total and deterministic.
#[derive(Debug, Clone, Copy)]
pub struct AncestorScoreKey {
    /// Ancestor package fees, prioritisation deltas included.
    pub fees: Amount,
    /// Ancestor package weight.
    pub weight: u64,
    /// Insertion ordinal of the entry.
    pub sequence: u64,
    /// Txid of the entry.
    pub txid: Hash256,
}

impl Ord for AncestorScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_feerates(other.fees, other.weight, self.fees, self.weight)
            .then_with(|| self.sequence.cmp(&other.sequence))
            .then_with(|| self.txid.cmp(&other.txid))
    }
}

impl PartialOrd for AncestorScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for AncestorScoreKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AncestorScoreKey {}

/// An accepted unconfirmed transaction with cached selection metadata.
#[derive(Debug, Clone)]
pub struct CandidateEntry {
    tx: Arc<Transaction>,
    txid: Hash256,
    fee: Amount,
    weight: u64,
    sigop_cost: i64,
    entry_height: u64,
    time: u64,
    sequence: u64,
    fee_delta: Amount,
    count_with_ancestors: u64,
    weight_with_ancestors: u64,
    fees_with_ancestors: Amount,
    sigop_cost_with_ancestors: i64,
    count_with_descendants: u64,
    weight_with_descendants: u64,
    fees_with_descendants: Amount,
}

fn add_signed(base: u64, delta: i64) -> u64 {
    let updated = base.checked_add_signed(delta);
    debug_assert!(updated.is_some(), "aggregate underflow");
    updated.unwrap_or(0)
}

impl CandidateEntry {
    /// Create an entry whose aggregates cover only itself.
    ///
    /// The candidate index assigns the insertion ordinal and folds the
    /// entry into the ancestor/descendant aggregates on insert.
    pub fn new(
        tx: Arc<Transaction>,
        txid: Hash256,
        fee: Amount,
        weight: u64,
        sigop_cost: i64,
        entry_height: u64,
        time: u64,
    ) -> Self {
        Self {
            tx,
            txid,
            fee,
            weight,
            sigop_cost,
            entry_height,
            time,
            sequence: 0,
            fee_delta: 0,
            count_with_ancestors: 1,
            weight_with_ancestors: weight,
            fees_with_ancestors: fee,
            sigop_cost_with_ancestors: sigop_cost,
            count_with_descendants: 1,
            weight_with_descendants: weight,
            fees_with_descendants: fee,
        }
    }

    /// The wrapped transaction.
    pub fn tx(&self) -> &Arc<Transaction> {
        &self.tx
    }

    /// Precomputed transaction id.
    pub fn txid(&self) -> Hash256 {
        self.txid
    }

    /// Base fee in satoshis, before any prioritisation delta.
    pub fn fee(&self) -> Amount {
        self.fee
    }

    /// Base fee plus the accumulated prioritisation delta.
    pub fn modified_fee(&self) -> Amount {
        self.fee + self.fee_delta
    }

    /// Accumulated prioritisation delta.
    pub fn fee_delta(&self) -> Amount {
        self.fee_delta
    }

    /// Transaction weight.
    pub fn weight(&self) -> u64 {
        self.weight
    }

    /// Declared signature-operation cost.
    pub fn sigop_cost(&self) -> i64 {
        self.sigop_cost
    }

    /// Chain height when the entry was admitted.
    pub fn entry_height(&self) -> u64 {
        self.entry_height
    }

    /// Unix time when the entry was admitted.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Insertion ordinal; earlier entries win feerate ties.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Transactions in the ancestor package, this entry included.
    pub fn ancestor_count(&self) -> u64 {
        self.count_with_ancestors
    }

    /// Total weight of the ancestor package.
    pub fn ancestor_weight(&self) -> u64 {
        self.weight_with_ancestors
    }

    /// Total modified fees of the ancestor package.
    pub fn ancestor_fees(&self) -> Amount {
        self.fees_with_ancestors
    }

    /// Total sigop cost of the ancestor package.
    pub fn ancestor_sigop_cost(&self) -> i64 {
        self.sigop_cost_with_ancestors
    }

    /// Transactions in the descendant set, this entry included.
    pub fn descendant_count(&self) -> u64 {
        self.count_with_descendants
    }

    /// Total weight of the descendant set.
    pub fn descendant_weight(&self) -> u64 {
        self.weight_with_descendants
    }

    /// Total modified fees of the descendant set.
    pub fn descendant_fees(&self) -> Amount {
        self.fees_with_descendants
    }

    /// Selection key over the current ancestor aggregates.
    pub fn ancestor_score_key(&self) -> AncestorScoreKey {
        AncestorScoreKey {
            fees: self.fees_with_ancestors,
            weight: self.weight_with_ancestors,
            sequence: self.sequence,
            txid: self.txid,
        }
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    /// Fold `delta` into the prioritisation delta and both fee aggregates.
    pub(crate) fn update_fee_delta(&mut self, delta: Amount) {
        self.fee_delta += delta;
        self.fees_with_ancestors += delta;
        self.fees_with_descendants += delta;
    }

    /// Adjust the ancestor aggregates by signed deltas.
    pub(crate) fn update_ancestor_state(
        &mut self,
        count: i64,
        weight: i64,
        fees: Amount,
        sigop_cost: i64,
    ) {
        self.count_with_ancestors = add_signed(self.count_with_ancestors, count);
        self.weight_with_ancestors = add_signed(self.weight_with_ancestors, weight);
        self.fees_with_ancestors += fees;
        self.sigop_cost_with_ancestors += sigop_cost;
    }

    /// Adjust the descendant aggregates by signed deltas.
    pub(crate) fn update_descendant_state(&mut self, count: i64, weight: i64, fees: Amount) {
        self.count_with_descendants = add_signed(self.count_with_descendants, count);
        self.weight_with_descendants = add_signed(self.weight_with_descendants, weight);
        self.fees_with_descendants += fees;
    }
}

/// Builder for candidate entries in tests.
///
/// Defaults: fee 0, time 0, entry height 1, sigop cost 4 (one scaled
/// signature check). Available when the crate is compiled under test or
/// with the `testing` feature, so downstream test suites can construct
/// entries without going through admission.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Clone)]
pub struct EntryBuilder {
    fee: Amount,
    time: u64,
    height: u64,
    sigop_cost: i64,
}

#[cfg(any(test, feature = "testing"))]
impl Default for EntryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "testing"))]
impl EntryBuilder {
    pub fn new() -> Self {
        Self {
            fee: 0,
            time: 0,
            height: 1,
            sigop_cost: 4,
        }
    }

    pub fn fee(mut self, fee: Amount) -> Self {
        self.fee = fee;
        self
    }

    pub fn time(mut self, time: u64) -> Self {
        self.time = time;
        self
    }

    pub fn height(mut self, height: u64) -> Self {
        self.height = height;
        self
    }

    pub fn sigop_cost(mut self, sigop_cost: i64) -> Self {
        self.sigop_cost = sigop_cost;
        self
    }

    /// Build an entry around `tx`, deriving txid and weight from it.
    pub fn from_tx(&self, tx: Transaction) -> CandidateEntry {
        let tx = Arc::new(tx);
        let txid = tx.txid().expect("test transaction must encode");
        let weight = tx.weight().expect("test transaction must encode");
        CandidateEntry::new(
            tx,
            txid,
            self.fee,
            weight,
            self.sigop_cost,
            self.height,
            self.time,
        )
    }
}

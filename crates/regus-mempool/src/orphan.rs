//! Bounded cache of transactions whose inputs are not yet known.
//!
//! Orphans are kept keyed by txid with the peer that offered them, an
//! outpoint index so a newly accepted parent can find its waiting
//! children, and a flat list for O(1) uniformly random eviction. Eviction
//! is randomized rather than LRU/FIFO so a peer cannot predict ordering
//! and keep its own spam alive; nothing may assume any ordering beyond
//! the size bound holding.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regus_core::traits::PeerId;
use regus_core::types::{Hash256, OutPoint, Transaction};
use tracing::debug;

/// Default maximum number of orphans retained.
pub const DEFAULT_MAX_ORPHAN_COUNT: usize = 100;

/// Transactions with more inputs than this are never cached, so one
/// pathological transaction cannot dominate the pool's memory.
pub const MAX_ORPHAN_INPUTS: usize = 1000;

/// Orphan lifetime in seconds (20 minutes).
const ORPHAN_EXPIRE_SECS: u64 = 20 * 60;

/// Minimum spacing between expiry sweeps (5 minutes).
const ORPHAN_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

struct OrphanEntry {
    tx: Arc<Transaction>,
    peer: PeerId,
    expires_at: u64,
    /// Position in the eviction list.
    list_pos: usize,
}

/// Bounded, peer-attributed cache of unconnectable transactions.
///
/// Not thread-safe; the [`Mempool`](crate::Mempool) facade wraps it in a
/// `Mutex` and is the handle shared across threads.
pub struct OrphanPool {
    entries: HashMap<Hash256, OrphanEntry>,
    /// Outpoint → orphans waiting on it. Ordered so `children_of` can
    /// range over every output of one parent txid.
    by_prev: BTreeMap<OutPoint, HashSet<Hash256>>,
    /// Random-eviction list; entries remember their position here.
    order: Vec<Hash256>,
    max_entries: usize,
    clock: Box<dyn Fn() -> u64 + Send + Sync>,
    rng: StdRng,
    next_sweep: u64,
}

impl fmt::Debug for OrphanPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrphanPool")
            .field("entries", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

impl OrphanPool {
    /// Create a pool holding at most `max_entries` orphans, using the
    /// system clock.
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, || {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs()
        })
    }

    /// Create a pool with the default capacity.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_ORPHAN_COUNT)
    }

    /// Create a pool with a custom clock for expiry decisions.
    pub fn with_clock(
        max_entries: usize,
        clock: impl Fn() -> u64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            entries: HashMap::new(),
            by_prev: BTreeMap::new(),
            order: Vec::new(),
            max_entries,
            clock: Box::new(clock),
            rng: StdRng::from_entropy(),
            next_sweep: 0,
        }
    }

    /// Create a pool with a custom clock and a seeded eviction source.
    ///
    /// Available when the crate is compiled under test (`#[cfg(test)]`) or
    /// when the `testing` feature is enabled, so downstream test suites can
    /// drive capacity eviction deterministically.
    #[cfg(any(test, feature = "testing"))]
    pub fn with_clock_and_rng(
        max_entries: usize,
        clock: impl Fn() -> u64 + Send + Sync + 'static,
        rng: StdRng,
    ) -> Self {
        let mut pool = Self::with_clock(max_entries, clock);
        pool.rng = rng;
        pool
    }

    /// Number of orphans held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `txid` is cached.
    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    /// Look up a cached orphan.
    pub fn get(&self, txid: &Hash256) -> Option<Arc<Transaction>> {
        self.entries.get(txid).map(|e| Arc::clone(&e.tx))
    }

    /// Peer that offered `txid`, if cached.
    pub fn peer_of(&self, txid: &Hash256) -> Option<PeerId> {
        self.entries.get(txid).map(|e| e.peer)
    }

    /// Cache `tx` attributed to `peer`.
    ///
    /// Returns false without side effect on a duplicate or when the input
    /// count exceeds [`MAX_ORPHAN_INPUTS`]. If the pool overflows, expired
    /// entries are swept and then uniformly random entries are evicted
    /// until the bound holds again; the newcomer is in the lottery too, so
    /// the call reports whether it actually stayed (a zero-capacity pool
    /// accepts nothing).
    pub fn add_tx(&mut self, tx: Arc<Transaction>, peer: PeerId) -> bool {
        let Ok(txid) = tx.txid() else { return false };
        if self.entries.contains_key(&txid) {
            return false;
        }
        if tx.inputs.len() > MAX_ORPHAN_INPUTS {
            debug!(%txid, inputs = tx.inputs.len(), "ignoring oversized orphan");
            return false;
        }

        let expires_at = (self.clock)() + ORPHAN_EXPIRE_SECS;
        for input in &tx.inputs {
            self.by_prev
                .entry(input.previous_output)
                .or_default()
                .insert(txid);
        }
        let list_pos = self.order.len();
        self.order.push(txid);
        self.entries.insert(
            txid,
            OrphanEntry {
                tx,
                peer,
                expires_at,
                list_pos,
            },
        );
        debug!(%txid, peer, "stored orphan");

        if self.entries.len() > self.max_entries {
            self.sweep_expired();
        }
        let mut survived = true;
        while self.entries.len() > self.max_entries {
            let victim_index = self.rng.gen_range(0..self.order.len());
            let victim = self.order[victim_index];
            if victim == txid {
                survived = false;
            }
            self.erase_tx(&victim);
        }
        if !survived {
            debug!(%txid, "orphan evicted on arrival");
        }
        survived
    }

    /// Drop a single orphan. Returns whether it was present.
    pub fn erase_tx(&mut self, txid: &Hash256) -> bool {
        let Some(entry) = self.entries.remove(txid) else {
            return false;
        };
        for input in &entry.tx.inputs {
            if let Some(waiting) = self.by_prev.get_mut(&input.previous_output) {
                waiting.remove(txid);
                if waiting.is_empty() {
                    self.by_prev.remove(&input.previous_output);
                }
            }
        }
        self.order.swap_remove(entry.list_pos);
        if let Some(moved) = self.order.get(entry.list_pos).copied() {
            if let Some(moved_entry) = self.entries.get_mut(&moved) {
                moved_entry.list_pos = entry.list_pos;
            }
        }
        true
    }

    /// Drop every orphan attributed to `peer`. Idempotent; returns how
    /// many entries were erased.
    pub fn erase_for_peer(&mut self, peer: PeerId) -> usize {
        let doomed: Vec<Hash256> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.peer == peer)
            .map(|(txid, _)| *txid)
            .collect();
        let mut erased = 0;
        for txid in doomed {
            if self.erase_tx(&txid) {
                erased += 1;
            }
        }
        if erased > 0 {
            debug!(peer, erased, "erased orphans for disconnected peer");
        }
        erased
    }

    /// Drop orphans that conflict with a connected block.
    ///
    /// An orphan waiting on an outpoint the block also spends can never
    /// connect; an orphan that IS one of the block's transactions spends
    /// the same outpoints and is caught by the same probe.
    pub fn erase_for_block(&mut self, block_txs: &[Transaction]) -> usize {
        let mut doomed: Vec<Hash256> = Vec::new();
        for tx in block_txs {
            for input in &tx.inputs {
                if let Some(waiting) = self.by_prev.get(&input.previous_output) {
                    doomed.extend(waiting.iter().copied());
                }
            }
        }
        doomed.sort();
        doomed.dedup();
        let mut erased = 0;
        for txid in doomed {
            if self.erase_tx(&txid) {
                erased += 1;
            }
        }
        if erased > 0 {
            debug!(erased, "erased orphans conflicting with connected block");
        }
        erased
    }

    /// Shrink the pool to at most `max_entries` survivors.
    ///
    /// Expired entries go first (at most one sweep per interval), then
    /// uniformly random victims drawn from `rng` until the bound holds.
    /// `max_entries = 0` empties the pool.
    pub fn limit_orphans<R: Rng>(&mut self, max_entries: usize, rng: &mut R) {
        self.sweep_expired();
        let mut evicted = 0usize;
        while self.entries.len() > max_entries {
            let victim_index = rng.gen_range(0..self.order.len());
            let victim = self.order[victim_index];
            self.erase_tx(&victim);
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, "orphan cap overflow, removed random entries");
        }
    }

    /// Cached orphans spending any output of `parent`, in txid order.
    pub fn children_of(&self, parent: &Hash256) -> Vec<Hash256> {
        let low = OutPoint {
            txid: *parent,
            index: 0,
        };
        let high = OutPoint {
            txid: *parent,
            index: u64::MAX,
        };
        let mut children: Vec<Hash256> = self
            .by_prev
            .range(low..=high)
            .flat_map(|(_, waiting)| waiting.iter().copied())
            .collect();
        children.sort();
        children.dedup();
        children
    }

    fn sweep_expired(&mut self) {
        let now = (self.clock)();
        if now < self.next_sweep {
            return;
        }
        let doomed: Vec<Hash256> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(txid, _)| *txid)
            .collect();
        let expired = doomed.len();
        for txid in doomed {
            self.erase_tx(&txid);
        }
        self.next_sweep = now + ORPHAN_SWEEP_INTERVAL_SECS;
        if expired > 0 {
            debug!(expired, "swept expired orphans");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use regus_core::amount::COIN;
    use regus_core::types::{TxInput, TxOutput};
    use std::sync::atomic::{AtomicU64, Ordering};

    const START: u64 = 1_700_000_000;

    fn orphan_spending(prevs: &[OutPoint]) -> Arc<Transaction> {
        Arc::new(Transaction {
            version: 2,
            inputs: prevs
                .iter()
                .map(|prev| TxInput {
                    previous_output: *prev,
                    script_sig: Vec::new(),
                    sequence: TxInput::SEQUENCE_FINAL,
                })
                .collect(),
            outputs: vec![TxOutput {
                value: COIN,
                script_pubkey: Vec::new(),
            }],
            lock_time: 0,
        })
    }

    fn orphan(byte: u8) -> Arc<Transaction> {
        orphan_spending(&[OutPoint {
            txid: Hash256([byte; 32]),
            index: 0,
        }])
    }

    fn wide_orphan(byte: u8, inputs: u64) -> Arc<Transaction> {
        let prevs: Vec<OutPoint> = (0..inputs)
            .map(|index| OutPoint {
                txid: Hash256([byte; 32]),
                index,
            })
            .collect();
        orphan_spending(&prevs)
    }

    fn steered_pool(max_entries: usize) -> (OrphanPool, Arc<AtomicU64>) {
        let time = Arc::new(AtomicU64::new(START));
        let handle = Arc::clone(&time);
        let pool = OrphanPool::with_clock_and_rng(
            max_entries,
            move || handle.load(Ordering::Relaxed),
            StdRng::seed_from_u64(42),
        );
        (pool, time)
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    #[test]
    fn stores_and_attributes_orphans() {
        let (mut pool, _) = steered_pool(10);
        let tx = orphan(1);
        let txid = tx.txid().unwrap();
        assert!(pool.add_tx(tx, 7));
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&txid));
        assert_eq!(pool.peer_of(&txid), Some(7));
        assert!(pool.get(&txid).is_some());
    }

    #[test]
    fn duplicates_are_rejected_without_side_effect() {
        let (mut pool, _) = steered_pool(10);
        assert!(pool.add_tx(orphan(1), 1));
        assert!(!pool.add_tx(orphan(1), 2));
        assert_eq!(pool.len(), 1);
        // Attribution stays with the first peer.
        let txid = orphan(1).txid().unwrap();
        assert_eq!(pool.peer_of(&txid), Some(1));
    }

    #[test]
    fn oversized_input_count_is_never_admitted() {
        let (mut pool, _) = steered_pool(10);
        assert!(!pool.add_tx(wide_orphan(1, MAX_ORPHAN_INPUTS as u64 + 1), 1));
        assert!(pool.is_empty());
        // The cap itself is admissible.
        assert!(pool.add_tx(wide_orphan(2, MAX_ORPHAN_INPUTS as u64), 1));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn zero_capacity_pool_accepts_nothing() {
        let (mut pool, _) = steered_pool(0);
        assert!(!pool.add_tx(orphan(1), 1));
        assert!(pool.is_empty());
    }

    #[test]
    fn overflow_evicts_down_to_capacity() {
        let (mut pool, _) = steered_pool(5);
        for byte in 0..8u8 {
            pool.add_tx(orphan(byte), byte as PeerId);
            assert!(pool.len() <= 5);
        }
        assert_eq!(pool.len(), 5);
    }

    // ------------------------------------------------------------------
    // Dependency lookup
    // ------------------------------------------------------------------

    #[test]
    fn children_of_spans_every_output_of_the_parent() {
        let (mut pool, _) = steered_pool(10);
        let parent = Hash256([9; 32]);
        let child_a = orphan_spending(&[OutPoint {
            txid: parent,
            index: 0,
        }]);
        let child_b = orphan_spending(&[OutPoint {
            txid: parent,
            index: 7,
        }]);
        let unrelated = orphan(3);
        let mut expected = vec![child_a.txid().unwrap(), child_b.txid().unwrap()];
        expected.sort();

        assert!(pool.add_tx(child_a, 1));
        assert!(pool.add_tx(child_b, 1));
        assert!(pool.add_tx(unrelated, 1));
        assert_eq!(pool.children_of(&parent), expected);
    }

    #[test]
    fn erase_tx_clears_the_dependency_index() {
        let (mut pool, _) = steered_pool(10);
        let parent = Hash256([9; 32]);
        let child = orphan_spending(&[OutPoint {
            txid: parent,
            index: 0,
        }]);
        let txid = child.txid().unwrap();
        assert!(pool.add_tx(child, 1));
        assert!(pool.erase_tx(&txid));
        assert!(pool.children_of(&parent).is_empty());
        assert!(!pool.erase_tx(&txid));
    }

    // ------------------------------------------------------------------
    // Peer and block sweeps
    // ------------------------------------------------------------------

    #[test]
    fn erase_for_peer_is_idempotent() {
        let (mut pool, _) = steered_pool(10);
        for byte in 0..3u8 {
            assert!(pool.add_tx(orphan(byte), 1));
        }
        for byte in 3..5u8 {
            assert!(pool.add_tx(orphan(byte), 2));
        }
        assert_eq!(pool.erase_for_peer(1), 3);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.erase_for_peer(1), 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn connected_block_sweeps_conflicting_orphans() {
        let (mut pool, _) = steered_pool(10);
        let contested = OutPoint {
            txid: Hash256([1; 32]),
            index: 0,
        };
        let conflicted = orphan_spending(&[contested]);
        let survivor = orphan(2);
        let survivor_id = survivor.txid().unwrap();
        assert!(pool.add_tx(conflicted, 1));
        assert!(pool.add_tx(survivor, 1));

        let block_tx = Transaction {
            version: 2,
            inputs: vec![TxInput {
                previous_output: contested,
                script_sig: Vec::new(),
                sequence: TxInput::SEQUENCE_FINAL,
            }],
            outputs: vec![TxOutput {
                value: COIN,
                script_pubkey: Vec::new(),
            }],
            lock_time: 0,
        };
        assert_eq!(pool.erase_for_block(&[block_tx]), 1);
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&survivor_id));
    }

    // ------------------------------------------------------------------
    // Capacity and expiry
    // ------------------------------------------------------------------

    #[test]
    fn limit_orphans_enforces_any_cap() {
        let (mut pool, _) = steered_pool(100);
        for byte in 0..61u8 {
            assert!(pool.add_tx(orphan(byte), byte as PeerId));
        }
        assert_eq!(pool.len(), 61);

        let mut rng = StdRng::seed_from_u64(7);
        pool.limit_orphans(40, &mut rng);
        assert_eq!(pool.len(), 40);
        pool.limit_orphans(0, &mut rng);
        assert!(pool.is_empty());
    }

    #[test]
    fn expired_orphans_go_before_random_victims() {
        let (mut pool, time) = steered_pool(100);
        let stale = orphan(1);
        let stale_id = stale.txid().unwrap();
        assert!(pool.add_tx(stale, 1));

        time.store(START + ORPHAN_EXPIRE_SECS + 1, Ordering::Relaxed);
        let fresh = orphan(2);
        let fresh_id = fresh.txid().unwrap();
        assert!(pool.add_tx(fresh, 1));

        let mut rng = StdRng::seed_from_u64(7);
        pool.limit_orphans(100, &mut rng);
        assert!(!pool.contains(&stale_id));
        assert!(pool.contains(&fresh_id));
    }

    #[test]
    fn expiry_sweep_runs_at_most_once_per_interval() {
        let (mut pool, time) = steered_pool(100);
        let mut rng = StdRng::seed_from_u64(7);
        let tx = orphan(1);
        let txid = tx.txid().unwrap();
        assert!(pool.add_tx(tx, 1));

        // A sweep shortly before expiry arms the interval gate.
        time.store(START + ORPHAN_EXPIRE_SECS - 100, Ordering::Relaxed);
        pool.limit_orphans(100, &mut rng);
        assert!(pool.contains(&txid));

        // Expired now, but the gate still holds.
        time.store(START + ORPHAN_EXPIRE_SECS + 50, Ordering::Relaxed);
        pool.limit_orphans(100, &mut rng);
        assert!(pool.contains(&txid));

        // Past the gate the sweep fires.
        time.store(START + ORPHAN_EXPIRE_SECS + ORPHAN_SWEEP_INTERVAL_SECS, Ordering::Relaxed);
        pool.limit_orphans(100, &mut rng);
        assert!(!pool.contains(&txid));
    }

    // --- proptest ---

    proptest! {
        #[test]
        fn cap_bound_holds_for_arbitrary_histories(
            seeds in prop::collection::vec(0u8..=255u8, 0..120),
            cap in 0usize..60,
        ) {
            let (mut pool, _) = steered_pool(usize::MAX);
            for seed in seeds {
                pool.add_tx(orphan(seed), seed as PeerId);
            }
            let mut rng = StdRng::seed_from_u64(11);
            pool.limit_orphans(cap, &mut rng);
            prop_assert!(pool.len() <= cap);
        }
    }
}

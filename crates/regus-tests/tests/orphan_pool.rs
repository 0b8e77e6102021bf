//! Adversarial tests for the orphan cache.
//!
//! A peer that controls which transactions arrive without parents controls
//! what the orphan pool stores. These tests flood the pool the way such a
//! peer would and verify that every bound holds.
//!
//! Attack vectors tested:
//! - Flooding with unconnectable transactions across many peers
//! - Orphans chained onto other orphans
//! - Oversized transactions aimed at the cache's memory
//! - Disconnect bookkeeping (per-peer erasure)
//! - Capacity squeezes down to zero
//! - Stale entries riding out the expiry window

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regus_core::types::{Hash256, OutPoint};
use regus_mempool::orphan::{DEFAULT_MAX_ORPHAN_COUNT, MAX_ORPHAN_INPUTS};
use regus_mempool::OrphanPool;
use regus_tests::helpers::*;

const START: u64 = 1_700_000_000;

fn fixed_clock_pool(max_entries: usize) -> OrphanPool {
    OrphanPool::with_clock_and_rng(max_entries, || START, StdRng::seed_from_u64(7))
}

// ---------------------------------------------------------------------------
// Flooding
// ---------------------------------------------------------------------------

#[test]
fn orphan_flood_stays_within_every_bound() {
    let mut rng = StdRng::seed_from_u64(33);
    let mut pool = fixed_clock_pool(DEFAULT_MAX_ORPHAN_COUNT);
    let mut known: Vec<Hash256> = Vec::new();

    // 50 orphan transactions, one per peer:
    for i in 0..50u64 {
        let parent = OutPoint {
            txid: Hash256(rng.r#gen()),
            index: 0,
        };
        let tx = make_tx(vec![parent], vec![(1_000_000 + i as i64, payout_script(1))]);
        known.push(tx.txid().unwrap());
        assert!(pool.add_tx(Arc::new(tx), i));
    }

    // ... and 50 that depend on other orphans:
    for i in 0..50u64 {
        let parent = OutPoint {
            txid: known[rng.gen_range(0..known.len())],
            index: 0,
        };
        let tx = make_tx(vec![parent], vec![(2_000_000 + i as i64, payout_script(1))]);
        known.push(tx.txid().unwrap());
        assert!(pool.add_tx(Arc::new(tx), i));
    }
    assert_eq!(pool.len(), 100);

    // Really big orphans are ignored outright:
    for i in 0..10u64 {
        let parent = known[rng.gen_range(0..known.len())];
        let inputs: Vec<OutPoint> = (0..=MAX_ORPHAN_INPUTS as u64)
            .map(|j| OutPoint {
                txid: parent,
                index: j,
            })
            .collect();
        let tx = make_tx(inputs, vec![(1_000_000, payout_script(1))]);
        assert!(!pool.add_tx(Arc::new(tx), i));
    }
    assert_eq!(pool.len(), 100);

    // Disconnecting a peer erases its orphans; each of peers 0..3 offered
    // at least one, so the count strictly decreases every time.
    for peer in 0..3u64 {
        let before = pool.len();
        pool.erase_for_peer(peer);
        assert!(pool.len() < before, "peer {peer} owned at least one orphan");
    }
    assert_eq!(pool.erase_for_peer(0), 0);

    // Capacity squeezes evict uniformly at random down to the new bound.
    let mut evict_rng = StdRng::seed_from_u64(1);
    pool.limit_orphans(40, &mut evict_rng);
    assert!(pool.len() <= 40);
    pool.limit_orphans(10, &mut evict_rng);
    assert!(pool.len() <= 10);
    pool.limit_orphans(0, &mut evict_rng);
    assert_eq!(pool.len(), 0);
}

#[test]
fn arrival_over_capacity_holds_the_bound() {
    let mut pool = fixed_clock_pool(25);
    for i in 0..200u64 {
        let parent = OutPoint {
            txid: Hash256([(i % 251) as u8 + 1; 32]),
            index: i,
        };
        let tx = make_tx(vec![parent], vec![(1_000_000 + i as i64, payout_script(2))]);
        pool.add_tx(Arc::new(tx), i % 8);
        assert!(pool.len() <= 25);
    }
    assert_eq!(pool.len(), 25);
}

// ---------------------------------------------------------------------------
// Expiry
// ---------------------------------------------------------------------------

#[test]
fn expired_orphans_are_swept_before_eviction() {
    let now = Arc::new(AtomicU64::new(START));
    let clock_handle = Arc::clone(&now);
    let mut pool = OrphanPool::with_clock_and_rng(
        DEFAULT_MAX_ORPHAN_COUNT,
        move || clock_handle.load(Ordering::Relaxed),
        StdRng::seed_from_u64(9),
    );

    for i in 0..5u64 {
        let parent = OutPoint {
            txid: Hash256([i as u8 + 1; 32]),
            index: 0,
        };
        let tx = make_tx(vec![parent], vec![(1_000_000 + i as i64, payout_script(3))]);
        assert!(pool.add_tx(Arc::new(tx), 0));
    }
    assert_eq!(pool.len(), 5);

    // Past the 20 minute lifetime everything above is stale; a fresh
    // arrival is not.
    now.store(START + 20 * 60 + 1, Ordering::Relaxed);
    let fresh = make_tx(
        vec![OutPoint {
            txid: Hash256([0xff; 32]),
            index: 0,
        }],
        vec![(9_000_000, payout_script(3))],
    );
    let fresh_id = fresh.txid().unwrap();
    assert!(pool.add_tx(Arc::new(fresh), 1));

    let mut rng = StdRng::seed_from_u64(2);
    pool.limit_orphans(DEFAULT_MAX_ORPHAN_COUNT, &mut rng);
    assert_eq!(pool.len(), 1);
    assert!(pool.contains(&fresh_id));
}

// ---------------------------------------------------------------------------
// Parent resolution
// ---------------------------------------------------------------------------

#[test]
fn children_lookup_spans_outputs_and_peers() {
    let mut pool = fixed_clock_pool(DEFAULT_MAX_ORPHAN_COUNT);
    let parent = Hash256([0xaa; 32]);

    let a = make_tx(
        vec![OutPoint {
            txid: parent,
            index: 0,
        }],
        vec![(1_000_000, payout_script(4))],
    );
    let b = make_tx(
        vec![OutPoint {
            txid: parent,
            index: 5,
        }],
        vec![(2_000_000, payout_script(4))],
    );
    let unrelated = make_tx(
        vec![OutPoint {
            txid: Hash256([0xbb; 32]),
            index: 0,
        }],
        vec![(3_000_000, payout_script(4))],
    );
    let a_id = a.txid().unwrap();
    let b_id = b.txid().unwrap();
    assert!(pool.add_tx(Arc::new(a), 1));
    assert!(pool.add_tx(Arc::new(b), 2));
    assert!(pool.add_tx(Arc::new(unrelated), 3));

    let mut expected = vec![a_id, b_id];
    expected.sort();
    assert_eq!(pool.children_of(&parent), expected);

    pool.erase_for_peer(1);
    assert_eq!(pool.children_of(&parent), vec![b_id]);
}

#[test]
fn connected_block_clears_conflicted_orphans() {
    let mut pool = fixed_clock_pool(DEFAULT_MAX_ORPHAN_COUNT);
    let contested = OutPoint {
        txid: Hash256([0x11; 32]),
        index: 0,
    };

    let waiting = make_tx(vec![contested], vec![(1_000_000, payout_script(5))]);
    let waiting_id = waiting.txid().unwrap();
    let bystander = make_tx(
        vec![OutPoint {
            txid: Hash256([0x22; 32]),
            index: 0,
        }],
        vec![(2_000_000, payout_script(5))],
    );
    let bystander_id = bystander.txid().unwrap();
    assert!(pool.add_tx(Arc::new(waiting), 1));
    assert!(pool.add_tx(Arc::new(bystander), 1));

    // The block spends the contested outpoint through a different tx, so
    // the waiting orphan can never connect.
    let confirmed = make_tx(vec![contested], vec![(900_000, payout_script(6))]);
    assert_eq!(pool.erase_for_block(&[confirmed]), 1);
    assert!(!pool.contains(&waiting_id));
    assert!(pool.contains(&bystander_id));
}

//! Criterion benchmarks for block template assembly.
//!
//! Covers: selection over independent transactions, deep spend chains, and
//! fee-bumped package (CPFP) workloads.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use regus_core::amount::{Amount, COIN};
use regus_core::chain::MemoryChainView;
use regus_core::params::ChainParams;
use regus_core::script::OP_CHECKSIG;
use regus_core::traits::NoopScriptVerifier;
use regus_core::types::{Hash256, OutPoint, Transaction, TxInput, TxOutput, UtxoEntry};
use regus_mempool::{CandidateIndex, EntryBuilder};
use regus_miner::{AssemblerOptions, BlockAssembler};

const PAYOUT: &[u8] = &[OP_CHECKSIG];

fn coin(index: u64) -> OutPoint {
    OutPoint {
        txid: Hash256([0x11; 32]),
        index,
    }
}

fn spend(prevs: &[OutPoint], outputs: &[Amount]) -> Transaction {
    Transaction {
        version: 2,
        inputs: prevs
            .iter()
            .map(|prev| TxInput {
                previous_output: *prev,
                script_sig: Vec::new(),
                sequence: TxInput::SEQUENCE_FINAL,
            })
            .collect(),
        outputs: outputs
            .iter()
            .map(|value| TxOutput {
                value: *value,
                script_pubkey: Vec::new(),
            })
            .collect(),
        lock_time: 0,
    }
}

fn chain_with_coins(n: u64) -> Arc<MemoryChainView> {
    let chain = Arc::new(MemoryChainView::new());
    for index in 0..n {
        chain.add_utxo(
            coin(index),
            UtxoEntry {
                output: TxOutput {
                    value: 100 * COIN,
                    script_pubkey: Vec::new(),
                },
                block_height: 0,
                is_coinbase: false,
            },
        );
    }
    chain
}

fn assembler(chain: Arc<MemoryChainView>) -> BlockAssembler {
    BlockAssembler::with_clock(
        chain,
        Arc::new(NoopScriptVerifier),
        ChainParams::regtest(),
        AssemblerOptions::default(),
        || 1_700_000_000,
    )
}

/// `n` unrelated single-input spends with spread-out fees.
fn independent_pool(n: u64) -> CandidateIndex {
    let mut pool = CandidateIndex::new();
    for index in 0..n {
        let fee = 10_000 + index as Amount * 7;
        let tx = spend(&[coin(index)], &[100 * COIN - fee]);
        pool.add_unchecked(EntryBuilder::new().fee(fee).from_tx(tx));
    }
    pool
}

/// One chain of `n` spends hanging off a single coin.
fn chained_pool(n: u64) -> CandidateIndex {
    let mut pool = CandidateIndex::new();
    let mut prev = coin(0);
    let mut value = 100 * COIN;
    for _ in 0..n {
        value -= 10_000;
        let tx = spend(&[prev], &[value]);
        prev = OutPoint {
            txid: tx.txid().expect("txid"),
            index: 0,
        };
        pool.add_unchecked(EntryBuilder::new().fee(10_000).from_tx(tx));
    }
    pool
}

/// Zero-fee parents each bumped by a well-paying child.
fn cpfp_pool(pairs: u64) -> CandidateIndex {
    let mut pool = CandidateIndex::new();
    for index in 0..pairs {
        let parent = spend(&[coin(index)], &[100 * COIN]);
        let child = spend(
            &[OutPoint {
                txid: parent.txid().expect("txid"),
                index: 0,
            }],
            &[100 * COIN - 50_000],
        );
        pool.add_unchecked(EntryBuilder::new().fee(0).from_tx(parent));
        pool.add_unchecked(EntryBuilder::new().fee(50_000).from_tx(child));
    }
    pool
}

fn bench_independent_selection(c: &mut Criterion) {
    let chain = chain_with_coins(1000);
    let pool = independent_pool(1000);
    let assembler = assembler(chain);

    c.bench_function("assemble_1000_independent", |b| {
        b.iter(|| assembler.create_new_block(black_box(&pool), PAYOUT))
    });
}

fn bench_chained_selection(c: &mut Criterion) {
    let chain = chain_with_coins(1);
    let pool = chained_pool(200);
    let assembler = assembler(chain);

    c.bench_function("assemble_200_tx_chain", |b| {
        b.iter(|| assembler.create_new_block(black_box(&pool), PAYOUT))
    });
}

fn bench_cpfp_selection(c: &mut Criterion) {
    let chain = chain_with_coins(250);
    let pool = cpfp_pool(250);
    let assembler = assembler(chain);

    c.bench_function("assemble_250_cpfp_pairs", |b| {
        b.iter(|| assembler.create_new_block(black_box(&pool), PAYOUT))
    });
}

criterion_group!(
    benches,
    bench_independent_selection,
    bench_chained_selection,
    bench_cpfp_selection,
);
criterion_main!(benches);
//! Shared test helpers for the integration suites.

use regus_core::amount::{Amount, COIN};
use regus_core::chain::{ChainView, MemoryChainView};
use regus_core::merkle;
use regus_core::script::{append_push, OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160};
use regus_core::types::*;

/// Pay-to-pubkey-hash style locking script from a seed byte.
pub fn payout_script(seed: u8) -> Vec<u8> {
    let mut script = vec![OP_DUP, OP_HASH160];
    append_push(&mut script, &[seed; 20]);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// Create a coinbase transaction with a unique marker.
///
/// Pushes `marker` into the script sig so that each call produces a
/// distinct txid, matching what the assembler does with the block height.
pub fn make_coinbase(value: Amount, script_pubkey: Vec<u8>, marker: u64) -> Transaction {
    let mut script_sig = Vec::new();
    append_push(&mut script_sig, &marker.to_le_bytes());
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            script_sig,
            sequence: TxInput::SEQUENCE_FINAL,
        }],
        outputs: vec![TxOutput {
            value,
            script_pubkey,
        }],
        lock_time: 0,
    }
}

/// Create a simple spending transaction (unsigned).
pub fn make_tx(inputs: Vec<OutPoint>, outputs: Vec<(Amount, Vec<u8>)>) -> Transaction {
    Transaction {
        version: 2,
        inputs: inputs
            .into_iter()
            .map(|op| TxInput {
                previous_output: op,
                script_sig: Vec::new(),
                sequence: TxInput::SEQUENCE_FINAL,
            })
            .collect(),
        outputs: outputs
            .into_iter()
            .map(|(value, script_pubkey)| TxOutput {
                value,
                script_pubkey,
            })
            .collect(),
        lock_time: 0,
    }
}

/// Outpoint for output `index` of `tx`.
pub fn output_of(tx: &Transaction, index: u64) -> OutPoint {
    OutPoint {
        txid: tx.txid().unwrap(),
        index,
    }
}

/// Create a block with a correct merkle root over `txs`.
pub fn make_block(prev_hash: Hash256, timestamp: u64, txs: Vec<Transaction>) -> Block {
    let txids: Vec<Hash256> = txs.iter().map(|tx| tx.txid().unwrap()).collect();
    Block {
        header: BlockHeader {
            version: 1,
            prev_hash,
            merkle_root: merkle::merkle_root(&txids),
            timestamp,
            difficulty_target: u64::MAX,
            nonce: 0,
        },
        transactions: txs,
    }
}

/// Seed a spendable non-coinbase output directly into the UTXO set.
pub fn seed_coin(chain: &MemoryChainView, seed: u8, value: Amount, height: u64) -> OutPoint {
    let outpoint = OutPoint {
        txid: Hash256([seed; 32]),
        index: 0,
    };
    chain.add_utxo(
        outpoint,
        UtxoEntry {
            output: TxOutput {
                value,
                script_pubkey: payout_script(seed),
            },
            block_height: height,
            is_coinbase: false,
        },
    );
    outpoint
}

/// Connect `count` coinbase-only blocks, advancing height and the
/// median-time-past window. Timestamps start at `start_time` and step by
/// `spacing` seconds per block.
pub fn connect_empty_blocks(chain: &MemoryChainView, count: u64, start_time: u64, spacing: u64) {
    for i in 0..count {
        let timestamp = start_time + i * spacing;
        let coinbase = make_coinbase(2000 * COIN, payout_script(0xcb), timestamp);
        let block = make_block(chain.tip_hash(), timestamp, vec![coinbase]);
        chain
            .connect_block(&block)
            .expect("empty block connects cleanly");
    }
}

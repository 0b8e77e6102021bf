//! Core protocol types: transactions, blocks, UTXOs.
//!
//! All monetary values are in satoshis (1 REG = 10^8 satoshis). Transaction
//! weight and serialized size are derived from the canonical bincode
//! encoding rather than stored on the types.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::amount::Amount;
use crate::error::TransactionError;
use crate::params::WITNESS_SCALE_FACTOR;

/// A 32-byte hash value.
///
/// Used for transaction IDs (BLAKE3), block header hashes (SHA-256),
/// and merkle roots (BLAKE3).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes). Used for coinbase previous outpoints.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Reference to a specific output of a previous transaction.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    /// Transaction ID containing the referenced output.
    pub txid: Hash256,
    /// Index of the output within the transaction.
    pub index: u64,
}

impl OutPoint {
    /// The null outpoint, used for coinbase transaction inputs.
    pub fn null() -> Self {
        Self {
            txid: Hash256::ZERO,
            index: u64::MAX,
        }
    }

    /// Check if this is the null outpoint (coinbase marker).
    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.index == u64::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// A transaction input, spending a previous output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxInput {
    /// The outpoint being spent. Null outpoint for coinbase.
    pub previous_output: OutPoint,
    /// Unlocking script. Carries the height marker for coinbase inputs.
    pub script_sig: Vec<u8>,
    /// Sequence number, encoding relative lock-time per BIP 68.
    pub sequence: u32,
}

impl TxInput {
    /// Sequence value that opts the input out of all lock-time semantics.
    pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

    /// Highest sequence that still leaves absolute lock-time enforcement active.
    pub const MAX_SEQUENCE_NONFINAL: u32 = Self::SEQUENCE_FINAL - 1;

    /// Bit 31: when set, the sequence number carries no relative lock.
    pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

    /// Bit 22: when set, the lock value is in 512-second units instead of blocks.
    pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

    /// Mask extracting the 16-bit lock value from a sequence number.
    pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;

    /// Shift converting a time-type lock value to seconds (1 unit = 512 s).
    pub const SEQUENCE_LOCKTIME_GRANULARITY: u32 = 9;
}

/// A transaction output, creating a new UTXO.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    /// Value in satoshis.
    pub value: Amount,
    /// Locking script committing to the recipient.
    pub script_pubkey: Vec<u8>,
}

/// A transaction transferring value between outputs.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    /// Protocol version. Relative lock-times require version 2 or later.
    pub version: u64,
    /// Inputs consuming previous outputs.
    pub inputs: Vec<TxInput>,
    /// New outputs created by this transaction.
    pub outputs: Vec<TxOutput>,
    /// Block height or timestamp before which this tx is not final.
    pub lock_time: u64,
}

impl Transaction {
    /// Compute the transaction ID (BLAKE3 hash of the canonical encoding).
    ///
    /// Uses bincode with standard config for deterministic serialization.
    /// Returns an error if serialization fails.
    pub fn txid(&self) -> Result<Hash256, TransactionError> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TransactionError::Serialization(e.to_string()))?;
        Ok(Hash256(blake3::hash(&encoded).into()))
    }

    /// Check if this is a coinbase transaction (single input with null outpoint).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// Serialized size of the canonical encoding, in bytes.
    pub fn serialized_size(&self) -> Result<u64, TransactionError> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TransactionError::Serialization(e.to_string()))?;
        Ok(encoded.len() as u64)
    }

    /// Transaction weight: serialized size scaled by the witness factor.
    pub fn weight(&self) -> Result<u64, TransactionError> {
        Ok(self.serialized_size()? * WITNESS_SCALE_FACTOR)
    }

    /// Sum of all output values. Returns None on overflow.
    pub fn total_output_value(&self) -> Option<Amount> {
        self.outputs
            .iter()
            .try_fold(0i64, |acc, out| acc.checked_add(out.value))
    }
}

/// Block header containing the proof-of-work puzzle.
///
/// Hash is computed as double SHA-256 over a fixed byte layout.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Protocol version.
    pub version: u64,
    /// Hash of the previous block header.
    pub prev_hash: Hash256,
    /// BLAKE3 merkle root of the block's transactions.
    pub merkle_root: Hash256,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Compact difficulty target.
    pub difficulty_target: u64,
    /// Proof-of-work nonce.
    pub nonce: u64,
}

impl BlockHeader {
    /// Header size in bytes when serialized for hashing (4 u64 fields + 2 * 32-byte hashes).
    const HASH_SIZE: usize = 4 * 8 + 2 * 32;

    /// Compute the block header hash (double SHA-256).
    ///
    /// Uses an explicit fixed byte layout: version || prev_hash || merkle_root ||
    /// timestamp || difficulty_target || nonce, all little-endian.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(Self::HASH_SIZE);
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(self.prev_hash.as_bytes());
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&self.difficulty_target.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        let first = Sha256::digest(&data);
        Hash256(Sha256::digest(first).into())
    }
}

/// A complete block: header plus transactions.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    /// Block header with proof-of-work.
    pub header: BlockHeader,
    /// Ordered list of transactions. First transaction must be coinbase.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Get the coinbase transaction, if the block is non-empty.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }
}

/// An entry in the unspent transaction output set.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct UtxoEntry {
    /// The unspent output.
    pub output: TxOutput,
    /// Height of the block containing this UTXO.
    pub block_height: u64,
    /// Whether this output is from a coinbase transaction.
    pub is_coinbase: bool,
}

impl UtxoEntry {
    /// Check if this UTXO has matured and can be spent at `current_height`.
    ///
    /// Coinbase outputs require [`COINBASE_MATURITY`](crate::params::COINBASE_MATURITY)
    /// confirmations. Non-coinbase outputs are always mature.
    pub fn is_mature(&self, current_height: u64) -> bool {
        if !self.is_coinbase {
            return true;
        }
        current_height.saturating_sub(self.block_height) >= crate::params::COINBASE_MATURITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::COIN;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint {
                    txid: Hash256([0x11; 32]),
                    index: 0,
                },
                script_sig: vec![0x51],
                sequence: TxInput::SEQUENCE_FINAL,
            }],
            outputs: vec![TxOutput {
                value: 50 * COIN,
                script_pubkey: vec![0xac],
            }],
            lock_time: 0,
        }
    }

    fn sample_coinbase() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint::null(),
                script_sig: 7u64.to_le_bytes().to_vec(),
                sequence: TxInput::SEQUENCE_FINAL,
            }],
            outputs: vec![TxOutput {
                value: 2000 * COIN,
                script_pubkey: vec![0xac],
            }],
            lock_time: 7,
        }
    }

    fn sample_header() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: Hash256([0xab; 32]),
            merkle_root: Hash256([0xcd; 32]),
            timestamp: 1_712_232_000,
            difficulty_target: u64::MAX,
            nonce: 42,
        }
    }

    // --- Hash256 ---

    #[test]
    fn hash256_display_is_lowercase_hex() {
        let h = Hash256([0x0f; 32]);
        assert_eq!(h.to_string(), "0f".repeat(32));
    }

    #[test]
    fn hash256_zero_roundtrip() {
        assert!(Hash256::ZERO.is_zero());
        assert!(!Hash256([1; 32]).is_zero());
        assert_eq!(Hash256::from_bytes([3; 32]).as_bytes(), &[3; 32]);
    }

    // --- OutPoint ---

    #[test]
    fn null_outpoint_marker() {
        assert!(OutPoint::null().is_null());
        let op = OutPoint {
            txid: Hash256([1; 32]),
            index: 0,
        };
        assert!(!op.is_null());
        assert!(op.to_string().ends_with(":0"));
    }

    #[test]
    fn outpoint_ordering_groups_by_txid() {
        let a0 = OutPoint { txid: Hash256([1; 32]), index: 0 };
        let a1 = OutPoint { txid: Hash256([1; 32]), index: 1 };
        let b0 = OutPoint { txid: Hash256([2; 32]), index: 0 };
        assert!(a0 < a1);
        assert!(a1 < b0);
    }

    // --- Transaction ---

    #[test]
    fn txid_is_deterministic() {
        let tx = sample_tx();
        assert_eq!(tx.txid().unwrap(), tx.txid().unwrap());
    }

    #[test]
    fn txid_changes_with_content() {
        let tx = sample_tx();
        let mut other = sample_tx();
        other.outputs[0].value += 1;
        assert_ne!(tx.txid().unwrap(), other.txid().unwrap());
    }

    #[test]
    fn coinbase_detection() {
        assert!(sample_coinbase().is_coinbase());
        assert!(!sample_tx().is_coinbase());
    }

    #[test]
    fn weight_is_scaled_size() {
        let tx = sample_tx();
        assert_eq!(
            tx.weight().unwrap(),
            tx.serialized_size().unwrap() * WITNESS_SCALE_FACTOR
        );
    }

    #[test]
    fn total_output_value_checks_overflow() {
        let mut tx = sample_tx();
        assert_eq!(tx.total_output_value(), Some(50 * COIN));
        tx.outputs.push(TxOutput {
            value: Amount::MAX,
            script_pubkey: vec![],
        });
        assert_eq!(tx.total_output_value(), None);
    }

    // --- BlockHeader ---

    #[test]
    fn header_hash_is_deterministic() {
        assert_eq!(sample_header().hash(), sample_header().hash());
    }

    #[test]
    fn header_hash_changes_with_nonce() {
        let mut header = sample_header();
        let first = header.hash();
        header.nonce += 1;
        assert_ne!(first, header.hash());
    }

    // --- UtxoEntry ---

    #[test]
    fn coinbase_utxo_matures() {
        let entry = UtxoEntry {
            output: TxOutput {
                value: COIN,
                script_pubkey: vec![],
            },
            block_height: 10,
            is_coinbase: true,
        };
        assert!(!entry.is_mature(10));
        assert!(!entry.is_mature(109));
        assert!(entry.is_mature(110));
    }

    #[test]
    fn regular_utxo_always_mature() {
        let entry = UtxoEntry {
            output: TxOutput {
                value: COIN,
                script_pubkey: vec![],
            },
            block_height: 10,
            is_coinbase: false,
        };
        assert!(entry.is_mature(10));
    }
}

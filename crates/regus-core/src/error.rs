//! Error types for the Regus admission and assembly pipeline.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("serialization: {0}")] Serialization(String),
    #[error("empty inputs or outputs")] EmptyInputsOrOutputs,
    #[error("value overflow")] ValueOverflow,
    #[error("value out of range at output {0}")] ValueOutOfRange(usize),
    #[error("duplicate input: {0}")] DuplicateInput(String),
    #[error("null outpoint in non-coinbase input {0}")] NullOutpointInRegularTx(usize),
}

/// Block-level check failures. The display strings are the consensus
/// reject codes carried on the wire and asserted by the test suite.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("bad-cb-missing")] CoinbaseMissing,
    #[error("bad-cb-multiple")] CoinbaseMultiple,
    #[error("bad-cb-amount")] CoinbaseAmount,
    #[error("bad-txns-inputs-missingorspent")] InputsMissingOrSpent,
    #[error("bad-txns-premature-spend-of-coinbase")] PrematureCoinbaseSpend,
    #[error("bad-txns-in-belowout")] InputsBelowOutputs,
    #[error("bad-txns-accumulated-fee-outofrange")] FeeOutOfRange,
    #[error("bad-txns-duplicate")] DuplicateTxid,
    #[error("bad-txnmrklroot")] MerkleRootMismatch,
    #[error("bad-txns-nonfinal")] NonFinal,
    #[error("bad-blk-weight")] WeightExceeded,
    #[error("bad-blk-sigops")] SigopsExceeded,
    #[error("block-validation-failed")] ScriptVerification,
    #[error(transparent)] Transaction(#[from] TransactionError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction already in pool: {0}")] AlreadyExists(String),
    #[error("conflicts with pool tx {existing_txid} on outpoint {outpoint}")] Conflict { new_txid: String, existing_txid: String, outpoint: String },
    #[error("rejected: {0}")] Rejected(String),
    #[error(transparent)] Transaction(#[from] TransactionError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    #[error("template validation failed: {0}")] TemplateInvalid(#[from] BlockError),
    #[error(transparent)] Transaction(#[from] TransactionError),
}

#[derive(Error, Debug)]
pub enum RegusError {
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] Block(#[from] BlockError),
    #[error(transparent)] Mempool(#[from] MempoolError),
    #[error(transparent)] Assembler(#[from] AssemblerError),
}

//! Trait interfaces between the admission, pool, and assembly layers.
//!
//! - [`PoolView`] — unconfirmed-output lookups (the candidate index implements)
//! - [`Validator`] — admission judgment for incoming transactions
//! - [`ScriptVerifier`] — script execution seam, stubbed by [`NoopScriptVerifier`]

use std::sync::Arc;

use crate::amount::{money_range, Amount};
use crate::chain::ChainView;
use crate::script::transaction_sigop_cost;
use crate::types::{OutPoint, Transaction, TxOutput};
use crate::validation::check_transaction;

/// Identifier for a connected peer session.
pub type PeerId = u64;

/// Outcome of judging a transaction for mempool admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxVerdict {
    /// Admissible. Carries the computed fee and declared sigop cost.
    Valid {
        /// Fee in satoshis (input value minus output value).
        fee: Amount,
        /// Signature-operation cost in weight-scaled units.
        sigop_cost: i64,
    },
    /// Inputs not found in the chain or the pool; orphan candidate.
    MissingInputs(Vec<OutPoint>),
    /// Hard rejection with a reason.
    Invalid(String),
}

/// Read access to outputs created by unconfirmed pool transactions.
pub trait PoolView {
    /// Output created by an unconfirmed transaction, if the pool holds it.
    fn unconfirmed_output(&self, outpoint: &OutPoint) -> Option<TxOutput>;
}

/// Judges transactions for mempool admission.
pub trait Validator: Send + Sync {
    /// Validate `tx` against the current chain tip and the given pool view.
    ///
    /// Never returns an error; every failure mode is a [`TxVerdict`] so
    /// admission can distinguish orphanhood from hard rejection.
    fn check_admission(&self, tx: &Transaction, pool: &dyn PoolView) -> TxVerdict;
}

/// Script execution seam.
///
/// Consensus code treats scripts as opaque; implementations decide whether
/// an input satisfies the locking script of the coin it spends.
pub trait ScriptVerifier: Send + Sync {
    /// Check input `input_index` of `tx` against `locking_script`.
    fn verify(&self, tx: &Transaction, input_index: usize, locking_script: &[u8]) -> bool;
}

/// Script verifier that accepts everything. Used where script execution
/// is out of scope or provided externally.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScriptVerifier;

impl ScriptVerifier for NoopScriptVerifier {
    fn verify(&self, _tx: &Transaction, _input_index: usize, _locking_script: &[u8]) -> bool {
        true
    }
}

/// Standard admission validator.
///
/// Runs structural checks, resolves every input against unconfirmed pool
/// outputs and then the chain UTXO set, enforces coinbase maturity and
/// value conservation, and hands each input to the script verifier.
/// Lock-time and sequence-lock finality are deliberately not judged here;
/// block assembly evaluates them against the block actually being built.
pub struct StandardValidator {
    chain: Arc<dyn ChainView>,
    scripts: Arc<dyn ScriptVerifier>,
}

impl StandardValidator {
    /// Create a validator reading the given chain and script seams.
    pub fn new(chain: Arc<dyn ChainView>, scripts: Arc<dyn ScriptVerifier>) -> Self {
        Self { chain, scripts }
    }
}

impl Validator for StandardValidator {
    fn check_admission(&self, tx: &Transaction, pool: &dyn PoolView) -> TxVerdict {
        if let Err(e) = check_transaction(tx) {
            return TxVerdict::Invalid(e.to_string());
        }
        if tx.is_coinbase() {
            return TxVerdict::Invalid("coinbase not admissible".into());
        }

        let next_height = self.chain.height() + 1;
        let mut missing = Vec::new();
        let mut spent_scripts = Vec::with_capacity(tx.inputs.len());
        let mut total_in: Amount = 0;

        for input in &tx.inputs {
            let outpoint = &input.previous_output;
            let spent = if let Some(output) = pool.unconfirmed_output(outpoint) {
                output
            } else if let Some(entry) = self.chain.get_utxo(outpoint) {
                if !entry.is_mature(next_height) {
                    return TxVerdict::Invalid(format!(
                        "premature spend of coinbase {outpoint}"
                    ));
                }
                entry.output
            } else {
                missing.push(*outpoint);
                continue;
            };
            total_in = match total_in.checked_add(spent.value) {
                Some(v) if money_range(v) => v,
                _ => return TxVerdict::Invalid("input value out of range".into()),
            };
            spent_scripts.push(spent.script_pubkey);
        }

        if !missing.is_empty() {
            return TxVerdict::MissingInputs(missing);
        }

        // total_output_value cannot overflow past check_transaction.
        let total_out = tx.total_output_value().unwrap_or(Amount::MAX);
        if total_in < total_out {
            return TxVerdict::Invalid("input value below output value".into());
        }

        for (i, script) in spent_scripts.iter().enumerate() {
            if !self.scripts.verify(tx, i, script) {
                return TxVerdict::Invalid(format!("script verification failed on input {i}"));
            }
        }

        TxVerdict::Valid {
            fee: total_in - total_out,
            sigop_cost: transaction_sigop_cost(tx),
        }
    }
}

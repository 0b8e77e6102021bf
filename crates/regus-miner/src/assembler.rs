//! Greedy ancestor-package block assembly.
//!
//! [`BlockAssembler::create_new_block`] drains a [`CandidateIndex`] snapshot
//! in descending ancestor-feerate order. Each pick carries its whole
//! unconfirmed ancestor package; packages that would push the block past its
//! weight or sigop budget are skipped, packages containing a non-final
//! transaction are skipped, and selection stops once the best remaining
//! package scores below the configured minimum feerate. The finished block
//! runs through the full consensus checks before it is returned, so a caller
//! never receives a template the node itself would reject.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use regus_core::amount::Amount;
use regus_core::block_check::{check_block, BlockContext};
use regus_core::chain::ChainView;
use regus_core::error::AssemblerError;
use regus_core::merkle::merkle_root;
use regus_core::params::{
    block_subsidy, ChainParams, MAX_BLOCK_SIGOPS_COST, MAX_BLOCK_WEIGHT, WITNESS_SCALE_FACTOR,
};
use regus_core::script::{append_push, transaction_sigop_cost};
use regus_core::traits::ScriptVerifier;
use regus_core::types::{
    Block, BlockHeader, Hash256, OutPoint, Transaction, TxInput, TxOutput,
};
use regus_core::validation::{calculate_sequence_locks, is_final_tx};
use regus_mempool::{AncestorScoreKey, CandidateEntry, CandidateIndex};
use tracing::info;

use crate::template::BlockTemplate;

/// Weight held back from the transaction budget for the coinbase.
const COINBASE_WEIGHT_RESERVATION: u64 = 4000;

/// Sigop cost held back from the block budget for the coinbase.
const COINBASE_SIGOPS_RESERVATION: i64 = 400;

/// Budget-violation streak after which a nearly full block stops trying.
const MAX_CONSECUTIVE_FAILURES: u32 = 1000;

/// Fee corresponding to `rate` (satoshis per 1000 virtual bytes) over `weight`
/// weight units. Rounds toward zero but never all the way to zero for a
/// nonzero rate and weight.
pub fn fee_for_weight(rate: Amount, weight: u64) -> Amount {
    let vsize = weight.div_ceil(WITNESS_SCALE_FACTOR);
    let mut fee = (i128::from(rate) * i128::from(vsize) / 1000) as Amount;
    if fee == 0 && vsize != 0 {
        if rate > 0 {
            fee = 1;
        } else if rate < 0 {
            fee = -1;
        }
    }
    fee
}

/// Tunables for block construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerOptions {
    /// Weight ceiling for the whole block. Clamped on construction to
    /// leave room for the coinbase and stay within consensus bounds.
    pub max_block_weight: u64,
    /// Minimum ancestor-package feerate, in satoshis per 1000 virtual bytes.
    /// Selection stops once the best remaining package falls below it.
    pub min_package_feerate: Amount,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            max_block_weight: MAX_BLOCK_WEIGHT,
            min_package_feerate: 1000,
        }
    }
}

/// Package aggregates of an entry whose ancestors were partly included.
///
/// Tracks what remains of the ancestor package once included ancestors'
/// fee, weight, and sigop contributions are subtracted.
#[derive(Clone, Copy)]
struct ModifiedPackage {
    weight: u64,
    fees: Amount,
    sigop_cost: i64,
    sequence: u64,
}

impl ModifiedPackage {
    fn key(&self, txid: Hash256) -> AncestorScoreKey {
        AncestorScoreKey {
            fees: self.fees,
            weight: self.weight,
            sequence: self.sequence,
            txid,
        }
    }
}

/// Working set of re-scored packages, ordered best-first.
#[derive(Default)]
struct ModifiedSet {
    by_score: BTreeSet<AncestorScoreKey>,
    packages: HashMap<Hash256, ModifiedPackage>,
}

impl ModifiedSet {
    fn contains(&self, txid: &Hash256) -> bool {
        self.packages.contains_key(txid)
    }

    fn best(&self) -> Option<AncestorScoreKey> {
        self.by_score.first().copied()
    }

    fn package(&self, txid: &Hash256) -> Option<ModifiedPackage> {
        self.packages.get(txid).copied()
    }

    fn remove(&mut self, txid: &Hash256) {
        if let Some(pkg) = self.packages.remove(txid) {
            self.by_score.remove(&pkg.key(*txid));
        }
    }

    /// Subtract an included ancestor's own contribution from `descendant`'s
    /// remaining package, creating the working entry on first touch.
    fn deduct_included_ancestor(&mut self, descendant: &CandidateEntry, included: &CandidateEntry) {
        let txid = descendant.txid();
        let mut pkg = match self.packages.remove(&txid) {
            Some(pkg) => {
                self.by_score.remove(&pkg.key(txid));
                pkg
            }
            None => ModifiedPackage {
                weight: descendant.ancestor_weight(),
                fees: descendant.ancestor_fees(),
                sigop_cost: descendant.ancestor_sigop_cost(),
                sequence: descendant.sequence(),
            },
        };
        pkg.weight -= included.weight();
        pkg.fees -= included.modified_fee();
        pkg.sigop_cost -= included.sigop_cost();
        self.by_score.insert(pkg.key(txid));
        self.packages.insert(txid, pkg);
    }
}

/// Builds block templates from the candidate index.
///
/// Holds the chain view for coin lookups and lock-time context, the script
/// verifier for self-validation, and the consensus parameters of the
/// network being mined.
pub struct BlockAssembler {
    chain: Arc<dyn ChainView>,
    scripts: Arc<dyn ScriptVerifier>,
    params: ChainParams,
    options: AssemblerOptions,
    clock: Box<dyn Fn() -> u64 + Send + Sync>,
}

impl fmt::Debug for BlockAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockAssembler")
            .field("chain_type", &self.params.chain)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl BlockAssembler {
    /// Create an assembler using the system clock for header timestamps.
    pub fn new(
        chain: Arc<dyn ChainView>,
        scripts: Arc<dyn ScriptVerifier>,
        params: ChainParams,
        options: AssemblerOptions,
    ) -> Self {
        Self::with_clock(chain, scripts, params, options, || {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs()
        })
    }

    /// Create an assembler with a custom clock.
    pub fn with_clock(
        chain: Arc<dyn ChainView>,
        scripts: Arc<dyn ScriptVerifier>,
        params: ChainParams,
        mut options: AssemblerOptions,
        clock: impl Fn() -> u64 + Send + Sync + 'static,
    ) -> Self {
        options.max_block_weight = options.max_block_weight.clamp(
            COINBASE_WEIGHT_RESERVATION,
            MAX_BLOCK_WEIGHT - COINBASE_WEIGHT_RESERVATION,
        );
        Self {
            chain,
            scripts,
            params,
            options,
            clock: Box::new(clock),
        }
    }

    /// The options in effect, after clamping.
    pub fn options(&self) -> &AssemblerOptions {
        &self.options
    }

    /// Assemble a block template paying collected fees and the height's
    /// subsidy to `payout_script`.
    ///
    /// Callers pass the locked candidate index and hold the guard until the
    /// call returns, so the whole build sees one consistent snapshot. The
    /// assembled block is checked against the full consensus rules; a
    /// failure there surfaces as [`AssemblerError::TemplateInvalid`] naming
    /// the violated rule.
    pub fn create_new_block(
        &self,
        pool: &CandidateIndex,
        payout_script: &[u8],
    ) -> Result<BlockTemplate, AssemblerError> {
        let next_height = self.chain.height() + 1;
        let lock_cutoff = self.chain.median_time_past();

        let included = self.select_packages(pool, next_height, lock_cutoff);

        let total_fees: Amount = included.iter().map(|entry| entry.fee()).sum();
        let coinbase = self.build_coinbase(next_height, total_fees, payout_script);

        let mut transactions = Vec::with_capacity(included.len() + 1);
        let mut tx_fees = Vec::with_capacity(included.len() + 1);
        let mut tx_sigop_costs = Vec::with_capacity(included.len() + 1);
        tx_fees.push(0);
        tx_sigop_costs.push(transaction_sigop_cost(&coinbase));
        transactions.push(coinbase);
        for entry in &included {
            tx_fees.push(entry.fee());
            tx_sigop_costs.push(entry.sigop_cost());
            transactions.push(entry.tx().as_ref().clone());
        }

        let txids = transactions
            .iter()
            .map(Transaction::txid)
            .collect::<Result<Vec<_>, _>>()?;
        let header = BlockHeader {
            version: 1,
            prev_hash: self.chain.tip_hash(),
            merkle_root: merkle_root(&txids),
            timestamp: (self.clock)().max(lock_cutoff + 1),
            difficulty_target: u64::MAX,
            nonce: 0,
        };
        let block = Block {
            header,
            transactions,
        };

        let context = BlockContext {
            height: next_height,
            median_time_past: lock_cutoff,
        };
        let summary = check_block(
            &block,
            &context,
            &self.params,
            self.chain.as_ref(),
            self.scripts.as_ref(),
        )?;

        info!(
            height = next_height,
            txs = block.transactions.len(),
            weight = summary.total_weight,
            fees = summary.total_fees,
            "assembled block template"
        );

        Ok(BlockTemplate {
            block,
            tx_fees,
            tx_sigop_costs,
            total_fees: summary.total_fees,
            total_weight: summary.total_weight,
        })
    }

    /// Pick entries package by package, best ancestor feerate first.
    ///
    /// Entries whose ancestors enter the block are re-scored through a
    /// working set of modified packages, so a child left behind by its
    /// parent's inclusion competes with its remaining package only.
    /// Returns the picks in inclusion order, parents before children.
    fn select_packages<'p>(
        &self,
        pool: &'p CandidateIndex,
        next_height: u64,
        lock_cutoff: u64,
    ) -> Vec<&'p CandidateEntry> {
        let mut base = pool.ordered_by_ancestor_score().into_iter().peekable();
        let mut modified = ModifiedSet::default();
        let mut in_block: HashSet<Hash256> = HashSet::new();
        let mut failed: HashSet<Hash256> = HashSet::new();
        let mut included: Vec<&CandidateEntry> = Vec::new();

        let mut block_weight = COINBASE_WEIGHT_RESERVATION;
        let mut block_sigops = COINBASE_SIGOPS_RESERVATION;
        let mut consecutive_failures = 0u32;

        loop {
            // Entries already placed, already failed, or tracked in the
            // modified set are stale in the base ordering.
            while let Some(entry) = base.peek() {
                let txid = entry.txid();
                if in_block.contains(&txid) || failed.contains(&txid) || modified.contains(&txid) {
                    base.next();
                } else {
                    break;
                }
            }

            // Choose between the base ordering's head and the best
            // re-scored package.
            let base_key = base.peek().map(|entry| entry.ancestor_score_key());
            let using_modified = match (base_key, modified.best()) {
                (None, None) => break,
                (None, Some(_)) => true,
                (Some(_), None) => false,
                (Some(base_key), Some(modified_key)) => modified_key < base_key,
            };

            let (entry, package_weight, package_fees, package_sigops) = if using_modified {
                let Some(key) = modified.best() else { break };
                let Some(pkg) = modified.package(&key.txid) else { break };
                let Some(entry) = pool.get(&key.txid) else { break };
                (entry, pkg.weight, pkg.fees, pkg.sigop_cost)
            } else {
                let Some(entry) = base.next() else { break };
                (
                    entry,
                    entry.ancestor_weight(),
                    entry.ancestor_fees(),
                    entry.ancestor_sigop_cost(),
                )
            };
            let txid = entry.txid();

            // Everything after this point scores lower still.
            if package_fees < fee_for_weight(self.options.min_package_feerate, package_weight) {
                break;
            }

            if !self.package_fits(block_weight, block_sigops, package_weight, package_sigops) {
                if using_modified {
                    modified.remove(&txid);
                    failed.insert(txid);
                }
                consecutive_failures += 1;
                if consecutive_failures > MAX_CONSECUTIVE_FAILURES
                    && block_weight > self.options.max_block_weight - COINBASE_WEIGHT_RESERVATION
                {
                    break;
                }
                continue;
            }

            let mut package: Vec<&CandidateEntry> = pool
                .calculate_ancestors(&txid)
                .into_iter()
                .filter(|ancestor| !in_block.contains(ancestor))
                .filter_map(|ancestor| pool.get(&ancestor))
                .collect();
            package.push(entry);

            if !package
                .iter()
                .all(|member| self.entry_is_final(pool, member, next_height, lock_cutoff))
            {
                if using_modified {
                    modified.remove(&txid);
                    failed.insert(txid);
                }
                continue;
            }

            // Parents carry strictly fewer ancestors than their children.
            package.sort_by_key(|member| (member.ancestor_count(), member.txid()));

            for member in &package {
                block_weight += member.weight();
                block_sigops += member.sigop_cost();
                in_block.insert(member.txid());
                included.push(member);
                modified.remove(&member.txid());
            }
            consecutive_failures = 0;

            for member in &package {
                for descendant in pool.calculate_descendants(&member.txid()) {
                    if in_block.contains(&descendant) {
                        continue;
                    }
                    let Some(descendant_entry) = pool.get(&descendant) else {
                        continue;
                    };
                    modified.deduct_included_ancestor(descendant_entry, member);
                }
            }
        }

        included
    }

    fn package_fits(
        &self,
        block_weight: u64,
        block_sigops: i64,
        package_weight: u64,
        package_sigops: i64,
    ) -> bool {
        if block_weight + package_weight > self.options.max_block_weight {
            return false;
        }
        if block_sigops + package_sigops > MAX_BLOCK_SIGOPS_COST {
            return false;
        }
        true
    }

    /// Both lock families must clear at the target height and time cutoff.
    fn entry_is_final(
        &self,
        pool: &CandidateIndex,
        entry: &CandidateEntry,
        next_height: u64,
        lock_cutoff: u64,
    ) -> bool {
        let tx = entry.tx();
        if !is_final_tx(tx, next_height, lock_cutoff) {
            return false;
        }
        let prev_heights: Vec<u64> = tx
            .inputs
            .iter()
            .map(|input| {
                if pool.contains(&input.previous_output.txid) {
                    next_height
                } else if let Some(utxo) = self.chain.get_utxo(&input.previous_output) {
                    utxo.block_height
                } else {
                    // Unresolvable coin; self-validation owns the verdict.
                    0
                }
            })
            .collect();
        let locks = calculate_sequence_locks(tx, &prev_heights, |height| {
            self.chain.median_time_past_at(height)
        });
        locks.satisfied_at(next_height, lock_cutoff)
    }

    fn build_coinbase(&self, height: u64, fees: Amount, payout_script: &[u8]) -> Transaction {
        let mut script_sig = Vec::new();
        append_push(&mut script_sig, &height.to_le_bytes());
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint::null(),
                script_sig,
                sequence: TxInput::SEQUENCE_FINAL,
            }],
            outputs: vec![TxOutput {
                value: block_subsidy(height, &self.params) + fees,
                script_pubkey: payout_script.to_vec(),
            }],
            lock_time: 0,
        }
    }
}

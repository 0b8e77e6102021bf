//! # regus-miner
//! Block template construction for the Regus node: greedy ancestor-package
//! selection over the mempool's candidate index, coinbase construction, and
//! full self-validation of the assembled block.
//!
//! The [`BlockAssembler`] reads a locked [`CandidateIndex`] snapshot and the
//! shared chain view; proof-of-work over the returned [`BlockTemplate`] is
//! the caller's concern.
//!
//! [`CandidateIndex`]: regus_mempool::CandidateIndex

pub mod assembler;
pub mod template;

pub use assembler::{fee_for_weight, AssemblerOptions, BlockAssembler};
pub use template::BlockTemplate;

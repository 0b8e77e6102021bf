//! # regus-core
//! Foundation types, chain parameters, and validation helpers for the
//! Regus transaction-admission and block-construction pipeline.

pub mod amount;
pub mod block_check;
pub mod chain;
pub mod error;
pub mod merkle;
pub mod params;
pub mod script;
pub mod traits;
pub mod types;
pub mod validation;

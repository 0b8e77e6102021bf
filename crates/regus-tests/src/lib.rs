//! Adversarial and integration test suite for the Regus transaction pipeline.
//!
//! This crate contains integration tests that drive the admission pool,
//! orphan cache, and block assembler together, from an attacker's
//! perspective where applicable. Scenarios live under `tests/`; the
//! library target only carries shared fixtures.

pub mod helpers;

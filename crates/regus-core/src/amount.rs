//! Monetary amounts in satoshis (1 REG = 10^8 satoshis).

/// Amount in satoshis. Signed, so fee deltas and prioritisation adjustments
/// can go below zero without wrapping.
pub type Amount = i64;

/// The amount of satoshis in one REG.
pub const COIN: Amount = 100_000_000;

/// One hundredth of a REG.
pub const CENT: Amount = 1_000_000;

/// No amount larger than this (in satoshis) is valid.
///
/// Not the circulating supply, which is lower; a sanity bound used by
/// consensus-critical validation.
pub const MAX_MONEY: Amount = 4_500_000_000 * COIN;

/// Check that an amount is within the valid monetary range.
///
/// # Examples
/// ```
/// use regus_core::amount::{money_range, MAX_MONEY};
///
/// assert!(money_range(0));
/// assert!(money_range(MAX_MONEY));
/// assert!(!money_range(-1));
/// assert!(!money_range(MAX_MONEY + 1));
/// ```
pub fn money_range(value: Amount) -> bool {
    (0..=MAX_MONEY).contains(&value)
}

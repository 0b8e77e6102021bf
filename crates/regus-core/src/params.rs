//! Chain parameters and consensus limits.

use crate::amount::{Amount, COIN};

/// Maximum block weight (serialized size scaled by [`WITNESS_SCALE_FACTOR`]).
pub const MAX_BLOCK_WEIGHT: u64 = 4_000_000;

/// Maximum total signature-operation cost per block.
pub const MAX_BLOCK_SIGOPS_COST: i64 = 80_000;

/// Confirmations required before a coinbase output can be spent.
pub const COINBASE_MATURITY: u64 = 100;

/// Lock-time values below this are block heights; at or above, Unix timestamps.
pub const LOCKTIME_THRESHOLD: u64 = 500_000_000;

/// Number of trailing blocks used to compute median-time-past.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Factor converting serialized bytes to weight units.
pub const WITNESS_SCALE_FACTOR: u64 = 4;

/// Network type: Main, Testnet, or Regtest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChainType {
    /// Production network.
    #[default]
    Main,
    /// Public test network.
    Testnet,
    /// Local regression-test network with minimal difficulty.
    Regtest,
}

/// Immutable per-network consensus parameters.
///
/// Constructed once via [`ChainParams::main`], [`ChainParams::testnet`], or
/// [`ChainParams::regtest`] and threaded explicitly to the code that needs it.
///
/// # Examples
///
/// ```
/// use regus_core::params::{ChainParams, ChainType};
/// let params = ChainParams::main();
/// assert_eq!(params.chain, ChainType::Main);
/// assert_eq!(params.target_spacing_secs, 60);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
    /// Which network these parameters describe.
    pub chain: ChainType,
    /// Blocks between subsidy halvings.
    pub subsidy_halving_interval: u64,
    /// Target seconds between blocks.
    pub target_spacing_secs: u64,
    /// Subsidy of the genesis block, halved every interval.
    pub initial_subsidy: Amount,
    /// Default TCP port for P2P connections.
    pub default_p2p_port: u16,
    /// Four-byte message-start sequence prefixing P2P messages.
    pub message_start: [u8; 4],
    /// Bech32 human-readable part for addresses.
    pub bech32_hrp: &'static str,
}

impl ChainParams {
    /// Parameters for the production network.
    pub fn main() -> Self {
        Self {
            chain: ChainType::Main,
            subsidy_halving_interval: 1_051_000,
            target_spacing_secs: 60,
            initial_subsidy: 2000 * COIN,
            default_p2p_port: 4610,
            message_start: [0xef, 0xbf, 0xc9, 0xeb],
            bech32_hrp: "rgs",
        }
    }

    /// Parameters for the public test network.
    pub fn testnet() -> Self {
        Self {
            chain: ChainType::Testnet,
            subsidy_halving_interval: 1_051_000,
            target_spacing_secs: 60,
            initial_subsidy: 2000 * COIN,
            default_p2p_port: 14_610,
            message_start: [0xb4, 0xfa, 0xdf, 0xa4],
            bech32_hrp: "rgt",
        }
    }

    /// Parameters for local regression testing. Fast halvings for supply tests.
    pub fn regtest() -> Self {
        Self {
            chain: ChainType::Regtest,
            subsidy_halving_interval: 1_051,
            target_spacing_secs: 60,
            initial_subsidy: 2000 * COIN,
            default_p2p_port: 24_610,
            message_start: [0xa5, 0xdc, 0xc8, 0xfc],
            bech32_hrp: "rgrt",
        }
    }
}

/// Block subsidy at the given height: the initial subsidy halved once per
/// completed halving interval. Zero after 64 halvings (the shift would
/// overflow and the value is zero by then anyway).
///
/// # Examples
///
/// ```
/// use regus_core::amount::COIN;
/// use regus_core::params::{block_subsidy, ChainParams};
/// let params = ChainParams::main();
/// assert_eq!(block_subsidy(0, &params), 2000 * COIN);
/// assert_eq!(block_subsidy(1_051_000, &params), 1000 * COIN);
/// ```
pub fn block_subsidy(height: u64, params: &ChainParams) -> Amount {
    let halvings = height / params.subsidy_halving_interval;
    if halvings >= 64 {
        return 0;
    }
    params.initial_subsidy >> halvings
}

//! Persisted state types for the pool: requests, cycle machine, LP positions,
//! and the pool aggregate.

pub mod cycle;
pub mod lp;
pub mod pool_account;
pub mod requests;

pub use cycle::{CycleState, Phase, SettlementRecord};
pub use lp::LpPosition;
pub use pool_account::PoolAccount;
pub use requests::{RequestKind, SettlementOutcome, UserRequest};

use crate::math::WAD;

/// Maximum number of registered LPs. Bounds the roster iterations performed
/// at cycle close and on liquidation redistribution.
pub const MAX_LPS: u32 = 32;

/// Cycle index assigned to the first Active phase. Index 0 never settles, so
/// a default (zeroed) request slot can never look claimable.
pub const FIRST_CYCLE: u64 = 1;

// Protocol defaults. Timing is in milliseconds of block time; rates are
// WAD-scaled per-cycle values.
pub const DEFAULT_CYCLE_DURATION_MS: u64 = 7_000;
pub const DEFAULT_REBALANCE_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_MARKET_OPEN_WINDOW_MS: u64 = 1_000;
pub const DEFAULT_FEE_BPS: u32 = 0;

/// 6% per cycle at zero utilization
pub const DEFAULT_BASE_RATE: u64 = 60_000_000_000_000_000;
/// 12% per cycle at the first utilization tier
pub const DEFAULT_TIER1_RATE: u64 = 120_000_000_000_000_000;
/// 24% per cycle at the second utilization tier
pub const DEFAULT_TIER2_RATE: u64 = 240_000_000_000_000_000;
/// 36% per cycle cap above the maximum utilization tier
pub const DEFAULT_MAX_RATE: u64 = 360_000_000_000_000_000;

/// First utilization tier, 50%
pub const DEFAULT_TIER1_UTILIZATION: u64 = 500_000_000_000_000_000;
/// Second utilization tier, 75%
pub const DEFAULT_TIER2_UTILIZATION: u64 = 750_000_000_000_000_000;
/// Maximum utilization tier, 95%
pub const DEFAULT_MAX_UTILIZATION: u64 = 950_000_000_000_000_000;

/// Deposits must post at least 20% of principal as collateral
pub const DEFAULT_DEPOSIT_COLLATERAL_BPS: u32 = 2_000;
/// LPs must hold 150% of their share of exposure notional
pub const DEFAULT_LP_MARGIN_BPS: u32 = 15_000;
/// Liquidation callers receive 5% of seized collateral
pub const DEFAULT_LIQUIDATION_BONUS_BPS: u32 = 500;
/// Health below 1.0 is liquidatable
pub const DEFAULT_LIQUIDATION_THRESHOLD: u64 = WAD;
/// Minimum LP contribution, one whole reserve token
pub const DEFAULT_MIN_LP_COLLATERAL: u64 = WAD;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tier_defaults_are_ordered() {
        assert!(DEFAULT_TIER1_UTILIZATION < DEFAULT_TIER2_UTILIZATION);
        assert!(DEFAULT_TIER2_UTILIZATION < DEFAULT_MAX_UTILIZATION);
        assert!(DEFAULT_BASE_RATE < DEFAULT_TIER1_RATE);
        assert!(DEFAULT_TIER2_RATE < DEFAULT_MAX_RATE);
    }
}

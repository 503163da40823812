//! Interest-rate strategy and collateral parameters.
//!
//! The per-cycle rate is a three-tier linear curve over pool utilization:
//! it rises slowly from `base_rate` up to the first tier, more steeply up to
//! the second, steepest up to the maximum tier, and is clamped at `max_rate`
//! above that. The strategy also carries the collateral parameters the pool
//! enforces on deposits and LPs.

use crate::error::Error;
use crate::math::{bps_of, Rate, TryAdd, TryDiv, TryMul, TrySub, BPS_DIVISOR, WAD};
use crate::state::{
    DEFAULT_BASE_RATE, DEFAULT_DEPOSIT_COLLATERAL_BPS, DEFAULT_LIQUIDATION_BONUS_BPS,
    DEFAULT_LIQUIDATION_THRESHOLD, DEFAULT_LP_MARGIN_BPS, DEFAULT_MAX_RATE,
    DEFAULT_MAX_UTILIZATION, DEFAULT_MIN_LP_COLLATERAL, DEFAULT_TIER1_RATE,
    DEFAULT_TIER1_UTILIZATION, DEFAULT_TIER2_RATE, DEFAULT_TIER2_UTILIZATION,
};
use odra::casper_types::U256;
use odra::prelude::*;

/// Rate curve and collateral parameters. Rates and utilization tiers are
/// WAD-scaled; `*_bps` fields are basis points.
#[odra::odra_type]
pub struct RateStrategy {
    pub base_rate: U256,
    pub tier1_rate: U256,
    pub tier2_rate: U256,
    pub max_rate: U256,
    pub tier1_utilization: U256,
    pub tier2_utilization: U256,
    pub max_utilization: U256,
    pub deposit_collateral_bps: u32,
    pub lp_margin_bps: u32,
    pub liquidation_threshold: U256,
    pub liquidation_bonus_bps: u32,
    pub min_lp_collateral: U256,
}

impl RateStrategy {
    /// Strategy with the protocol default parameters.
    pub fn standard() -> Self {
        Self {
            base_rate: U256::from(DEFAULT_BASE_RATE),
            tier1_rate: U256::from(DEFAULT_TIER1_RATE),
            tier2_rate: U256::from(DEFAULT_TIER2_RATE),
            max_rate: U256::from(DEFAULT_MAX_RATE),
            tier1_utilization: U256::from(DEFAULT_TIER1_UTILIZATION),
            tier2_utilization: U256::from(DEFAULT_TIER2_UTILIZATION),
            max_utilization: U256::from(DEFAULT_MAX_UTILIZATION),
            deposit_collateral_bps: DEFAULT_DEPOSIT_COLLATERAL_BPS,
            lp_margin_bps: DEFAULT_LP_MARGIN_BPS,
            liquidation_threshold: U256::from(DEFAULT_LIQUIDATION_THRESHOLD),
            liquidation_bonus_bps: DEFAULT_LIQUIDATION_BONUS_BPS,
            min_lp_collateral: U256::from(DEFAULT_MIN_LP_COLLATERAL),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.tier1_utilization.is_zero()
            || self.tier1_utilization >= self.tier2_utilization
            || self.tier2_utilization >= self.max_utilization
        {
            return Err(Error::InvalidConfig);
        }
        if self.base_rate > self.tier1_rate
            || self.tier1_rate > self.tier2_rate
            || self.tier2_rate > self.max_rate
        {
            return Err(Error::InvalidConfig);
        }
        if self.deposit_collateral_bps == 0
            || self.deposit_collateral_bps > BPS_DIVISOR as u32
            || self.liquidation_bonus_bps > BPS_DIVISOR as u32
        {
            return Err(Error::InvalidConfig);
        }
        // LPs must be required to at least fully back their notional share
        if (self.lp_margin_bps as u64) < BPS_DIVISOR {
            return Err(Error::InvalidConfig);
        }
        if self.liquidation_threshold.is_zero() || self.liquidation_threshold > U256::from(WAD) {
            return Err(Error::InvalidConfig);
        }
        if self.min_lp_collateral.is_zero() {
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }

    /// Per-cycle rate at the given WAD utilization.
    pub fn rate_at(&self, utilization: U256) -> Result<U256, Error> {
        if utilization >= self.max_utilization {
            return Ok(self.max_rate);
        }
        if utilization >= self.tier2_utilization {
            return segment(
                utilization,
                self.tier2_utilization,
                self.max_utilization,
                self.tier2_rate,
                self.max_rate,
            );
        }
        if utilization >= self.tier1_utilization {
            return segment(
                utilization,
                self.tier1_utilization,
                self.tier2_utilization,
                self.tier1_rate,
                self.tier2_rate,
            );
        }
        segment(
            utilization,
            U256::zero(),
            self.tier1_utilization,
            self.base_rate,
            self.tier1_rate,
        )
    }

    /// Minimum collateral a deposit of `amount` must post.
    pub fn deposit_collateral_required(&self, amount: U256) -> Result<U256, Error> {
        bps_of(amount, self.deposit_collateral_bps)
    }
}

/// Linear interpolation of the rate between two curve knots.
fn segment(u: U256, u0: U256, u1: U256, r0: U256, r1: U256) -> Result<U256, Error> {
    let run = Rate(u1).try_sub(Rate(u0))?;
    let progress = Rate(u).try_sub(Rate(u0))?.try_div(run)?;
    let rise = Rate(r1).try_sub(Rate(r0))?;
    Ok(Rate(r0).try_add(rise.try_mul(progress)?)?.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn curve_hits_the_knots() {
        let s = RateStrategy::standard();
        assert_eq!(s.rate_at(U256::zero()).unwrap(), s.base_rate);
        assert_eq!(s.rate_at(s.tier1_utilization).unwrap(), s.tier1_rate);
        assert_eq!(s.rate_at(s.tier2_utilization).unwrap(), s.tier2_rate);
        assert_eq!(s.rate_at(s.max_utilization).unwrap(), s.max_rate);
        assert_eq!(s.rate_at(U256::from(2u64) * U256::from(WAD)).unwrap(), s.max_rate);
    }

    #[test]
    fn curve_interpolates_between_knots() {
        let s = RateStrategy::standard();
        // halfway to the first tier: halfway between base and tier1 rates
        let u = s.tier1_utilization / U256::from(2u64);
        let expected = (s.base_rate + s.tier1_rate) / U256::from(2u64);
        assert_eq!(s.rate_at(u).unwrap(), expected);
    }

    #[test]
    fn deposit_collateral_is_bps_of_amount() {
        let s = RateStrategy::standard();
        let amount = U256::from(1_000u64) * U256::from(WAD);
        assert_eq!(
            s.deposit_collateral_required(amount).unwrap(),
            U256::from(200u64) * U256::from(WAD)
        );
    }

    #[test]
    fn validate_rejects_bad_params() {
        let mut s = RateStrategy::standard();
        s.tier1_utilization = s.tier2_utilization;
        assert_eq!(s.validate(), Err(Error::InvalidConfig));

        let mut s = RateStrategy::standard();
        s.base_rate = s.max_rate + U256::one();
        assert_eq!(s.validate(), Err(Error::InvalidConfig));

        let mut s = RateStrategy::standard();
        s.deposit_collateral_bps = 10_001;
        assert_eq!(s.validate(), Err(Error::InvalidConfig));

        let mut s = RateStrategy::standard();
        s.lp_margin_bps = 9_999;
        assert_eq!(s.validate(), Err(Error::InvalidConfig));

        let mut s = RateStrategy::standard();
        s.min_lp_collateral = U256::zero();
        assert_eq!(s.validate(), Err(Error::InvalidConfig));

        assert_eq!(RateStrategy::standard().validate(), Ok(()));
    }

    proptest! {
        #[test]
        fn rate_is_monotone_and_bounded(
            a in 0u64..=2_000_000_000_000_000_000,
            b in 0u64..=2_000_000_000_000_000_000,
        ) {
            let s = RateStrategy::standard();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let r_lo = s.rate_at(U256::from(lo)).unwrap();
            let r_hi = s.rate_at(U256::from(hi)).unwrap();
            prop_assert!(r_lo <= r_hi);
            prop_assert!(r_lo >= s.base_rate);
            prop_assert!(r_hi <= s.max_rate);
        }
    }
}

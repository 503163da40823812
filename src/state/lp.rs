//! Liquidity provider positions and health math.
//!
//! An LP underwrites the pool pro rata to its shares. The collateral it must
//! hold is the margin requirement applied to its slice of the outstanding
//! exposure notional; health is posted collateral over that requirement.

use crate::error::Error;
use crate::math::{bps_of, Decimal, TryDiv, TryMul, TrySub};
use odra::casper_types::U256;
use odra::prelude::*;

#[odra::odra_type]
#[derive(Default)]
pub struct LpPosition {
    pub collateral: U256,
    pub shares: U256,
    /// Interest index the collateral was last settled against.
    pub last_index: U256,
    pub last_health_cycle: u64,
}

impl LpPosition {
    pub fn new(collateral: U256, shares: U256, index: U256, cycle: u64) -> Self {
        Self {
            collateral,
            shares,
            last_index: index,
            last_health_cycle: cycle,
        }
    }

    /// Roll earned interest into collateral by catching the position up to
    /// the current index. Returns the amount credited.
    pub fn settle_interest(&mut self, current_index: U256) -> Result<U256, Error> {
        if self.last_index.is_zero() {
            return Err(Error::InvalidState);
        }
        if current_index == self.last_index {
            return Ok(U256::zero());
        }
        let grown = self
            .collateral
            .try_mul(current_index)?
            .try_div(self.last_index)?;
        let credited = grown.try_sub(self.collateral)?;
        self.collateral = grown;
        self.last_index = current_index;
        Ok(credited)
    }

    /// Collateral this position must hold against `notional` of outstanding
    /// exposure, at `margin_bps` of its pro-rata slice.
    pub fn required_collateral(
        &self,
        total_shares: U256,
        notional: U256,
        margin_bps: u32,
    ) -> Result<U256, Error> {
        if self.shares.is_zero() || total_shares.is_zero() {
            return Ok(U256::zero());
        }
        let slice = notional.try_mul(self.shares)?.try_div(total_shares)?;
        bps_of(slice, margin_bps)
    }

    /// WAD health ratio against a precomputed requirement. Unencumbered
    /// positions are infinitely healthy.
    pub fn health(&self, required: U256) -> Result<U256, Error> {
        if required.is_zero() {
            return Ok(U256::MAX);
        }
        Ok(Decimal(self.collateral).try_div(Decimal(required))?.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WAD;

    fn wad(n: u64) -> U256 {
        U256::from(n) * U256::from(WAD)
    }

    #[test]
    fn interest_catches_up_to_the_index() {
        let mut lp = LpPosition::new(wad(100), wad(100), U256::from(WAD), 1);

        // one cycle at 6%
        let index = U256::from(1_060_000_000_000_000_000u64);
        assert_eq!(lp.settle_interest(index), Ok(wad(6)));
        assert_eq!(lp.collateral, wad(106));
        assert_eq!(lp.last_index, index);

        // settling twice against the same index credits nothing
        assert_eq!(lp.settle_interest(index), Ok(U256::zero()));

        // a second 6% cycle compounds on the grown collateral
        let index2 = index * index / U256::from(WAD);
        let credited = lp.settle_interest(index2).unwrap();
        assert_eq!(credited, U256::from(6_360_000_000_000_000_000u64));
        assert_eq!(lp.collateral, U256::from(112_360_000_000_000_000_000u128));
    }

    #[test]
    fn unsettled_position_is_rejected() {
        let mut lp = LpPosition::default();
        assert_eq!(
            lp.settle_interest(U256::from(WAD)),
            Err(Error::InvalidState)
        );
    }

    #[test]
    fn requirement_is_margin_on_the_pro_rata_slice() {
        let lp = LpPosition::new(wad(15_000), wad(50), U256::from(WAD), 1);

        // half the shares of 20000 notional at 150% margin
        let required = lp
            .required_collateral(wad(100), wad(20_000), 15_000)
            .unwrap();
        assert_eq!(required, wad(15_000));

        assert_eq!(lp.health(required), Ok(U256::from(WAD)));

        let mut thin = lp.clone();
        thin.collateral = wad(14_999);
        assert!(thin.health(required).unwrap() < U256::from(WAD));
    }

    #[test]
    fn zero_exposure_means_infinite_health() {
        let lp = LpPosition::new(wad(10), U256::zero(), U256::from(WAD), 1);
        let required = lp.required_collateral(wad(0), wad(0), 15_000).unwrap();
        assert_eq!(required, U256::zero());
        assert_eq!(lp.health(required), Ok(U256::MAX));
    }
}

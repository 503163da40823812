//! Per-user settlement requests.
//!
//! Each account owns a single request slot. A submitted intent waits in the
//! slot until the cycle it was submitted in settles, then the slot can be
//! claimed against that cycle's settlement record. The slot math is pure so
//! the pool entrypoints stay thin.

use crate::error::Error;
use crate::math::{bps_of, Decimal, Rate, TryDiv, TryMul, TrySub};
use crate::state::cycle::SettlementRecord;
use odra::casper_types::U256;
use odra::prelude::*;

#[odra::odra_type]
#[derive(Default)]
pub enum RequestKind {
    #[default]
    None = 0,
    Deposit = 1,
    Redeem = 2,
    Liquidate = 3,
}

/// A pending intent. `principal` is reserve units for deposits and exposure
/// units for redemptions and liquidations. `posted_collateral` is only used
/// by deposits.
#[odra::odra_type]
#[derive(Default)]
pub struct UserRequest {
    pub kind: RequestKind,
    pub principal: U256,
    pub posted_collateral: U256,
    pub cycle_submitted: u64,
}

/// What a claimed request resolves to. Amounts the pool pays out, mints, or
/// keeps, all derived from the settlement record of the request's cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SettlementOutcome {
    pub minted: U256,
    pub payout: U256,
    pub collateral_charge: U256,
    pub collateral_refund: U256,
    pub fee: U256,
}

impl UserRequest {
    pub fn deposit(principal: U256, posted_collateral: U256, cycle: u64) -> Self {
        Self {
            kind: RequestKind::Deposit,
            principal,
            posted_collateral,
            cycle_submitted: cycle,
        }
    }

    pub fn redemption(principal: U256, cycle: u64) -> Self {
        Self {
            kind: RequestKind::Redeem,
            principal,
            posted_collateral: U256::zero(),
            cycle_submitted: cycle,
        }
    }

    pub fn liquidation(principal: U256, cycle: u64) -> Self {
        Self {
            kind: RequestKind::Liquidate,
            principal,
            posted_collateral: U256::zero(),
            cycle_submitted: cycle,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.kind != RequestKind::None
    }

    /// Resolve the request against the settlement record of its cycle.
    ///
    /// Deposits convert net-of-fee principal into exposure at the settled
    /// price and are charged interest on the full principal, clamped to the
    /// collateral actually posted. Redemptions convert exposure to reserve
    /// at the settled price and pay the fee out of proceeds. Liquidations
    /// are fee-free redemptions.
    pub fn settle(&self, record: &SettlementRecord) -> Result<SettlementOutcome, Error> {
        match self.kind {
            RequestKind::None => Err(Error::NothingToClaim),
            RequestKind::Deposit => {
                let fee = bps_of(self.principal, record.fee_bps)?;
                let net = self.principal.try_sub(fee)?;
                let minted = Decimal(net).try_div(Decimal(record.price))?.0;
                let charge = Decimal(self.principal)
                    .try_mul(Rate(record.rate))?
                    .0
                    .min(self.posted_collateral);
                let refund = self.posted_collateral.try_sub(charge)?;
                Ok(SettlementOutcome {
                    minted,
                    payout: U256::zero(),
                    collateral_charge: charge,
                    collateral_refund: refund,
                    fee,
                })
            }
            RequestKind::Redeem => {
                let gross = Decimal(self.principal).try_mul(Decimal(record.price))?.0;
                let fee = bps_of(gross, record.fee_bps)?;
                Ok(SettlementOutcome {
                    minted: U256::zero(),
                    payout: gross.try_sub(fee)?,
                    collateral_charge: U256::zero(),
                    collateral_refund: U256::zero(),
                    fee,
                })
            }
            RequestKind::Liquidate => {
                let gross = Decimal(self.principal).try_mul(Decimal(record.price))?.0;
                Ok(SettlementOutcome {
                    minted: U256::zero(),
                    payout: gross,
                    collateral_charge: U256::zero(),
                    collateral_refund: U256::zero(),
                    fee: U256::zero(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WAD;
    use proptest::prelude::*;

    fn wad(n: u64) -> U256 {
        U256::from(n) * U256::from(WAD)
    }

    fn record(price: U256, fee_bps: u32, rate: U256) -> SettlementRecord {
        SettlementRecord { price, fee_bps, rate }
    }

    #[test]
    fn deposit_settles_at_cycle_price() {
        // 6% cycle rate on 1000 principal with 20% posted collateral
        let req = UserRequest::deposit(wad(1_000), wad(200), 1);
        let rec = record(wad(2), 0, U256::from(60_000_000_000_000_000u64));
        let out = req.settle(&rec).unwrap();

        assert_eq!(out.minted, wad(500));
        assert_eq!(out.collateral_charge, wad(60));
        assert_eq!(out.collateral_refund, wad(140));
        assert_eq!(out.fee, U256::zero());
        assert_eq!(out.payout, U256::zero());
    }

    #[test]
    fn deposit_charge_is_clamped_to_posted_collateral() {
        // 36% of principal exceeds the 20% posted, so the charge caps out
        let req = UserRequest::deposit(wad(1_000), wad(200), 1);
        let rec = record(wad(2), 0, U256::from(360_000_000_000_000_000u64));
        let out = req.settle(&rec).unwrap();

        assert_eq!(out.collateral_charge, wad(200));
        assert_eq!(out.collateral_refund, U256::zero());
    }

    #[test]
    fn deposit_fee_comes_off_before_conversion() {
        let req = UserRequest::deposit(wad(1_000), wad(200), 1);
        let rec = record(wad(2), 50, U256::zero());
        let out = req.settle(&rec).unwrap();

        assert_eq!(out.fee, wad(5));
        // (1000 - 5) / 2
        assert_eq!(out.minted, U256::from(4_975u64) * U256::from(WAD) / U256::from(10u64));
    }

    #[test]
    fn redemption_pays_fee_from_proceeds() {
        let req = UserRequest::redemption(wad(10), 3);
        let rec = record(wad(3), 100, U256::zero());
        let out = req.settle(&rec).unwrap();

        assert_eq!(out.fee, U256::from(3u64) * U256::from(WAD) / U256::from(10u64));
        assert_eq!(out.payout, wad(30) - out.fee);
        assert_eq!(out.minted, U256::zero());
    }

    #[test]
    fn liquidation_is_fee_free() {
        let req = UserRequest::liquidation(wad(10), 3);
        let rec = record(wad(3), 100, U256::zero());
        let out = req.settle(&rec).unwrap();

        assert_eq!(out.payout, wad(30));
        assert_eq!(out.fee, U256::zero());
    }

    #[test]
    fn empty_slot_has_nothing_to_claim() {
        let req = UserRequest::default();
        let rec = record(wad(2), 0, U256::zero());
        assert_eq!(req.settle(&rec), Err(Error::NothingToClaim));
    }

    proptest! {
        #[test]
        fn deposit_conserves_value(
            principal_units in 1u64..=1_000_000_000,
            price_units in 1u64..=1_000_000,
            fee_bps in 0u32..=1_000,
            rate_raw in 0u64..=360_000_000_000_000_000,
            collateral_bps in 1u32..=10_000,
        ) {
            let principal = wad(principal_units);
            let posted = bps_of(principal, collateral_bps).unwrap();
            let price = wad(price_units);
            let req = UserRequest::deposit(principal, posted, 1);
            let rec = record(price, fee_bps, U256::from(rate_raw));
            let out = req.settle(&rec).unwrap();

            let wad_one = U256::from(WAD);
            let net = principal - out.fee;
            // the mint floors, so converting back never exceeds net and the
            // dust is below one exposure unit's worth of reserve
            let reconstructed = out.minted * price / wad_one;
            prop_assert!(reconstructed <= net);
            prop_assert!(net - reconstructed <= price / wad_one + U256::one());
            // charge never exceeds the posted collateral and the refund is
            // the exact remainder
            prop_assert!(out.collateral_charge <= posted);
            prop_assert_eq!(out.collateral_charge + out.collateral_refund, posted);
        }

        #[test]
        fn redemption_splits_gross_exactly(
            exposure_raw in 1u64..=u64::MAX,
            price_units in 1u64..=1_000_000,
            fee_bps in 0u32..=1_000,
        ) {
            let principal = U256::from(exposure_raw);
            let price = wad(price_units);
            let req = UserRequest::redemption(principal, 1);
            let rec = record(price, fee_bps, U256::zero());
            let out = req.settle(&rec).unwrap();

            let gross = principal * price / U256::from(WAD);
            prop_assert_eq!(out.payout + out.fee, gross);
            prop_assert!(out.fee <= gross);
        }
    }
}

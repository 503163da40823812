//! Aggregate pool balance sheet.
//!
//! `reserve_balance` is the productive reserve: exposure backing, LP
//! collateral and accumulated surplus together. Escrowed request principal,
//! protocol fees and collateral orphaned by a roster wipe-out sit outside it
//! and are tracked separately so utilization and solvency read only against
//! funds that actually back exposure.

use crate::error::Error;
use crate::math::{bps_of, Decimal, Rate, TryAdd, TryDiv, TryMul, WAD};
use odra::casper_types::U256;
use odra::prelude::*;

#[odra::odra_type]
#[derive(Default)]
pub struct PoolAccount {
    pub reserve_balance: U256,
    pub total_exposure_supply: U256,
    pub total_shares: U256,
    pub interest_index: U256,
    pub accrued_fees: U256,
    pub unallocated_collateral: U256,
    pub solvency_deficit: bool,
    pub emergency: bool,
}

impl PoolAccount {
    pub fn new() -> Self {
        Self {
            interest_index: U256::from(WAD),
            ..Default::default()
        }
    }

    /// Reserve value of the outstanding exposure at `price`.
    pub fn exposure_notional(&self, price: U256) -> Result<U256, Error> {
        Ok(Decimal(self.total_exposure_supply).try_mul(Decimal(price))?.0)
    }

    /// WAD share of the reserve consumed by exposure backing. Saturates at
    /// the maximum when exposure exists against an empty reserve.
    pub fn utilization(&self, price: U256) -> Result<U256, Error> {
        if self.total_exposure_supply.is_zero() {
            return Ok(U256::zero());
        }
        if self.reserve_balance.is_zero() {
            return Ok(U256::MAX);
        }
        let backing = Decimal(self.exposure_notional(price)?);
        Ok(backing.try_div(Decimal(self.reserve_balance))?.0)
    }

    /// Compound the interest index by `rate` for one cycle.
    pub fn accrue(&mut self, rate: U256) -> Result<U256, Error> {
        let factor = Rate::one().try_add(Rate(rate))?;
        self.interest_index = Decimal(self.interest_index).try_mul(factor)?.0;
        Ok(self.interest_index)
    }

    /// Reserve left over once the exposure backing is carved out. This is
    /// what LP shares are worth in aggregate.
    pub fn lp_nav(&self, price: U256) -> Result<U256, Error> {
        let backing = self.exposure_notional(price)?;
        if backing >= self.reserve_balance {
            return Ok(U256::zero());
        }
        Ok(self.reserve_balance - backing)
    }

    /// Shares minted for a collateral contribution at `price`. First entry
    /// and entry into a wiped-out pool both price shares one to one.
    pub fn shares_for_contribution(&self, contribution: U256, price: U256) -> Result<U256, Error> {
        if self.total_shares.is_zero() {
            return Ok(contribution);
        }
        let nav = self.lp_nav(price)?;
        if nav.is_zero() {
            return Ok(contribution);
        }
        contribution.try_mul(self.total_shares)?.try_div(nav)
    }

    pub fn credit_reserve(&mut self, amount: U256) -> Result<(), Error> {
        self.reserve_balance = self.reserve_balance.try_add(amount)?;
        Ok(())
    }

    pub fn debit_reserve(&mut self, amount: U256) -> Result<(), Error> {
        if self.reserve_balance < amount {
            return Err(Error::InsufficientBalance);
        }
        self.reserve_balance -= amount;
        Ok(())
    }

    /// True when the reserve no longer covers the margin requirement on the
    /// whole book.
    pub fn is_undercollateralized(&self, price: U256, margin_bps: u32) -> Result<bool, Error> {
        let required = bps_of(self.exposure_notional(price)?, margin_bps)?;
        Ok(self.reserve_balance < required)
    }
}

//! WAD fixed-point math over U256.

pub mod decimal;
pub mod rate;

pub use decimal::Decimal;
pub use rate::Rate;

use crate::error::Error;
use odra::casper_types::U256;

/// Scale of precision
pub const SCALE: usize = 18;
/// Identity
pub const WAD: u64 = 1_000_000_000_000_000_000;
/// Half of identity
pub const HALF_WAD: u64 = 500_000_000_000_000_000;
/// Scale for percentages
pub const PERCENT_SCALER: u64 = 10_000_000_000_000_000;
/// Scale for basis points
pub const BPS_SCALER: u64 = 100_000_000_000_000;
/// Basis points per whole
pub const BPS_DIVISOR: u64 = 10_000;

/// Try to add, return an error on overflow
pub trait TryAdd: Sized {
    fn try_add(self, rhs: Self) -> Result<Self, Error>;
}

/// Try to subtract, return an error on underflow
pub trait TrySub: Sized {
    fn try_sub(self, rhs: Self) -> Result<Self, Error>;
}

/// Try to divide, return an error on overflow or divide by zero
pub trait TryDiv<Rhs = Self>: Sized {
    fn try_div(self, rhs: Rhs) -> Result<Self, Error>;
}

/// Try to multiply, return an error on overflow
pub trait TryMul<Rhs = Self>: Sized {
    fn try_mul(self, rhs: Rhs) -> Result<Self, Error>;
}

impl TryAdd for U256 {
    fn try_add(self, rhs: Self) -> Result<Self, Error> {
        self.checked_add(rhs).ok_or(Error::MathOverflow)
    }
}

impl TrySub for U256 {
    fn try_sub(self, rhs: Self) -> Result<Self, Error> {
        self.checked_sub(rhs).ok_or(Error::MathOverflow)
    }
}

impl TryMul for U256 {
    fn try_mul(self, rhs: Self) -> Result<Self, Error> {
        self.checked_mul(rhs).ok_or(Error::MathOverflow)
    }
}

impl TryDiv for U256 {
    fn try_div(self, rhs: Self) -> Result<Self, Error> {
        self.checked_div(rhs).ok_or(Error::MathOverflow)
    }
}

/// Scale an amount by a basis-point fraction, rounding down.
pub fn bps_of(amount: U256, bps: u32) -> Result<U256, Error> {
    amount
        .checked_mul(U256::from(bps))
        .ok_or(Error::MathOverflow)?
        .checked_div(U256::from(BPS_DIVISOR))
        .ok_or(Error::MathOverflow)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn u256_checked_ops() {
        let max = U256::MAX;
        assert_eq!(max.try_add(U256::one()), Err(Error::MathOverflow));
        assert_eq!(U256::zero().try_sub(U256::one()), Err(Error::MathOverflow));
        assert_eq!(U256::from(6u64).try_mul(U256::from(7u64)), Ok(U256::from(42u64)));
        assert_eq!(U256::one().try_div(U256::zero()), Err(Error::MathOverflow));
    }

    #[test]
    fn bps_of_rounds_down() {
        let amount = U256::from(10_001u64);
        assert_eq!(bps_of(amount, 5_000).unwrap(), U256::from(5_000u64));
        assert_eq!(bps_of(amount, 0).unwrap(), U256::zero());
        assert_eq!(bps_of(amount, 10_000).unwrap(), amount);
    }
}

//! Large decimal values, precise to 18 digits.

#![allow(clippy::assign_op_pattern)]
#![allow(clippy::manual_range_contains)]

use {
    crate::{
        error::Error,
        math::{HALF_WAD, PERCENT_SCALER, SCALE, WAD},
    },
    alloc::{string::ToString, vec},
    core::fmt,
    odra::casper_types::U256,
};

/// WAD-scaled decimal. The raw value is the quantity times 1e18.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Eq, Ord)]
pub struct Decimal(pub U256);

impl Decimal {
    /// One
    pub fn one() -> Self {
        Self(U256::from(WAD))
    }

    /// Zero
    pub fn zero() -> Self {
        Self(U256::zero())
    }

    fn wad() -> U256 {
        U256::from(WAD)
    }

    fn half_wad() -> U256 {
        U256::from(HALF_WAD)
    }

    /// Create scaled decimal from percent value
    pub fn from_percent(percent: u8) -> Self {
        Self(U256::from(percent as u64 * PERCENT_SCALER))
    }

    /// Return raw scaled value as u128 (assumes value fits into u128)
    #[allow(clippy::wrong_self_convention)]
    pub fn to_scaled_val(&self) -> u128 {
        self.0.as_u128()
    }

    /// Create decimal from scaled value
    pub fn from_scaled_val(scaled_val: u128) -> Self {
        Self(U256::from(scaled_val))
    }

    /// Round scaled decimal to u64
    pub fn try_round_u64(&self) -> Result<u64, Error> {
        let rounded_val = Self::half_wad()
            .checked_add(self.0)
            .ok_or(Error::MathOverflow)?
            .checked_div(Self::wad())
            .ok_or(Error::MathOverflow)?;

        if rounded_val > U256::from(u64::MAX) {
            return Err(Error::MathOverflow);
        }
        Ok(rounded_val.as_u64())
    }

    /// Ceiling scaled decimal to u64
    pub fn try_ceil_u64(&self) -> Result<u64, Error> {
        let ceil_val = Self::wad()
            .checked_sub(U256::from(1u64))
            .ok_or(Error::MathOverflow)?
            .checked_add(self.0)
            .ok_or(Error::MathOverflow)?
            .checked_div(Self::wad())
            .ok_or(Error::MathOverflow)?;

        if ceil_val > U256::from(u64::MAX) {
            return Err(Error::MathOverflow);
        }
        Ok(ceil_val.as_u64())
    }

    /// Floor scaled decimal to u64
    pub fn try_floor_u64(&self) -> Result<u64, Error> {
        let floor_val = self.0.checked_div(Self::wad()).ok_or(Error::MathOverflow)?;

        if floor_val > U256::from(u64::MAX) {
            return Err(Error::MathOverflow);
        }
        Ok(floor_val.as_u64())
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scaled_val = self.0.to_string();
        if scaled_val.len() <= SCALE {
            scaled_val.insert_str(0, &vec!["0"; SCALE - scaled_val.len()].join(""));
            scaled_val.insert_str(0, "0.");
        } else {
            scaled_val.insert(scaled_val.len() - SCALE, '.');
        }
        f.write_str(&scaled_val)
    }
}

impl From<u64> for Decimal {
    fn from(val: u64) -> Self {
        Self(Self::wad().checked_mul(U256::from(val)).unwrap_or(U256::zero()))
    }
}

impl From<u128> for Decimal {
    fn from(val: u128) -> Self {
        Self(Self::wad().checked_mul(U256::from(val)).unwrap_or(U256::zero()))
    }
}

impl From<crate::math::Rate> for Decimal {
    fn from(rate: crate::math::Rate) -> Self {
        Self(rate.0)
    }
}

impl crate::math::TryAdd for Decimal {
    fn try_add(self, rhs: Self) -> Result<Self, Error> {
        Ok(Self(self.0.checked_add(rhs.0).ok_or(Error::MathOverflow)?))
    }
}

impl crate::math::TrySub for Decimal {
    fn try_sub(self, rhs: Self) -> Result<Self, Error> {
        Ok(Self(self.0.checked_sub(rhs.0).ok_or(Error::MathOverflow)?))
    }
}

impl crate::math::TryDiv<u64> for Decimal {
    fn try_div(self, rhs: u64) -> Result<Self, Error> {
        Ok(Self(self.0.checked_div(U256::from(rhs)).ok_or(Error::MathOverflow)?))
    }
}

impl crate::math::TryDiv<Decimal> for Decimal {
    fn try_div(self, rhs: Self) -> Result<Self, Error> {
        Ok(Self(
            self.0
                .checked_mul(Self::wad())
                .ok_or(Error::MathOverflow)?
                .checked_div(rhs.0)
                .ok_or(Error::MathOverflow)?,
        ))
    }
}

impl crate::math::TryDiv<crate::math::Rate> for Decimal {
    fn try_div(self, rhs: crate::math::Rate) -> Result<Self, Error> {
        self.try_div(Decimal::from(rhs))
    }
}

impl crate::math::TryMul<u64> for Decimal {
    fn try_mul(self, rhs: u64) -> Result<Self, Error> {
        Ok(Self(self.0.checked_mul(U256::from(rhs)).ok_or(Error::MathOverflow)?))
    }
}

impl crate::math::TryMul<Decimal> for Decimal {
    fn try_mul(self, rhs: Self) -> Result<Self, Error> {
        Ok(Self(
            self.0
                .checked_mul(rhs.0)
                .ok_or(Error::MathOverflow)?
                .checked_div(Self::wad())
                .ok_or(Error::MathOverflow)?,
        ))
    }
}

impl crate::math::TryMul<crate::math::Rate> for Decimal {
    fn try_mul(self, rhs: crate::math::Rate) -> Result<Self, Error> {
        self.try_mul(Decimal::from(rhs))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::{TryDiv, TryMul, TrySub};

    #[test]
    fn test_scaler() {
        assert_eq!(U256::from(WAD), Decimal::wad());
    }

    #[test]
    fn wad_mul_div_round_trip() {
        let amount = Decimal(U256::from(1_000u64) * U256::from(WAD));
        let price = Decimal(U256::from(42_069u64) * U256::from(WAD));
        let minted = amount.try_div(price).unwrap();
        let back = minted.try_mul(price).unwrap();
        // flooring loses at most one raw unit per operation
        assert!(back <= amount);
        assert!(amount.try_sub(back).unwrap().0 <= U256::from(42_069u64));
    }

    #[test]
    fn rounding_helpers() {
        let d = Decimal(U256::from(WAD) + U256::from(HALF_WAD));
        assert_eq!(d.try_floor_u64().unwrap(), 1);
        assert_eq!(d.try_round_u64().unwrap(), 2);
        assert_eq!(d.try_ceil_u64().unwrap(), 2);
    }

    #[test]
    fn display_pads_fraction() {
        let d = Decimal::from_percent(5);
        assert_eq!(d.to_string(), "0.050000000000000000");
    }
}

//! Rate type for interest and ratio calculations.

use {
    crate::{
        error::Error,
        math::{BPS_SCALER, PERCENT_SCALER, SCALE, WAD},
    },
    alloc::{format, string::ToString},
    core::fmt,
    odra::casper_types::U256,
};

/// WAD-scaled rate. `Rate::one()` is 100%.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Eq, Ord)]
pub struct Rate(pub U256);

impl Rate {
    /// One (100%)
    pub fn one() -> Self {
        Self(Self::wad())
    }

    /// Zero (0%)
    pub fn zero() -> Self {
        Self(U256::zero())
    }

    fn wad() -> U256 {
        U256::from(WAD)
    }

    /// Create rate from percent value (0-100)
    pub fn from_percent(percent: u8) -> Self {
        Self(U256::from(percent as u64 * PERCENT_SCALER))
    }

    /// Create rate from basis points (0-10000)
    pub fn from_bps(bps: u32) -> Self {
        Self(U256::from(bps as u64 * BPS_SCALER))
    }

    /// Return raw scaled value as u128
    pub fn to_scaled_val(&self) -> u128 {
        self.0.as_u128()
    }

    /// Create rate from scaled value
    pub fn from_scaled_val(scaled_val: u128) -> Self {
        Self(U256::from(scaled_val))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scaled_val = self.0.to_string();
        if scaled_val.len() <= SCALE {
            let padding = "0".repeat(SCALE - scaled_val.len());
            scaled_val = format!("0.{}{}", padding, scaled_val);
        } else {
            scaled_val.insert(scaled_val.len() - SCALE, '.');
        }
        f.write_str(&scaled_val)
    }
}

impl From<crate::math::Decimal> for Rate {
    fn from(decimal: crate::math::Decimal) -> Self {
        Self(decimal.0)
    }
}

impl crate::math::TryAdd for Rate {
    fn try_add(self, rhs: Self) -> Result<Self, Error> {
        Ok(Self(self.0.checked_add(rhs.0).ok_or(Error::MathOverflow)?))
    }
}

impl crate::math::TrySub for Rate {
    fn try_sub(self, rhs: Self) -> Result<Self, Error> {
        Ok(Self(self.0.checked_sub(rhs.0).ok_or(Error::MathOverflow)?))
    }
}

impl crate::math::TryDiv<u64> for Rate {
    fn try_div(self, rhs: u64) -> Result<Self, Error> {
        Ok(Self(self.0.checked_div(U256::from(rhs)).ok_or(Error::MathOverflow)?))
    }
}

impl crate::math::TryDiv<Rate> for Rate {
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

impl crate::math::TryMul<u64> for Rate {
    fn try_mul(self, rhs: u64) -> Result<Self, Error> {
        Ok(Self(self.0.checked_mul(U256::from(rhs)).ok_or(Error::MathOverflow)?))
    }
}

impl crate::math::TryMul<Rate> for Rate {
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::TryMul;

    #[test]
    fn test_rate_percent() {
        let rate = Rate::from_percent(5);
        assert_eq!(rate.to_scaled_val(), 50_000_000_000_000_000);
    }

    #[test]
    fn test_rate_bps() {
        assert_eq!(Rate::from_bps(500), Rate::from_percent(5));
        assert_eq!(Rate::from_bps(10_000), Rate::one());
    }

    #[test]
    fn test_rate_mul_shrinks_fractions() {
        let rate = Rate::from_percent(10);
        let squared = rate.try_mul(rate).unwrap();
        assert_eq!(squared, Rate::from_percent(1));
    }
}

use odra::prelude::*;
use core::fmt;

/// Crate-wide error enum. Codes are stable and grouped by concern.
#[odra::odra_error]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    // 1: phase machine and timing
    InvalidPhase = 1,
    InvalidState = 2,
    CycleNotElapsed = 3,
    StalePrice = 4,
    AlreadyRebalanced = 5,

    // 6: funding preconditions
    InsufficientCollateral = 6,
    InsufficientBalance = 7,
    InsufficientAllowance = 8,
    BelowMinimumCollateral = 9,
    ZeroAmount = 10,

    // 11: claims and liquidation
    NothingToClaim = 11,
    HealthyPosition = 12,
    NotRegistered = 13,
    LpRosterFull = 14,

    // 15: oracle round matching
    UnexpectedRequestID = 15,
    InvalidSource = 16,

    // 17: access control and pool status
    Unauthorized = 17,
    PoolPaused = 18,
    PoolEmergency = 19,
    ReentrantCall = 20,

    // 21: configuration and arithmetic
    InvalidConfig = 21,
    MathOverflow = 22,
}

impl Error {
    pub fn message(&self) -> &str {
        match self {
            Error::InvalidPhase => "Operation called outside its required phase",
            Error::InvalidState => "Operation conflicts with current pool state",
            Error::CycleNotElapsed => "Minimum cycle duration has not elapsed",
            Error::StalePrice => "Oracle sample is missing or older than the rebalance window",
            Error::AlreadyRebalanced => "LP already rebalanced in this cycle",
            Error::InsufficientCollateral => "Posted collateral is below the required minimum",
            Error::InsufficientBalance => "Token balance is below the requested amount",
            Error::InsufficientAllowance => "Token allowance is below the requested amount",
            Error::BelowMinimumCollateral => "Withdrawal would leave collateral below the required ratio",
            Error::ZeroAmount => "Amount must be non-zero",
            Error::NothingToClaim => "No settled request exists for this account",
            Error::HealthyPosition => "Position is at or above the liquidation threshold",
            Error::NotRegistered => "No LP position exists for this address",
            Error::LpRosterFull => "LP roster has reached its maximum size",
            Error::UnexpectedRequestID => "Oracle response does not match the outstanding request",
            Error::InvalidSource => "Caller is not an approved oracle publisher",
            Error::Unauthorized => "Caller is not authorized for this operation",
            Error::PoolPaused => "Pool is paused",
            Error::PoolEmergency => "Pool requires emergency re-collateralization",
            Error::ReentrantCall => "Reentrant call detected",
            Error::InvalidConfig => "Configuration value is invalid",
            Error::MathOverflow => "Math operation overflow",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

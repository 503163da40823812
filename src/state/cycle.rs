//! Cycle phase machine and per-cycle settlement records.

use crate::error::Error;
use crate::math::TryAdd;
use crate::state::FIRST_CYCLE;
use odra::casper_types::U256;
use odra::prelude::*;

#[odra::odra_type]
#[derive(Default)]
pub enum Phase {
    #[default]
    Active = 0,
    OffchainRebalance = 1,
    OnchainRebalance = 2,
}

/// Frozen terms of a settled cycle. Requests submitted during that cycle
/// claim against exactly these values, whenever the claim happens.
#[odra::odra_type]
pub struct SettlementRecord {
    pub price: U256,
    pub fee_bps: u32,
    pub rate: U256,
}

/// Mutable cycle bookkeeping. `rebalance_price` doubles as the price the
/// last settlement executed at, so it is the pool's current price whenever
/// the phase is Active. `previous_price` holds the price the book was
/// marked at before the fix, which settlement needs for the re-mark.
#[odra::odra_type]
#[derive(Default)]
pub struct CycleState {
    pub phase: Phase,
    pub cycle_index: u64,
    pub active_since: u64,
    pub offchain_since: u64,
    pub rebalance_price: U256,
    pub previous_price: U256,
    pub pending_round_id: u64,
    pub total_deposit_requests: U256,
    pub total_redemption_requests: U256,
    pub total_liquidation_requests: U256,
    pub rebalanced_lps: u32,
}

impl CycleState {
    pub fn new(initial_price: U256, now: u64) -> Self {
        Self {
            phase: Phase::Active,
            cycle_index: FIRST_CYCLE,
            active_since: now,
            offchain_since: 0,
            rebalance_price: initial_price,
            previous_price: initial_price,
            pending_round_id: 0,
            total_deposit_requests: U256::zero(),
            total_redemption_requests: U256::zero(),
            total_liquidation_requests: U256::zero(),
            rebalanced_lps: 0,
        }
    }

    pub fn require_phase(&self, phase: Phase) -> Result<(), Error> {
        if self.phase != phase {
            return Err(Error::InvalidPhase);
        }
        Ok(())
    }

    pub fn current_price(&self) -> U256 {
        self.rebalance_price
    }

    pub fn elapsed(&self, now: u64, cycle_duration: u64) -> bool {
        now >= self.active_since + cycle_duration
    }

    pub fn timed_out(&self, now: u64, rebalance_timeout: u64) -> bool {
        self.offchain_since > 0 && now >= self.offchain_since + rebalance_timeout
    }

    /// Active -> OffchainRebalance once the cycle duration has passed.
    pub fn begin_offchain(
        &mut self,
        now: u64,
        cycle_duration: u64,
        round_id: u64,
    ) -> Result<(), Error> {
        self.require_phase(Phase::Active)?;
        if !self.elapsed(now, cycle_duration) {
            return Err(Error::CycleNotElapsed);
        }
        self.phase = Phase::OffchainRebalance;
        self.offchain_since = now;
        self.pending_round_id = round_id;
        Ok(())
    }

    /// Point the waiting window at a replacement oracle round. Used when a
    /// requested round was never answered.
    pub fn reissue_round(&mut self, now: u64, round_id: u64) -> Result<(), Error> {
        self.require_phase(Phase::OffchainRebalance)?;
        self.offchain_since = now;
        self.pending_round_id = round_id;
        Ok(())
    }

    /// OffchainRebalance -> OnchainRebalance with the delivered price. The
    /// old mark is kept so settlement can move the book to the new one.
    pub fn begin_onchain(&mut self, price: U256) -> Result<(), Error> {
        self.require_phase(Phase::OffchainRebalance)?;
        self.phase = Phase::OnchainRebalance;
        self.previous_price = self.rebalance_price;
        self.rebalance_price = price;
        self.pending_round_id = 0;
        self.rebalanced_lps = 0;
        Ok(())
    }

    pub fn note_deposit(&mut self, amount: U256) -> Result<(), Error> {
        self.require_phase(Phase::Active)?;
        self.total_deposit_requests = self.total_deposit_requests.try_add(amount)?;
        Ok(())
    }

    pub fn note_redemption(&mut self, amount: U256) -> Result<(), Error> {
        self.require_phase(Phase::Active)?;
        self.total_redemption_requests = self.total_redemption_requests.try_add(amount)?;
        Ok(())
    }

    /// Forced redemptions settle fee-free, so they are aggregated apart
    /// from ordinary redemption flow.
    pub fn note_liquidation(&mut self, amount: U256) -> Result<(), Error> {
        self.require_phase(Phase::Active)?;
        self.total_liquidation_requests = self.total_liquidation_requests.try_add(amount)?;
        Ok(())
    }

    pub fn has_pending_flow(&self) -> bool {
        !self.total_deposit_requests.is_zero()
            || !self.total_redemption_requests.is_zero()
            || !self.total_liquidation_requests.is_zero()
    }

    pub fn mark_rebalanced(&mut self) -> Result<u32, Error> {
        self.require_phase(Phase::OnchainRebalance)?;
        self.rebalanced_lps += 1;
        Ok(self.rebalanced_lps)
    }

    /// Open the next cycle. The caller settles and records the closing
    /// cycle first; this only rolls the bookkeeping forward.
    pub fn advance(&mut self, now: u64) {
        self.phase = Phase::Active;
        self.cycle_index += 1;
        self.active_since = now;
        self.offchain_since = 0;
        self.pending_round_id = 0;
        self.total_deposit_requests = U256::zero();
        self.total_redemption_requests = U256::zero();
        self.total_liquidation_requests = U256::zero();
        self.rebalanced_lps = 0;
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
    fn phase_walk_through_one_cycle() {
        let mut cycle = CycleState::new(wad(100), 10);
        assert_eq!(cycle.cycle_index, FIRST_CYCLE);
        assert_eq!(cycle.current_price(), wad(100));

        cycle.note_deposit(wad(50)).unwrap();
        cycle.note_redemption(wad(3)).unwrap();
        cycle.note_liquidation(wad(2)).unwrap();
        assert_eq!(cycle.total_deposit_requests, wad(50));
        assert_eq!(cycle.total_redemption_requests, wad(3));
        assert_eq!(cycle.total_liquidation_requests, wad(2));
        assert!(cycle.has_pending_flow());

        // too early to leave the active phase
        assert_eq!(
            cycle.begin_offchain(7_009, 7_000, 9),
            Err(Error::CycleNotElapsed)
        );
        cycle.begin_offchain(7_010, 7_000, 9).unwrap();
        assert_eq!(cycle.phase, Phase::OffchainRebalance);
        assert_eq!(cycle.pending_round_id, 9);
        assert_eq!(cycle.offchain_since, 7_010);

        // submissions are refused mid-rebalance
        assert_eq!(cycle.note_deposit(wad(1)), Err(Error::InvalidPhase));

        cycle.begin_onchain(wad(101)).unwrap();
        assert_eq!(cycle.phase, Phase::OnchainRebalance);
        assert_eq!(cycle.current_price(), wad(101));
        assert_eq!(cycle.previous_price, wad(100));
        assert_eq!(cycle.pending_round_id, 0);

        assert_eq!(cycle.mark_rebalanced(), Ok(1));
        assert_eq!(cycle.mark_rebalanced(), Ok(2));

        cycle.advance(7_500);
        assert_eq!(cycle.phase, Phase::Active);
        assert_eq!(cycle.cycle_index, FIRST_CYCLE + 1);
        assert_eq!(cycle.active_since, 7_500);
        assert!(!cycle.has_pending_flow());
        assert_eq!(cycle.rebalanced_lps, 0);
        // the settled price carries into the new cycle
        assert_eq!(cycle.current_price(), wad(101));
    }

    #[test]
    fn transitions_enforce_their_source_phase() {
        let mut cycle = CycleState::new(wad(1), 0);
        assert_eq!(cycle.begin_onchain(wad(2)), Err(Error::InvalidPhase));
        assert_eq!(cycle.mark_rebalanced(), Err(Error::InvalidPhase));
        assert_eq!(cycle.reissue_round(8_000, 2), Err(Error::InvalidPhase));

        cycle.begin_offchain(7_000, 7_000, 1).unwrap();
        assert_eq!(
            cycle.begin_offchain(14_000, 7_000, 2),
            Err(Error::InvalidPhase)
        );

        // a reissue keeps the phase but restarts the waiting window
        cycle.reissue_round(8_000, 2).unwrap();
        assert_eq!(cycle.phase, Phase::OffchainRebalance);
        assert_eq!(cycle.offchain_since, 8_000);
        assert_eq!(cycle.pending_round_id, 2);
    }

    #[test]
    fn timeout_counts_from_rebalance_start() {
        let mut cycle = CycleState::new(wad(1), 0);
        assert!(!cycle.timed_out(10_000, 1_000));

        cycle.begin_offchain(7_000, 7_000, 1).unwrap();
        assert!(!cycle.timed_out(7_999, 1_000));
        assert!(cycle.timed_out(8_000, 1_000));
    }
}

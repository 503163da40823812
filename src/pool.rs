//! The asset pool: position ledger, cycle manager and LP collateral book in
//! one contract.
//!
//! Users queue deposit and redemption intents during the Active phase. Once
//! the cycle duration has elapsed anyone may crank the pool through its
//! rebalance sequence: an off-chain price round is requested, the delivered
//! candle fixes the settlement price, every registered LP attests the fixed
//! price, and the cycle closes by settling aggregate flow, re-marking LP
//! collateral to the new price and compounding the interest index. Requests
//! then become claimable against the frozen settlement record of their
//! cycle. LPs whose collateral falls under the margin requirement can be
//! liquidated by anyone while the pool is Active.

use crate::error::Error;
use crate::math::{bps_of, Decimal, TryAdd, TryDiv, TryMul, TrySub};
use crate::oracle::PriceFeedContractRef;
use crate::state::{
    CycleState, LpPosition, Phase, PoolAccount, RequestKind, SettlementRecord, UserRequest,
    MAX_LPS, DEFAULT_CYCLE_DURATION_MS, DEFAULT_FEE_BPS, DEFAULT_REBALANCE_TIMEOUT_MS,
};
use crate::strategy::RateStrategy;
use crate::token::SyntheticTokenContractRef;
use odra::casper_types::U256;
use odra::prelude::*;
use odra::ContractRef;

pub mod events {
    use odra::casper_types::U256;
    use odra::prelude::*;

    #[odra::event]
    pub struct DepositRequested {
        pub user: Address,
        pub amount: U256,
        pub collateral: U256,
        pub cycle: u64,
    }

    #[odra::event]
    pub struct RedemptionRequested {
        pub user: Address,
        pub amount: U256,
        pub cycle: u64,
    }

    #[odra::event]
    pub struct LiquidationRequested {
        pub holder: Address,
        pub amount: U256,
        pub cycle: u64,
    }

    #[odra::event]
    pub struct CollateralAdded {
        pub user: Address,
        pub amount: U256,
        pub total_posted: U256,
    }

    #[odra::event]
    pub struct RequestClaimed {
        pub user: Address,
        pub cycle: u64,
        pub minted: U256,
        pub payout: U256,
        pub collateral_refund: U256,
    }

    #[odra::event]
    pub struct LpRegistered {
        pub lp: Address,
        pub collateral: U256,
        pub shares: U256,
    }

    #[odra::event]
    pub struct CollateralWithdrawn {
        pub lp: Address,
        pub amount: U256,
        pub remaining: U256,
    }

    #[odra::event]
    pub struct LpLiquidated {
        pub lp: Address,
        pub seized: U256,
        pub bonus: U256,
        pub liquidator: Address,
    }

    #[odra::event]
    pub struct OffchainRebalanceStarted {
        pub cycle: u64,
        pub round_id: u64,
    }

    #[odra::event]
    pub struct OnchainRebalanceStarted {
        pub cycle: u64,
        pub price: U256,
    }

    #[odra::event]
    pub struct LpRebalanced {
        pub lp: Address,
        pub cycle: u64,
    }

    #[odra::event]
    pub struct CycleSettled {
        pub cycle: u64,
        pub price: U256,
        pub rate: U256,
        pub minted: U256,
        pub redeemed: U256,
    }

    #[odra::event]
    pub struct CycleSkipped {
        pub cycle: u64,
        pub price: U256,
    }

    #[odra::event]
    pub struct EmergencyDeclared {
        pub cycle: u64,
    }

    #[odra::event]
    pub struct EmergencyCleared {
        pub lp: Address,
    }

    #[odra::event]
    pub struct Paused {
        pub by: Address,
    }

    #[odra::event]
    pub struct Unpaused {
        pub by: Address,
    }

    #[odra::event]
    pub struct FeeChanged {
        pub fee_bps: u32,
    }

    #[odra::event]
    pub struct FeesCollected {
        pub to: Address,
        pub amount: U256,
    }

    #[odra::event]
    pub struct OwnershipTransferred {
        pub previous_owner: Address,
        pub new_owner: Address,
    }
}

/// Cycle timing and fee parameters.
#[odra::odra_type]
pub struct PoolConfig {
    pub cycle_duration_ms: u64,
    pub rebalance_timeout_ms: u64,
    pub fee_bps: u32,
}

impl PoolConfig {
    pub fn standard() -> Self {
        Self {
            cycle_duration_ms: DEFAULT_CYCLE_DURATION_MS,
            rebalance_timeout_ms: DEFAULT_REBALANCE_TIMEOUT_MS,
            fee_bps: DEFAULT_FEE_BPS,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.cycle_duration_ms == 0 || self.rebalance_timeout_ms == 0 || self.fee_bps > 10_000 {
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }
}

#[odra::module(events = [
    events::DepositRequested,
    events::RedemptionRequested,
    events::LiquidationRequested,
    events::CollateralAdded,
    events::RequestClaimed,
    events::LpRegistered,
    events::CollateralWithdrawn,
    events::LpLiquidated,
    events::OffchainRebalanceStarted,
    events::OnchainRebalanceStarted,
    events::LpRebalanced,
    events::CycleSettled,
    events::CycleSkipped,
    events::EmergencyDeclared,
    events::EmergencyCleared,
    events::Paused,
    events::Unpaused,
    events::FeeChanged,
    events::FeesCollected,
    events::OwnershipTransferred
])]
pub struct AssetPool {
    reserve_token: Var<Address>,
    exposure_token: Var<Address>,
    price_feed: Var<Address>,
    config: Var<PoolConfig>,
    strategy: Var<RateStrategy>,
    cycle: Var<CycleState>,
    account: Var<PoolAccount>,
    requests: Mapping<Address, UserRequest>,
    settlements: Mapping<u64, SettlementRecord>,
    positions: Mapping<Address, LpPosition>,
    roster: Var<Vec<Address>>,
    lp_last_rebalanced: Mapping<Address, u64>,
    owner: Var<Address>,
    paused: Var<bool>,
    entered: Var<bool>,
}

#[odra::module]
impl AssetPool {
    pub fn init(
        &mut self,
        reserve_token: Address,
        exposure_token: Address,
        price_feed: Address,
        initial_price: U256,
        config: PoolConfig,
        strategy: RateStrategy,
    ) {
        self.unwrap_or_revert(config.validate());
        self.unwrap_or_revert(strategy.validate());
        if initial_price.is_zero() {
            self.env().revert(Error::InvalidConfig);
        }
        self.reserve_token.set(reserve_token);
        self.exposure_token.set(exposure_token);
        self.price_feed.set(price_feed);
        self.config.set(config);
        self.strategy.set(strategy);
        self.cycle
            .set(CycleState::new(initial_price, self.env().get_block_time()));
        self.account.set(PoolAccount::new());
        self.roster.set(Vec::new());
        self.owner.set(self.env().caller());
        self.paused.set(false);
        self.entered.set(false);
    }

    // ------------------------------------------------------------------
    // Position ledger
    // ------------------------------------------------------------------

    /// Queue a deposit of `amount` reserve units backed by `collateral`.
    /// Both legs are pulled into custody; the deposit converts to exposure
    /// when the current cycle settles.
    pub fn submit_deposit(&mut self, amount: U256, collateral: U256) {
        self.enter();
        self.require_not_paused();
        let account = self.load_account();
        if account.emergency {
            self.env().revert(Error::PoolEmergency);
        }
        if amount.is_zero() {
            self.env().revert(Error::ZeroAmount);
        }
        let caller = self.env().caller();
        if self.pending_request(&caller).is_some() {
            self.env().revert(Error::InvalidState);
        }
        let strategy = self.load_strategy();
        let required = self.unwrap_or_revert(strategy.deposit_collateral_required(amount));
        if collateral < required {
            self.env().revert(Error::InsufficientCollateral);
        }

        let mut cycle = self.load_cycle();
        self.unwrap_or_revert(cycle.note_deposit(amount));
        self.requests
            .set(&caller, UserRequest::deposit(amount, collateral, cycle.cycle_index));
        let cycle_index = cycle.cycle_index;
        self.cycle.set(cycle);

        let escrow = self.unwrap_or_revert(amount.try_add(collateral));
        let mut reserve = self.reserve_ref();
        reserve.transfer_from(caller, self.env().self_address(), escrow);

        self.env().emit_event(events::DepositRequested {
            user: caller,
            amount,
            collateral,
            cycle: cycle_index,
        });
        self.exit();
    }

    /// Queue a redemption of `amount` exposure units. The tokens are
    /// escrowed now and burned when the cycle settles.
    pub fn submit_redemption(&mut self, amount: U256) {
        self.enter();
        self.require_not_paused();
        let account = self.load_account();
        if account.emergency {
            self.env().revert(Error::PoolEmergency);
        }
        if amount.is_zero() {
            self.env().revert(Error::ZeroAmount);
        }
        let caller = self.env().caller();
        if self.pending_request(&caller).is_some() {
            self.env().revert(Error::InvalidState);
        }
        let mut exposure = self.exposure_ref();
        if exposure.balance_of(caller) < amount {
            self.env().revert(Error::InsufficientBalance);
        }

        let mut cycle = self.load_cycle();
        self.unwrap_or_revert(cycle.note_redemption(amount));
        self.requests
            .set(&caller, UserRequest::redemption(amount, cycle.cycle_index));
        let cycle_index = cycle.cycle_index;
        self.cycle.set(cycle);

        exposure.transfer_from(caller, self.env().self_address(), amount);

        self.env().emit_event(events::RedemptionRequested {
            user: caller,
            amount,
            cycle: cycle_index,
        });
        self.exit();
    }

    /// Top up the collateral of a still-unsettled deposit. Permissionless;
    /// the caller funds the top-up.
    pub fn add_collateral(&mut self, user: Address, amount: U256) {
        self.enter();
        self.require_not_paused();
        if amount.is_zero() {
            self.env().revert(Error::ZeroAmount);
        }
        let cycle = self.load_cycle();
        let mut request = match self.pending_request(&user) {
            Some(request) => request,
            None => self.env().revert(Error::InvalidState),
        };
        if request.kind != RequestKind::Deposit || request.cycle_submitted != cycle.cycle_index {
            self.env().revert(Error::InvalidState);
        }
        request.posted_collateral =
            self.unwrap_or_revert(request.posted_collateral.try_add(amount));
        let total_posted = request.posted_collateral;
        self.requests.set(&user, request);

        let mut reserve = self.reserve_ref();
        reserve.transfer_from(self.env().caller(), self.env().self_address(), amount);

        self.env().emit_event(events::CollateralAdded {
            user,
            amount,
            total_posted,
        });
        self.exit();
    }

    /// Resolve the caller's request against the settlement record of its
    /// cycle, paying out reserve and exposure as the record dictates.
    pub fn claim(&mut self) {
        self.enter();
        let caller = self.env().caller();
        let request = match self.pending_request(&caller) {
            Some(request) => request,
            None => self.env().revert(Error::NothingToClaim),
        };
        let record = match self.settlements.get(&request.cycle_submitted) {
            Some(record) => record,
            None => self.env().revert(Error::NothingToClaim),
        };
        let outcome = self.unwrap_or_revert(request.settle(&record));
        self.requests.set(&caller, UserRequest::default());

        // interest realized on the deposit principal enters the reserve,
        // the posted remainder goes back to the user
        if !outcome.collateral_charge.is_zero() {
            let mut account = self.load_account();
            self.unwrap_or_revert(account.credit_reserve(outcome.collateral_charge));
            self.account.set(account);
        }

        if !outcome.minted.is_zero() {
            let mut exposure = self.exposure_ref();
            exposure.transfer(caller, outcome.minted);
        }
        let reserve_out = self.unwrap_or_revert(outcome.payout.try_add(outcome.collateral_refund));
        if !reserve_out.is_zero() {
            let mut reserve = self.reserve_ref();
            reserve.transfer(caller, reserve_out);
        }

        self.env().emit_event(events::RequestClaimed {
            user: caller,
            cycle: request.cycle_submitted,
            minted: outcome.minted,
            payout: outcome.payout,
            collateral_refund: outcome.collateral_refund,
        });
        self.exit();
    }

    /// Force a holder's entire exposure balance into a fee-free redemption.
    /// Only available while the pool is flagged for emergency
    /// re-collateralization.
    pub fn submit_liquidation(&mut self, holder: Address) {
        self.enter();
        let account = self.load_account();
        if !account.emergency {
            self.env().revert(Error::InvalidState);
        }
        if self.pending_request(&holder).is_some() {
            self.env().revert(Error::InvalidState);
        }
        let mut exposure = self.exposure_ref();
        let balance = exposure.balance_of(holder);
        if balance.is_zero() {
            self.env().revert(Error::InsufficientBalance);
        }

        let mut cycle = self.load_cycle();
        self.unwrap_or_revert(cycle.note_liquidation(balance));
        self.requests
            .set(&holder, UserRequest::liquidation(balance, cycle.cycle_index));
        let cycle_index = cycle.cycle_index;
        self.cycle.set(cycle);

        // forced escrow: pull the balance into the pool with mint authority
        exposure.burn(holder, balance);
        exposure.mint(self.env().self_address(), balance);

        self.env().emit_event(events::LiquidationRequested {
            holder,
            amount: balance,
            cycle: cycle_index,
        });
        self.exit();
    }

    // ------------------------------------------------------------------
    // Liquidity providers
    // ------------------------------------------------------------------

    /// Join the LP roster with `collateral` reserve units. Shares are priced
    /// against the pool NAV at the current price.
    pub fn register_lp(&mut self, collateral: U256) {
        self.enter();
        self.require_not_paused();
        let cycle = self.load_cycle();
        self.unwrap_or_revert(cycle.require_phase(Phase::Active));
        let strategy = self.load_strategy();
        if collateral < strategy.min_lp_collateral {
            self.env().revert(Error::InsufficientCollateral);
        }
        let caller = self.env().caller();
        if self.position_of(&caller).is_some() {
            self.env().revert(Error::InvalidState);
        }
        let mut roster = self.roster.get_or_default();
        if roster.len() as u32 >= MAX_LPS {
            self.env().revert(Error::LpRosterFull);
        }

        let mut account = self.load_account();
        let shares =
            self.unwrap_or_revert(account.shares_for_contribution(collateral, cycle.current_price()));
        let position = LpPosition::new(collateral, shares, account.interest_index, cycle.cycle_index);
        account.total_shares = self.unwrap_or_revert(account.total_shares.try_add(shares));
        self.unwrap_or_revert(account.credit_reserve(collateral));
        // fresh underwriting absorbs any collateral orphaned by a wipe-out
        // and ends the emergency
        if !account.unallocated_collateral.is_zero() {
            let orphaned = account.unallocated_collateral;
            account.unallocated_collateral = U256::zero();
            self.unwrap_or_revert(account.credit_reserve(orphaned));
        }
        if account.emergency {
            account.emergency = false;
            self.env().emit_event(events::EmergencyCleared { lp: caller });
        }
        roster.push(caller);
        self.roster.set(roster);
        self.positions.set(&caller, position);
        self.account.set(account);

        let mut reserve = self.reserve_ref();
        reserve.transfer_from(caller, self.env().self_address(), collateral);

        self.env().emit_event(events::LpRegistered {
            lp: caller,
            collateral,
            shares,
        });
        self.exit();
    }

    /// Withdraw collateral down to the margin requirement. Withdrawing the
    /// whole balance exits the roster, which is only possible once the
    /// position no longer backs any exposure.
    pub fn withdraw_collateral(&mut self, amount: U256) {
        self.enter();
        if amount.is_zero() {
            self.env().revert(Error::ZeroAmount);
        }
        let cycle = self.load_cycle();
        self.unwrap_or_revert(cycle.require_phase(Phase::Active));
        let caller = self.env().caller();
        let mut position = match self.position_of(&caller) {
            Some(position) => position,
            None => self.env().revert(Error::NotRegistered),
        };
        let mut account = self.load_account();
        self.unwrap_or_revert(position.settle_interest(account.interest_index));
        if amount > position.collateral {
            self.env().revert(Error::InsufficientCollateral);
        }

        let strategy = self.load_strategy();
        let notional =
            self.unwrap_or_revert(account.exposure_notional(cycle.current_price()));
        let required = self.unwrap_or_revert(position.required_collateral(
            account.total_shares,
            notional,
            strategy.lp_margin_bps,
        ));
        let remaining = self.unwrap_or_revert(position.collateral.try_sub(amount));
        if remaining.is_zero() {
            if !required.is_zero() {
                self.env().revert(Error::BelowMinimumCollateral);
            }
            account.total_shares =
                self.unwrap_or_revert(account.total_shares.try_sub(position.shares));
            self.positions.set(&caller, LpPosition::default());
            self.roster_remove(&caller);
        } else {
            if remaining < required || remaining < strategy.min_lp_collateral {
                self.env().revert(Error::BelowMinimumCollateral);
            }
            position.collateral = remaining;
            self.positions.set(&caller, position);
        }
        self.unwrap_or_revert(account.debit_reserve(amount));
        self.account.set(account);

        let mut reserve = self.reserve_ref();
        reserve.transfer(caller, amount);

        self.env().emit_event(events::CollateralWithdrawn {
            lp: caller,
            amount,
            remaining,
        });
        self.exit();
    }

    /// Seize an unhealthy LP position. Callable by anyone; the caller earns
    /// the liquidation bonus, the rest of the collateral recapitalizes the
    /// surviving LPs.
    pub fn liquidate(&mut self, lp: Address) {
        self.enter();
        let cycle = self.load_cycle();
        self.unwrap_or_revert(cycle.require_phase(Phase::Active));
        let mut position = match self.position_of(&lp) {
            Some(position) => position,
            None => self.env().revert(Error::NotRegistered),
        };
        let mut account = self.load_account();
        self.unwrap_or_revert(position.settle_interest(account.interest_index));

        let strategy = self.load_strategy();
        let price = cycle.current_price();
        let notional = self.unwrap_or_revert(account.exposure_notional(price));
        let required = self.unwrap_or_revert(position.required_collateral(
            account.total_shares,
            notional,
            strategy.lp_margin_bps,
        ));
        let health = self.unwrap_or_revert(position.health(required));
        if health >= strategy.liquidation_threshold {
            self.env().revert(Error::HealthyPosition);
        }

        let caller = self.env().caller();
        let seized = position.collateral;
        let bonus = self.unwrap_or_revert(bps_of(seized, strategy.liquidation_bonus_bps));
        let remainder = self.unwrap_or_revert(seized.try_sub(bonus));
        self.unwrap_or_revert(account.debit_reserve(bonus));
        account.total_shares =
            self.unwrap_or_revert(account.total_shares.try_sub(position.shares));
        self.positions.set(&lp, LpPosition::default());
        self.roster_remove(&lp);

        let survivors = self.roster.get_or_default();
        if account.total_shares.is_zero() || survivors.is_empty() {
            // nobody left to underwrite: park the remainder and flag the
            // pool for emergency re-collateralization
            self.unwrap_or_revert(account.debit_reserve(remainder));
            account.unallocated_collateral =
                self.unwrap_or_revert(account.unallocated_collateral.try_add(remainder));
            if !account.emergency {
                account.emergency = true;
                self.env()
                    .emit_event(events::EmergencyDeclared { cycle: cycle.cycle_index });
            }
        } else if !remainder.is_zero() {
            for survivor in &survivors {
                let mut survivor_position = match self.position_of(survivor) {
                    Some(position) => position,
                    None => continue,
                };
                self.unwrap_or_revert(survivor_position.settle_interest(account.interest_index));
                let slice = self.unwrap_or_revert(
                    remainder
                        .try_mul(survivor_position.shares)
                        .and_then(|value| value.try_div(account.total_shares)),
                );
                survivor_position.collateral =
                    self.unwrap_or_revert(survivor_position.collateral.try_add(slice));
                self.positions.set(survivor, survivor_position);
            }
        }
        self.account.set(account);

        if !bonus.is_zero() {
            let mut reserve = self.reserve_ref();
            reserve.transfer(caller, bonus);
        }

        self.env().emit_event(events::LpLiquidated {
            lp,
            seized,
            bonus,
            liquidator: caller,
        });
        self.exit();
    }

    // ------------------------------------------------------------------
    // Cycle manager
    // ------------------------------------------------------------------

    /// Leave the Active phase and ask the oracle for a settlement round.
    /// While already waiting, a round the oracle never answered can be
    /// replaced once the rebalance timeout has passed, so an unresponsive
    /// oracle cannot strand the pool.
    pub fn initiate_offchain_rebalance(&mut self) {
        self.enter();
        let mut cycle = self.load_cycle();
        let config = self.load_config();
        let now = self.env().get_block_time();
        match cycle.phase {
            Phase::Active => {
                if !cycle.elapsed(now, config.cycle_duration_ms) {
                    self.env().revert(Error::CycleNotElapsed);
                }
            }
            Phase::OffchainRebalance => {
                if !cycle.timed_out(now, config.rebalance_timeout_ms) {
                    self.env().revert(Error::CycleNotElapsed);
                }
            }
            Phase::OnchainRebalance => self.env().revert(Error::InvalidPhase),
        }

        let mut feed = self.feed_ref();
        let round_id = feed.request_round();
        let transition = match cycle.phase {
            Phase::Active => cycle.begin_offchain(now, config.cycle_duration_ms, round_id),
            _ => cycle.reissue_round(now, round_id),
        };
        self.unwrap_or_revert(transition);
        let cycle_index = cycle.cycle_index;
        self.cycle.set(cycle);

        self.env().emit_event(events::OffchainRebalanceStarted {
            cycle: cycle_index,
            round_id,
        });
        self.exit();
    }

    /// Fix the settlement price from the delivered candle. The candle must
    /// answer this pool's round, postdate the rebalance start and have been
    /// observed on an open market.
    pub fn initiate_onchain_rebalance(&mut self) {
        self.enter();
        let mut cycle = self.load_cycle();
        self.unwrap_or_revert(cycle.require_phase(Phase::OffchainRebalance));

        let feed = self.feed_ref();
        if cycle.pending_round_id == 0 || feed.latest_round() != cycle.pending_round_id {
            self.env().revert(Error::StalePrice);
        }
        let sample = match feed.latest_sample() {
            Some(sample) => sample,
            None => self.env().revert(Error::StalePrice),
        };
        if sample.timestamp < cycle.offchain_since {
            self.env().revert(Error::StalePrice);
        }
        if !feed.is_market_open() {
            self.env().revert(Error::StalePrice);
        }

        self.unwrap_or_revert(cycle.begin_onchain(sample.close));
        let cycle_index = cycle.cycle_index;
        let price = cycle.rebalance_price;
        self.cycle.set(cycle);

        self.env().emit_event(events::OnchainRebalanceStarted {
            cycle: cycle_index,
            price,
        });
        self.exit();
    }

    /// Attest the fixed settlement price for a registered LP. Idempotent
    /// per LP per cycle; once every roster member has attested the cycle
    /// settles. After the rebalance timeout anyone may close the cycle
    /// regardless of missing attestations.
    pub fn rebalance_pool(&mut self, lp: Address, expected_price: U256) {
        self.enter();
        let mut cycle = self.load_cycle();
        self.unwrap_or_revert(cycle.require_phase(Phase::OnchainRebalance));
        if expected_price != cycle.rebalance_price {
            self.env().revert(Error::InvalidState);
        }
        let config = self.load_config();
        let now = self.env().get_block_time();
        if cycle.timed_out(now, config.rebalance_timeout_ms) {
            self.settle_cycle(&mut cycle, now);
            self.cycle.set(cycle);
            self.exit();
            return;
        }

        if self.position_of(&lp).is_none() {
            self.env().revert(Error::NotRegistered);
        }
        if self.lp_last_rebalanced.get(&lp) == Some(cycle.cycle_index) {
            self.env().revert(Error::AlreadyRebalanced);
        }
        self.lp_last_rebalanced.set(&lp, cycle.cycle_index);
        let attested = self.unwrap_or_revert(cycle.mark_rebalanced());
        self.env().emit_event(events::LpRebalanced {
            lp,
            cycle: cycle.cycle_index,
        });

        let roster_size = self.roster.get_or_default().len();
        if attested as usize >= roster_size {
            self.settle_cycle(&mut cycle, now);
        }
        self.cycle.set(cycle);
        self.exit();
    }

    /// Roll a quiet cycle straight to the next one at the previous price.
    /// Only possible with no pending flow and no outstanding exposure.
    pub fn start_new_cycle(&mut self) {
        let mut cycle = self.load_cycle();
        self.unwrap_or_revert(cycle.require_phase(Phase::Active));
        let config = self.load_config();
        let now = self.env().get_block_time();
        if !cycle.elapsed(now, config.cycle_duration_ms) {
            self.env().revert(Error::CycleNotElapsed);
        }
        let account = self.load_account();
        if cycle.has_pending_flow() || !account.total_exposure_supply.is_zero() {
            self.env().revert(Error::InvalidState);
        }

        let closed_cycle = cycle.cycle_index;
        let price = cycle.rebalance_price;
        self.settlements.set(
            &closed_cycle,
            SettlementRecord {
                price,
                fee_bps: config.fee_bps,
                rate: U256::zero(),
            },
        );
        cycle.advance(now);
        self.cycle.set(cycle);

        self.env().emit_event(events::CycleSkipped {
            cycle: closed_cycle,
            price,
        });
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub fn pool_account(&self) -> PoolAccount {
        self.load_account()
    }

    pub fn cycle_state(&self) -> CycleState {
        self.load_cycle()
    }

    pub fn pool_config(&self) -> PoolConfig {
        self.load_config()
    }

    pub fn rate_strategy(&self) -> RateStrategy {
        self.load_strategy()
    }

    pub fn current_price(&self) -> U256 {
        self.load_cycle().current_price()
    }

    /// WAD ratio of backed exposure notional to the reserve, at the current
    /// price.
    pub fn utilization(&self) -> U256 {
        let account = self.load_account();
        let price = self.load_cycle().current_price();
        self.unwrap_or_revert(account.utilization(price))
    }

    pub fn user_request(&self, user: Address) -> Option<UserRequest> {
        self.pending_request(&user)
    }

    pub fn lp_position(&self, lp: Address) -> Option<LpPosition> {
        self.position_of(&lp)
    }

    pub fn settlement(&self, cycle: u64) -> Option<SettlementRecord> {
        self.settlements.get(&cycle)
    }

    pub fn lp_roster(&self) -> Vec<Address> {
        self.roster.get_or_default()
    }

    /// WAD collateral ratio of a registered LP at the current price, with
    /// earned interest counted in.
    pub fn check_health(&self, lp: Address) -> U256 {
        let mut position = match self.position_of(&lp) {
            Some(position) => position,
            None => self.env().revert(Error::NotRegistered),
        };
        let account = self.load_account();
        let cycle = self.load_cycle();
        let strategy = self.load_strategy();
        self.unwrap_or_revert(position.settle_interest(account.interest_index));
        let notional =
            self.unwrap_or_revert(account.exposure_notional(cycle.current_price()));
        let required = self.unwrap_or_revert(position.required_collateral(
            account.total_shares,
            notional,
            strategy.lp_margin_bps,
        ));
        self.unwrap_or_revert(position.health(required))
    }

    pub fn owner(&self) -> Address {
        self.owner.get_or_revert_with(Error::InvalidState)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.get_or_default()
    }

    // ------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------

    pub fn pause(&mut self) {
        self.require_owner();
        if self.paused.get_or_default() {
            self.env().revert(Error::InvalidState);
        }
        self.paused.set(true);
        self.env().emit_event(events::Paused {
            by: self.env().caller(),
        });
    }

    pub fn unpause(&mut self) {
        self.require_owner();
        if !self.paused.get_or_default() {
            self.env().revert(Error::InvalidState);
        }
        self.paused.set(false);
        self.env().emit_event(events::Unpaused {
            by: self.env().caller(),
        });
    }

    /// Change the protocol fee for cycles settled from now on. Frozen
    /// settlement records keep the fee they settled with.
    pub fn set_fee_bps(&mut self, fee_bps: u32) {
        self.require_owner();
        let mut config = self.load_config();
        config.fee_bps = fee_bps;
        self.unwrap_or_revert(config.validate());
        self.config.set(config);
        self.env().emit_event(events::FeeChanged { fee_bps });
    }

    /// Sweep the accumulated protocol fees to `to`. Owner only. Fees sit
    /// outside the reserve book and the pending escrows.
    pub fn collect_fees(&mut self, to: Address) {
        self.enter();
        self.require_owner();
        let mut account = self.load_account();
        let amount = account.accrued_fees;
        if amount.is_zero() {
            self.env().revert(Error::ZeroAmount);
        }
        account.accrued_fees = U256::zero();
        self.account.set(account);

        let mut reserve = self.reserve_ref();
        reserve.transfer(to, amount);

        self.env().emit_event(events::FeesCollected { to, amount });
        self.exit();
    }

    pub fn transfer_ownership(&mut self, new_owner: Address) {
        self.require_owner();
        let previous_owner = self.owner.get_or_revert_with(Error::InvalidState);
        self.owner.set(new_owner);
        self.env().emit_event(events::OwnershipTransferred {
            previous_owner,
            new_owner,
        });
    }
}

impl AssetPool {
    /// Close the fixed-price cycle: re-mark LP collateral to the settlement
    /// price, accrue interest at the utilization-driven rate, net the
    /// aggregate flows and freeze the settlement record.
    fn settle_cycle(&mut self, cycle: &mut CycleState, now: u64) {
        let mut account = self.load_account();
        let strategy = self.load_strategy();
        let config = self.load_config();
        let price = cycle.rebalance_price;
        let previous = cycle.previous_price;
        let closed_cycle = cycle.cycle_index;
        let roster = self.roster.get_or_default();

        // move the mark on the book between LP collateral and exposure
        // backing; the reserve total is untouched
        let supply_before = account.total_exposure_supply;
        if !supply_before.is_zero() && price != previous && !account.total_shares.is_zero() {
            if price > previous {
                let delta = self.unwrap_or_revert(price.try_sub(previous));
                let loss = self
                    .unwrap_or_revert(Decimal(supply_before).try_mul(Decimal(delta)))
                    .0;
                let mut unfunded = false;
                for lp in &roster {
                    let mut position = match self.position_of(lp) {
                        Some(position) => position,
                        None => continue,
                    };
                    self.unwrap_or_revert(position.settle_interest(account.interest_index));
                    let slice = self.unwrap_or_revert(
                        loss.try_mul(position.shares)
                            .and_then(|value| value.try_div(account.total_shares)),
                    );
                    if slice > position.collateral {
                        unfunded = true;
                        position.collateral = U256::zero();
                    } else {
                        position.collateral =
                            self.unwrap_or_revert(position.collateral.try_sub(slice));
                    }
                    self.positions.set(lp, position);
                }
                if unfunded && !account.emergency {
                    account.emergency = true;
                    self.env()
                        .emit_event(events::EmergencyDeclared { cycle: closed_cycle });
                }
            } else {
                let delta = self.unwrap_or_revert(previous.try_sub(price));
                let gain = self
                    .unwrap_or_revert(Decimal(supply_before).try_mul(Decimal(delta)))
                    .0;
                for lp in &roster {
                    let mut position = match self.position_of(lp) {
                        Some(position) => position,
                        None => continue,
                    };
                    self.unwrap_or_revert(position.settle_interest(account.interest_index));
                    let slice = self.unwrap_or_revert(
                        gain.try_mul(position.shares)
                            .and_then(|value| value.try_div(account.total_shares)),
                    );
                    position.collateral =
                        self.unwrap_or_revert(position.collateral.try_add(slice));
                    self.positions.set(lp, position);
                }
            }
        }

        // rate for the closing cycle is read off the pre-flow utilization
        let utilization = self.unwrap_or_revert(account.utilization(price));
        let rate = self.unwrap_or_revert(strategy.rate_at(utilization));
        self.unwrap_or_revert(account.accrue(rate));

        // net new deposits into exposure at the settlement price
        let deposits = cycle.total_deposit_requests;
        let mut minted_total = U256::zero();
        if !deposits.is_zero() {
            let fee = self.unwrap_or_revert(bps_of(deposits, config.fee_bps));
            let net = self.unwrap_or_revert(deposits.try_sub(fee));
            minted_total = self
                .unwrap_or_revert(Decimal(net).try_div(Decimal(price)))
                .0;
            self.unwrap_or_revert(account.credit_reserve(net));
            account.accrued_fees = self.unwrap_or_revert(account.accrued_fees.try_add(fee));
            account.total_exposure_supply =
                self.unwrap_or_revert(account.total_exposure_supply.try_add(minted_total));
            if !minted_total.is_zero() {
                let mut exposure = self.exposure_ref();
                exposure.mint(self.env().self_address(), minted_total);
            }
        }

        // burn escrowed redemptions and carve their value out of the
        // reserve; forced exits settle fee-free
        let redemptions = cycle.total_redemption_requests;
        let liquidations = cycle.total_liquidation_requests;
        let burn_total = self.unwrap_or_revert(redemptions.try_add(liquidations));
        if !burn_total.is_zero() {
            let mut exposure = self.exposure_ref();
            exposure.burn(self.env().self_address(), burn_total);
            account.total_exposure_supply =
                self.unwrap_or_revert(account.total_exposure_supply.try_sub(burn_total));
            let gross_redeemed = self
                .unwrap_or_revert(Decimal(redemptions).try_mul(Decimal(price)))
                .0;
            let fee = self.unwrap_or_revert(bps_of(gross_redeemed, config.fee_bps));
            let gross_forced = self
                .unwrap_or_revert(Decimal(liquidations).try_mul(Decimal(price)))
                .0;
            let owed = self.unwrap_or_revert(gross_redeemed.try_add(gross_forced));
            if account.debit_reserve(owed).is_err() {
                // the book cannot cover the exits; drain it and flag the
                // pool rather than deadlock the close
                account.reserve_balance = U256::zero();
                if !account.emergency {
                    account.emergency = true;
                    self.env()
                        .emit_event(events::EmergencyDeclared { cycle: closed_cycle });
                }
            }
            account.accrued_fees = self.unwrap_or_revert(account.accrued_fees.try_add(fee));
        }

        // solvency snapshot at the settled price
        for lp in &roster {
            if let Some(mut position) = self.position_of(lp) {
                position.last_health_cycle = closed_cycle;
                self.positions.set(lp, position);
            }
        }
        account.solvency_deficit =
            self.unwrap_or_revert(account.is_undercollateralized(price, strategy.lp_margin_bps));

        self.settlements.set(
            &closed_cycle,
            SettlementRecord {
                price,
                fee_bps: config.fee_bps,
                rate,
            },
        );
        cycle.advance(now);
        self.account.set(account);

        self.env().emit_event(events::CycleSettled {
            cycle: closed_cycle,
            price,
            rate,
            minted: minted_total,
            redeemed: burn_total,
        });
    }

    fn enter(&mut self) {
        if self.entered.get_or_default() {
            self.env().revert(Error::ReentrantCall);
        }
        self.entered.set(true);
    }

    fn exit(&mut self) {
        self.entered.set(false);
    }

    fn require_owner(&self) {
        if self.owner.get() != Some(self.env().caller()) {
            self.env().revert(Error::Unauthorized);
        }
    }

    fn require_not_paused(&self) {
        if self.paused.get_or_default() {
            self.env().revert(Error::PoolPaused);
        }
    }

    fn unwrap_or_revert<T>(&self, result: Result<T, Error>) -> T {
        match result {
            Ok(value) => value,
            Err(error) => self.env().revert(error),
        }
    }

    fn pending_request(&self, user: &Address) -> Option<UserRequest> {
        self.requests.get(user).filter(UserRequest::is_pending)
    }

    fn position_of(&self, lp: &Address) -> Option<LpPosition> {
        self.positions.get(lp).filter(|position| !position.last_index.is_zero())
    }

    fn roster_remove(&mut self, lp: &Address) {
        let mut roster = self.roster.get_or_default();
        if let Some(index) = roster.iter().position(|member| member == lp) {
            roster.swap_remove(index);
        }
        self.roster.set(roster);
    }

    fn load_cycle(&self) -> CycleState {
        self.cycle.get_or_revert_with(Error::InvalidState)
    }

    fn load_account(&self) -> PoolAccount {
        self.account.get_or_revert_with(Error::InvalidState)
    }

    fn load_strategy(&self) -> RateStrategy {
        self.strategy.get_or_revert_with(Error::InvalidState)
    }

    fn load_config(&self) -> PoolConfig {
        self.config.get_or_revert_with(Error::InvalidState)
    }

    fn reserve_ref(&self) -> SyntheticTokenContractRef {
        let address = self.reserve_token.get_or_revert_with(Error::InvalidState);
        SyntheticTokenContractRef::new(self.env().clone(), address)
    }

    fn exposure_ref(&self) -> SyntheticTokenContractRef {
        let address = self.exposure_token.get_or_revert_with(Error::InvalidState);
        SyntheticTokenContractRef::new(self.env().clone(), address)
    }

    fn feed_ref(&self) -> PriceFeedContractRef {
        let address = self.price_feed.get_or_revert_with(Error::InvalidState);
        PriceFeedContractRef::new(self.env().clone(), address)
    }
}

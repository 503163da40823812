//! Asynchronous OHLC price feed.
//!
//! Consumers call `request_round` to open a round; an off-chain publisher
//! answers with `fulfill_round` carrying the candle for that round id. Only
//! the answer matching the pending id is accepted, so a slow response to an
//! earlier round can never overwrite a newer one. A delivered sample also
//! carries the market-open flag: the market counts as open when the candle's
//! observation timestamp was within the market-open window of its delivery.

use crate::error::Error;
use odra::casper_types::U256;
use odra::prelude::*;

pub mod events {
    use odra::casper_types::U256;
    use odra::prelude::*;

    #[odra::event]
    pub struct RoundRequested {
        pub round_id: u64,
        pub requested_by: Address,
    }

    #[odra::event]
    pub struct RoundFulfilled {
        pub round_id: u64,
        pub publisher: Address,
        pub close: U256,
        pub timestamp: u64,
    }

    #[odra::event]
    pub struct PublisherAdded {
        pub publisher: Address,
    }

    #[odra::event]
    pub struct PublisherRemoved {
        pub publisher: Address,
    }

    #[odra::event]
    pub struct MarketOpenWindowChanged {
        pub window_ms: u64,
    }

    #[odra::event]
    pub struct OwnershipTransferred {
        pub previous_owner: Address,
        pub new_owner: Address,
    }
}

/// One delivered candle. Prices are WAD-scaled, `timestamp` is the block
/// time the publisher observed the candle at.
#[odra::odra_type]
pub struct PriceSample {
    pub open: U256,
    pub high: U256,
    pub low: U256,
    pub close: U256,
    pub timestamp: u64,
}

#[odra::module(events = [
    events::RoundRequested,
    events::RoundFulfilled,
    events::PublisherAdded,
    events::PublisherRemoved,
    events::MarketOpenWindowChanged,
    events::OwnershipTransferred
])]
pub struct PriceFeed {
    owner: Var<Address>,
    publishers: Mapping<Address, bool>,
    next_round_id: Var<u64>,
    pending_round: Var<u64>,
    latest_round: Var<u64>,
    latest_sample: Var<PriceSample>,
    delivered_at: Var<u64>,
    market_open_window: Var<u64>,
}

#[odra::module]
impl PriceFeed {
    /// Initialize the feed. `market_open_window_ms` is how long a delivered
    /// sample keeps the market flagged open.
    pub fn init(&mut self, market_open_window_ms: u64) {
        if market_open_window_ms == 0 {
            self.env().revert(Error::InvalidConfig);
        }
        self.owner.set(self.env().caller());
        self.next_round_id.set(1);
        self.pending_round.set(0);
        self.latest_round.set(0);
        self.delivered_at.set(0);
        self.market_open_window.set(market_open_window_ms);
    }

    /// Open a new round and return its id. A newer request supersedes any
    /// still-pending one.
    pub fn request_round(&mut self) -> u64 {
        let round_id = self.next_round_id.get_or_default();
        self.next_round_id.set(round_id + 1);
        self.pending_round.set(round_id);
        self.env().emit_event(events::RoundRequested {
            round_id,
            requested_by: self.env().caller(),
        });
        round_id
    }

    /// Deliver the candle for `round_id`. Publisher only; the id must match
    /// the pending round.
    pub fn fulfill_round(&mut self, round_id: u64, sample: PriceSample) {
        let caller = self.env().caller();
        if !self.is_publisher(caller) {
            self.env().revert(Error::InvalidSource);
        }
        let pending = self.pending_round.get_or_default();
        if pending == 0 || round_id != pending {
            self.env().revert(Error::UnexpectedRequestID);
        }
        let now = self.env().get_block_time();
        if sample.close.is_zero()
            || sample.high < sample.low
            || sample.open < sample.low
            || sample.open > sample.high
            || sample.close < sample.low
            || sample.close > sample.high
            || sample.timestamp > now
        {
            self.env().revert(Error::InvalidConfig);
        }

        let close = sample.close;
        let timestamp = sample.timestamp;
        self.latest_sample.set(sample);
        self.latest_round.set(round_id);
        self.delivered_at.set(now);
        self.pending_round.set(0);

        self.env().emit_event(events::RoundFulfilled {
            round_id,
            publisher: caller,
            close,
            timestamp,
        });
    }

    /// Id of the most recently delivered round, 0 if none yet.
    pub fn latest_round(&self) -> u64 {
        self.latest_round.get_or_default()
    }

    /// Id of the round awaiting delivery, 0 if none.
    pub fn pending_round(&self) -> u64 {
        self.pending_round.get_or_default()
    }

    pub fn latest_sample(&self) -> Option<PriceSample> {
        if self.latest_round.get_or_default() == 0 {
            return None;
        }
        self.latest_sample.get()
    }

    /// Block time the latest sample arrived at.
    pub fn delivered_at(&self) -> u64 {
        self.delivered_at.get_or_default()
    }

    /// True when the latest candle's observation timestamp was within the
    /// market-open window of its delivery. An answer built from old data
    /// means the underlying market was not trading.
    pub fn is_market_open(&self) -> bool {
        if self.latest_round.get_or_default() == 0 {
            return false;
        }
        let sample = match self.latest_sample.get() {
            Some(sample) => sample,
            None => return false,
        };
        let lag = self.delivered_at.get_or_default().saturating_sub(sample.timestamp);
        lag < self.market_open_window.get_or_default()
    }

    pub fn is_publisher(&self, address: Address) -> bool {
        if self.publishers.get(&address).unwrap_or(false) {
            return true;
        }
        self.owner.get() == Some(address)
    }

    /// Approve a publisher. Owner only.
    pub fn add_publisher(&mut self, publisher: Address) {
        self.require_owner();
        self.publishers.set(&publisher, true);
        self.env().emit_event(events::PublisherAdded { publisher });
    }

    /// Revoke a publisher. Owner only.
    pub fn remove_publisher(&mut self, publisher: Address) {
        self.require_owner();
        self.publishers.set(&publisher, false);
        self.env().emit_event(events::PublisherRemoved { publisher });
    }

    /// Change the market-open window. Owner only.
    pub fn set_market_open_window(&mut self, window_ms: u64) {
        self.require_owner();
        if window_ms == 0 {
            self.env().revert(Error::InvalidConfig);
        }
        self.market_open_window.set(window_ms);
        self.env().emit_event(events::MarketOpenWindowChanged { window_ms });
    }

    /// Hand the feed to a new owner. Owner only.
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

impl PriceFeed {
    fn require_owner(&self) {
        if self.owner.get() != Some(self.env().caller()) {
            self.env().revert(Error::Unauthorized);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WAD;
    use crate::state::DEFAULT_MARKET_OPEN_WINDOW_MS;
    use odra::host::{Deployer, HostEnv};

    fn deploy(env: &HostEnv) -> PriceFeedHostRef {
        PriceFeed::deploy(
            env,
            PriceFeedInitArgs {
                market_open_window_ms: DEFAULT_MARKET_OPEN_WINDOW_MS,
            },
        )
    }

    fn candle(close: u64) -> PriceSample {
        let close = U256::from(close) * U256::from(WAD);
        PriceSample {
            open: close,
            high: close + U256::from(WAD),
            low: close - U256::from(WAD),
            close,
            timestamp: 0,
        }
    }

    #[test]
    fn round_ids_are_monotonic() {
        let env = odra_test::env();
        let mut feed = deploy(&env);
        assert_eq!(feed.request_round(), 1);
        assert_eq!(feed.request_round(), 2);
        assert_eq!(feed.pending_round(), 2);
        assert_eq!(feed.latest_round(), 0);
        assert!(feed.latest_sample().is_none());
    }

    #[test]
    fn fulfill_matches_the_pending_round() {
        let env = odra_test::env();
        let mut feed = deploy(&env);
        let round = feed.request_round();

        // a stale or unknown id is refused
        assert_eq!(
            feed.try_fulfill_round(round + 1, candle(42_069)),
            Err(Error::UnexpectedRequestID.into())
        );

        feed.fulfill_round(round, candle(42_069));
        assert_eq!(feed.latest_round(), round);
        assert_eq!(feed.pending_round(), 0);
        let sample = feed.latest_sample().unwrap();
        assert_eq!(sample.close, U256::from(42_069u64) * U256::from(WAD));

        // the answered round cannot be answered twice
        assert_eq!(
            feed.try_fulfill_round(round, candle(42_069)),
            Err(Error::UnexpectedRequestID.into())
        );
    }

    #[test]
    fn superseded_round_is_rejected() {
        let env = odra_test::env();
        let mut feed = deploy(&env);
        let first = feed.request_round();
        let second = feed.request_round();

        assert_eq!(
            feed.try_fulfill_round(first, candle(100)),
            Err(Error::UnexpectedRequestID.into())
        );
        feed.fulfill_round(second, candle(101));
        assert_eq!(feed.latest_round(), second);
    }

    #[test]
    fn only_publishers_fulfill() {
        let env = odra_test::env();
        let mut feed = deploy(&env);
        let outsider = env.get_account(1);
        let round = feed.request_round();

        env.set_caller(outsider);
        assert_eq!(
            feed.try_fulfill_round(round, candle(5)),
            Err(Error::InvalidSource.into())
        );
        assert_eq!(
            feed.try_add_publisher(outsider),
            Err(Error::Unauthorized.into())
        );

        env.set_caller(env.get_account(0));
        feed.add_publisher(outsider);
        env.set_caller(outsider);
        feed.fulfill_round(round, candle(5));
        assert_eq!(feed.latest_round(), round);
    }

    #[test]
    fn malformed_candles_are_rejected() {
        let env = odra_test::env();
        let mut feed = deploy(&env);
        let round = feed.request_round();

        let mut zero_close = candle(10);
        zero_close.close = U256::zero();
        zero_close.low = U256::zero();
        assert_eq!(
            feed.try_fulfill_round(round, zero_close),
            Err(Error::InvalidConfig.into())
        );

        let mut inverted = candle(10);
        inverted.low = inverted.high + U256::from(WAD);
        assert_eq!(
            feed.try_fulfill_round(round, inverted),
            Err(Error::InvalidConfig.into())
        );
    }

    #[test]
    fn market_open_reflects_candle_freshness_at_delivery() {
        let env = odra_test::env();
        let mut feed = deploy(&env);
        assert!(!feed.is_market_open());

        env.advance_block_time(5_000);
        let round = feed.request_round();
        let mut fresh = candle(7);
        fresh.timestamp = 5_000;
        feed.fulfill_round(round, fresh);
        assert!(feed.is_market_open());

        // the flag is a property of the delivery, not of later clock reads
        env.advance_block_time(10_000);
        assert!(feed.is_market_open());

        // a candle observed a full window before delivery means the market
        // was not trading
        let round = feed.request_round();
        let mut lagged = candle(8);
        lagged.timestamp = 14_000;
        feed.fulfill_round(round, lagged);
        assert!(!feed.is_market_open());
    }

    #[test]
    fn future_dated_candles_are_rejected() {
        let env = odra_test::env();
        let mut feed = deploy(&env);
        let round = feed.request_round();
        let mut early = candle(9);
        early.timestamp = 1;
        assert_eq!(
            feed.try_fulfill_round(round, early),
            Err(Error::InvalidConfig.into())
        );
    }

    #[test]
    fn admin_ops_follow_the_owner() {
        let env = odra_test::env();
        let mut feed = deploy(&env);
        let owner = env.get_account(0);
        let keeper = env.get_account(1);

        feed.add_publisher(keeper);
        assert!(feed.is_publisher(keeper));
        feed.remove_publisher(keeper);
        assert!(!feed.is_publisher(keeper));
        // the owner publishes implicitly
        assert!(feed.is_publisher(owner));

        assert_eq!(
            feed.try_set_market_open_window(0),
            Err(Error::InvalidConfig.into())
        );
        feed.set_market_open_window(5_000);

        // the implicit publisher role moves with the ownership
        feed.transfer_ownership(keeper);
        assert!(!feed.is_publisher(owner));
        assert_eq!(
            feed.try_add_publisher(owner),
            Err(Error::Unauthorized.into())
        );
        env.set_caller(keeper);
        feed.add_publisher(owner);
        assert!(feed.is_publisher(owner));
    }
}

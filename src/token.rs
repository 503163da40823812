//! Minimal fungible token used for both the reserve asset and the exposure
//! asset. The pool contract is installed as the minter of the exposure token
//! and mints and burns it at settlement.

use crate::error::Error;
use odra::casper_types::U256;
use odra::prelude::*;

pub mod events {
    use odra::casper_types::U256;
    use odra::prelude::*;

    #[odra::event]
    pub struct Transfer {
        pub from: Option<Address>,
        pub to: Option<Address>,
        pub amount: U256,
    }

    #[odra::event]
    pub struct Approval {
        pub owner: Address,
        pub spender: Address,
        pub amount: U256,
    }

    #[odra::event]
    pub struct MinterChanged {
        pub minter: Address,
    }
}

#[odra::module(events = [events::Transfer, events::Approval, events::MinterChanged])]
pub struct SyntheticToken {
    name: Var<String>,
    symbol: Var<String>,
    decimals: Var<u8>,
    total_supply: Var<U256>,
    balances: Mapping<Address, U256>,
    allowances: Mapping<(Address, Address), U256>,
    owner: Var<Address>,
    minter: Var<Address>,
}

#[odra::module]
impl SyntheticToken {
    /// Deploys the token and mints `initial_supply` to the deployer, who also
    /// starts out as both owner and minter.
    pub fn init(&mut self, name: String, symbol: String, decimals: u8, initial_supply: U256) {
        let caller = self.env().caller();
        self.name.set(name);
        self.symbol.set(symbol);
        self.decimals.set(decimals);
        self.total_supply.set(initial_supply);
        self.owner.set(caller);
        self.minter.set(caller);
        if !initial_supply.is_zero() {
            self.balances.set(&caller, initial_supply);
            self.env().emit_event(events::Transfer {
                from: None,
                to: Some(caller),
                amount: initial_supply,
            });
        }
    }

    pub fn transfer(&mut self, to: Address, amount: U256) {
        let caller = self.env().caller();
        self.raw_transfer(caller, to, amount);
    }

    pub fn approve(&mut self, spender: Address, amount: U256) {
        let caller = self.env().caller();
        self.allowances.set(&(caller, spender), amount);
        self.env().emit_event(events::Approval {
            owner: caller,
            spender,
            amount,
        });
    }

    pub fn transfer_from(&mut self, from: Address, to: Address, amount: U256) {
        let caller = self.env().caller();
        let allowance = self.allowances.get(&(from, caller)).unwrap_or_default();
        if allowance < amount {
            self.env().revert(Error::InsufficientAllowance);
        }
        self.allowances.set(&(from, caller), allowance - amount);
        self.raw_transfer(from, to, amount);
    }

    /// Mints `amount` to `to`. Minter only.
    pub fn mint(&mut self, to: Address, amount: U256) {
        self.require_minter();
        let supply = self.total_supply.get_or_default();
        self.total_supply.set(supply + amount);
        let balance = self.balances.get(&to).unwrap_or_default();
        self.balances.set(&to, balance + amount);
        self.env().emit_event(events::Transfer {
            from: None,
            to: Some(to),
            amount,
        });
    }

    /// Burns `amount` from `from`. Minter only.
    pub fn burn(&mut self, from: Address, amount: U256) {
        self.require_minter();
        let balance = self.balances.get(&from).unwrap_or_default();
        if balance < amount {
            self.env().revert(Error::InsufficientBalance);
        }
        self.balances.set(&from, balance - amount);
        let supply = self.total_supply.get_or_default();
        self.total_supply.set(supply - amount);
        self.env().emit_event(events::Transfer {
            from: Some(from),
            to: None,
            amount,
        });
    }

    /// Hands the mint and burn privilege to `minter`. Owner only.
    pub fn set_minter(&mut self, minter: Address) {
        if self.env().caller() != self.owner.get_or_revert_with(Error::InvalidState) {
            self.env().revert(Error::Unauthorized);
        }
        self.minter.set(minter);
        self.env().emit_event(events::MinterChanged { minter });
    }

    pub fn name(&self) -> String {
        self.name.get_or_default()
    }

    pub fn symbol(&self) -> String {
        self.symbol.get_or_default()
    }

    pub fn decimals(&self) -> u8 {
        self.decimals.get_or_default()
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply.get_or_default()
    }

    pub fn balance_of(&self, account: Address) -> U256 {
        self.balances.get(&account).unwrap_or_default()
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances.get(&(owner, spender)).unwrap_or_default()
    }
}

impl SyntheticToken {
    fn require_minter(&self) {
        if self.env().caller() != self.minter.get_or_revert_with(Error::InvalidState) {
            self.env().revert(Error::Unauthorized);
        }
    }

    fn raw_transfer(&mut self, from: Address, to: Address, amount: U256) {
        let from_balance = self.balances.get(&from).unwrap_or_default();
        if from_balance < amount {
            self.env().revert(Error::InsufficientBalance);
        }
        self.balances.set(&from, from_balance - amount);
        let to_balance = self.balances.get(&to).unwrap_or_default();
        self.balances.set(&to, to_balance + amount);
        self.env().emit_event(events::Transfer {
            from: Some(from),
            to: Some(to),
            amount,
        });
    }
}

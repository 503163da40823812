#![allow(clippy::arithmetic_side_effects)]
#![cfg_attr(not(test), no_std)]

//! A cycle-settled synthetic exposure pool for the casper blockchain.

pub mod error;
pub mod math;
pub mod oracle;
pub mod pool;
pub mod state;
pub mod strategy;
pub mod token;

extern crate alloc;

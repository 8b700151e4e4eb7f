//! Exchange integration for margin lending.
//!
//! ## KuCoin
//! REST access (API key version 2 signing) for:
//! - Main-account balance lookup
//! - Margin lending market rates
//! - Lend order creation, active-order listing, and cancellation
//!
//! The controller depends only on the `LendingVenue` trait, never on the
//! concrete client.

mod client;
mod traits;
mod types;

pub use client::KucoinClient;
pub use traits::{CancelOutcome, LendingVenue};
pub use types::*;

#[cfg(test)]
pub use traits::MockLendingVenue;

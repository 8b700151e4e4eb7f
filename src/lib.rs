//! # Margin Lender
//!
//! Automated USDT margin lending on KuCoin: watch the main account balance,
//! pick a competitive daily rate, place a lend offer, wait for it to fill,
//! and cancel it if it stalls. Runs as a single never-ending cycle.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `controller`: The lending cycle state machine (the core of the bot)
//! - `exchange`: KuCoin REST client and the `LendingVenue` capability trait
//! - `utils`: Shared decimal arithmetic helpers

pub mod config;
pub mod controller;
pub mod exchange;
pub mod utils;

pub use config::Config;

//! Sports-betting arbitrage and +EV scanner.
//!
//! This library pulls bookmaker odds from an upstream provider, finds
//! risk-free arbitrage books and positive expected value prices, sizes
//! stakes, and tracks virtual bets through to settlement against final
//! scores with a per-guild bankroll ledger.
//!
//! # Arbitrage
//!
//! When the best prices across bookmakers for every outcome of a market
//! satisfy `Σ 1/price < 1`, staking each outcome in proportion to its
//! inverse price returns the same amount whichever outcome wins:
//!
//! ```text
//! TeamA @ 2.10 (TAB):   1/2.10 = 0.4762
//! TeamB @ 2.05 (Neds):  1/2.05 = 0.4878
//! ─────────────────────────────────────
//! Σ 1/price = 0.9640 < 1
//! Margin:   3.60%
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`market`]: Odds data model, provider client, cache and outcome normalizer
//! - [`arbitrage`]: Arbitrage and EV detection, stake calculator
//! - [`trading`]: Stake sizing, bankrolls and the bet ledger
//! - [`settlement`]: Outcome determination and the result resolver
//! - [`scanner`]: Scheduled scans shared across guilds
//! - [`guild`]: Per-guild scan settings
//! - [`notify`]: Notifications for the presentation layer
//! - [`schedule`]: Daily summary and periodic persistence
//! - [`api`]: HTTP API over the scanner and ledger
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod arbitrage;
pub mod config;
pub mod error;
pub mod guild;
pub mod market;
pub mod metrics;
pub mod notify;
pub mod scanner;
pub mod schedule;
pub mod settlement;
pub mod trading;
pub mod utils;

pub use config::Config;
pub use error::{BotError, Result};

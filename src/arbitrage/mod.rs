//! Arbitrage module for detecting priced opportunities.
//!
//! This module handles:
//! - 2-way arbitrage detection across bookmakers
//! - Opportunity scoring and the stand-alone stake calculator
//! - Positive expected value detection against a consensus price

pub mod calculator;
pub mod detector;
pub mod ev;

pub use calculator::{arbitrage_calculator, calculate_opportunity, ArbitrageLeg, ArbitrageOpportunity};
pub use detector::{find_arbitrage, find_arbitrage_at, is_allowed, is_valid_price};
pub use ev::{expected_value_percent, fair_price, find_ev_opportunities, find_ev_opportunities_at, EvOpportunity};

//! Trading module for virtual bets and bankroll accounting.
//!
//! This module handles:
//! - Stake sizing (arbitrage split, EV units and dollars)
//! - Active bets and settlement records
//! - Per-guild bankrolls and the persisted ledger

pub mod bankroll;
pub mod bet;
pub mod ledger;
pub mod stake;
pub mod store;

pub use bankroll::{BankrollSummary, DrawdownLevel, GuildBankroll, NetworkSummary};
pub use bet::{ActiveBet, BetRecord, BetResult, ReviewEntry};
pub use ledger::{BetLedger, Settlement};
pub use stake::{ev_stake_dollars, ev_stake_units, split_arbitrage_stake, ArbitrageStakes, LegStake};
pub use store::{ActiveBetMap, BankrollMap, LedgerStore};

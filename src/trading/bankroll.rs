//! Per-guild bankroll accounting.
//!
//! Every mutation keeps `current == initial + total_profit` exactly and
//! asserts it afterwards.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use tracing::{error, warn};

use super::bet::{ActiveBet, BetRecord, BetResult};
use crate::error::LedgerError;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Oldest records are dropped beyond this many settled bets per day.
pub const MAX_BETS_TODAY: usize = 500;

/// Bets considered for the rolling average odds.
pub const RECENT_BETS_WINDOW: usize = 10;

/// Balance below this share of the initial bankroll is a warning.
pub const DRAWDOWN_WARNING: Decimal = dec!(0.8);

/// Balance below this share of the initial bankroll is severe.
pub const DRAWDOWN_SEVERE: Decimal = dec!(0.5);

/// Drawdown severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawdownLevel {
    /// Down more than 20%.
    Warning,
    /// Down more than 50%.
    Severe,
}

/// Mutable ledger for one guild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildBankroll {
    /// Current balance.
    pub current: Decimal,
    /// Balance at creation or last reset.
    pub initial: Decimal,
    /// Profit since `last_reset`.
    pub daily_profit: Decimal,
    /// Lifetime profit.
    pub total_profit: Decimal,
    /// Sum of stakes on won and lost bets.
    pub total_staked: Decimal,
    /// Sum of profit on won bets.
    pub total_winnings: Decimal,
    /// Won bet count.
    pub won_bets: u32,
    /// Lost bet count.
    pub lost_bets: u32,
    /// Void bet count.
    pub void_bets: u32,
    /// Bets placed and not yet settled.
    pub pending_bets: u32,
    /// UTC date of the last daily rollover.
    #[serde(with = "iso_date")]
    pub last_reset: Date,
    /// Bets settled since `last_reset`.
    #[serde(default)]
    pub bets_today: Vec<BetRecord>,
    /// Won bets per market key.
    #[serde(default)]
    pub market_wins: BTreeMap<String, u32>,
    /// Lost bets per market key.
    #[serde(default)]
    pub market_losses: BTreeMap<String, u32>,
}

impl GuildBankroll {
    /// Fresh bankroll seeded with `initial`.
    pub fn new(initial: Decimal, today: Date) -> Self {
        Self {
            current: initial,
            initial,
            daily_profit: Decimal::ZERO,
            total_profit: Decimal::ZERO,
            total_staked: Decimal::ZERO,
            total_winnings: Decimal::ZERO,
            won_bets: 0,
            lost_bets: 0,
            void_bets: 0,
            pending_bets: 0,
            last_reset: today,
            bets_today: Vec::new(),
            market_wins: BTreeMap::new(),
            market_losses: BTreeMap::new(),
        }
    }

    /// Check `current == initial + total_profit`.
    pub fn is_consistent(&self) -> bool {
        self.current == self.initial + self.total_profit
    }

    /// Panic if the accounting invariant is broken.
    pub fn assert_invariant(&self) {
        assert!(
            self.is_consistent(),
            "bankroll invariant violated: current {} != initial {} + total_profit {}",
            self.current,
            self.initial,
            self.total_profit
        );
    }

    /// Validate a bankroll loaded from storage.
    pub fn validate(&self, guild_id: &str) -> Result<(), LedgerError> {
        if self.is_consistent() {
            Ok(())
        } else {
            Err(LedgerError::Inconsistent {
                guild_id: guild_id.to_string(),
                current: self.current,
                initial: self.initial,
                total_profit: self.total_profit,
            })
        }
    }

    /// Reset daily figures if the UTC date changed. Returns true on rollover.
    pub fn roll_over(&mut self, today: Date) -> bool {
        if self.last_reset == today {
            return false;
        }
        self.daily_profit = Decimal::ZERO;
        self.bets_today.clear();
        self.last_reset = today;
        true
    }

    /// Count a newly placed bet.
    pub fn record_placed(&mut self) {
        self.pending_bets += 1;
    }

    /// Drop a bet from the pending count without any P&L effect.
    pub fn record_withdrawn(&mut self) {
        self.pending_bets = self.pending_bets.saturating_sub(1);
    }

    /// Apply a settled result. Void bets only move counters.
    pub fn settle(&mut self, bet: &ActiveBet, result: BetResult, now: OffsetDateTime) -> Option<BetRecord> {
        self.roll_over(now.date());
        self.record_withdrawn();

        let profit = match result {
            BetResult::Void => {
                self.void_bets += 1;
                self.assert_invariant();
                return None;
            }
            BetResult::Won => {
                let profit = bet.potential_profit();
                self.won_bets += 1;
                self.total_winnings += profit;
                *self.market_wins.entry(bet.market_key.clone()).or_default() += 1;
                profit
            }
            BetResult::Lost => {
                self.lost_bets += 1;
                *self.market_losses.entry(bet.market_key.clone()).or_default() += 1;
                -bet.stake
            }
        };

        self.current += profit;
        self.daily_profit += profit;
        self.total_profit += profit;
        self.total_staked += bet.stake;

        let record = BetRecord {
            bet_id: bet.bet_id.clone(),
            event_id: bet.event_id.clone(),
            game: bet.game.clone(),
            market_key: bet.market_key.clone(),
            outcome: bet.outcome.clone(),
            bookmaker: bet.bookmaker.clone(),
            stake: bet.stake,
            odds: bet.odds,
            result,
            profit,
            ev_percent: bet.ev_percent,
            settled_at: now,
        };
        self.bets_today.push(record.clone());
        if self.bets_today.len() > MAX_BETS_TODAY {
            let excess = self.bets_today.len() - MAX_BETS_TODAY;
            self.bets_today.drain(..excess);
        }

        self.assert_invariant();
        Some(record)
    }

    /// Operator reset: re-seed the balance and clear history.
    ///
    /// Pending bets stay counted since they are still being tracked.
    pub fn reset(&mut self, amount: Decimal, today: Date) {
        let pending = self.pending_bets;
        *self = Self::new(amount, today);
        self.pending_bets = pending;
        self.assert_invariant();
    }

    /// Settled (won + lost) bet count.
    pub fn decided_bets(&self) -> u32 {
        self.won_bets + self.lost_bets
    }

    /// Won share of decided bets, in percent.
    pub fn win_rate(&self) -> Option<Decimal> {
        let decided = self.decided_bets();
        (decided > 0).then(|| Decimal::from(self.won_bets) / Decimal::from(decided) * Decimal::ONE_HUNDRED)
    }

    /// Mean stake over decided bets.
    pub fn avg_stake(&self) -> Option<Decimal> {
        let decided = self.decided_bets();
        (decided > 0).then(|| self.total_staked / Decimal::from(decided))
    }

    /// Mean odds of the last ten bets settled today.
    pub fn avg_recent_odds(&self) -> Option<Decimal> {
        let recent = &self.bets_today[self.bets_today.len().saturating_sub(RECENT_BETS_WINDOW)..];
        if recent.is_empty() {
            return None;
        }
        let sum: Decimal = recent.iter().map(|r| r.odds).sum();
        Some(sum / Decimal::from(recent.len()))
    }

    /// Lifetime profit over the initial balance, in percent.
    pub fn roi_pct(&self) -> Decimal {
        if self.initial.is_zero() {
            Decimal::ZERO
        } else {
            self.total_profit / self.initial * Decimal::ONE_HUNDRED
        }
    }

    /// Distance below the initial balance, in percent (zero when up).
    pub fn drawdown_pct(&self) -> Decimal {
        if self.initial.is_zero() || self.current >= self.initial {
            Decimal::ZERO
        } else {
            (self.initial - self.current) / self.initial * Decimal::ONE_HUNDRED
        }
    }

    /// Current drawdown severity.
    pub fn drawdown_level(&self) -> Option<DrawdownLevel> {
        if self.current < self.initial * DRAWDOWN_SEVERE {
            Some(DrawdownLevel::Severe)
        } else if self.current < self.initial * DRAWDOWN_WARNING {
            Some(DrawdownLevel::Warning)
        } else {
            None
        }
    }

    /// Log the drawdown level, if any.
    pub fn log_drawdown(&self, guild_id: &str) {
        match self.drawdown_level() {
            Some(DrawdownLevel::Severe) => error!(
                guild_id = %guild_id,
                current = %self.current,
                "Bankroll hit 50% drawdown"
            ),
            Some(DrawdownLevel::Warning) => warn!(
                guild_id = %guild_id,
                current = %self.current,
                "Bankroll hit 20% drawdown"
            ),
            None => {}
        }
    }

    /// Display snapshot.
    pub fn summary(&self) -> BankrollSummary {
        BankrollSummary {
            current: self.current,
            initial: self.initial,
            daily_profit: self.daily_profit,
            total_profit: self.total_profit,
            bets_today: self.bets_today.len(),
            won_bets: self.won_bets,
            lost_bets: self.lost_bets,
            void_bets: self.void_bets,
            pending_bets: self.pending_bets,
            win_rate: self.win_rate(),
            avg_stake: self.avg_stake(),
            avg_recent_odds: self.avg_recent_odds(),
            roi_pct: self.roi_pct(),
            drawdown_pct: self.drawdown_pct(),
            drawdown: self.drawdown_level(),
        }
    }
}

/// Read-only bankroll figures for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankrollSummary {
    /// Current balance.
    pub current: Decimal,
    /// Initial balance.
    pub initial: Decimal,
    /// Today's profit.
    pub daily_profit: Decimal,
    /// Lifetime profit.
    pub total_profit: Decimal,
    /// Bets settled today.
    pub bets_today: usize,
    /// Won bets.
    pub won_bets: u32,
    /// Lost bets.
    pub lost_bets: u32,
    /// Void bets.
    pub void_bets: u32,
    /// Pending bets.
    pub pending_bets: u32,
    /// Win rate in percent.
    pub win_rate: Option<Decimal>,
    /// Mean stake.
    pub avg_stake: Option<Decimal>,
    /// Mean odds of recent bets.
    pub avg_recent_odds: Option<Decimal>,
    /// ROI in percent.
    pub roi_pct: Decimal,
    /// Drawdown in percent.
    pub drawdown_pct: Decimal,
    /// Drawdown severity.
    pub drawdown: Option<DrawdownLevel>,
}

/// Totals across every guild.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    /// Guilds with a bankroll.
    pub guilds: usize,
    /// Won bets.
    pub won_bets: u32,
    /// Lost bets.
    pub lost_bets: u32,
    /// Win rate in percent.
    pub win_rate: Option<Decimal>,
    /// Lifetime profit.
    pub total_profit: Decimal,
}

impl NetworkSummary {
    /// Aggregate over a set of bankrolls.
    pub fn from_bankrolls<'a>(bankrolls: impl IntoIterator<Item = &'a GuildBankroll>) -> Self {
        let mut summary = Self::default();
        for bankroll in bankrolls {
            summary.guilds += 1;
            summary.won_bets += bankroll.won_bets;
            summary.lost_bets += bankroll.lost_bets;
            summary.total_profit += bankroll.total_profit;
        }
        let decided = summary.won_bets + summary.lost_bets;
        summary.win_rate = (decided > 0)
            .then(|| Decimal::from(summary.won_bets) / Decimal::from(decided) * Decimal::ONE_HUNDRED);
        summary
    }
}

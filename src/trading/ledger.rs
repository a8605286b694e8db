//! Bet ledger: active bets, per-guild bankrolls and the review queue.
//!
//! Every mutation and the save that follows it happen under one lock, so two
//! overlapping scans or resolver passes cannot lose updates. Save failures
//! are logged; the in-memory state stays authoritative until the next
//! successful save.

use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::bankroll::{GuildBankroll, NetworkSummary};
use super::bet::{ActiveBet, BetRecord, BetResult, ReviewEntry};
use super::store::{ActiveBetMap, BankrollMap, LedgerStore};
use crate::error::LedgerError;
use crate::market::GameScore;
use crate::metrics;

#[derive(Debug, Default)]
struct LedgerState {
    bankrolls: BankrollMap,
    active: ActiveBetMap,
    review: Vec<ReviewEntry>,
}

impl LedgerState {
    fn bankroll_mut(&mut self, guild_id: &str, seed: Decimal, today: Date) -> &mut GuildBankroll {
        let bankroll = self
            .bankrolls
            .entry(guild_id.to_string())
            .or_insert_with(|| {
                info!(guild_id = %guild_id, initial = %seed, "Created bankroll");
                GuildBankroll::new(seed, today)
            });
        if bankroll.roll_over(today) {
            debug!(guild_id = %guild_id, date = %today, "Daily rollover");
        }
        bankroll
    }

    /// Snapshot of a guild's bankroll, and whether it was created or rolled over.
    fn bankroll_snapshot(&mut self, guild_id: &str, seed: Decimal, today: Date) -> (GuildBankroll, bool) {
        let changed = self
            .bankrolls
            .get(guild_id)
            .map_or(true, |bankroll| bankroll.last_reset != today);
        (self.bankroll_mut(guild_id, seed, today).clone(), changed)
    }
}

/// Outcome of settling one bet.
#[derive(Debug, Clone)]
pub struct Settlement {
    /// The bet as it was tracked.
    pub bet: ActiveBet,
    /// Applied result.
    pub result: BetResult,
    /// Record appended to today's list (none for void).
    pub record: Option<BetRecord>,
    /// Bankroll after the update.
    pub bankroll: GuildBankroll,
}

/// Process-wide ledger.
pub struct BetLedger {
    state: Mutex<LedgerState>,
    store: Option<LedgerStore>,
    default_bankroll: Decimal,
}

impl BetLedger {
    /// Empty ledger. With no store nothing is persisted.
    pub fn new(default_bankroll: Decimal, store: Option<LedgerStore>) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            store,
            default_bankroll,
        }
    }

    /// Ledger seeded from the store's files.
    #[instrument(skip(store))]
    pub async fn load(store: LedgerStore, default_bankroll: Decimal) -> Result<Self, LedgerError> {
        let bankrolls = store.load_bankrolls().await?;
        let active = store.load_active_bets().await?;
        let review = store.load_review().await?;

        info!(
            guilds = bankrolls.len(),
            active_bets = active.len(),
            review = review.len(),
            "Ledger loaded"
        );

        Ok(Self {
            state: Mutex::new(LedgerState {
                bankrolls,
                active,
                review,
            }),
            store: Some(store),
            default_bankroll,
        })
    }

    /// Starting balance for guilds seen for the first time.
    pub fn default_bankroll(&self) -> Decimal {
        self.default_bankroll
    }

    /// Track a new bet and count it as pending.
    pub async fn place(&self, bet: ActiveBet) -> Result<(), LedgerError> {
        if bet.stake <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(bet.stake));
        }
        if bet.odds <= Decimal::ONE {
            return Err(LedgerError::InvalidAmount(bet.odds));
        }

        let mut state = self.state.lock().await;
        if state.active.contains_key(&bet.bet_id) {
            return Err(LedgerError::DuplicateBet { bet_id: bet.bet_id });
        }

        let today = OffsetDateTime::now_utc().date();
        state
            .bankroll_mut(&bet.guild_id, self.default_bankroll, today)
            .record_placed();

        info!(
            bet_id = %bet.bet_id,
            guild_id = %bet.guild_id,
            outcome = %bet.outcome,
            odds = %bet.odds,
            stake = %bet.stake,
            "Bet placed"
        );
        state.active.insert(bet.bet_id.clone(), bet);
        metrics::inc_bets_placed();

        self.persist_bankrolls(&state).await;
        self.persist_active(&state).await;
        Ok(())
    }

    /// Settle a bet as won or lost and return the updated bankroll.
    pub async fn resolve(&self, bet_id: &str, won: bool) -> Result<GuildBankroll, LedgerError> {
        let result = if won { BetResult::Won } else { BetResult::Lost };
        self.settle_at(bet_id, result, OffsetDateTime::now_utc())
            .await
            .map(|s| s.bankroll)
    }

    /// Settle a bet with any result at `now`.
    #[instrument(skip(self))]
    pub async fn settle_at(
        &self,
        bet_id: &str,
        result: BetResult,
        now: OffsetDateTime,
    ) -> Result<Settlement, LedgerError> {
        let mut state = self.state.lock().await;
        let bet = state
            .active
            .remove(bet_id)
            .ok_or_else(|| LedgerError::UnknownBet {
                bet_id: bet_id.to_string(),
            })?;

        let bankroll = state.bankroll_mut(&bet.guild_id, self.default_bankroll, now.date());
        let record = bankroll.settle(&bet, result, now);
        bankroll.log_drawdown(&bet.guild_id);
        let bankroll = bankroll.clone();

        info!(
            bet_id = %bet.bet_id,
            guild_id = %bet.guild_id,
            result = %result,
            current = %bankroll.current,
            "Bet settled"
        );
        metrics::inc_bets_settled(result.label());

        self.persist_bankrolls(&state).await;
        self.persist_active(&state).await;

        Ok(Settlement {
            bet,
            result,
            record,
            bankroll,
        })
    }

    /// Stop tracking a bet whose outcome could not be determined.
    pub async fn flag_for_review(
        &self,
        bet_id: &str,
        reason: &str,
        game_result: Option<GameScore>,
        now: OffsetDateTime,
    ) -> Result<ReviewEntry, LedgerError> {
        let mut state = self.state.lock().await;
        let bet = state
            .active
            .remove(bet_id)
            .ok_or_else(|| LedgerError::UnknownBet {
                bet_id: bet_id.to_string(),
            })?;

        state
            .bankroll_mut(&bet.guild_id, self.default_bankroll, now.date())
            .record_withdrawn();

        warn!(bet_id = %bet.bet_id, reason = %reason, "Bet flagged for review");
        let entry = ReviewEntry {
            bet,
            reason: reason.to_string(),
            game_result,
            flagged_at: now,
        };
        state.review.push(entry.clone());

        self.persist_bankrolls(&state).await;
        self.persist_active(&state).await;
        self.persist_review(&state).await;
        Ok(entry)
    }

    /// Bankroll for a guild, created with the default balance if missing.
    pub async fn bankroll(&self, guild_id: &str) -> GuildBankroll {
        self.bankroll_at(guild_id, OffsetDateTime::now_utc().date()).await
    }

    /// [`Self::bankroll`] with an explicit date for the rollover check.
    pub async fn bankroll_at(&self, guild_id: &str, today: Date) -> GuildBankroll {
        self.ensure_bankroll(guild_id, self.default_bankroll, today).await
    }

    /// Bankroll for a guild, created with `initial` if missing.
    pub async fn bankroll_or_init(&self, guild_id: &str, initial: Decimal) -> GuildBankroll {
        self.ensure_bankroll(guild_id, initial, OffsetDateTime::now_utc().date())
            .await
    }

    async fn ensure_bankroll(&self, guild_id: &str, seed: Decimal, today: Date) -> GuildBankroll {
        let mut state = self.state.lock().await;
        let (bankroll, changed) = state.bankroll_snapshot(guild_id, seed, today);
        if changed {
            self.persist_bankrolls(&state).await;
        }
        bankroll
    }

    /// Snapshot of every bankroll.
    pub async fn bankrolls(&self) -> BankrollMap {
        self.state.lock().await.bankrolls.clone()
    }

    /// Network-wide totals.
    pub async fn network_summary(&self) -> NetworkSummary {
        NetworkSummary::from_bankrolls(self.state.lock().await.bankrolls.values())
    }

    /// Snapshot of every active bet, oldest first.
    pub async fn active_bets(&self) -> Vec<ActiveBet> {
        let mut bets: Vec<ActiveBet> = self.state.lock().await.active.values().cloned().collect();
        bets.sort_by_key(|b| b.posted_time);
        bets
    }

    /// Active bets owned by one guild.
    pub async fn active_bets_for(&self, guild_id: &str) -> Vec<ActiveBet> {
        let mut bets: Vec<ActiveBet> = self
            .state
            .lock()
            .await
            .active
            .values()
            .filter(|b| b.guild_id == guild_id)
            .cloned()
            .collect();
        bets.sort_by_key(|b| b.posted_time);
        bets
    }

    /// Whether a bet id is being tracked.
    pub async fn is_active(&self, bet_id: &str) -> bool {
        self.state.lock().await.active.contains_key(bet_id)
    }

    /// Number of tracked bets.
    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active.len()
    }

    /// Re-seed a guild's bankroll.
    pub async fn reset_bankroll(&self, guild_id: &str, amount: Decimal) -> Result<GuildBankroll, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut state = self.state.lock().await;
        let today = OffsetDateTime::now_utc().date();
        let bankroll = state.bankroll_mut(guild_id, amount, today);
        bankroll.reset(amount, today);
        let bankroll = bankroll.clone();

        info!(guild_id = %guild_id, amount = %amount, "Bankroll reset");
        self.persist_bankrolls(&state).await;
        Ok(bankroll)
    }

    /// Bets awaiting manual review.
    pub async fn review_queue(&self) -> Vec<ReviewEntry> {
        self.state.lock().await.review.clone()
    }

    /// Save active bets now.
    pub async fn save_active_bets(&self) -> Result<(), LedgerError> {
        let state = self.state.lock().await;
        match &self.store {
            Some(store) => store.save_active_bets(&state.active).await,
            None => Ok(()),
        }
    }

    /// Save everything now, returning the first failure.
    pub async fn flush(&self) -> Result<(), LedgerError> {
        let state = self.state.lock().await;
        let Some(store) = &self.store else {
            return Ok(());
        };
        store.save_bankrolls(&state.bankrolls).await?;
        store.save_active_bets(&state.active).await?;
        store.save_review(&state.review).await?;
        debug!(active_bets = state.active.len(), "Ledger flushed");
        Ok(())
    }

    async fn persist_bankrolls(&self, state: &LedgerState) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_bankrolls(&state.bankrolls).await {
                error!(error = %e, "Failed to save bankrolls");
            }
        }
    }

    async fn persist_active(&self, state: &LedgerState) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_active_bets(&state.active).await {
                error!(error = %e, "Failed to save active bets");
            }
        }
    }

    async fn persist_review(&self, state: &LedgerState) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_review(&state.review).await {
                error!(error = %e, "Failed to save review queue");
            }
        }
    }
}

//! Periodic settlement of active bets against final scores.
//!
//! Each cycle walks the active bets oldest first. A bet is skipped while it is
//! younger than the minimum wait, voided once it outlives the maximum age, and
//! otherwise looked up on the scores endpoint under a prioritized list of
//! candidate sport keys.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use super::outcome::determine_outcome;
use crate::config::Config;
use crate::error::{LedgerError, ProviderError};
use crate::market::{GameScore, OddsProvider};
use crate::metrics;
use crate::notify::{Notification, Notifier};
use crate::trading::{ActiveBet, BetLedger, BetResult};
use crate::utils::wait_for_shutdown;

/// Sport keys tried for every bet after its own key and the title hints.
pub const FALLBACK_SPORTS: [&str; 13] = [
    "americanfootball_nfl",
    "basketball_nba",
    "icehockey_nhl",
    "soccer_epl",
    "baseball_mlb",
    "basketball_ncaab",
    "americanfootball_ncaaf",
    "soccer_uefa_champs_league",
    "tennis_atp",
    "tennis_wta",
    "cricket_international",
    "rugby_league_nrl",
    "aussierules_afl",
];

/// Title keywords and the sport keys they suggest, checked in order.
const SPORT_HINTS: [(&[&str], &[&str]); 5] = [
    (
        &["nfl", "football", "patriots", "cowboys"],
        &["americanfootball_nfl", "americanfootball_ncaaf"],
    ),
    (
        &["nba", "lakers", "warriors", "basketball"],
        &["basketball_nba", "basketball_ncaab"],
    ),
    (&["nhl", "hockey", "rangers", "bruins"], &["icehockey_nhl"]),
    (&["mlb", "baseball", "yankees", "dodgers"], &["baseball_mlb"]),
    (
        &["premier", "champions", "soccer", "football"],
        &["soccer_epl", "soccer_uefa_champs_league"],
    ),
];

/// Resolver timing.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Bets younger than this are not checked.
    pub min_wait: Duration,
    /// Bets older than this are voided.
    pub max_age: Duration,
    /// Pause after a rate-limited scores call.
    pub scores_backoff: StdDuration,
    /// Time between cycles.
    pub interval: StdDuration,
}

impl ResolverConfig {
    /// Timing from the application config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_wait: Duration::seconds(config.bet_min_wait_secs as i64),
            max_age: Duration::seconds(config.bet_max_age_secs as i64),
            scores_backoff: StdDuration::from_millis(config.scores_backoff_ms),
            interval: StdDuration::from_secs(config.result_check_interval_secs),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_wait: Duration::hours(2),
            max_age: Duration::days(14),
            scores_backoff: StdDuration::from_secs(1),
            interval: StdDuration::from_secs(30 * 60),
        }
    }
}

/// Where a bet sits relative to the checking window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetAge {
    /// Not old enough to check.
    TooNew,
    /// Due for a result lookup.
    Due,
    /// Past the maximum age.
    Expired,
}

/// Classify a bet's age at `now`.
pub fn classify_age(bet: &ActiveBet, now: OffsetDateTime, config: &ResolverConfig) -> BetAge {
    let age = bet.age(now);
    if age < config.min_wait {
        BetAge::TooNew
    } else if age > config.max_age {
        BetAge::Expired
    } else {
        BetAge::Due
    }
}

/// Candidate sport keys for a bet, most likely first, without duplicates.
pub fn candidate_sports(bet: &ActiveBet) -> Vec<String> {
    let title = bet.game.to_lowercase();
    let hints = SPORT_HINTS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| title.contains(k)))
        .map(|(_, sports)| *sports)
        .unwrap_or(&[]);

    let mut candidates: Vec<String> = Vec::new();
    let stored = bet.sport_key.as_deref().filter(|s| !s.is_empty());
    for sport in stored
        .into_iter()
        .chain(hints.iter().copied())
        .chain(FALLBACK_SPORTS.iter().copied())
    {
        if !candidates.iter().any(|c| c == sport) {
            candidates.push(sport.to_string());
        }
    }
    candidates
}

/// Counts from one resolver cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    /// Bets examined.
    pub checked: usize,
    /// Settled won/lost (or pushed).
    pub resolved: usize,
    /// Too new, or game not finished.
    pub waiting: usize,
    /// Voided for age.
    pub expired: usize,
    /// Sent to manual review.
    pub needs_review: usize,
    /// Errors while handling a bet.
    pub failed: usize,
}

/// Settles active bets against the scores endpoint.
pub struct ResultResolver {
    provider: Arc<dyn OddsProvider>,
    ledger: Arc<BetLedger>,
    notifier: Notifier,
    config: ResolverConfig,
    cycle_lock: Mutex<()>,
}

impl ResultResolver {
    /// Create a resolver.
    pub fn new(
        provider: Arc<dyn OddsProvider>,
        ledger: Arc<BetLedger>,
        notifier: Notifier,
        config: ResolverConfig,
    ) -> Self {
        Self {
            provider,
            ledger,
            notifier,
            config,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Timing in use.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Run one cycle now.
    pub async fn run_cycle(&self) -> CycleSummary {
        self.run_cycle_at(OffsetDateTime::now_utc()).await
    }

    /// Run one cycle as of `now`. Overlapping calls run one after the other.
    #[instrument(skip(self))]
    pub async fn run_cycle_at(&self, now: OffsetDateTime) -> CycleSummary {
        let _cycle = self.cycle_lock.lock().await;
        let _timer = metrics::timer_resolve();
        let mut summary = CycleSummary::default();

        let bets = self.ledger.active_bets().await;
        if bets.is_empty() {
            debug!("No active bets to check");
            return summary;
        }
        info!(active_bets = bets.len(), "Checking active bets for results");

        for bet in bets {
            summary.checked += 1;
            match classify_age(&bet, now, &self.config) {
                BetAge::TooNew => summary.waiting += 1,
                BetAge::Expired => self.expire(&bet, now, &mut summary).await,
                BetAge::Due => match self.find_result(&bet).await {
                    Some(game) if game.completed => self.settle(&bet, game, now, &mut summary).await,
                    _ => {
                        debug!(bet_id = %bet.bet_id, game = %bet.game, "Game not completed yet");
                        summary.waiting += 1;
                    }
                },
            }
        }

        info!(
            resolved = summary.resolved,
            waiting = summary.waiting,
            expired = summary.expired,
            needs_review = summary.needs_review,
            failed = summary.failed,
            "Bet check finished"
        );
        summary
    }

    async fn expire(&self, bet: &ActiveBet, now: OffsetDateTime, summary: &mut CycleSummary) {
        warn!(
            bet_id = %bet.bet_id,
            age_days = bet.age(now).whole_days(),
            "Expiring bet without a result"
        );
        match self.ledger.settle_at(&bet.bet_id, BetResult::Void, now).await {
            Ok(settlement) => {
                summary.expired += 1;
                self.notifier.notify(Notification::BetExpired {
                    bet: settlement.bet,
                });
            }
            Err(e) => self.record_failure(bet, e, summary),
        }
    }

    async fn settle(
        &self,
        bet: &ActiveBet,
        game: GameScore,
        now: OffsetDateTime,
        summary: &mut CycleSummary,
    ) {
        match determine_outcome(&game, bet) {
            Ok(result) => match self.ledger.settle_at(&bet.bet_id, result, now).await {
                Ok(settlement) => {
                    summary.resolved += 1;
                    self.notifier.notify(Notification::BetSettled {
                        bet: settlement.bet,
                        result,
                        bankroll: settlement.bankroll.summary(),
                    });
                }
                Err(e) => self.record_failure(bet, e, summary),
            },
            Err(reason) => {
                warn!(bet_id = %bet.bet_id, reason = %reason, "Completed game with unclear outcome");
                match self
                    .ledger
                    .flag_for_review(&bet.bet_id, &reason.to_string(), Some(game), now)
                    .await
                {
                    Ok(entry) => {
                        summary.needs_review += 1;
                        self.notifier.notify(Notification::BetNeedsReview { entry });
                    }
                    Err(e) => self.record_failure(bet, e, summary),
                }
            }
        }
    }

    fn record_failure(&self, bet: &ActiveBet, e: LedgerError, summary: &mut CycleSummary) {
        match e {
            // Settled by an overlapping caller between snapshot and update.
            LedgerError::UnknownBet { .. } => {
                debug!(bet_id = %bet.bet_id, "Bet no longer active");
            }
            e => {
                error!(bet_id = %bet.bet_id, error = %e, "Error checking bet");
                summary.failed += 1;
            }
        }
    }

    /// Look up the final score for a bet across candidate sport keys.
    ///
    /// The first entry returned for the event id is used, completed or not.
    pub async fn find_result(&self, bet: &ActiveBet) -> Option<GameScore> {
        if bet.event_id.is_empty() {
            return None;
        }

        let candidates = candidate_sports(bet);
        for sport_key in &candidates {
            match self.provider.fetch_scores(sport_key, &bet.event_id).await {
                Ok(scores) => {
                    if let Some(game) = scores.into_iter().find(|s| s.id == bet.event_id) {
                        info!(
                            event_id = %bet.event_id,
                            sport = %sport_key,
                            completed = game.completed,
                            "Found result"
                        );
                        return Some(game);
                    }
                }
                Err(ProviderError::InvalidParameters { .. }) => continue,
                Err(e @ ProviderError::RateLimited { .. }) => {
                    metrics::inc_provider_errors(e.kind());
                    warn!(sport = %sport_key, "Rate limited on scores, backing off");
                    tokio::time::sleep(self.config.scores_backoff).await;
                }
                Err(e) => {
                    metrics::inc_provider_errors(e.kind());
                    warn!(sport = %sport_key, event_id = %bet.event_id, error = %e, "Scores lookup failed");
                }
            }
        }

        debug!(
            event_id = %bet.event_id,
            sports = candidates.len(),
            "No result found"
        );
        None
    }

    /// Run cycles on the configured interval until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(interval_secs = self.config.interval.as_secs(), "Result resolver started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("Result resolver stopping");
                    return;
                }
            }
        }
    }
}

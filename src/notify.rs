//! Outbound notifications for the presentation layer.
//!
//! Producers (scanner, resolver, daily summary) push typed [`Notification`]s
//! onto a bounded channel and never wait on the consumer. A full channel
//! drops the message with a warning.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::arbitrage::{ArbitrageOpportunity, EvOpportunity};
use crate::metrics;
use crate::trading::{ActiveBet, BankrollSummary, BetResult, NetworkSummary, ReviewEntry};

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 1000;

/// One guild's line in the daily summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuildDailySummary {
    /// Guild id.
    pub guild_id: String,
    /// Bankroll figures at the time of the summary.
    pub bankroll: BankrollSummary,
}

/// Message for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Arbitrage alert for a guild.
    Arbitrage {
        /// Target guild.
        guild_id: String,
        /// Target channel, if configured.
        channel_id: Option<String>,
        /// The opportunity.
        opportunity: ArbitrageOpportunity,
    },
    /// EV alert for a guild, with the bet it registered.
    Ev {
        /// Target guild.
        guild_id: String,
        /// Target channel, if configured.
        channel_id: Option<String>,
        /// The opportunity.
        opportunity: EvOpportunity,
        /// Bet registered for the alert, if placement succeeded.
        bet_id: Option<String>,
    },
    /// A bet was settled won or lost.
    BetSettled {
        /// The bet.
        bet: ActiveBet,
        /// Result.
        result: BetResult,
        /// Bankroll after settlement.
        bankroll: BankrollSummary,
    },
    /// A bet aged out without a result and was voided.
    BetExpired {
        /// The bet.
        bet: ActiveBet,
    },
    /// A bet needs manual review.
    BetNeedsReview {
        /// The review entry.
        entry: ReviewEntry,
    },
    /// Daily summary across guilds.
    DailySummary {
        /// Per-guild figures.
        guilds: Vec<GuildDailySummary>,
        /// Network totals.
        network: NetworkSummary,
    },
}

impl Notification {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Arbitrage { .. } => "arbitrage",
            Notification::Ev { .. } => "ev",
            Notification::BetSettled { .. } => "bet_settled",
            Notification::BetExpired { .. } => "bet_expired",
            Notification::BetNeedsReview { .. } => "bet_needs_review",
            Notification::DailySummary { .. } => "daily_summary",
        }
    }
}

/// Non-blocking sender half.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    /// Create a notifier and its receiver.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Notifier whose messages go nowhere.
    pub fn disconnected() -> Self {
        let (notifier, _rx) = Self::channel(1);
        notifier
    }

    /// Queue a notification. Returns false if it was dropped.
    pub fn notify(&self, notification: Notification) -> bool {
        let kind = notification.kind();
        match self.tx.try_send(notification) {
            Ok(()) => {
                metrics::inc_alerts_sent(kind);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(kind = kind, "Notification channel full, dropping");
                metrics::inc_alerts_dropped();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(kind = kind, "No notification consumer");
                false
            }
        }
    }
}

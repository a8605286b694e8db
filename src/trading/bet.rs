//! Virtual bets and their settlement records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use time::OffsetDateTime;

use crate::arbitrage::EvOpportunity;
use crate::market::{GameScore, Selection};

/// Final state of a settled bet.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BetResult {
    /// Selection won; stake × (odds − 1) credited.
    Won,
    /// Selection lost; stake debited.
    Lost,
    /// Pushed, expired or otherwise cancelled; no P&L effect.
    Void,
}

impl BetResult {
    /// Static label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            BetResult::Won => "won",
            BetResult::Lost => "lost",
            BetResult::Void => "void",
        }
    }
}

/// A placed virtual wager awaiting resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveBet {
    /// Unique bet id.
    pub bet_id: String,
    /// Provider event id.
    pub event_id: String,
    /// Provider sport key, when known at placement.
    #[serde(default)]
    pub sport_key: Option<String>,
    /// Market key (`h2h`, `totals`, `spreads`).
    pub market_key: String,
    /// Outcome label, kept for display and legacy settlement.
    pub outcome: String,
    /// Structured side backed by the bet.
    #[serde(default)]
    pub selection: Option<Selection>,
    /// Line for totals/spreads.
    #[serde(default)]
    pub point: Option<Decimal>,
    /// Bookmaker the price was taken from.
    pub bookmaker: String,
    /// Decimal odds.
    pub odds: Decimal,
    /// Stake in currency.
    pub stake: Decimal,
    /// Owning guild.
    pub guild_id: String,
    /// Channel the alert was posted to.
    #[serde(default)]
    pub channel_id: Option<String>,
    /// "Home vs Away".
    #[serde(default)]
    pub game: String,
    /// Home team name.
    #[serde(default)]
    pub home_team: String,
    /// Away team name.
    #[serde(default)]
    pub away_team: String,
    /// EV at placement, for EV bets.
    #[serde(default)]
    pub ev_percent: Option<Decimal>,
    /// When the bet was posted.
    #[serde(with = "time::serde::rfc3339")]
    pub posted_time: OffsetDateTime,
}

impl ActiveBet {
    /// Bet id for an outcome placed by a guild.
    pub fn make_id(event_id: &str, outcome: &str, guild_id: &str) -> String {
        format!("{}:{}:{}", event_id, outcome, guild_id)
    }

    /// Build a bet from an EV opportunity.
    pub fn from_ev(
        opp: &EvOpportunity,
        guild_id: &str,
        channel_id: Option<String>,
        stake: Decimal,
        posted_time: OffsetDateTime,
    ) -> Self {
        Self {
            bet_id: Self::make_id(&opp.event.id, &opp.outcome, guild_id),
            event_id: opp.event.id.clone(),
            sport_key: Some(opp.event.sport_key.clone()).filter(|s| !s.is_empty()),
            market_key: opp.market_key.to_string(),
            outcome: opp.outcome.clone(),
            selection: Some(opp.selection.clone()),
            point: opp.point,
            bookmaker: opp.bookmaker.clone(),
            odds: opp.offered_price,
            stake,
            guild_id: guild_id.to_string(),
            channel_id,
            game: opp.event.title(),
            home_team: opp.event.home_team.clone(),
            away_team: opp.event.away_team.clone(),
            ev_percent: Some(opp.ev_percent),
            posted_time,
        }
    }

    /// Profit if the bet wins.
    pub fn potential_profit(&self) -> Decimal {
        self.stake * (self.odds - Decimal::ONE)
    }

    /// Age at `now`.
    pub fn age(&self, now: OffsetDateTime) -> time::Duration {
        now - self.posted_time
    }
}

/// Record of a settled bet in a bankroll's daily list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRecord {
    /// Bet id.
    pub bet_id: String,
    /// Provider event id.
    pub event_id: String,
    /// "Home vs Away".
    pub game: String,
    /// Market key.
    pub market_key: String,
    /// Outcome label.
    pub outcome: String,
    /// Bookmaker.
    pub bookmaker: String,
    /// Stake.
    pub stake: Decimal,
    /// Odds.
    pub odds: Decimal,
    /// Result.
    pub result: BetResult,
    /// Signed profit.
    pub profit: Decimal,
    /// EV at placement.
    #[serde(default)]
    pub ev_percent: Option<Decimal>,
    /// Settlement time.
    #[serde(with = "time::serde::rfc3339")]
    pub settled_at: OffsetDateTime,
}

/// A bet pulled from tracking because its outcome could not be determined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    /// The bet as it was tracked.
    pub bet: ActiveBet,
    /// Why it could not be settled automatically.
    pub reason: String,
    /// The completed game result, for the reviewer.
    #[serde(default)]
    pub game_result: Option<GameScore>,
    /// When it was flagged.
    #[serde(with = "time::serde::rfc3339")]
    pub flagged_at: OffsetDateTime,
}

//! Mapping a completed game onto a bet result.
//!
//! Bets placed by the scanner carry a structured [`Selection`] and line, which
//! settle directly. Bets persisted before that was recorded only have the
//! display label, so those fall back to parsing the label text.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::SettlementError;
use crate::market::normalize::{clean_label, DRAW_SYNONYMS};
use crate::market::{GameScore, MarketKey, Selection};
use crate::trading::{ActiveBet, BetResult};

static TOTAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"over\s*(\d+\.?\d*)",
        r"(\d+\.?\d*)\s*over",
        r"under\s*(\d+\.?\d*)",
        r"(\d+\.?\d*)\s*under",
        r"\bo\s*(\d+\.?\d*)",
        r"\bu\s*(\d+\.?\d*)",
        r"(\d+\.?\d*)\s*pts",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static SPREAD_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"([+-]?\d+\.?\d*)\s*spread",
        r"([+-]?\d+\.?\d*)\s*pts",
        r"([+-]?\d+\.?\d*)\s*points",
        r"\(([+-]?\d+\.?\d*)\)",
        r"([+-]?\d+\.?\d*)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Home or away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Home team.
    Home,
    /// Away team.
    Away,
}

/// Final points per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalScore {
    /// Home points.
    pub home: Decimal,
    /// Away points.
    pub away: Decimal,
}

impl FinalScore {
    /// Combined points.
    pub fn total(&self) -> Decimal {
        self.home + self.away
    }

    /// Points scored by `side`.
    pub fn of(&self, side: Side) -> Decimal {
        match side {
            Side::Home => self.home,
            Side::Away => self.away,
        }
    }

    /// Points scored against `side`.
    pub fn against(&self, side: Side) -> Decimal {
        match side {
            Side::Home => self.away,
            Side::Away => self.home,
        }
    }
}

/// Match a label to the home or away team.
///
/// An exact (case-insensitive) name wins. Otherwise the label must share a
/// word with exactly one of the two team names.
pub fn match_team(label: &str, home: &str, away: &str) -> Option<Side> {
    let label_clean = clean_label(label);
    if label_clean == clean_label(home) {
        return Some(Side::Home);
    }
    if label_clean == clean_label(away) {
        return Some(Side::Away);
    }

    let label_words = name_words(label);
    let overlaps = |team: &str| name_words(team).iter().any(|w| label_words.contains(w));

    match (overlaps(home), overlaps(away)) {
        (true, false) => Some(Side::Home),
        (false, true) => Some(Side::Away),
        _ => None,
    }
}

fn name_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !w.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_lowercase)
        .collect()
}

/// Extract home and away points from a completed game.
pub fn final_score(game: &GameScore) -> Result<FinalScore, SettlementError> {
    let scores = game
        .scores
        .as_deref()
        .filter(|s| s.len() >= 2)
        .ok_or(SettlementError::MissingScores)?;

    let mut home = None;
    let mut away = None;
    for entry in scores {
        let points = entry.points().ok_or(SettlementError::MissingScores)?;
        match match_team(&entry.name, &game.home_team, &game.away_team) {
            Some(Side::Home) if home.is_none() => home = Some(points),
            Some(Side::Away) if away.is_none() => away = Some(points),
            _ => {}
        }
    }

    match (home, away) {
        (Some(home), Some(away)) => Ok(FinalScore { home, away }),
        _ => Err(SettlementError::ScoresUnmatched {
            home: game.home_team.clone(),
            away: game.away_team.clone(),
        }),
    }
}

/// Won when `value` beats `line`, void on a push.
fn against_line(value: Decimal, line: Decimal) -> BetResult {
    match value.cmp(&line) {
        std::cmp::Ordering::Greater => BetResult::Won,
        std::cmp::Ordering::Less => BetResult::Lost,
        std::cmp::Ordering::Equal => BetResult::Void,
    }
}

/// Settle a bet against a completed game.
pub fn determine_outcome(game: &GameScore, bet: &ActiveBet) -> Result<BetResult, SettlementError> {
    let market = MarketKey::from_str(bet.market_key.trim())
        .map_err(|_| SettlementError::UnsupportedMarket(bet.market_key.clone()))?;
    let score = final_score(game)?;

    let result = match &bet.selection {
        Some(selection) => settle_structured(market, selection, bet.point, &score, game, bet)?,
        None => settle_from_label(market, &bet.outcome, &score, game)?,
    };

    debug!(
        bet_id = %bet.bet_id,
        home = %score.home,
        away = %score.away,
        result = %result,
        "Outcome determined"
    );
    Ok(result)
}

fn team_side(name: &str, game: &GameScore) -> Result<Side, SettlementError> {
    match_team(name, &game.home_team, &game.away_team).ok_or_else(|| SettlementError::TeamUnmatched {
        outcome: name.to_string(),
        home: game.home_team.clone(),
        away: game.away_team.clone(),
    })
}

fn settle_structured(
    market: MarketKey,
    selection: &Selection,
    point: Option<Decimal>,
    score: &FinalScore,
    game: &GameScore,
    bet: &ActiveBet,
) -> Result<BetResult, SettlementError> {
    let missing_line = || SettlementError::LineUnparsed(bet.outcome.clone());

    match (market, selection) {
        // A draw loses a team bet in a head-to-head market.
        (MarketKey::H2h, Selection::Team(name)) => {
            let side = team_side(name, game)?;
            Ok(win_or_lose(score.of(side) > score.against(side)))
        }
        (MarketKey::H2h, Selection::Draw) => Ok(win_or_lose(score.home == score.away)),
        (MarketKey::Totals, Selection::Over) => {
            Ok(against_line(score.total(), point.ok_or_else(missing_line)?))
        }
        (MarketKey::Totals, Selection::Under) => {
            Ok(against_line(point.ok_or_else(missing_line)?, score.total()))
        }
        (MarketKey::Spreads, Selection::Team(name)) => {
            let side = team_side(name, game)?;
            let line = point.ok_or_else(missing_line)?;
            Ok(against_line(score.of(side) + line, score.against(side)))
        }
        (MarketKey::Totals, _) => Err(SettlementError::SideUnparsed(bet.outcome.clone())),
        _ => Err(SettlementError::TeamUnmatched {
            outcome: bet.outcome.clone(),
            home: game.home_team.clone(),
            away: game.away_team.clone(),
        }),
    }
}

fn win_or_lose(won: bool) -> BetResult {
    if won {
        BetResult::Won
    } else {
        BetResult::Lost
    }
}

fn settle_from_label(
    market: MarketKey,
    outcome: &str,
    score: &FinalScore,
    game: &GameScore,
) -> Result<BetResult, SettlementError> {
    let text = clean_label(outcome);

    match market {
        MarketKey::H2h => {
            if let Some(side) = match_team(&text, &game.home_team, &game.away_team) {
                Ok(win_or_lose(score.of(side) > score.against(side)))
            } else if DRAW_SYNONYMS.iter().any(|d| text.contains(d)) {
                Ok(win_or_lose(score.home == score.away))
            } else {
                Err(SettlementError::TeamUnmatched {
                    outcome: outcome.to_string(),
                    home: game.home_team.clone(),
                    away: game.away_team.clone(),
                })
            }
        }
        MarketKey::Totals => {
            let (over, line) = parse_total(&text)?;
            if over {
                Ok(against_line(score.total(), line))
            } else {
                Ok(against_line(line, score.total()))
            }
        }
        MarketKey::Spreads => {
            let line = parse_spread(&text).ok_or_else(|| SettlementError::LineUnparsed(outcome.to_string()))?;
            let side = team_side(&text, game)?;
            Ok(against_line(score.of(side) + line, score.against(side)))
        }
    }
}

/// Parse `(is_over, line)` from a lowercase totals label.
pub fn parse_total(text: &str) -> Result<(bool, Decimal), SettlementError> {
    let line = TOTAL_PATTERNS
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| Decimal::from_str(m.as_str()).ok())
        .ok_or_else(|| SettlementError::LineUnparsed(text.to_string()))?;

    if text.contains("over") || text.starts_with("o ") || text.contains(" o ") {
        Ok((true, line))
    } else if text.contains("under") || text.starts_with("u ") || text.contains(" u ") {
        Ok((false, line))
    } else {
        Err(SettlementError::SideUnparsed(text.to_string()))
    }
}

/// Parse a signed spread from a lowercase label.
pub fn parse_spread(text: &str) -> Option<Decimal> {
    SPREAD_PATTERNS
        .iter()
        .filter_map(|re| re.captures(text))
        .filter_map(|caps| caps.get(1))
        .find_map(|m| Decimal::from_str(m.as_str().trim_start_matches('+')).ok())
}

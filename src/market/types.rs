//! Upstream odds data model: sports, events, bookmaker quotes and scores.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use time::{Duration, OffsetDateTime};

/// Events closer than this to kick-off are not scanned.
pub const MIN_LEAD_TIME: Duration = Duration::hours(1);

/// Events further out than this are not scanned.
pub const MAX_HORIZON: Duration = Duration::days(7);

/// Market types the scanner understands.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MarketKey {
    /// Head-to-head (match winner).
    H2h,
    /// Over/under on the combined score.
    Totals,
    /// Handicap.
    Spreads,
}

impl MarketKey {
    /// Human readable label.
    pub fn label(&self) -> &'static str {
        match self {
            MarketKey::H2h => "Match Winner",
            MarketKey::Totals => "Over/Under",
            MarketKey::Spreads => "Handicap",
        }
    }
}

/// A sport offered by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sport {
    /// Provider sport key, e.g. `basketball_nba`.
    pub key: String,
    /// Group name, e.g. `Basketball`.
    #[serde(default)]
    pub group: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Whether the sport currently has events.
    #[serde(default)]
    pub active: bool,
}

impl Sport {
    /// Check whether this sport should be scanned.
    pub fn is_scannable(&self, excluded_keywords: &[String]) -> bool {
        let key = self.key.to_lowercase();
        self.active
            && !excluded_keywords
                .iter()
                .any(|word| key.contains(&word.to_lowercase()))
    }
}

/// A single real-world fixture with its bookmaker quotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Provider event id.
    pub id: String,
    /// Provider sport key.
    #[serde(default)]
    pub sport_key: String,
    /// Sport display title.
    #[serde(default)]
    pub sport_title: String,
    /// Home team name.
    #[serde(default)]
    pub home_team: String,
    /// Away team name.
    #[serde(default)]
    pub away_team: String,
    /// Kick-off; `None` when the provider sent something unparseable.
    #[serde(default, with = "lenient_rfc3339")]
    pub commence_time: Option<OffsetDateTime>,
    /// Quotes per bookmaker.
    #[serde(default)]
    pub bookmakers: Vec<BookmakerQuote>,
}

impl Event {
    /// "Home vs Away".
    pub fn title(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }

    /// Time until kick-off, if known.
    pub fn lead_time(&self, now: OffsetDateTime) -> Option<Duration> {
        self.commence_time.map(|start| start - now)
    }

    /// Check whether the event starts within `[MIN_LEAD_TIME, MAX_HORIZON)` of `now`.
    pub fn is_in_detection_window(&self, now: OffsetDateTime) -> bool {
        match self.lead_time(now) {
            Some(lead) => lead >= MIN_LEAD_TIME && lead < MAX_HORIZON,
            None => false,
        }
    }
}

/// Event identity carried by detection results, without the quotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    /// Provider event id.
    pub id: String,
    /// Provider sport key.
    pub sport_key: String,
    /// Sport display title.
    pub sport_title: String,
    /// Home team name.
    pub home_team: String,
    /// Away team name.
    pub away_team: String,
    /// Kick-off.
    #[serde(default, with = "lenient_rfc3339")]
    pub commence_time: Option<OffsetDateTime>,
}

impl EventInfo {
    /// "Home vs Away".
    pub fn title(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }
}

impl From<&Event> for EventInfo {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            sport_key: event.sport_key.clone(),
            sport_title: event.sport_title.clone(),
            home_team: event.home_team.clone(),
            away_team: event.away_team.clone(),
            commence_time: event.commence_time,
        }
    }
}

/// All markets a single bookmaker offers for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmakerQuote {
    /// Provider bookmaker key.
    #[serde(default)]
    pub key: String,
    /// Bookmaker display title (what allow-lists match on).
    pub title: String,
    /// Offered markets.
    #[serde(default)]
    pub markets: Vec<Market>,
}

/// One market type offered by a bookmaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Market key as sent by the provider.
    pub key: String,
    /// Priced outcomes.
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
}

impl Market {
    /// Check whether this market is of the given type.
    pub fn is(&self, market_key: MarketKey) -> bool {
        self.key.eq_ignore_ascii_case(market_key.as_ref())
    }
}

/// A priced selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Raw label ("Over", a team name, "Draw", ...).
    pub name: String,
    /// Decimal price. Missing prices decode as zero and are dropped as invalid.
    #[serde(default)]
    pub price: Decimal,
    /// Line for totals/spreads.
    #[serde(default)]
    pub point: Option<Decimal>,
}

/// Result entry from the scores endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameScore {
    /// Provider event id.
    pub id: String,
    /// Provider sport key.
    #[serde(default)]
    pub sport_key: String,
    /// Whether the game is final.
    #[serde(default)]
    pub completed: bool,
    /// Home team name.
    #[serde(default)]
    pub home_team: String,
    /// Away team name.
    #[serde(default)]
    pub away_team: String,
    /// Kick-off.
    #[serde(default, with = "lenient_rfc3339")]
    pub commence_time: Option<OffsetDateTime>,
    /// Per-team scores; null until the game starts.
    #[serde(default)]
    pub scores: Option<Vec<TeamScore>>,
}

/// Score line for one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamScore {
    /// Team name.
    pub name: String,
    /// Score, sent as a string by the provider.
    #[serde(default)]
    pub score: Option<serde_json::Value>,
}

impl TeamScore {
    /// Numeric score, accepting both string and number encodings.
    pub fn points(&self) -> Option<Decimal> {
        match self.score.as_ref()? {
            serde_json::Value::String(s) => s.trim().parse().ok(),
            serde_json::Value::Number(n) => n.to_string().parse().ok(),
            _ => None,
        }
    }
}

/// RFC 3339 timestamps that decode to `None` instead of failing.
mod lenient_rfc3339 {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;

    pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        time::serde::rfc3339::option::serialize(value, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.and_then(|s| OffsetDateTime::parse(s.trim(), &Rfc3339).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn market_key_from_string_works() {
        assert_eq!(MarketKey::from_str("h2h").unwrap(), MarketKey::H2h);
        assert_eq!(MarketKey::from_str("TOTALS").unwrap(), MarketKey::Totals);
        assert_eq!(MarketKey::Spreads.to_string(), "spreads");
        assert!(MarketKey::from_str("outrights").is_err());
    }

    #[test]
    fn event_decodes_provider_payload() {
        let json = r#"{
            "id": "e1",
            "sport_key": "basketball_nba",
            "sport_title": "NBA",
            "commence_time": "2030-01-02T03:04:05Z",
            "home_team": "Lakers",
            "away_team": "Celtics",
            "bookmakers": [{
                "key": "tab",
                "title": "TAB",
                "markets": [{
                    "key": "totals",
                    "outcomes": [
                        {"name": "Over", "price": 1.91, "point": 220.5},
                        {"name": "Under", "price": 1.95, "point": 220.5}
                    ]
                }]
            }]
        }"#;

        let event: Event = serde_json::from_str(json).unwrap();

        assert_eq!(event.title(), "Lakers vs Celtics");
        assert!(event.commence_time.is_some());
        let outcome = &event.bookmakers[0].markets[0].outcomes[0];
        assert_eq!(outcome.price, dec!(1.91));
        assert_eq!(outcome.point, Some(dec!(220.5)));
    }

    #[test]
    fn malformed_commence_time_decodes_as_none() {
        let json = r#"{"id": "e1", "commence_time": "tomorrow-ish"}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert!(event.commence_time.is_none());
        assert!(!event.is_in_detection_window(OffsetDateTime::now_utc()));
    }

    #[test]
    fn detection_window_bounds() {
        let now = OffsetDateTime::now_utc();
        let mut event: Event = serde_json::from_str(r#"{"id": "e1"}"#).unwrap();

        event.commence_time = Some(now + Duration::minutes(59));
        assert!(!event.is_in_detection_window(now));

        event.commence_time = Some(now + Duration::hours(1));
        assert!(event.is_in_detection_window(now));

        event.commence_time = Some(now + Duration::days(6));
        assert!(event.is_in_detection_window(now));

        event.commence_time = Some(now + Duration::days(7));
        assert!(!event.is_in_detection_window(now));
    }

    #[test]
    fn sport_filter_excludes_keywords_and_inactive() {
        let excluded = vec!["outright".to_string(), "winner".to_string()];
        let sport = |key: &str, active: bool| Sport {
            key: key.to_string(),
            group: String::new(),
            title: String::new(),
            active,
        };

        assert!(sport("basketball_nba", true).is_scannable(&excluded));
        assert!(!sport("basketball_nba", false).is_scannable(&excluded));
        assert!(!sport("golf_masters_tournament_winner", true).is_scannable(&excluded));
    }

    #[test]
    fn team_score_accepts_strings_and_numbers() {
        let s: TeamScore = serde_json::from_str(r#"{"name": "A", "score": "102"}"#).unwrap();
        let n: TeamScore = serde_json::from_str(r#"{"name": "B", "score": 99}"#).unwrap();
        let missing: TeamScore = serde_json::from_str(r#"{"name": "C"}"#).unwrap();

        assert_eq!(s.points(), Some(dec!(102)));
        assert_eq!(n.points(), Some(dec!(99)));
        assert_eq!(missing.points(), None);
    }
}

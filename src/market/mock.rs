//! Mock odds provider for unit testing.
//!
//! This module provides a provider that can be used in tests
//! without making real network requests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rust_decimal::Decimal;
use time::{Duration, OffsetDateTime};

use crate::error::ProviderError;

use super::client::OddsProvider;
use super::types::{BookmakerQuote, Event, GameScore, Market, MarketKey, Outcome, Sport, TeamScore};

/// Failure the mock should return instead of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// HTTP 401.
    Unauthorized,
    /// HTTP 422.
    InvalidParameters,
    /// HTTP 429.
    RateLimited,
    /// Request timeout.
    Timeout,
    /// Non-array body.
    Malformed,
    /// Any other status code.
    Status(u16),
}

impl MockFailure {
    fn into_error(self, resource: &str) -> ProviderError {
        let resource = resource.to_string();
        match self {
            MockFailure::Unauthorized => ProviderError::Unauthorized,
            MockFailure::InvalidParameters => ProviderError::InvalidParameters { resource },
            MockFailure::RateLimited => ProviderError::RateLimited { resource },
            MockFailure::Timeout => ProviderError::Timeout { resource },
            MockFailure::Malformed => ProviderError::Malformed {
                resource,
                reason: "mock malformed body".to_string(),
            },
            MockFailure::Status(status) => ProviderError::Status { status, resource },
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    sports: Vec<Sport>,
    odds: HashMap<(String, MarketKey), Vec<Event>>,
    scores: HashMap<String, Vec<GameScore>>,
    failures: HashMap<String, VecDeque<MockFailure>>,
    calls: HashMap<String, usize>,
}

/// Mock odds provider for testing.
///
/// Resources are addressed as `sports`, `odds:{sport}:{market}` and
/// `scores:{sport}` for failure injection and call counting.
#[derive(Debug, Clone, Default)]
pub struct MockOddsProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockOddsProvider {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not cascade into unrelated assertions.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Convenience constructor for a sport entry.
    pub fn sport(key: &str, active: bool) -> Sport {
        Sport {
            key: key.to_string(),
            group: String::new(),
            title: key.to_string(),
            active,
        }
    }

    /// Set the sports list.
    pub fn set_sports(&self, sports: Vec<Sport>) {
        self.state().sports = sports;
    }

    /// Set the odds returned for a sport and market.
    pub fn set_odds(&self, sport_key: &str, market: MarketKey, events: Vec<Event>) {
        self.state()
            .odds
            .insert((sport_key.to_string(), market), events);
    }

    /// Add a score entry under a sport key.
    pub fn add_score(&self, sport_key: &str, score: GameScore) {
        self.state()
            .scores
            .entry(sport_key.to_string())
            .or_default()
            .push(score);
    }

    /// Queue a failure for the next call on `resource`.
    pub fn fail_next(&self, resource: &str, failure: MockFailure) {
        self.state()
            .failures
            .entry(resource.to_string())
            .or_default()
            .push_back(failure);
    }

    /// Number of calls made for `resource`.
    pub fn calls(&self, resource: &str) -> usize {
        self.state().calls.get(resource).copied().unwrap_or(0)
    }

    /// Total calls across every resource.
    pub fn total_calls(&self) -> usize {
        self.state().calls.values().sum()
    }

    /// Clear all mock data.
    pub fn clear(&self) {
        *self.state() = MockState::default();
    }

    /// Count the call and pop a queued failure, if any.
    fn begin_call(&self, resource: &str) -> Result<(), ProviderError> {
        let mut state = self.state();
        *state.calls.entry(resource.to_string()).or_default() += 1;
        match state.failures.get_mut(resource).and_then(VecDeque::pop_front) {
            Some(failure) => Err(failure.into_error(resource)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl OddsProvider for MockOddsProvider {
    async fn fetch_sports(&self) -> Result<Vec<Sport>, ProviderError> {
        self.begin_call("sports")?;
        Ok(self.state().sports.clone())
    }

    async fn fetch_odds(
        &self,
        sport_key: &str,
        market: MarketKey,
    ) -> Result<Vec<Event>, ProviderError> {
        self.begin_call(&format!("odds:{}:{}", sport_key, market))?;
        Ok(self
            .state()
            .odds
            .get(&(sport_key.to_string(), market))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_scores(
        &self,
        sport_key: &str,
        event_id: &str,
    ) -> Result<Vec<GameScore>, ProviderError> {
        self.begin_call(&format!("scores:{}", sport_key))?;
        Ok(self
            .state()
            .scores
            .get(sport_key)
            .map(|scores| scores.iter().filter(|s| s.id == event_id).cloned().collect())
            .unwrap_or_default())
    }
}

/// Builder for mock events.
#[derive(Debug, Clone)]
pub struct MockEventBuilder {
    event: Event,
}

impl MockEventBuilder {
    /// Start an event that commences one day from now.
    pub fn new(id: &str, home_team: &str, away_team: &str) -> Self {
        Self {
            event: Event {
                id: id.to_string(),
                sport_key: "basketball_nba".to_string(),
                sport_title: "NBA".to_string(),
                home_team: home_team.to_string(),
                away_team: away_team.to_string(),
                commence_time: Some(OffsetDateTime::now_utc() + Duration::days(1)),
                bookmakers: Vec::new(),
            },
        }
    }

    /// Set the sport key.
    pub fn sport(mut self, sport_key: &str) -> Self {
        self.event.sport_key = sport_key.to_string();
        self
    }

    /// Set the kick-off relative to now.
    pub fn commence_in(mut self, lead: Duration) -> Self {
        self.event.commence_time = Some(OffsetDateTime::now_utc() + lead);
        self
    }

    /// Set an absolute kick-off (or none).
    pub fn commence_at(mut self, at: Option<OffsetDateTime>) -> Self {
        self.event.commence_time = at;
        self
    }

    /// Add a priced outcome without a line.
    pub fn price(self, bookmaker: &str, market: MarketKey, name: &str, price: Decimal) -> Self {
        self.line(bookmaker, market, name, price, None)
    }

    /// Add a priced outcome, creating the bookmaker and market as needed.
    pub fn line(
        mut self,
        bookmaker: &str,
        market: MarketKey,
        name: &str,
        price: Decimal,
        point: Option<Decimal>,
    ) -> Self {
        let quote = match self.event.bookmakers.iter().position(|b| b.title == bookmaker) {
            Some(index) => &mut self.event.bookmakers[index],
            None => {
                self.event.bookmakers.push(BookmakerQuote {
                    key: bookmaker.to_lowercase(),
                    title: bookmaker.to_string(),
                    markets: Vec::new(),
                });
                let last = self.event.bookmakers.len() - 1;
                &mut self.event.bookmakers[last]
            }
        };

        let market_entry = match quote.markets.iter().position(|m| m.is(market)) {
            Some(index) => &mut quote.markets[index],
            None => {
                quote.markets.push(Market {
                    key: market.to_string(),
                    outcomes: Vec::new(),
                });
                let last = quote.markets.len() - 1;
                &mut quote.markets[last]
            }
        };

        market_entry.outcomes.push(Outcome {
            name: name.to_string(),
            price,
            point,
        });
        self
    }

    /// Build the event.
    pub fn build(self) -> Event {
        self.event
    }
}

/// A completed score line for `event_id`.
pub fn final_score(
    event_id: &str,
    home_team: &str,
    away_team: &str,
    home_score: u32,
    away_score: u32,
) -> GameScore {
    GameScore {
        id: event_id.to_string(),
        sport_key: String::new(),
        completed: true,
        home_team: home_team.to_string(),
        away_team: away_team.to_string(),
        commence_time: None,
        scores: Some(vec![
            TeamScore {
                name: home_team.to_string(),
                score: Some(serde_json::Value::String(home_score.to_string())),
            },
            TeamScore {
                name: away_team.to_string(),
                score: Some(serde_json::Value::String(away_score.to_string())),
            },
        ]),
    }
}

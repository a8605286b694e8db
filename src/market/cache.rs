//! Read-through odds cache.
//!
//! Upstream failures never escape this module: every lookup yields a
//! (possibly empty) list plus a [`Freshness`] tag so callers can tell
//! "nothing on offer" apart from "provider unavailable".

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::error::ProviderError;
use crate::metrics;

use super::client::OddsProvider;
use super::types::{Event, MarketKey, Sport};

/// Where a lookup result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served from a live cache entry.
    Cached,
    /// Fetched from the provider (possibly a definitive empty answer).
    Fetched,
    /// Provider failed; the result is empty and was not cached.
    Unavailable,
}

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub struct Lookup<T> {
    /// Items, shared with the cache.
    pub data: Arc<Vec<T>>,
    /// Origin of the items.
    pub freshness: Freshness,
}

impl<T> Lookup<T> {
    fn unavailable() -> Self {
        Self {
            data: Arc::new(Vec::new()),
            freshness: Freshness::Unavailable,
        }
    }

    /// Check whether the provider failed for this lookup.
    pub fn is_unavailable(&self) -> bool {
        self.freshness == Freshness::Unavailable
    }
}

#[derive(Debug)]
struct CacheEntry<T> {
    data: Arc<Vec<T>>,
    fetched_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(data: Vec<T>) -> Self {
        Self {
            data: Arc::new(data),
            fetched_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Time-bounded cache of the sports list and per-(sport, market) odds.
///
/// Concurrent misses for the same key may both hit the provider; the last
/// writer wins.
pub struct OddsCache {
    provider: Arc<dyn OddsProvider>,
    odds: DashMap<(String, MarketKey), CacheEntry<Event>>,
    sports: RwLock<Option<CacheEntry<Sport>>>,
    odds_ttl: Duration,
    sports_ttl: Duration,
    retry_delay: Duration,
    excluded_keywords: Vec<String>,
}

impl OddsCache {
    /// Create a cache in front of `provider`.
    pub fn new(provider: Arc<dyn OddsProvider>, config: &Config) -> Self {
        Self {
            provider,
            odds: DashMap::new(),
            sports: RwLock::new(None),
            odds_ttl: config.odds_cache_ttl(),
            sports_ttl: config.sports_cache_ttl(),
            retry_delay: config.rate_limit_retry(),
            excluded_keywords: config.excluded_sport_keywords.clone(),
        }
    }

    /// Underlying provider, for callers that bypass the cache (scores).
    pub fn provider(&self) -> &Arc<dyn OddsProvider> {
        &self.provider
    }

    /// Scannable sports.
    pub async fn get_sports(&self) -> Arc<Vec<Sport>> {
        self.lookup_sports().await.data
    }

    /// Odds for one sport and market.
    pub async fn get_odds(&self, sport_key: &str, market: MarketKey) -> Arc<Vec<Event>> {
        self.lookup_odds(sport_key, market).await.data
    }

    /// Scannable sports, with provenance.
    #[instrument(skip(self))]
    pub async fn lookup_sports(&self) -> Lookup<Sport> {
        if let Some(entry) = self.sports.read().await.as_ref() {
            if entry.is_fresh(self.sports_ttl) {
                metrics::inc_cache_hits("sports");
                return Lookup {
                    data: Arc::clone(&entry.data),
                    freshness: Freshness::Cached,
                };
            }
        }
        metrics::inc_cache_misses("sports");

        let sports = match self.provider.fetch_sports().await {
            Ok(all) => {
                let total = all.len();
                let kept: Vec<Sport> = all
                    .into_iter()
                    .filter(|s| s.is_scannable(&self.excluded_keywords))
                    .collect();
                debug!(total, kept = kept.len(), "Fetched sports list");
                kept
            }
            Err(e) => {
                metrics::inc_provider_errors(e.kind());
                if !caches_as_empty(&e) {
                    log_provider_failure(&e, "sports");
                    return Lookup::unavailable();
                }
                debug!(error = %e, "Caching empty sports list");
                Vec::new()
            }
        };

        let entry = CacheEntry::new(sports);
        let data = Arc::clone(&entry.data);
        *self.sports.write().await = Some(entry);

        Lookup {
            data,
            freshness: Freshness::Fetched,
        }
    }

    /// Odds for one sport and market, with provenance.
    #[instrument(skip(self), fields(market = %market))]
    pub async fn lookup_odds(&self, sport_key: &str, market: MarketKey) -> Lookup<Event> {
        let key = (sport_key.to_string(), market);

        // The map guard must not be held across an await.
        let cached = self
            .odds
            .get(&key)
            .filter(|entry| entry.is_fresh(self.odds_ttl))
            .map(|entry| Arc::clone(&entry.data));
        if let Some(data) = cached {
            metrics::inc_cache_hits("odds");
            return Lookup {
                data,
                freshness: Freshness::Cached,
            };
        }
        metrics::inc_cache_misses("odds");

        let events = match self.fetch_odds_with_retry(sport_key, market).await {
            Ok(events) => events,
            Err(e) => {
                metrics::inc_provider_errors(e.kind());
                if !caches_as_empty(&e) {
                    log_provider_failure(&e, sport_key);
                    return Lookup::unavailable();
                }
                debug!(error = %e, "Caching empty odds snapshot");
                Vec::new()
            }
        };

        let entry = CacheEntry::new(events);
        let data = Arc::clone(&entry.data);
        self.odds.insert(key, entry);

        Lookup {
            data,
            freshness: Freshness::Fetched,
        }
    }

    async fn fetch_odds_with_retry(
        &self,
        sport_key: &str,
        market: MarketKey,
    ) -> Result<Vec<Event>, ProviderError> {
        match self.provider.fetch_odds(sport_key, market).await {
            Err(ProviderError::RateLimited { .. }) => {
                warn!(
                    sport = %sport_key,
                    retry_in_ms = self.retry_delay.as_millis() as u64,
                    "Rate limited, retrying once"
                );
                tokio::time::sleep(self.retry_delay).await;
                self.provider.fetch_odds(sport_key, market).await
            }
            other => other,
        }
    }

    /// Drop every cached entry.
    pub async fn invalidate(&self) {
        self.odds.clear();
        *self.sports.write().await = None;
        info!("Odds cache invalidated");
    }

    /// Number of cached (sport, market) snapshots.
    pub fn len(&self) -> usize {
        self.odds.len()
    }

    /// Check if no odds snapshot is cached.
    pub fn is_empty(&self) -> bool {
        self.odds.is_empty()
    }
}

/// Definitive answers are cached as empty so a dead combination is not
/// re-requested until the TTL expires.
fn caches_as_empty(error: &ProviderError) -> bool {
    matches!(
        error,
        ProviderError::InvalidParameters { .. } | ProviderError::Malformed { .. }
    )
}

fn log_provider_failure(error: &ProviderError, resource: &str) {
    match error {
        ProviderError::Unauthorized => {
            error!(resource = %resource, "Odds provider rejected the API key")
        }
        other => warn!(resource = %resource, error = %other, "Odds provider unavailable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::mock::{MockEventBuilder, MockFailure, MockOddsProvider};
    use rust_decimal_macros::dec;

    fn cache_with(mock: &MockOddsProvider) -> OddsCache {
        let config = Config::with_api_key("test");
        OddsCache::new(Arc::new(mock.clone()), &config)
    }

    fn sample_event() -> Event {
        MockEventBuilder::new("e1", "Lakers", "Celtics")
            .price("TAB", MarketKey::H2h, "Lakers", dec!(2.10))
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn odds_are_served_from_cache_within_ttl() {
        let mock = MockOddsProvider::new();
        mock.set_odds("basketball_nba", MarketKey::H2h, vec![sample_event()]);
        let cache = cache_with(&mock);

        let first = cache.lookup_odds("basketball_nba", MarketKey::H2h).await;
        let second = cache.lookup_odds("basketball_nba", MarketKey::H2h).await;

        assert_eq!(first.freshness, Freshness::Fetched);
        assert_eq!(second.freshness, Freshness::Cached);
        assert_eq!(second.data.len(), 1);
        assert_eq!(mock.calls("odds:basketball_nba:h2h"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn odds_are_refetched_after_ttl() {
        let mock = MockOddsProvider::new();
        mock.set_odds("basketball_nba", MarketKey::H2h, vec![sample_event()]);
        let cache = cache_with(&mock);

        cache.get_odds("basketball_nba", MarketKey::H2h).await;
        tokio::time::advance(Duration::from_secs(16)).await;
        cache.get_odds("basketball_nba", MarketKey::H2h).await;

        assert_eq!(mock.calls("odds:basketball_nba:h2h"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_is_retried_exactly_once() {
        let mock = MockOddsProvider::new();
        mock.set_odds("basketball_nba", MarketKey::H2h, vec![sample_event()]);
        mock.fail_next("odds:basketball_nba:h2h", MockFailure::RateLimited);
        let cache = cache_with(&mock);

        let lookup = cache.lookup_odds("basketball_nba", MarketKey::H2h).await;

        assert_eq!(lookup.data.len(), 1);
        assert_eq!(mock.calls("odds:basketball_nba:h2h"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_rate_limit_degrades_to_unavailable() {
        let mock = MockOddsProvider::new();
        mock.fail_next("odds:basketball_nba:h2h", MockFailure::RateLimited);
        mock.fail_next("odds:basketball_nba:h2h", MockFailure::RateLimited);
        let cache = cache_with(&mock);

        let lookup = cache.lookup_odds("basketball_nba", MarketKey::H2h).await;

        assert!(lookup.is_unavailable());
        assert!(lookup.data.is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_parameters_are_cached_as_empty() {
        let mock = MockOddsProvider::new();
        mock.fail_next("odds:golf_masters:spreads", MockFailure::InvalidParameters);
        let cache = cache_with(&mock);

        let first = cache.lookup_odds("golf_masters", MarketKey::Spreads).await;
        let second = cache.lookup_odds("golf_masters", MarketKey::Spreads).await;

        assert_eq!(first.freshness, Freshness::Fetched);
        assert!(first.data.is_empty());
        assert_eq!(second.freshness, Freshness::Cached);
        assert_eq!(mock.calls("odds:golf_masters:spreads"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_body_is_cached_as_empty() {
        let mock = MockOddsProvider::new();
        mock.fail_next("odds:basketball_nba:h2h", MockFailure::Malformed);
        mock.set_odds("basketball_nba", MarketKey::H2h, vec![sample_event()]);
        let cache = cache_with(&mock);

        let first = cache.lookup_odds("basketball_nba", MarketKey::H2h).await;
        let second = cache.lookup_odds("basketball_nba", MarketKey::H2h).await;

        assert_eq!(first.freshness, Freshness::Fetched);
        assert!(first.data.is_empty());
        assert_eq!(second.freshness, Freshness::Cached);
        assert!(second.data.is_empty());
        assert_eq!(mock.calls("odds:basketball_nba:h2h"), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_not_cached() {
        let mock = MockOddsProvider::new();
        mock.fail_next("odds:basketball_nba:h2h", MockFailure::Timeout);
        mock.set_odds("basketball_nba", MarketKey::H2h, vec![sample_event()]);
        let cache = cache_with(&mock);

        let failed = cache.lookup_odds("basketball_nba", MarketKey::H2h).await;
        let recovered = cache.lookup_odds("basketball_nba", MarketKey::H2h).await;

        assert!(failed.is_unavailable());
        assert_eq!(recovered.freshness, Freshness::Fetched);
        assert_eq!(recovered.data.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_is_not_cached() {
        let mock = MockOddsProvider::new();
        mock.fail_next("odds:basketball_nba:h2h", MockFailure::Unauthorized);
        mock.set_odds("basketball_nba", MarketKey::H2h, vec![sample_event()]);
        let cache = cache_with(&mock);

        let failed = cache.lookup_odds("basketball_nba", MarketKey::H2h).await;
        let recovered = cache.lookup_odds("basketball_nba", MarketKey::H2h).await;

        assert!(failed.is_unavailable());
        assert_eq!(recovered.data.len(), 1);
        assert_eq!(mock.calls("odds:basketball_nba:h2h"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sports_list_is_filtered_and_cached() {
        let mock = MockOddsProvider::new();
        mock.set_sports(vec![
            MockOddsProvider::sport("basketball_nba", true),
            MockOddsProvider::sport("icehockey_nhl", false),
            MockOddsProvider::sport("americanfootball_nfl_super_bowl_winner", true),
        ]);
        let cache = cache_with(&mock);

        let sports = cache.get_sports().await;
        cache.get_sports().await;

        assert_eq!(sports.len(), 1);
        assert_eq!(sports[0].key, "basketball_nba");
        assert_eq!(mock.calls("sports"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sports_list_is_not_retried_on_rate_limit() {
        let mock = MockOddsProvider::new();
        mock.fail_next("sports", MockFailure::RateLimited);
        let cache = cache_with(&mock);

        let lookup = cache.lookup_sports().await;

        assert!(lookup.is_unavailable());
        assert_eq!(mock.calls("sports"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refetch() {
        let mock = MockOddsProvider::new();
        mock.set_odds("basketball_nba", MarketKey::H2h, vec![sample_event()]);
        let cache = cache_with(&mock);

        cache.get_odds("basketball_nba", MarketKey::H2h).await;
        cache.invalidate().await;
        cache.get_odds("basketball_nba", MarketKey::H2h).await;

        assert_eq!(mock.calls("odds:basketball_nba:h2h"), 2);
    }
}

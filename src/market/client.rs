//! Odds provider client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::config::Config;
use crate::error::ProviderError;
use crate::metrics;

use super::types::{Event, GameScore, MarketKey, Sport};

/// Source of sports, odds and scores.
///
/// Implementations report every upstream condition as a typed error; the
/// policy for each (retry, cache empty, give up) lives in the callers.
#[async_trait]
pub trait OddsProvider: Send + Sync {
    /// List all sports.
    async fn fetch_sports(&self) -> Result<Vec<Sport>, ProviderError>;

    /// Fetch decimal odds for one sport and market.
    async fn fetch_odds(&self, sport_key: &str, market: MarketKey)
        -> Result<Vec<Event>, ProviderError>;

    /// Fetch scores for one event under a candidate sport key.
    async fn fetch_scores(
        &self,
        sport_key: &str,
        event_id: &str,
    ) -> Result<Vec<GameScore>, ProviderError>;
}

/// HTTP client for the odds provider REST API.
#[derive(Debug, Clone)]
pub struct OddsApiClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Base URL, always ending in `/`.
    base_url: Url,
    /// API key sent on every request.
    api_key: String,
    /// Bookmaker region.
    region: String,
    /// Timeout for odds/sports calls.
    timeout: Duration,
    /// Timeout for scores calls.
    scores_timeout: Duration,
    /// History window requested from the scores endpoint.
    scores_days_from: u32,
}

impl OddsApiClient {
    /// Create a new client from config.
    pub fn new(config: &Config) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        let mut base = config.odds_api_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            http,
            base_url: Url::parse(&base)?,
            api_key: config.odds_api_key.clone(),
            region: config.odds_region.clone(),
            timeout: Duration::from_secs(config.http_timeout_secs),
            scores_timeout: Duration::from_secs(config.scores_timeout_secs),
            scores_days_from: config.scores_days_from,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Issue a GET and return the top-level JSON array.
    async fn get_array(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
        endpoint: &'static str,
    ) -> Result<Vec<Value>, ProviderError> {
        let url = self.base_url.join(path)?;
        let resource = path.trim_end_matches('/').to_string();
        let start = Instant::now();

        let result = self
            .http
            .get(url)
            .query(&[("apiKey", self.api_key.as_str())])
            .query(query)
            .timeout(timeout)
            .send()
            .await;
        metrics::record_http_latency(start, endpoint);

        let response = result.map_err(|e| classify_transport_error(e, &resource))?;
        let status = response.status().as_u16();

        match status {
            200 => {}
            401 => return Err(ProviderError::Unauthorized),
            422 => return Err(ProviderError::InvalidParameters { resource }),
            429 => return Err(ProviderError::RateLimited { resource }),
            _ => return Err(ProviderError::Status { status, resource }),
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| classify_transport_error(e, &resource))?;

        match body {
            Value::Array(items) => Ok(items),
            other => Err(ProviderError::Malformed {
                resource,
                reason: format!("expected array, got {}", json_type(&other)),
            }),
        }
    }
}

#[async_trait]
impl OddsProvider for OddsApiClient {
    #[instrument(skip(self))]
    async fn fetch_sports(&self) -> Result<Vec<Sport>, ProviderError> {
        let items = self
            .get_array("sports/", &[], self.timeout, "sports")
            .await?;
        Ok(decode_items(items, "sports"))
    }

    #[instrument(skip(self), fields(market = %market))]
    async fn fetch_odds(
        &self,
        sport_key: &str,
        market: MarketKey,
    ) -> Result<Vec<Event>, ProviderError> {
        let path = format!("sports/{}/odds/", sport_key);
        let query = [
            ("regions", self.region.clone()),
            ("markets", market.to_string()),
            ("oddsFormat", "decimal".to_string()),
            ("dateFormat", "iso".to_string()),
        ];
        let items = self.get_array(&path, &query, self.timeout, "odds").await?;
        Ok(decode_items(items, &path))
    }

    #[instrument(skip(self))]
    async fn fetch_scores(
        &self,
        sport_key: &str,
        event_id: &str,
    ) -> Result<Vec<GameScore>, ProviderError> {
        let path = format!("sports/{}/scores/", sport_key);
        let query = [
            ("eventIds", event_id.to_string()),
            ("daysFrom", self.scores_days_from.to_string()),
            ("dateFormat", "iso".to_string()),
        ];
        let items = self
            .get_array(&path, &query, self.scores_timeout, "scores")
            .await?;
        Ok(decode_items(items, &path))
    }
}

/// Decode array items one by one, dropping the ones that don't fit.
pub fn decode_items<T: DeserializeOwned>(items: Vec<Value>, resource: &str) -> Vec<T> {
    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(resource = %resource, error = %e, "Dropping malformed item");
                None
            }
        })
        .collect();

    if decoded.len() < total {
        debug!(
            resource = %resource,
            kept = decoded.len(),
            total,
            "Some items failed validation"
        );
    }
    decoded
}

fn classify_transport_error(error: reqwest::Error, resource: &str) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout {
            resource: resource.to_string(),
        }
    } else if error.is_decode() {
        ProviderError::Malformed {
            resource: resource.to_string(),
            reason: error.to_string(),
        }
    } else {
        ProviderError::Http(error)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

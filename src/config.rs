//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Odds Provider ===
    /// API key for the odds provider.
    pub odds_api_key: String,

    /// Odds provider base URL.
    #[serde(default = "default_odds_api_url")]
    pub odds_api_url: String,

    /// Bookmaker region queried.
    #[serde(default = "default_region")]
    pub odds_region: String,

    /// Per-request timeout for odds/sports calls.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Per-request timeout for scores calls.
    #[serde(default = "default_scores_timeout")]
    pub scores_timeout_secs: u64,

    // === Odds Cache ===
    /// TTL of a cached (sport, market) odds snapshot.
    #[serde(default = "default_cache_ttl")]
    pub odds_cache_ttl_secs: u64,

    /// TTL of the cached sports list.
    #[serde(default = "default_cache_ttl")]
    pub sports_cache_ttl_secs: u64,

    /// Pause before the single retry after HTTP 429.
    #[serde(default = "default_rate_limit_retry")]
    pub rate_limit_retry_ms: u64,

    /// Concurrent odds fetches during a scan.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Sport keys containing any of these words are never scanned.
    #[serde(default = "default_excluded_keywords")]
    pub excluded_sport_keywords: Vec<String>,

    // === Detection ===
    /// Default minimum arbitrage margin (percent).
    #[serde(default = "default_min_margin")]
    pub default_min_margin: Decimal,

    /// Default minimum EV (percent).
    #[serde(default = "default_min_ev")]
    pub default_min_ev: Decimal,

    /// Default bookmaker allow-list.
    #[serde(default = "default_bookmakers")]
    pub bookmakers: Vec<String>,

    /// Maximum arbitrage alerts per guild per scan.
    #[serde(default = "default_max_arb_alerts")]
    pub max_arb_alerts: usize,

    /// Maximum EV alerts per guild per scan.
    #[serde(default = "default_max_ev_alerts")]
    pub max_ev_alerts: usize,

    /// Seconds between full scans.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    // === Staking ===
    /// Starting bankroll for new guilds (dollars).
    #[serde(default = "default_bankroll")]
    pub default_bankroll: Decimal,

    /// Decimal places for unit stakes.
    #[serde(default = "default_units_precision")]
    pub stake_units_precision: u32,

    /// Decimal places for dollar stakes.
    #[serde(default = "default_dollars_precision")]
    pub stake_dollars_precision: u32,

    // === Settlement ===
    /// Seconds between result polling passes.
    #[serde(default = "default_result_interval")]
    pub result_check_interval_secs: u64,

    /// Minimum age of a bet before its result is checked.
    #[serde(default = "default_bet_min_wait")]
    pub bet_min_wait_secs: u64,

    /// Age after which an unresolved bet is voided.
    #[serde(default = "default_bet_max_age")]
    pub bet_max_age_secs: u64,

    /// Pause after a 429 from the scores endpoint.
    #[serde(default = "default_scores_backoff")]
    pub scores_backoff_ms: u64,

    /// Days of history requested from the scores endpoint.
    #[serde(default = "default_scores_days_from")]
    pub scores_days_from: u32,

    // === Persistence ===
    /// Guild settings file.
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,

    /// Bankroll store.
    #[serde(default = "default_bankroll_file")]
    pub bankroll_file: PathBuf,

    /// Active bets store.
    #[serde(default = "default_active_bets_file")]
    pub active_bets_file: PathBuf,

    /// Bets flagged for manual review.
    #[serde(default = "default_review_file")]
    pub review_file: PathBuf,

    // === Server Configuration ===
    /// HTTP server port for the status API.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Emit JSON log lines.
    #[serde(default)]
    pub log_json: bool,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,

    /// Expose Prometheus metrics.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Prometheus exporter port.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_odds_api_url() -> String {
    "https://api.the-odds-api.com/v4/".to_string()
}

fn default_region() -> String {
    "au".to_string()
}

fn default_http_timeout() -> u64 {
    20
}

fn default_scores_timeout() -> u64 {
    20
}

fn default_cache_ttl() -> u64 {
    15
}

fn default_rate_limit_retry() -> u64 {
    2000
}

fn default_fetch_concurrency() -> usize {
    4
}

fn default_excluded_keywords() -> Vec<String> {
    [
        "winner", "futures", "election", "olympics", "medal", "outright", "mvp", "prop", "draft",
        "special",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_min_margin() -> Decimal {
    Decimal::new(20, 1) // 2.0%
}

fn default_min_ev() -> Decimal {
    Decimal::new(50, 1) // 5.0%
}

/// Bookmakers scanned when a guild has not chosen its own.
pub fn default_bookmakers() -> Vec<String> {
    [
        "PlayUp",
        "Unibet",
        "TAB",
        "Ladbrokes",
        "PointsBet (AU)",
        "Neds",
        "Sportsbet",
        "Dabble",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_arb_alerts() -> usize {
    3
}

fn default_max_ev_alerts() -> usize {
    5
}

fn default_scan_interval() -> u64 {
    3600
}

fn default_bankroll() -> Decimal {
    Decimal::new(1000, 0) // $1000
}

fn default_units_precision() -> u32 {
    1
}

fn default_dollars_precision() -> u32 {
    2
}

fn default_result_interval() -> u64 {
    1800
}

fn default_bet_min_wait() -> u64 {
    2 * 3600
}

fn default_bet_max_age() -> u64 {
    14 * 86_400
}

fn default_scores_backoff() -> u64 {
    1000
}

fn default_scores_days_from() -> u32 {
    3
}

fn default_settings_file() -> PathBuf {
    PathBuf::from("guild_settings.json")
}

fn default_bankroll_file() -> PathBuf {
    PathBuf::from("bankroll_data.json")
}

fn default_active_bets_file() -> PathBuf {
    PathBuf::from("active_bets.json")
}

fn default_review_file() -> PathBuf {
    PathBuf::from("review_bets.json")
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Configuration with every default filled in and the given API key.
    pub fn with_api_key(odds_api_key: impl Into<String>) -> Self {
        Self {
            odds_api_key: odds_api_key.into(),
            odds_api_url: default_odds_api_url(),
            odds_region: default_region(),
            http_timeout_secs: default_http_timeout(),
            scores_timeout_secs: default_scores_timeout(),
            odds_cache_ttl_secs: default_cache_ttl(),
            sports_cache_ttl_secs: default_cache_ttl(),
            rate_limit_retry_ms: default_rate_limit_retry(),
            fetch_concurrency: default_fetch_concurrency(),
            excluded_sport_keywords: default_excluded_keywords(),
            default_min_margin: default_min_margin(),
            default_min_ev: default_min_ev(),
            bookmakers: default_bookmakers(),
            max_arb_alerts: default_max_arb_alerts(),
            max_ev_alerts: default_max_ev_alerts(),
            scan_interval_secs: default_scan_interval(),
            default_bankroll: default_bankroll(),
            stake_units_precision: default_units_precision(),
            stake_dollars_precision: default_dollars_precision(),
            result_check_interval_secs: default_result_interval(),
            bet_min_wait_secs: default_bet_min_wait(),
            bet_max_age_secs: default_bet_max_age(),
            scores_backoff_ms: default_scores_backoff(),
            scores_days_from: default_scores_days_from(),
            settings_file: default_settings_file(),
            bankroll_file: default_bankroll_file(),
            active_bets_file: default_active_bets_file(),
            review_file: default_review_file(),
            port: default_port(),
            rust_log: default_log_level(),
            log_json: false,
            verbose: false,
            metrics_enabled: default_true(),
            metrics_port: default_metrics_port(),
        }
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.odds_api_key.trim().is_empty() {
            return Err("ODDS_API_KEY is required".to_string());
        }

        if url::Url::parse(&self.odds_api_url).is_err() {
            return Err(format!("ODDS_API_URL is not a valid url: {}", self.odds_api_url));
        }

        if self.default_min_margin < Decimal::ZERO {
            return Err("DEFAULT_MIN_MARGIN must not be negative".to_string());
        }

        if self.default_bankroll <= Decimal::ZERO {
            return Err("DEFAULT_BANKROLL must be positive".to_string());
        }

        if self.fetch_concurrency == 0 {
            return Err("FETCH_CONCURRENCY must be at least 1".to_string());
        }

        if self.bet_min_wait_secs >= self.bet_max_age_secs {
            return Err("BET_MIN_WAIT_SECS must be less than BET_MAX_AGE_SECS".to_string());
        }

        Ok(())
    }

    /// Odds cache TTL.
    pub fn odds_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.odds_cache_ttl_secs)
    }

    /// Sports list cache TTL.
    pub fn sports_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.sports_cache_ttl_secs)
    }

    /// Delay before retrying a rate-limited odds call.
    pub fn rate_limit_retry(&self) -> Duration {
        Duration::from_millis(self.rate_limit_retry_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_sensible() {
        assert_eq!(default_min_margin(), Decimal::new(2, 0));
        assert_eq!(default_min_ev(), Decimal::new(5, 0));
        assert_eq!(default_cache_ttl(), 15);
        assert_eq!(default_bet_max_age(), 1_209_600);
        assert_eq!(default_bookmakers().len(), 8);
        assert!(default_excluded_keywords().contains(&"outright".to_string()));
    }

    #[test]
    fn validate_accepts_defaults() {
        let config = Config::with_api_key("key");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_api_key() {
        let config = Config::with_api_key("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_bet_windows() {
        let mut config = Config::with_api_key("key");
        config.bet_min_wait_secs = config.bet_max_age_secs;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_url() {
        let mut config = Config::with_api_key("key");
        config.odds_api_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}

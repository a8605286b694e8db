//! Unified error types for the odds scanner.

use rust_decimal::Decimal;
use thiserror::Error;

/// Unified error type for the odds scanner.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration value rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Upstream odds provider error.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Arbitrage detection/sizing error.
    #[error("arbitrage error: {0}")]
    Arbitrage(#[from] ArbitrageError),

    /// Bankroll or active-bet ledger error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Upstream odds/scores provider errors.
///
/// None of these ever escape the odds cache or the result resolver: they are
/// classified there and degrade to "no data for this call".
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP 401, the API key was rejected.
    #[error("unauthorized: API key rejected")]
    Unauthorized,

    /// HTTP 422, the sport/market combination does not exist.
    #[error("invalid parameters for {resource}")]
    InvalidParameters {
        /// Resource that was requested.
        resource: String,
    },

    /// HTTP 429.
    #[error("rate limited on {resource}")]
    RateLimited {
        /// Resource that was requested.
        resource: String,
    },

    /// Request timed out.
    #[error("timeout fetching {resource}")]
    Timeout {
        /// Resource that was requested.
        resource: String,
    },

    /// Any other non-success status.
    #[error("unexpected status {status} for {resource}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Resource that was requested.
        resource: String,
    },

    /// Body was not the expected JSON shape.
    #[error("malformed response for {resource}: {reason}")]
    Malformed {
        /// Resource that was requested.
        resource: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Transport-level failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Base URL could not be joined with the endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl ProviderError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Unauthorized => "unauthorized",
            ProviderError::InvalidParameters { .. } => "invalid_parameters",
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::Timeout { .. } => "timeout",
            ProviderError::Status { .. } => "status",
            ProviderError::Malformed { .. } => "malformed",
            ProviderError::Http(_) => "http",
            ProviderError::Url(_) => "url",
        }
    }
}

/// Arbitrage/EV detection and sizing errors.
#[derive(Error, Debug)]
pub enum ArbitrageError {
    /// A price that cannot be inverted (zero or below one).
    #[error("invalid price {price} for {outcome}")]
    InvalidPrice {
        /// Outcome key.
        outcome: String,
        /// Offending price.
        price: Decimal,
    },

    /// Sum of implied probabilities is not a profitable book.
    #[error("no arbitrage: inverse sum {inv_sum} >= 1")]
    NoOpportunity {
        /// Σ 1/price across legs.
        inv_sum: Decimal,
    },

    /// Total stake must be positive.
    #[error("invalid stake: {0}")]
    InvalidStake(Decimal),

    /// Fewer legs than a 2-way book requires.
    #[error("need at least {required} legs, got {actual}")]
    NotEnoughLegs {
        /// Minimum legs.
        required: usize,
        /// Supplied legs.
        actual: usize,
    },
}

/// Bankroll and active-bet ledger errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// A bet with this id is already being tracked.
    #[error("bet {bet_id} is already active")]
    DuplicateBet {
        /// Bet identifier.
        bet_id: String,
    },

    /// No active bet with this id.
    #[error("bet {bet_id} is not active")]
    UnknownBet {
        /// Bet identifier.
        bet_id: String,
    },

    /// Stake or bankroll amount must be positive.
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// A persisted bankroll violates `current == initial + total_profit`.
    #[error("bankroll for guild {guild_id} is inconsistent: current {current} != initial {initial} + profit {total_profit}")]
    Inconsistent {
        /// Guild identifier.
        guild_id: String,
        /// Stored current balance.
        current: Decimal,
        /// Stored initial balance.
        initial: Decimal,
        /// Stored lifetime profit.
        total_profit: Decimal,
    },

    /// Persistence read/write failed.
    #[error("store io error on {path}: {source}")]
    Io {
        /// File that failed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Persisted file could not be encoded/decoded.
    #[error("store json error on {path}: {source}")]
    Json {
        /// File that failed.
        path: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Reasons a completed game could not be mapped to a bet result.
///
/// Any of these sends the bet to manual review.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// Fewer than two team scores, or a score that is not numeric.
    #[error("insufficient score data")]
    MissingScores,

    /// A score line could not be attributed to the home or away team.
    #[error("could not attribute scores to {home} vs {away}")]
    ScoresUnmatched {
        /// Home team.
        home: String,
        /// Away team.
        away: String,
    },

    /// The backed selection names neither team.
    #[error("could not match '{outcome}' to {home} vs {away}")]
    TeamUnmatched {
        /// Outcome text.
        outcome: String,
        /// Home team.
        home: String,
        /// Away team.
        away: String,
    },

    /// No usable line in the outcome.
    #[error("could not parse a line from '{0}'")]
    LineUnparsed(String),

    /// Totals outcome with neither over nor under.
    #[error("could not tell over from under in '{0}'")]
    SideUnparsed(String),

    /// Market this resolver does not settle.
    #[error("unsupported market {0}")]
    UnsupportedMarket(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;

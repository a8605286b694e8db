//! HTTP API handlers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::arbitrage::arbitrage_calculator;
use crate::error::{ArbitrageError, LedgerError};
use crate::scanner::{OpportunityScanner, ScanParams, ScanStats};
use crate::settlement::ResultResolver;
use crate::trading::{ActiveBet, BankrollSummary, BetLedger, NetworkSummary, ReviewEntry};

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the scheduled tasks are running.
    pub ready: Arc<AtomicBool>,
    /// Opportunity scanner.
    pub scanner: Arc<OpportunityScanner>,
    /// Bet ledger.
    pub ledger: Arc<BetLedger>,
    /// Result resolver.
    pub resolver: Arc<ResultResolver>,
    /// Thresholds for on-demand scans when the request leaves them out.
    pub default_params: ScanParams,
}

impl AppState {
    /// Create new app state.
    pub fn new(
        scanner: Arc<OpportunityScanner>,
        ledger: Arc<BetLedger>,
        resolver: Arc<ResultResolver>,
        default_params: ScanParams,
    ) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            scanner,
            ledger,
            resolver,
            default_params,
        }
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Error body returned by failing handlers.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable reason.
    pub error: String,
}

/// Handler error mapped to a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let status = match &e {
            LedgerError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            LedgerError::UnknownBet { .. } => StatusCode::NOT_FOUND,
            LedgerError::DuplicateBet { .. } => StatusCode::CONFLICT,
            _ => {
                warn!(error = %e, "Ledger request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<ArbitrageError> for ApiError {
    fn from(e: ArbitrageError) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: e.to_string(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether service is ready.
    pub ready: bool,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Scanner counters.
    pub scans: ScanStats,
    /// Bets awaiting settlement.
    pub active_bets: usize,
    /// Bets awaiting manual review.
    pub review_queue: usize,
}

/// Network-wide bankroll response.
#[derive(Debug, Serialize)]
pub struct BankrollsResponse {
    /// Totals across guilds.
    pub network: NetworkSummary,
    /// Per-guild summaries.
    pub guilds: BTreeMap<String, BankrollSummary>,
}

/// Optional guild filter for the bet list.
#[derive(Debug, Deserialize)]
pub struct BetsQuery {
    /// Only bets for this guild.
    pub guild_id: Option<String>,
}

/// Body for an on-demand scan. Missing fields use the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ScanRequest {
    /// Minimum arbitrage margin percent.
    pub min_margin: Option<Decimal>,
    /// Minimum EV percent.
    pub min_ev: Option<Decimal>,
    /// Bookmakers for both detectors.
    pub bookmakers: Option<Vec<String>>,
}

impl ScanRequest {
    fn into_params(self, defaults: &ScanParams) -> ScanParams {
        ScanParams {
            min_margin: self.min_margin.unwrap_or(defaults.min_margin),
            min_ev: self.min_ev.unwrap_or(defaults.min_ev),
            arb_bookmakers: self
                .bookmakers
                .clone()
                .unwrap_or_else(|| defaults.arb_bookmakers.clone()),
            ev_bookmakers: self
                .bookmakers
                .unwrap_or_else(|| defaults.ev_bookmakers.clone()),
        }
    }
}

/// Body for a bankroll reset.
#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    /// New starting balance.
    pub amount: Decimal,
}

/// One leg of a calculator request.
#[derive(Debug, Deserialize)]
pub struct CalculatorLeg {
    /// Outcome label.
    pub outcome: String,
    /// Decimal odds.
    pub odds: Decimal,
}

/// Body for the stake calculator.
#[derive(Debug, Deserialize)]
pub struct CalculatorRequest {
    /// Legs with user-entered odds.
    pub legs: Vec<CalculatorLeg>,
    /// Total amount to split.
    pub total_stake: Decimal,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadyResponse { ready }))
}

/// Scanner counters and queue sizes.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.is_ready() { "running" } else { "starting" };

    Json(StatusResponse {
        status,
        scans: state.scanner.stats().await,
        active_bets: state.ledger.active_count().await,
        review_queue: state.ledger.review_queue().await.len(),
    })
}

/// One guild's bankroll summary.
pub async fn bankroll(State(state): State<AppState>, Path(guild_id): Path<String>) -> Json<BankrollSummary> {
    Json(state.ledger.bankroll(&guild_id).await.summary())
}

/// Every guild's bankroll plus network totals.
pub async fn bankrolls(State(state): State<AppState>) -> Json<BankrollsResponse> {
    let bankrolls = state.ledger.bankrolls().await;
    Json(BankrollsResponse {
        network: NetworkSummary::from_bankrolls(bankrolls.values()),
        guilds: bankrolls
            .iter()
            .map(|(id, b)| (id.clone(), b.summary()))
            .collect(),
    })
}

/// Re-seed a guild's bankroll.
pub async fn reset_bankroll(
    State(state): State<AppState>,
    Path(guild_id): Path<String>,
    Json(request): Json<ResetRequest>,
) -> Result<Json<BankrollSummary>, ApiError> {
    let bankroll = state.ledger.reset_bankroll(&guild_id, request.amount).await?;
    Ok(Json(bankroll.summary()))
}

/// Active bets, optionally for one guild.
pub async fn bets(State(state): State<AppState>, Query(query): Query<BetsQuery>) -> Json<Vec<ActiveBet>> {
    let bets = match query.guild_id {
        Some(guild_id) => state.ledger.active_bets_for(&guild_id).await,
        None => state.ledger.active_bets().await,
    };
    Json(bets)
}

/// Bets flagged for manual review.
pub async fn review(State(state): State<AppState>) -> Json<Vec<ReviewEntry>> {
    Json(state.ledger.review_queue().await)
}

/// Run an on-demand scan.
pub async fn scan(State(state): State<AppState>, body: Option<Json<ScanRequest>>) -> impl IntoResponse {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let params = request.into_params(&state.default_params);
    Json(state.scanner.scan(&params).await)
}

/// Run a resolver cycle now.
pub async fn resolve(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.resolver.run_cycle().await)
}

/// Split a stake across user-supplied odds.
pub async fn calculator(
    State(state): State<AppState>,
    Json(request): Json<CalculatorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let odds: Vec<(String, Decimal)> = request
        .legs
        .into_iter()
        .map(|leg| (leg.outcome, leg.odds))
        .collect();
    let stakes = arbitrage_calculator(&odds, request.total_stake, state.scanner.config().dollars_precision)?;
    Ok(Json(stakes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn defaults() -> ScanParams {
        ScanParams {
            min_margin: dec!(2.0),
            min_ev: dec!(5.0),
            arb_bookmakers: vec!["TAB".to_string()],
            ev_bookmakers: vec!["Neds".to_string()],
        }
    }

    #[test]
    fn empty_scan_request_uses_defaults() {
        let params = ScanRequest::default().into_params(&defaults());

        assert_eq!(params, defaults());
    }

    #[test]
    fn scan_request_bookmakers_apply_to_both_detectors() {
        let request = ScanRequest {
            min_ev: Some(dec!(1.5)),
            bookmakers: Some(vec!["Unibet".to_string()]),
            ..ScanRequest::default()
        };

        let params = request.into_params(&defaults());

        assert_eq!(params.min_ev, dec!(1.5));
        assert_eq!(params.min_margin, dec!(2.0));
        assert_eq!(params.arb_bookmakers, vec!["Unibet".to_string()]);
        assert_eq!(params.ev_bookmakers, vec!["Unibet".to_string()]);
    }

    #[test]
    fn ledger_errors_map_to_status() {
        let bad = ApiError::from(LedgerError::InvalidAmount(dec!(-1)));
        let missing = ApiError::from(LedgerError::UnknownBet {
            bet_id: "x".to_string(),
        });

        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }
}

//! HTTP API route definitions.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{
    bankroll, bankrolls, bets, calculator, health, ready, reset_bankroll, resolve, review, scan, status,
    AppState,
};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/api/v1/status", get(status))
        // Ledger
        .route("/api/v1/bankrolls", get(bankrolls))
        .route("/api/v1/bankroll/:guild_id", get(bankroll))
        .route("/api/v1/bankroll/:guild_id/reset", post(reset_bankroll))
        .route("/api/v1/bets", get(bets))
        .route("/api/v1/review", get(review))
        // On-demand actions
        .route("/api/v1/scan", post(scan))
        .route("/api/v1/resolve", post(resolve))
        .route("/api/v1/calculator", post(calculator))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::guild::GuildDirectory;
    use crate::market::{MarketKey, MockEventBuilder, MockOddsProvider, OddsCache};
    use crate::notify::Notifier;
    use crate::scanner::{OpportunityScanner, ScanParams, ScannerConfig};
    use crate::settlement::{ResolverConfig, ResultResolver};
    use crate::trading::BetLedger;

    fn state_with(mock: &MockOddsProvider) -> AppState {
        let config = Config::with_api_key("test");
        let provider = Arc::new(mock.clone());
        let cache = Arc::new(OddsCache::new(provider.clone(), &config));
        let ledger = Arc::new(BetLedger::new(dec!(1000), None));
        let scanner = Arc::new(OpportunityScanner::new(
            cache,
            Arc::clone(&ledger),
            Arc::new(GuildDirectory::new(BTreeMap::new())),
            Notifier::disconnected(),
            ScannerConfig::default(),
        ));
        let resolver = Arc::new(ResultResolver::new(
            provider,
            Arc::clone(&ledger),
            Notifier::disconnected(),
            ResolverConfig::default(),
        ));
        AppState::new(scanner, ledger, resolver, ScanParams::from_config(&config))
    }

    fn state() -> AppState {
        state_with(&MockOddsProvider::new())
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = create_router(state());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_endpoint_returns_503_when_not_ready() {
        let app = create_router(state());

        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn ready_endpoint_returns_200_when_ready() {
        let state = state();
        state.set_ready(true);
        let app = create_router(state);

        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_reports_counts() {
        let app = create_router(state());

        let response = app
            .oneshot(Request::builder().uri("/api/v1/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "starting");
        assert_eq!(json["active_bets"], 0);
        assert_eq!(json["scans"]["cycles"], 0);
    }

    #[tokio::test]
    async fn bankroll_defaults_for_new_guild() {
        let app = create_router(state());

        let response = app
            .oneshot(Request::builder().uri("/api/v1/bankroll/g1").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["current"], "1000");
    }

    #[tokio::test]
    async fn reset_rejects_non_positive_amount() {
        let app = create_router(state());

        let response = app
            .oneshot(post_json("/api/v1/bankroll/g1/reset", r#"{"amount": "0"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reset_reseeds_the_guild() {
        let state = state();
        let ledger = Arc::clone(&state.ledger);
        let app = create_router(state);

        let response = app
            .oneshot(post_json("/api/v1/bankroll/g1/reset", r#"{"amount": "250"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ledger.bankroll("g1").await.current, dec!(250));
    }

    #[tokio::test]
    async fn scan_without_body_uses_defaults() {
        let mock = MockOddsProvider::new();
        mock.set_sports(vec![MockOddsProvider::sport("basketball_nba", true)]);
        mock.set_odds(
            "basketball_nba",
            MarketKey::H2h,
            vec![MockEventBuilder::new("e1", "TeamA", "TeamB")
                .price("TAB", MarketKey::H2h, "TeamA", dec!(2.10))
                .price("Neds", MarketKey::H2h, "TeamB", dec!(2.05))
                .build()],
        );
        let app = create_router(state_with(&mock));

        let response = app
            .oneshot(Request::builder().method("POST").uri("/api/v1/scan").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "found");
        assert_eq!(json["arbitrage"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resolve_with_no_bets_checks_nothing() {
        let app = create_router(state());

        let response = app
            .oneshot(Request::builder().method("POST").uri("/api/v1/resolve").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["checked"], 0);
    }

    #[tokio::test]
    async fn calculator_rejects_unprofitable_odds() {
        let app = create_router(state());
        let body = r#"{"legs": [{"outcome": "A", "odds": "1.9"}, {"outcome": "B", "odds": "1.9"}], "total_stake": "100"}"#;

        let response = app.oneshot(post_json("/api/v1/calculator", body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn calculator_splits_profitable_odds() {
        let app = create_router(state());
        let body = r#"{"legs": [{"outcome": "A", "odds": "2.1"}, {"outcome": "B", "odds": "2.05"}], "total_stake": "100"}"#;

        let response = app.oneshot(post_json("/api/v1/calculator", body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["legs"].as_array().unwrap().len(), 2);
    }
}

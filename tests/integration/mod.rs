//! End-to-end tests for the odds pipeline.
//!
//! Every test runs against the in-memory mock provider and a temporary
//! directory for the JSON stores, so no API key or network is needed.

use std::collections::BTreeMap;
use std::sync::Arc;

use odds_arb::config::Config;
use odds_arb::guild::GuildDirectory;
use odds_arb::market::{final_score, MarketKey, MockEventBuilder, MockOddsProvider, OddsCache, Selection};
use odds_arb::notify::{Notification, Notifier};
use odds_arb::scanner::{OpportunityScanner, ScannerConfig};
use odds_arb::settlement::{ResolverConfig, ResultResolver};
use odds_arb::trading::{ActiveBet, BetLedger, LedgerStore};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use time::{Duration, OffsetDateTime};
use tokio::sync::mpsc;

struct Pipeline {
    mock: MockOddsProvider,
    ledger: Arc<BetLedger>,
    scanner: Arc<OpportunityScanner>,
    resolver: Arc<ResultResolver>,
    notifications: mpsc::Receiver<Notification>,
}

async fn pipeline(dir: &std::path::Path, guilds: GuildDirectory) -> Pipeline {
    let config = Config::with_api_key("test");
    let mock = MockOddsProvider::new();
    let provider = Arc::new(mock.clone());
    let cache = Arc::new(OddsCache::new(provider.clone(), &config));
    let ledger = Arc::new(
        BetLedger::load(LedgerStore::in_dir(dir), dec!(1000))
            .await
            .unwrap(),
    );
    let (notifier, notifications) = Notifier::channel(64);

    let scanner = Arc::new(OpportunityScanner::new(
        cache,
        Arc::clone(&ledger),
        Arc::new(guilds),
        notifier.clone(),
        ScannerConfig::default(),
    ));
    let resolver = Arc::new(ResultResolver::new(
        provider,
        Arc::clone(&ledger),
        notifier,
        ResolverConfig::default(),
    ));

    Pipeline {
        mock,
        ledger,
        scanner,
        resolver,
        notifications,
    }
}

fn drain(rx: &mut mpsc::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

fn manual_bet(id: &str, selection: Selection, posted_time: OffsetDateTime) -> ActiveBet {
    ActiveBet {
        bet_id: id.to_string(),
        event_id: id.to_string(),
        sport_key: Some("basketball_nba".to_string()),
        market_key: "h2h".to_string(),
        outcome: "Lakers".to_string(),
        selection: Some(selection),
        point: None,
        bookmaker: "TAB".to_string(),
        odds: dec!(2.0),
        stake: dec!(10),
        guild_id: "g1".to_string(),
        channel_id: None,
        game: "Lakers vs Celtics".to_string(),
        home_team: "Lakers".to_string(),
        away_team: "Celtics".to_string(),
        ev_percent: None,
        posted_time,
    }
}

#[tokio::test]
async fn ev_alert_is_placed_settled_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let settings = dir.path().join("settings.json");
    tokio::fs::write(&settings, r#"{"g1": {"ev_alert_channel": "chan-1"}}"#)
        .await
        .unwrap();
    let guilds = GuildDirectory::load(settings).await.unwrap();
    let mut p = pipeline(dir.path(), guilds).await;

    p.mock.set_sports(vec![MockOddsProvider::sport("basketball_nba", true)]);
    p.mock.set_odds(
        "basketball_nba",
        MarketKey::Totals,
        vec![MockEventBuilder::new("e2", "Lakers", "Celtics")
            .line("TAB", MarketKey::Totals, "Over", dec!(1.90), Some(dec!(220.5)))
            .line("Neds", MarketKey::Totals, "Over", dec!(1.95), Some(dec!(220.5)))
            .line("Sportsbet", MarketKey::Totals, "Over", dec!(2.05), Some(dec!(220.5)))
            .build()],
    );

    let report = p.scanner.run_cycle().await;
    assert_eq!(report.guilds.len(), 1);
    assert_eq!(report.guilds[0].ev_alerts, 1);
    assert_eq!(report.guilds[0].arb_alerts, 0);

    let alerts = drain(&mut p.notifications);
    assert_eq!(alerts.len(), 1);
    let Notification::Ev { bet_id, channel_id, .. } = &alerts[0] else {
        panic!("expected an EV alert");
    };
    assert_eq!(channel_id.as_deref(), Some("chan-1"));
    assert!(bet_id.is_some());

    let bets = p.ledger.active_bets_for("g1").await;
    assert_eq!(bets.len(), 1);
    assert_eq!(bets[0].stake, dec!(5.00));
    assert_eq!(p.ledger.bankroll("g1").await.pending_bets, 1);

    // Too new to check.
    let early = p.resolver.run_cycle().await;
    assert_eq!(early.waiting, 1);
    assert_eq!(p.mock.calls("scores:basketball_nba"), 0);

    p.mock.add_score("basketball_nba", final_score("e2", "Lakers", "Celtics", 120, 105));
    let later = OffsetDateTime::now_utc() + Duration::hours(3);
    let summary = p.resolver.run_cycle_at(later).await;
    assert_eq!(summary.resolved, 1);
    assert_eq!(p.ledger.active_count().await, 0);

    let settled = drain(&mut p.notifications);
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].kind(), "bet_settled");

    let bankroll = p.ledger.bankroll("g1").await;
    assert_eq!(bankroll.current, dec!(1005.25));
    assert_eq!(bankroll.won_bets, 1);
    assert_eq!(bankroll.pending_bets, 0);
    assert!(bankroll.is_consistent());

    p.ledger.flush().await.unwrap();
    let reloaded = BetLedger::load(LedgerStore::in_dir(dir.path()), dec!(1000))
        .await
        .unwrap();
    assert_eq!(reloaded.active_count().await, 0);
    assert_eq!(reloaded.bankroll("g1").await.current, dec!(1005.25));
}

#[tokio::test]
async fn stale_bet_is_voided_without_touching_balance() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = pipeline(dir.path(), GuildDirectory::new(BTreeMap::new())).await;
    let posted = OffsetDateTime::now_utc() - Duration::days(15);
    p.ledger
        .place(manual_bet("old", Selection::Team("Lakers".to_string()), posted))
        .await
        .unwrap();

    let summary = p.resolver.run_cycle().await;

    assert_eq!(summary.expired, 1);
    assert_eq!(p.mock.total_calls(), 0);
    let bankroll = p.ledger.bankroll("g1").await;
    assert_eq!(bankroll.current, dec!(1000));
    assert_eq!(bankroll.void_bets, 1);
    assert_eq!(bankroll.pending_bets, 0);
    assert_eq!(drain(&mut p.notifications)[0].kind(), "bet_expired");
}

#[tokio::test]
async fn unmatched_team_goes_to_review() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = pipeline(dir.path(), GuildDirectory::new(BTreeMap::new())).await;
    let posted = OffsetDateTime::now_utc() - Duration::hours(3);
    p.ledger
        .place(manual_bet("g-1", Selection::Team("Knicks".to_string()), posted))
        .await
        .unwrap();
    p.mock.add_score("basketball_nba", final_score("g-1", "Lakers", "Celtics", 100, 90));

    let summary = p.resolver.run_cycle().await;

    assert_eq!(summary.needs_review, 1);
    assert_eq!(p.ledger.active_count().await, 0);
    let review = p.ledger.review_queue().await;
    assert_eq!(review.len(), 1);
    assert_eq!(p.ledger.bankroll("g1").await.current, dec!(1000));
    assert_eq!(drain(&mut p.notifications)[0].kind(), "bet_needs_review");

    let reloaded = BetLedger::load(LedgerStore::in_dir(dir.path()), dec!(1000))
        .await
        .unwrap();
    assert_eq!(reloaded.review_queue().await.len(), 1);
}

#[tokio::test]
async fn arbitrage_guild_gets_alert_but_no_bet() {
    let dir = tempfile::tempdir().unwrap();
    let mut guilds = BTreeMap::new();
    guilds.insert(
        "g1".to_string(),
        odds_arb::guild::GuildSettings {
            arb_scan_enabled: true,
            ..Default::default()
        },
    );
    let mut p = pipeline(dir.path(), GuildDirectory::new(guilds)).await;
    p.mock.set_sports(vec![MockOddsProvider::sport("basketball_nba", true)]);
    p.mock.set_odds(
        "basketball_nba",
        MarketKey::H2h,
        vec![MockEventBuilder::new("e1", "TeamA", "TeamB")
            .price("TAB", MarketKey::H2h, "TeamA", dec!(2.10))
            .price("Neds", MarketKey::H2h, "TeamB", dec!(2.05))
            .build()],
    );

    let report = p.scanner.run_cycle().await;

    assert_eq!(report.guilds[0].arb_alerts, 1);
    assert_eq!(report.guilds[0].bets_placed, 0);
    assert_eq!(p.ledger.active_count().await, 0);
    assert_eq!(drain(&mut p.notifications)[0].kind(), "arbitrage");
}

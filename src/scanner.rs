//! Opportunity scanner.
//!
//! One cycle fetches every (sport, market) snapshot once through the odds
//! cache and shares it across all guilds. Each scanning guild then gets its
//! own detection pass with its thresholds and bookmaker allow-lists, alert
//! de-duplication and throttling, and automatic registration of EV alerts as
//! virtual bets.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::arbitrage::{find_arbitrage_at, find_ev_opportunities_at, ArbitrageOpportunity, EvOpportunity};
use crate::config::Config;
use crate::error::LedgerError;
use crate::guild::{GuildDirectory, GuildSettings};
use crate::market::{Event, MarketKey, OddsCache};
use crate::metrics;
use crate::notify::{Notification, Notifier};
use crate::trading::{ev_stake_dollars, ActiveBet, BetLedger};
use crate::utils::wait_for_shutdown;

/// Markets fetched for every sport.
pub const SCAN_MARKETS: [MarketKey; 3] = [MarketKey::H2h, MarketKey::Totals, MarketKey::Spreads];

/// A guild's sent-alert set is cleared once it grows past this.
pub const SENT_SET_LIMIT: usize = 100;

/// Odds for every scanned (sport, market), fetched once per cycle.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    /// Non-empty event lists keyed by (sport, market).
    pub markets: BTreeMap<(String, MarketKey), Arc<Vec<Event>>>,
    /// Sports considered.
    pub sports: usize,
    /// Lookups that failed upstream (sports list counts as one).
    pub unavailable: usize,
    /// When the snapshot was taken.
    pub fetched_at: OffsetDateTime,
}

impl MarketSnapshot {
    /// Snapshot over explicit market data.
    pub fn from_markets(markets: BTreeMap<(String, MarketKey), Arc<Vec<Event>>>) -> Self {
        let sports = markets
            .keys()
            .map(|(sport, _)| sport.as_str())
            .collect::<HashSet<_>>()
            .len();
        Self {
            markets,
            sports,
            unavailable: 0,
            fetched_at: OffsetDateTime::now_utc(),
        }
    }

    /// Total events across markets.
    pub fn event_count(&self) -> usize {
        self.markets.values().map(|events| events.len()).sum()
    }

    /// Check whether any upstream lookup failed.
    pub fn is_degraded(&self) -> bool {
        self.unavailable > 0
    }
}

/// Overall outcome of a scan, for user-facing reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// At least one opportunity.
    Found,
    /// Data was available and nothing qualified.
    NoOpportunities,
    /// Nothing qualified and the provider failed for some lookups.
    UpstreamUnavailable,
}

impl ScanStatus {
    fn classify(found: usize, snapshot: &MarketSnapshot) -> Self {
        if found > 0 {
            ScanStatus::Found
        } else if snapshot.is_degraded() {
            ScanStatus::UpstreamUnavailable
        } else {
            ScanStatus::NoOpportunities
        }
    }
}

/// Thresholds and allow-lists for one detection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanParams {
    /// Minimum arbitrage margin percent.
    pub min_margin: Decimal,
    /// Minimum EV percent.
    pub min_ev: Decimal,
    /// Bookmakers for arbitrage.
    pub arb_bookmakers: Vec<String>,
    /// Bookmakers for EV.
    pub ev_bookmakers: Vec<String>,
}

impl ScanParams {
    /// Application-wide defaults.
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_margin: config.default_min_margin,
            min_ev: config.default_min_ev,
            arb_bookmakers: config.bookmakers.clone(),
            ev_bookmakers: config.bookmakers.clone(),
        }
    }
}

impl From<&GuildSettings> for ScanParams {
    fn from(settings: &GuildSettings) -> Self {
        Self {
            min_margin: settings.min_margin,
            min_ev: settings.min_ev,
            arb_bookmakers: settings.arb_bookmakers.clone(),
            ev_bookmakers: settings.ev_bookmakers.clone(),
        }
    }
}

/// Ranked opportunities from one detection pass.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// Arbitrage, widest margin first.
    pub arbitrage: Vec<ArbitrageOpportunity>,
    /// EV, highest first.
    pub ev: Vec<EvOpportunity>,
    /// Overall status.
    pub status: ScanStatus,
    /// Markets with data.
    pub markets: usize,
    /// Events examined.
    pub events: usize,
}

/// Run both detectors over a snapshot.
pub fn detect(
    snapshot: &MarketSnapshot,
    params: &ScanParams,
    now: OffsetDateTime,
    units_precision: u32,
) -> ScanReport {
    let _timer = metrics::timer_detection();
    let mut arbitrage = Vec::new();
    let mut ev = Vec::new();

    for ((_, market), events) in &snapshot.markets {
        arbitrage.extend(find_arbitrage_at(
            events,
            *market,
            params.min_margin,
            &params.arb_bookmakers,
            now,
        ));
        ev.extend(find_ev_opportunities_at(
            events,
            *market,
            params.min_ev,
            &params.ev_bookmakers,
            now,
            units_precision,
        ));
    }

    arbitrage.sort_by(|a, b| b.margin_pct.cmp(&a.margin_pct));
    ev.sort_by(|a, b| b.ev_percent.cmp(&a.ev_percent));
    metrics::add_arbitrage_detected(arbitrage.len());
    metrics::add_ev_detected(ev.len());

    ScanReport {
        status: ScanStatus::classify(arbitrage.len() + ev.len(), snapshot),
        markets: snapshot.markets.len(),
        events: snapshot.event_count(),
        arbitrage,
        ev,
    }
}

/// Scanner tunables.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Parallel odds lookups.
    pub fetch_concurrency: usize,
    /// Arbitrage alerts per guild per cycle.
    pub max_arb_alerts: usize,
    /// EV alerts per guild per cycle.
    pub max_ev_alerts: usize,
    /// Rounding for unit stakes.
    pub units_precision: u32,
    /// Rounding for currency stakes.
    pub dollars_precision: u32,
    /// Time between cycles.
    pub interval: Duration,
}

impl ScannerConfig {
    /// Tunables from the application config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            fetch_concurrency: config.fetch_concurrency.max(1),
            max_arb_alerts: config.max_arb_alerts,
            max_ev_alerts: config.max_ev_alerts,
            units_precision: config.stake_units_precision,
            dollars_precision: config.stake_dollars_precision,
            interval: Duration::from_secs(config.scan_interval_secs),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: 4,
            max_arb_alerts: 3,
            max_ev_alerts: 5,
            units_precision: 1,
            dollars_precision: 2,
            interval: Duration::from_secs(3600),
        }
    }
}

/// What one guild received in a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GuildScanOutcome {
    /// Guild id.
    pub guild_id: String,
    /// Arbitrage alerts sent.
    pub arb_alerts: usize,
    /// EV alerts sent.
    pub ev_alerts: usize,
    /// Bets registered from EV alerts.
    pub bets_placed: usize,
}

/// Result of one scheduled cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Per-guild outcomes.
    pub guilds: Vec<GuildScanOutcome>,
    /// Markets with data.
    pub markets: usize,
    /// Upstream failures during the fetch.
    pub unavailable: usize,
    /// When the cycle ran.
    #[serde(with = "time::serde::rfc3339")]
    pub ran_at: OffsetDateTime,
}

/// Running counters for status reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    /// Completed cycles.
    pub cycles: u64,
    /// Last cycle time.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_scan_at: Option<OffsetDateTime>,
    /// Next scheduled cycle.
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_scan_at: Option<OffsetDateTime>,
    /// Arbitrage alerts sent since start.
    pub arb_alerts: u64,
    /// EV alerts sent since start.
    pub ev_alerts: u64,
    /// Bets registered since start.
    pub bets_placed: u64,
    /// Markets in the last snapshot.
    pub last_markets: usize,
    /// Upstream failures in the last snapshot.
    pub last_unavailable: usize,
}

/// Scheduled scanner shared by every guild.
pub struct OpportunityScanner {
    cache: Arc<OddsCache>,
    ledger: Arc<BetLedger>,
    guilds: Arc<GuildDirectory>,
    notifier: Notifier,
    config: ScannerConfig,
    arb_sent: DashMap<String, HashSet<String>>,
    ev_sent: DashMap<String, HashSet<String>>,
    stats: RwLock<ScanStats>,
    cycle_lock: Mutex<()>,
}

impl OpportunityScanner {
    /// Create a scanner.
    pub fn new(
        cache: Arc<OddsCache>,
        ledger: Arc<BetLedger>,
        guilds: Arc<GuildDirectory>,
        notifier: Notifier,
        config: ScannerConfig,
    ) -> Self {
        Self {
            cache,
            ledger,
            guilds,
            notifier,
            config,
            arb_sent: DashMap::new(),
            ev_sent: DashMap::new(),
            stats: RwLock::new(ScanStats::default()),
            cycle_lock: Mutex::new(()),
        }
    }

    /// Tunables in use.
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Counters so far.
    pub async fn stats(&self) -> ScanStats {
        self.stats.read().await.clone()
    }

    /// Fetch every scannable (sport, market) through the cache.
    #[instrument(skip(self))]
    pub async fn fetch_snapshot(&self) -> MarketSnapshot {
        let sports = self.cache.lookup_sports().await;
        let mut snapshot = MarketSnapshot {
            markets: BTreeMap::new(),
            sports: sports.data.len(),
            unavailable: usize::from(sports.is_unavailable()),
            fetched_at: OffsetDateTime::now_utc(),
        };

        let requests: Vec<(String, MarketKey)> = sports
            .data
            .iter()
            .flat_map(|sport| SCAN_MARKETS.iter().map(move |m| (sport.key.clone(), *m)))
            .collect();

        let lookups: Vec<_> = stream::iter(requests)
            .map(|(sport, market)| async move {
                let lookup = self.cache.lookup_odds(&sport, market).await;
                (sport, market, lookup)
            })
            .buffer_unordered(self.config.fetch_concurrency)
            .collect()
            .await;

        for (sport, market, lookup) in lookups {
            if lookup.is_unavailable() {
                snapshot.unavailable += 1;
            } else if !lookup.data.is_empty() {
                snapshot.markets.insert((sport, market), lookup.data);
            }
        }

        info!(
            sports = snapshot.sports,
            markets = snapshot.markets.len(),
            events = snapshot.event_count(),
            unavailable = snapshot.unavailable,
            "Odds snapshot fetched"
        );
        snapshot
    }

    /// On-demand scan with explicit thresholds.
    pub async fn scan(&self, params: &ScanParams) -> ScanReport {
        let snapshot = self.fetch_snapshot().await;
        detect(&snapshot, params, OffsetDateTime::now_utc(), self.config.units_precision)
    }

    /// Register an EV opportunity as a bet sized against the guild's bankroll.
    pub async fn place_ev_bet(
        &self,
        guild_id: &str,
        opportunity: &EvOpportunity,
        channel_id: Option<String>,
        initial_bankroll: Option<Decimal>,
    ) -> Result<ActiveBet, LedgerError> {
        let seed = initial_bankroll.unwrap_or_else(|| self.ledger.default_bankroll());
        let bankroll = self.ledger.bankroll_or_init(guild_id, seed).await;
        let stake = ev_stake_dollars(
            opportunity.ev_percent,
            opportunity.offered_price,
            bankroll.current,
            self.config.dollars_precision,
        );

        let bet = ActiveBet::from_ev(opportunity, guild_id, channel_id, stake, OffsetDateTime::now_utc());
        self.ledger.place(bet.clone()).await?;
        Ok(bet)
    }

    /// Run one scheduled cycle now.
    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(OffsetDateTime::now_utc()).await
    }

    /// Run one cycle as of `now`. Overlapping calls run one after the other.
    #[instrument(skip(self))]
    pub async fn run_cycle_at(&self, now: OffsetDateTime) -> CycleReport {
        let _cycle = self.cycle_lock.lock().await;
        let _timer = metrics::timer_scan();
        info!("Starting global scan");

        let snapshot = self.fetch_snapshot().await;
        let mut report = CycleReport {
            guilds: Vec::new(),
            markets: snapshot.markets.len(),
            unavailable: snapshot.unavailable,
            ran_at: now,
        };

        let guilds = self.guilds.scanning().await;
        if snapshot.markets.is_empty() {
            warn!(unavailable = snapshot.unavailable, "No odds data retrieved");
        } else {
            for (guild_id, settings) in &guilds {
                report.guilds.push(self.scan_guild(guild_id, settings, &snapshot, now).await);
            }
        }

        let mut stats = self.stats.write().await;
        stats.cycles += 1;
        stats.last_scan_at = Some(now);
        stats.next_scan_at = Some(now + self.config.interval);
        stats.last_markets = report.markets;
        stats.last_unavailable = report.unavailable;
        for outcome in &report.guilds {
            stats.arb_alerts += outcome.arb_alerts as u64;
            stats.ev_alerts += outcome.ev_alerts as u64;
            stats.bets_placed += outcome.bets_placed as u64;
        }

        info!(
            guilds = report.guilds.len(),
            markets = report.markets,
            "Global scan completed"
        );
        report
    }

    /// Alert one guild from a shared snapshot.
    pub async fn scan_guild(
        &self,
        guild_id: &str,
        settings: &GuildSettings,
        snapshot: &MarketSnapshot,
        now: OffsetDateTime,
    ) -> GuildScanOutcome {
        let mut outcome = GuildScanOutcome {
            guild_id: guild_id.to_string(),
            ..GuildScanOutcome::default()
        };
        let found = detect(snapshot, &ScanParams::from(settings), now, self.config.units_precision);

        if settings.arb_scan_enabled {
            if settings.arb_bookmakers.is_empty() {
                warn!(guild_id = %guild_id, "No bookmakers configured for arbitrage");
            }
            let fresh = take_unsent(&self.arb_sent, guild_id, found.arbitrage, self.config.max_arb_alerts, |o| {
                o.dedup_key()
            });
            for opportunity in fresh {
                self.notifier.notify(Notification::Arbitrage {
                    guild_id: guild_id.to_string(),
                    channel_id: settings.arb_alert_channel.clone(),
                    opportunity,
                });
                outcome.arb_alerts += 1;
            }
        }

        if settings.ev_scan_enabled {
            let fresh = take_unsent(&self.ev_sent, guild_id, found.ev, self.config.max_ev_alerts, |o| {
                o.dedup_key()
            });
            for opportunity in fresh {
                let bet_id = match self
                    .place_ev_bet(
                        guild_id,
                        &opportunity,
                        settings.ev_alert_channel.clone(),
                        settings.bankroll,
                    )
                    .await
                {
                    Ok(bet) => {
                        outcome.bets_placed += 1;
                        Some(bet.bet_id)
                    }
                    Err(LedgerError::DuplicateBet { bet_id }) => {
                        debug!(bet_id = %bet_id, "EV bet already tracked");
                        Some(bet_id)
                    }
                    Err(e) => {
                        warn!(guild_id = %guild_id, error = %e, "Could not register EV bet");
                        None
                    }
                };
                self.notifier.notify(Notification::Ev {
                    guild_id: guild_id.to_string(),
                    channel_id: settings.ev_alert_channel.clone(),
                    opportunity,
                    bet_id,
                });
                outcome.ev_alerts += 1;
            }
        }

        debug!(
            guild_id = %guild_id,
            arb_alerts = outcome.arb_alerts,
            ev_alerts = outcome.ev_alerts,
            "Guild scanned"
        );
        outcome
    }

    /// Run cycles on the configured interval until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(interval_secs = self.config.interval.as_secs(), "Opportunity scanner started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("Opportunity scanner stopping");
                    return;
                }
            }
        }
    }
}

/// Keep up to `limit` items whose key has not been sent to the guild, and
/// record them as sent.
fn take_unsent<T>(
    sent: &DashMap<String, HashSet<String>>,
    guild_id: &str,
    items: Vec<T>,
    limit: usize,
    key: impl Fn(&T) -> String,
) -> Vec<T> {
    let mut seen = sent.entry(guild_id.to_string()).or_default();
    let fresh: Vec<T> = items
        .into_iter()
        .filter(|item| !seen.contains(&key(item)))
        .take(limit)
        .collect();

    for item in &fresh {
        seen.insert(key(item));
    }
    if seen.len() > SENT_SET_LIMIT {
        debug!(guild_id = %guild_id, "Clearing sent-alert history");
        seen.clear();
    }
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{MockEventBuilder, MockFailure, MockOddsProvider};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn arb_event(id: &str) -> Event {
        MockEventBuilder::new(id, "TeamA", "TeamB")
            .price("TAB", MarketKey::H2h, "TeamA", dec!(2.10))
            .price("Neds", MarketKey::H2h, "TeamB", dec!(2.05))
            .build()
    }

    fn ev_event(id: &str) -> Event {
        MockEventBuilder::new(id, "Lakers", "Celtics")
            .line("TAB", MarketKey::Totals, "Over", dec!(1.90), Some(dec!(220.5)))
            .line("Neds", MarketKey::Totals, "Over", dec!(1.95), Some(dec!(220.5)))
            .line("Sportsbet", MarketKey::Totals, "Over", dec!(2.05), Some(dec!(220.5)))
            .build()
    }

    fn setup(
        mock: &MockOddsProvider,
        settings: GuildSettings,
    ) -> (
        Arc<OpportunityScanner>,
        Arc<BetLedger>,
        tokio::sync::mpsc::Receiver<Notification>,
    ) {
        let config = Config::with_api_key("test");
        let cache = Arc::new(OddsCache::new(Arc::new(mock.clone()), &config));
        let ledger = Arc::new(BetLedger::new(dec!(1000), None));
        let mut guilds = BTreeMap::new();
        guilds.insert("g1".to_string(), settings);
        let (notifier, rx) = Notifier::channel(64);
        let scanner = Arc::new(OpportunityScanner::new(
            cache,
            Arc::clone(&ledger),
            Arc::new(GuildDirectory::new(guilds)),
            notifier,
            ScannerConfig::default(),
        ));
        (scanner, ledger, rx)
    }

    fn enabled() -> GuildSettings {
        GuildSettings {
            ev_scan_enabled: true,
            arb_scan_enabled: true,
            ..GuildSettings::default()
        }
    }

    #[tokio::test]
    async fn snapshot_is_fetched_once_per_sport_and_market() {
        let mock = MockOddsProvider::new();
        mock.set_sports(vec![
            MockOddsProvider::sport("basketball_nba", true),
            MockOddsProvider::sport("politics_election_winner", true),
        ]);
        mock.set_odds("basketball_nba", MarketKey::H2h, vec![arb_event("e1")]);
        let (scanner, _, _rx) = setup(&mock, enabled());

        let snapshot = scanner.fetch_snapshot().await;

        assert_eq!(snapshot.sports, 1);
        assert_eq!(snapshot.markets.len(), 1);
        assert_eq!(mock.calls("odds:basketball_nba:h2h"), 1);
        assert_eq!(mock.calls("odds:basketball_nba:totals"), 1);
        assert_eq!(mock.calls("odds:politics_election_winner:h2h"), 0);
    }

    #[tokio::test]
    async fn cycle_alerts_and_registers_ev_bets() {
        let mock = MockOddsProvider::new();
        mock.set_sports(vec![MockOddsProvider::sport("basketball_nba", true)]);
        mock.set_odds("basketball_nba", MarketKey::H2h, vec![arb_event("e1")]);
        mock.set_odds("basketball_nba", MarketKey::Totals, vec![ev_event("e2")]);
        let (scanner, ledger, mut rx) = setup(&mock, enabled());

        let report = scanner.run_cycle().await;

        assert_eq!(report.guilds.len(), 1);
        let outcome = &report.guilds[0];
        assert_eq!(outcome.arb_alerts, 1);
        assert_eq!(outcome.ev_alerts, 1);
        assert_eq!(outcome.bets_placed, 1);

        let bets = ledger.active_bets_for("g1").await;
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].stake, dec!(5.00));
        assert_eq!(bets[0].odds, dec!(2.05));

        let mut kinds = Vec::new();
        while let Ok(n) = rx.try_recv() {
            kinds.push(n.kind());
        }
        assert_eq!(kinds, vec!["arbitrage", "ev"]);
    }

    #[tokio::test]
    async fn repeated_cycles_do_not_resend() {
        let mock = MockOddsProvider::new();
        mock.set_sports(vec![MockOddsProvider::sport("basketball_nba", true)]);
        mock.set_odds("basketball_nba", MarketKey::H2h, vec![arb_event("e1")]);
        let (scanner, _, _rx) = setup(&mock, enabled());

        let first = scanner.run_cycle().await;
        let second = scanner.run_cycle().await;

        assert_eq!(first.guilds[0].arb_alerts, 1);
        assert_eq!(second.guilds[0].arb_alerts, 0);
        assert_eq!(scanner.stats().await.cycles, 2);
    }

    #[tokio::test]
    async fn alerts_are_throttled_per_guild() {
        let mock = MockOddsProvider::new();
        mock.set_sports(vec![MockOddsProvider::sport("basketball_nba", true)]);
        let events: Vec<Event> = (0..6).map(|i| arb_event(&format!("e{}", i))).collect();
        mock.set_odds("basketball_nba", MarketKey::H2h, events);
        let settings = GuildSettings {
            arb_scan_enabled: true,
            ..GuildSettings::default()
        };
        let (scanner, _, _rx) = setup(&mock, settings);

        let report = scanner.run_cycle().await;

        assert_eq!(report.guilds[0].arb_alerts, 3);
    }

    #[test]
    fn sent_set_is_cleared_past_the_limit() {
        let sent: DashMap<String, HashSet<String>> = DashMap::new();
        let items: Vec<usize> = (0..=SENT_SET_LIMIT).collect();

        let fresh = take_unsent(&sent, "g1", items, usize::MAX, |i| i.to_string());

        assert_eq!(fresh.len(), SENT_SET_LIMIT + 1);
        assert!(sent.get("g1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn unavailable_upstream_is_reported_distinctly() {
        let mock = MockOddsProvider::new();
        mock.fail_next("sports", MockFailure::Timeout);
        let (scanner, _, _rx) = setup(&mock, enabled());

        let report = scanner.scan(&ScanParams::from(&enabled())).await;

        assert_eq!(report.status, ScanStatus::UpstreamUnavailable);
        assert!(report.arbitrage.is_empty());
    }

    #[tokio::test]
    async fn empty_market_is_no_opportunities() {
        let mock = MockOddsProvider::new();
        mock.set_sports(vec![MockOddsProvider::sport("basketball_nba", true)]);
        let (scanner, _, _rx) = setup(&mock, enabled());

        let report = scanner.scan(&ScanParams::from(&enabled())).await;

        assert_eq!(report.status, ScanStatus::NoOpportunities);
    }
}

//! Sports odds arbitrage and EV scanner entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use odds_arb::api::{create_router, AppState};
use odds_arb::config::Config;
use odds_arb::guild::GuildDirectory;
use odds_arb::market::{OddsApiClient, OddsCache, OddsProvider};
use odds_arb::metrics;
use odds_arb::notify::{Notification, Notifier, DEFAULT_CAPACITY};
use odds_arb::scanner::{OpportunityScanner, ScanParams, ScannerConfig};
use odds_arb::schedule::{run_daily_summary, run_periodic_flush, FLUSH_INTERVAL};
use odds_arb::settlement::{ResolverConfig, ResultResolver};
use odds_arb::trading::{BetLedger, LedgerStore};
use odds_arb::utils::shutdown_signal;

/// Sports-betting arbitrage and +EV scanner.
#[derive(Parser, Debug)]
#[command(name = "odds-arb")]
#[command(about = "Scan bookmaker odds for arbitrage and +EV bets and settle virtual bets")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines.
    #[arg(long, global = true, env = "LOG_JSON")]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scanner, resolver and API (default).
    Run {
        /// HTTP server port for the status API.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// List scannable sports.
    Sports,

    /// Run one scan and print the opportunities.
    Scan {
        /// Minimum EV percent.
        #[arg(long)]
        min_ev: Option<Decimal>,

        /// Minimum arbitrage margin percent.
        #[arg(long)]
        min_margin: Option<Decimal>,
    },

    /// Run one resolver cycle over the persisted active bets.
    Resolve,

    /// Show bankrolls, or one guild's.
    Bankroll {
        /// Guild id.
        guild_id: Option<String>,
    },

    /// Re-seed a guild's bankroll.
    ResetBankroll {
        /// Guild id.
        guild_id: String,

        /// New starting balance.
        amount: Decimal,
    },
}

/// Long-lived pieces shared by the commands.
struct Components {
    config: Config,
    cache: Arc<OddsCache>,
    ledger: Arc<BetLedger>,
    scanner: Arc<OpportunityScanner>,
    resolver: Arc<ResultResolver>,
    notifier: Notifier,
    notifications: mpsc::Receiver<Notification>,
}

impl Components {
    async fn build(config: Config) -> anyhow::Result<Self> {
        let provider: Arc<dyn OddsProvider> = Arc::new(OddsApiClient::new(&config)?);
        let cache = Arc::new(OddsCache::new(Arc::clone(&provider), &config));
        let ledger = Arc::new(BetLedger::load(LedgerStore::from_config(&config), config.default_bankroll).await?);
        let guilds = Arc::new(GuildDirectory::load(config.settings_file.clone()).await?);
        let (notifier, notifications) = Notifier::channel(DEFAULT_CAPACITY);

        let scanner = Arc::new(OpportunityScanner::new(
            Arc::clone(&cache),
            Arc::clone(&ledger),
            guilds,
            notifier.clone(),
            ScannerConfig::from_config(&config),
        ));
        let resolver = Arc::new(ResultResolver::new(
            provider,
            Arc::clone(&ledger),
            notifier.clone(),
            ResolverConfig::from_config(&config),
        ));

        Ok(Self {
            config,
            cache,
            ledger,
            scanner,
            resolver,
            notifier,
            notifications,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config_result = Config::load();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("odds_arb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = config_result
                .as_ref()
                .map(|c| c.rust_log.clone())
                .unwrap_or_else(|_| "info".to_string());
            EnvFilter::new(level)
        })
    };

    let json = args.json_logs || config_result.as_ref().map(|c| c.log_json).unwrap_or(false);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    metrics::init_metrics();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(config_result),
        command => {
            let config = config_result?;
            config.validate().map_err(|e| anyhow::anyhow!(e))?;
            match command {
                Some(Command::Sports) => cmd_sports(config).await,
                Some(Command::Scan { min_ev, min_margin }) => cmd_scan(config, min_ev, min_margin).await,
                Some(Command::Resolve) => cmd_resolve(config).await,
                Some(Command::Bankroll { guild_id }) => cmd_bankroll(config, guild_id).await,
                Some(Command::ResetBankroll { guild_id, amount }) => cmd_reset_bankroll(config, &guild_id, amount).await,
                Some(Command::Run { port }) => cmd_run(config, port).await,
                Some(Command::CheckConfig) | None => cmd_run(config, None).await,
            }
        }
    }
}

/// Check configuration validity.
fn cmd_check_config(config: Result<Config, envy::Error>) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("ODDS ARB - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match config {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Odds API: {} (region {})", config.odds_api_url, config.odds_region);
    println!("  Cache TTL: {}s odds, {}s sports", config.odds_cache_ttl_secs, config.sports_cache_ttl_secs);
    println!("  Min Margin: {}%  Min EV: {}%", config.default_min_margin, config.default_min_ev);
    println!("  Bookmakers: {}", config.bookmakers.join(", "));
    println!("  Default Bankroll: ${}", config.default_bankroll);
    println!("  Scan Interval: {}s", config.scan_interval_secs);
    println!("  Result Check Interval: {}s", config.result_check_interval_secs);
    println!("  Settings File: {}", config.settings_file.display());
    println!("  Bankroll File: {}", config.bankroll_file.display());
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// List scannable sports.
async fn cmd_sports(config: Config) -> anyhow::Result<()> {
    let components = Components::build(config).await?;
    let sports = components.cache.lookup_sports().await;

    if sports.is_unavailable() {
        println!("Odds provider unavailable");
        return Ok(());
    }
    for sport in sports.data.iter() {
        println!("{:<40} {}", sport.key, sport.title);
    }
    println!("{} sports", sports.data.len());
    Ok(())
}

/// Run one scan and print the opportunities.
async fn cmd_scan(config: Config, min_ev: Option<Decimal>, min_margin: Option<Decimal>) -> anyhow::Result<()> {
    let mut params = ScanParams::from_config(&config);
    if let Some(min_ev) = min_ev {
        params.min_ev = min_ev;
    }
    if let Some(min_margin) = min_margin {
        params.min_margin = min_margin;
    }

    let components = Components::build(config).await?;
    let report = components.scanner.scan(&params).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Run one resolver cycle.
async fn cmd_resolve(config: Config) -> anyhow::Result<()> {
    let components = Components::build(config).await?;
    let summary = components.resolver.run_cycle().await;
    components.ledger.flush().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Show bankrolls.
async fn cmd_bankroll(config: Config, guild_id: Option<String>) -> anyhow::Result<()> {
    let components = Components::build(config).await?;

    match guild_id {
        Some(guild_id) => {
            let summary = components.ledger.bankroll(&guild_id).await.summary();
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        None => {
            for (guild_id, bankroll) in components.ledger.bankrolls().await {
                println!("{}: {}", guild_id, serde_json::to_string(&bankroll.summary())?);
            }
            let network = components.ledger.network_summary().await;
            println!("network: {}", serde_json::to_string(&network)?);
        }
    }
    Ok(())
}

/// Re-seed a guild's bankroll.
async fn cmd_reset_bankroll(config: Config, guild_id: &str, amount: Decimal) -> anyhow::Result<()> {
    let components = Components::build(config).await?;
    let bankroll = components.ledger.reset_bankroll(guild_id, amount).await?;
    println!("Bankroll for {} reset to ${}", guild_id, bankroll.current);
    Ok(())
}

/// Log every notification. Stands in for the chat front end.
async fn consume_notifications(mut notifications: mpsc::Receiver<Notification>) {
    while let Some(notification) = notifications.recv().await {
        match serde_json::to_string(&notification) {
            Ok(body) => info!(kind = notification.kind(), body = %body, "Notification"),
            Err(e) => warn!(kind = notification.kind(), error = %e, "Notification could not be encoded"),
        }
    }
}

/// Run the scheduled tasks and the API until shutdown.
async fn cmd_run(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    info!("Configuration loaded successfully");
    info!("Scan interval: {}s", config.scan_interval_secs);
    info!("Result check interval: {}s", config.result_check_interval_secs);
    info!("Bookmakers: {}", config.bookmakers.join(", "));

    if config.metrics_enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
        match PrometheusBuilder::new().with_http_listener(addr).install() {
            Ok(()) => info!("Prometheus exporter listening on {}", addr),
            Err(e) => warn!(error = %e, "Prometheus exporter not installed"),
        }
    }

    let components = Components::build(config).await?;
    let Components {
        config,
        ledger,
        scanner,
        resolver,
        notifier,
        notifications,
        ..
    } = components;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = tokio::spawn(consume_notifications(notifications));

    let tasks = vec![
        tokio::spawn(Arc::clone(&scanner).run(shutdown_rx.clone())),
        tokio::spawn(Arc::clone(&resolver).run(shutdown_rx.clone())),
        tokio::spawn(run_daily_summary(Arc::clone(&ledger), notifier, shutdown_rx.clone())),
        tokio::spawn(run_periodic_flush(Arc::clone(&ledger), FLUSH_INTERVAL, shutdown_rx.clone())),
    ];

    let app_state = AppState::new(
        Arc::clone(&scanner),
        Arc::clone(&ledger),
        Arc::clone(&resolver),
        ScanParams::from_config(&config),
    );
    app_state.set_ready(true);

    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(config.port)));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state.clone());
    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                odds_arb::utils::wait_for_shutdown(&mut server_shutdown).await;
            })
            .await
    });

    shutdown_signal().await;
    app_state.set_ready(false);
    info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Background task failed");
        }
    }
    match server.await {
        Ok(Err(e)) => error!(error = %e, "HTTP server error"),
        Err(e) => error!(error = %e, "HTTP server task failed"),
        Ok(Ok(())) => {}
    }

    consumer.abort();

    info!(active_bets = ledger.active_count().await, "Shutdown complete");
    Ok(())
}

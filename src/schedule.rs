//! Background jobs that are not scans or settlement.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{error, info};

use crate::notify::{GuildDailySummary, Notification, Notifier};
use crate::trading::{BetLedger, NetworkSummary};
use crate::utils::{duration_until_next_utc_midnight, wait_for_shutdown};

/// Interval for the periodic ledger flush.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(3600);

/// Build the daily summary from the ledger as it stands.
///
/// Bankrolls are read without a rollover so the day that just ended is
/// still visible.
pub async fn daily_summary(ledger: &BetLedger) -> Notification {
    let bankrolls = ledger.bankrolls().await;
    let network = NetworkSummary::from_bankrolls(bankrolls.values());
    let guilds = bankrolls
        .iter()
        .map(|(guild_id, bankroll)| GuildDailySummary {
            guild_id: guild_id.clone(),
            bankroll: bankroll.summary(),
        })
        .collect();

    Notification::DailySummary { guilds, network }
}

/// Emit the daily summary at every 00:00 UTC until shutdown.
pub async fn run_daily_summary(
    ledger: Arc<BetLedger>,
    notifier: Notifier,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let wait = duration_until_next_utc_midnight(OffsetDateTime::now_utc());
        info!(wait_secs = wait.as_secs(), "Next daily summary scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                let summary = daily_summary(&ledger).await;
                notifier.notify(summary);
                info!("Daily summary sent");
            }
            _ = wait_for_shutdown(&mut shutdown) => return,
        }
    }
}

/// Save the ledger every `every` and once more on shutdown.
pub async fn run_periodic_flush(
    ledger: Arc<BetLedger>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = ledger.flush().await {
                    error!(error = %e, "Periodic ledger save failed");
                }
            }
            _ = wait_for_shutdown(&mut shutdown) => {
                match ledger.flush().await {
                    Ok(()) => info!("Ledger saved on shutdown"),
                    Err(e) => error!(error = %e, "Ledger save on shutdown failed"),
                }
                return;
            }
        }
    }
}

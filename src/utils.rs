//! Utility functions.

use std::time::Duration;

use time::{OffsetDateTime, Time};
use tokio::sync::watch;
use tracing::info;

/// Wait for Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Resolve once the shutdown flag flips to true or its sender is dropped.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Time left until the next 00:00 UTC.
pub fn duration_until_next_utc_midnight(now: OffsetDateTime) -> Duration {
    let now = now.to_offset(time::UtcOffset::UTC);
    let next = match now.date().next_day() {
        Some(date) => date.with_time(Time::MIDNIGHT).assume_utc(),
        None => return Duration::from_secs(86_400),
    };
    let remaining = next - now;
    Duration::from_secs(remaining.whole_seconds().max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn midnight_countdown() {
        assert_eq!(
            duration_until_next_utc_midnight(datetime!(2030-01-01 23:00 UTC)),
            Duration::from_secs(3600)
        );
        assert_eq!(
            duration_until_next_utc_midnight(datetime!(2030-01-01 00:00 UTC)),
            Duration::from_secs(86_400)
        );
        assert_eq!(
            duration_until_next_utc_midnight(datetime!(2030-01-01 12:00 +02:00)),
            Duration::from_secs(14 * 3600)
        );
    }

    #[tokio::test]
    async fn shutdown_flag_releases_waiters() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { wait_for_shutdown(&mut rx).await });

        tx.send(true).unwrap();

        waiter.await.unwrap();
    }
}

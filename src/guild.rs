//! Per-guild scan settings.
//!
//! Settings live in one JSON object keyed by guild id. A missing file means
//! no guilds are configured yet.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::config::{default_bookmakers, Config};
use crate::error::LedgerError;

fn default_min_ev() -> Decimal {
    dec!(5.0)
}

fn default_min_margin() -> Decimal {
    dec!(2.0)
}

/// Scan preferences for one guild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildSettings {
    /// Send EV alerts.
    #[serde(default)]
    pub ev_scan_enabled: bool,
    /// Send arbitrage alerts.
    #[serde(default)]
    pub arb_scan_enabled: bool,
    /// Minimum EV percent for an alert.
    #[serde(default = "default_min_ev")]
    pub min_ev: Decimal,
    /// Minimum arbitrage margin percent for an alert.
    #[serde(default = "default_min_margin")]
    pub min_margin: Decimal,
    /// Bookmakers considered for EV.
    #[serde(default = "default_bookmakers")]
    pub ev_bookmakers: Vec<String>,
    /// Bookmakers considered for arbitrage.
    #[serde(default = "default_bookmakers")]
    pub arb_bookmakers: Vec<String>,
    /// Channel for EV alerts.
    #[serde(default)]
    pub ev_alert_channel: Option<String>,
    /// Channel for arbitrage alerts.
    #[serde(default)]
    pub arb_alert_channel: Option<String>,
    /// Starting bankroll for the guild's ledger.
    #[serde(default)]
    pub bankroll: Option<Decimal>,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            ev_scan_enabled: false,
            arb_scan_enabled: false,
            min_ev: default_min_ev(),
            min_margin: default_min_margin(),
            ev_bookmakers: default_bookmakers(),
            arb_bookmakers: default_bookmakers(),
            ev_alert_channel: None,
            arb_alert_channel: None,
            bankroll: None,
        }
    }
}

impl GuildSettings {
    /// Settings seeded from the application defaults.
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_ev: config.default_min_ev,
            min_margin: config.default_min_margin,
            ev_bookmakers: config.bookmakers.clone(),
            arb_bookmakers: config.bookmakers.clone(),
            ..Self::default()
        }
    }

    /// Turn scanning on for any alert type that has a channel.
    ///
    /// Returns true if anything changed.
    pub fn enable_configured_channels(&mut self) -> bool {
        let mut changed = false;
        if self.ev_alert_channel.is_some() && !self.ev_scan_enabled {
            self.ev_scan_enabled = true;
            changed = true;
        }
        if self.arb_alert_channel.is_some() && !self.arb_scan_enabled {
            self.arb_scan_enabled = true;
            changed = true;
        }
        changed
    }

    /// Whether any scan is enabled.
    pub fn is_scanning(&self) -> bool {
        self.ev_scan_enabled || self.arb_scan_enabled
    }
}

/// All guild settings, optionally backed by a file.
#[derive(Debug, Default)]
pub struct GuildDirectory {
    guilds: RwLock<BTreeMap<String, GuildSettings>>,
    path: Option<PathBuf>,
}

impl GuildDirectory {
    /// In-memory directory.
    pub fn new(guilds: BTreeMap<String, GuildSettings>) -> Self {
        Self {
            guilds: RwLock::new(guilds),
            path: None,
        }
    }

    /// Load from `path`, enabling scans for guilds with channels set.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn load(path: PathBuf) -> Result<Self, LedgerError> {
        let mut guilds: BTreeMap<String, GuildSettings> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| LedgerError::Json {
                path: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No settings file found, starting fresh");
                BTreeMap::new()
            }
            Err(source) => {
                return Err(LedgerError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let enabled = guilds
            .values_mut()
            .map(GuildSettings::enable_configured_channels)
            .filter(|changed| *changed)
            .count();
        info!(guilds = guilds.len(), auto_enabled = enabled, "Loaded guild settings");

        let directory = Self {
            guilds: RwLock::new(guilds),
            path: Some(path),
        };
        if enabled > 0 {
            directory.save().await?;
        }
        Ok(directory)
    }

    /// Settings for one guild.
    pub async fn get(&self, guild_id: &str) -> Option<GuildSettings> {
        self.guilds.read().await.get(guild_id).cloned()
    }

    /// Snapshot of every guild.
    pub async fn all(&self) -> BTreeMap<String, GuildSettings> {
        self.guilds.read().await.clone()
    }

    /// Guilds with at least one scan enabled.
    pub async fn scanning(&self) -> Vec<(String, GuildSettings)> {
        self.guilds
            .read()
            .await
            .iter()
            .filter(|(_, s)| s.is_scanning())
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect()
    }

    /// Insert or replace a guild's settings and save.
    pub async fn upsert(&self, guild_id: &str, settings: GuildSettings) -> Result<(), LedgerError> {
        let mut guilds = self.guilds.write().await;
        guilds.insert(guild_id.to_string(), settings);
        self.write_file(&guilds).await
    }

    /// Save to the backing file, if any.
    pub async fn save(&self) -> Result<(), LedgerError> {
        let guilds = self.guilds.read().await;
        self.write_file(&guilds).await
    }

    async fn write_file(&self, guilds: &BTreeMap<String, GuildSettings>) -> Result<(), LedgerError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let display = path.display().to_string();
        let bytes = serde_json::to_vec_pretty(guilds).map_err(|source| LedgerError::Json {
            path: display.clone(),
            source,
        })?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|source| LedgerError::Io { path: display, source })
    }
}

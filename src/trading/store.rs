//! JSON persistence for bankrolls, active bets and the review queue.
//!
//! Each file is rewritten in full on save (temp file + rename) and reloaded
//! in full at startup. A missing file is an empty store.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use super::bankroll::GuildBankroll;
use super::bet::{ActiveBet, ReviewEntry};
use crate::config::Config;
use crate::error::LedgerError;

/// Bankrolls keyed by guild id.
pub type BankrollMap = BTreeMap<String, GuildBankroll>;

/// Active bets keyed by bet id.
pub type ActiveBetMap = BTreeMap<String, ActiveBet>;

/// File locations for the ledger.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    bankroll_path: PathBuf,
    active_bets_path: PathBuf,
    review_path: PathBuf,
}

impl LedgerStore {
    /// Store rooted at explicit paths.
    pub fn new(
        bankroll_path: impl Into<PathBuf>,
        active_bets_path: impl Into<PathBuf>,
        review_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bankroll_path: bankroll_path.into(),
            active_bets_path: active_bets_path.into(),
            review_path: review_path.into(),
        }
    }

    /// Store at the configured paths.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.bankroll_file.clone(),
            config.active_bets_file.clone(),
            config.review_file.clone(),
        )
    }

    /// Store with the default file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(
            dir.join("bankroll_data.json"),
            dir.join("active_bets.json"),
            dir.join("review_bets.json"),
        )
    }

    /// Load bankrolls, rejecting any that break the accounting invariant.
    pub async fn load_bankrolls(&self) -> Result<BankrollMap, LedgerError> {
        let bankrolls: BankrollMap = read_json(&self.bankroll_path).await?;
        for (guild_id, bankroll) in &bankrolls {
            bankroll.validate(guild_id)?;
        }
        Ok(bankrolls)
    }

    /// Save bankrolls.
    pub async fn save_bankrolls(&self, bankrolls: &BankrollMap) -> Result<(), LedgerError> {
        write_json(&self.bankroll_path, bankrolls).await
    }

    /// Load active bets.
    pub async fn load_active_bets(&self) -> Result<ActiveBetMap, LedgerError> {
        read_json(&self.active_bets_path).await
    }

    /// Save active bets.
    pub async fn save_active_bets(&self, bets: &ActiveBetMap) -> Result<(), LedgerError> {
        write_json(&self.active_bets_path, bets).await
    }

    /// Load the review queue.
    pub async fn load_review(&self) -> Result<Vec<ReviewEntry>, LedgerError> {
        read_json(&self.review_path).await
    }

    /// Save the review queue.
    pub async fn save_review(&self, entries: &[ReviewEntry]) -> Result<(), LedgerError> {
        write_json(&self.review_path, entries).await
    }
}

#[instrument(skip_all, fields(path = %path.display()))]
async fn read_json<T>(path: &Path) -> Result<T, LedgerError>
where
    T: DeserializeOwned + Default,
{
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Store file absent, starting empty");
            return Ok(T::default());
        }
        Err(source) => {
            return Err(LedgerError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };

    serde_json::from_slice(&bytes).map_err(|source| LedgerError::Json {
        path: path.display().to_string(),
        source,
    })
}

async fn write_json<T>(path: &Path, value: &T) -> Result<(), LedgerError>
where
    T: Serialize + ?Sized,
{
    let display = path.display().to_string();
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| LedgerError::Json {
        path: display.clone(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|source| LedgerError::Io {
            path: display.clone(),
            source,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| LedgerError::Io {
            path: display,
            source,
        })?;

    debug!(path = %path.display(), bytes = bytes.len(), "Store file written");
    Ok(())
}

//! Persisted record of networks this device has successfully joined.
//!
//! The ledger is independent from NetworkManager's own profile store: an entry
//! is created on the first successful connection, touched on every later one,
//! and removed only by an explicit forget.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WifiManagerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedNetwork {
    pub ssid: String,
    pub connected_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

/// CRUD contract of the saved-networks store.
pub trait SavedNetworkLedger: Send + Sync {
    /// Inserts `ssid` stamped with the current time, or refreshes its `last_used`.
    fn add_or_touch(&self, ssid: &str) -> Result<()>;

    /// All saved networks, most recently used first.
    fn list(&self) -> Result<Vec<SavedNetwork>>;

    /// Removes `ssid`, returning whether it was present.
    fn remove(&self, ssid: &str) -> Result<bool>;

    fn exists(&self, ssid: &str) -> Result<bool>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    networks: Vec<SavedNetwork>,
}

/// Ledger stored as a TOML file.
///
/// Every operation is a whole-file read-modify-write under an internal lock.
/// A missing file reads as an empty ledger.
#[derive(Debug)]
pub struct TomlLedger {
    path: PathBuf,
    guard: Mutex<()>,
}

impl TomlLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load(&self) -> Result<LedgerFile> {
        if !self.path.exists() {
            return Ok(LedgerFile::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| WifiManagerError::LedgerRead {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let file = toml::from_str(&content).map_err(|e| WifiManagerError::LedgerParse {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        Ok(file)
    }

    fn save(&self, file: &LedgerFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create ledger directory: {}", parent.display())
                })?;
            }
        }

        let content = toml::to_string_pretty(file).context("Failed to serialize ledger")?;

        // Write beside the target and rename so readers never see a partial file
        let staging = self.path.with_extension("toml.tmp");
        fs::write(&staging, content)
            .and_then(|_| fs::rename(&staging, &self.path))
            .map_err(|e| WifiManagerError::LedgerWrite {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

impl SavedNetworkLedger for TomlLedger {
    fn add_or_touch(&self, ssid: &str) -> Result<()> {
        let _guard = self.lock();
        let mut file = self.load()?;
        let now = Utc::now();

        match file.networks.iter_mut().find(|n| n.ssid == ssid) {
            Some(existing) => existing.last_used = now,
            None => file.networks.push(SavedNetwork {
                ssid: ssid.to_string(),
                connected_at: now,
                last_used: now,
            }),
        }

        self.save(&file)?;
        debug!(ssid, "ledger entry stored");
        Ok(())
    }

    fn list(&self) -> Result<Vec<SavedNetwork>> {
        let _guard = self.lock();
        let mut networks = self.load()?.networks;
        networks.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        Ok(networks)
    }

    fn remove(&self, ssid: &str) -> Result<bool> {
        let _guard = self.lock();
        let mut file = self.load()?;
        let before = file.networks.len();
        file.networks.retain(|n| n.ssid != ssid);

        if file.networks.len() == before {
            return Ok(false);
        }

        self.save(&file)?;
        debug!(ssid, "ledger entry removed");
        Ok(true)
    }

    fn exists(&self, ssid: &str) -> Result<bool> {
        let _guard = self.lock();
        Ok(self.load()?.networks.iter().any(|n| n.ssid == ssid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let ledger = TomlLedger::new(dir.path().join("saved.toml"));

        assert!(ledger.list().unwrap().is_empty());
        assert!(!ledger.exists("Home").unwrap());
        assert!(!ledger.remove("Home").unwrap());
    }

    #[test]
    fn add_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("saved.toml");
        let ledger = TomlLedger::new(&path);

        ledger.add_or_touch("Home").unwrap();

        assert!(path.exists());
        assert!(ledger.exists("Home").unwrap());
    }

    #[test]
    fn touch_keeps_first_connection_time() {
        let dir = tempdir().unwrap();
        let ledger = TomlLedger::new(dir.path().join("saved.toml"));

        ledger.add_or_touch("Home").unwrap();
        let first = ledger.list().unwrap().remove(0);
        sleep(Duration::from_millis(5));
        ledger.add_or_touch("Home").unwrap();
        let second = ledger.list().unwrap().remove(0);

        assert_eq!(ledger.list().unwrap().len(), 1);
        assert_eq!(first.connected_at, second.connected_at);
        assert!(second.last_used > first.last_used);
    }

    #[test]
    fn list_is_most_recent_first() {
        let dir = tempdir().unwrap();
        let ledger = TomlLedger::new(dir.path().join("saved.toml"));

        for ssid in ["Alpha", "Beta", "Gamma"] {
            ledger.add_or_touch(ssid).unwrap();
            sleep(Duration::from_millis(5));
        }
        ledger.add_or_touch("Alpha").unwrap();

        let order: Vec<String> = ledger.list().unwrap().into_iter().map(|n| n.ssid).collect();
        assert_eq!(order, vec!["Alpha", "Gamma", "Beta"]);
    }

    #[test]
    fn remove_reports_presence() {
        let dir = tempdir().unwrap();
        let ledger = TomlLedger::new(dir.path().join("saved.toml"));
        ledger.add_or_touch("Home").unwrap();

        assert!(ledger.remove("Home").unwrap());
        assert!(!ledger.remove("Home").unwrap());
        assert!(!ledger.exists("Home").unwrap());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        TomlLedger::new(&path).add_or_touch("Home").unwrap();

        let reopened = TomlLedger::new(&path);
        assert!(reopened.exists("Home").unwrap());
    }

    #[test]
    fn corrupt_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        fs::write(&path, "networks = 7 = nope").unwrap();

        let err = TomlLedger::new(&path).list().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WifiManagerError>(),
            Some(WifiManagerError::LedgerParse { .. })
        ));
    }
}

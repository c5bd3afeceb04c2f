use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::WifiManagerError;

pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub interfaces: Interfaces,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub ledger: Ledger,
    #[serde(default)]
    pub logger: Logger,
}

/// The two radios this device manages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Interfaces {
    /// Joins external networks.
    pub client: String,
    /// Hosts the device's own hotspot.
    pub access_point: String,
}

impl Default for Interfaces {
    fn default() -> Self {
        Self {
            client: "wlan0".to_string(),
            access_point: "wlan1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Credentials accepted by the HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
        }
    }
}

impl AuthConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Ledger {
    /// Location of the saved-networks file; see [`default_ledger_path`].
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logger {
    pub level: String,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, or from [`config_path`] when none is given.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };
        if !path.exists() {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings = toml::from_str(&content).map_err(|e| WifiManagerError::Settings {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        Ok(settings)
    }

    pub fn ledger_path(&self) -> Result<PathBuf> {
        match &self.ledger.path {
            Some(path) => Ok(path.clone()),
            None => default_ledger_path(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("wifi-manager").join("config.toml"))
}

pub fn default_ledger_path() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir().context("Could not determine data directory")?;
    Ok(data_dir.join("wifi-manager").join("saved_networks.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(Some(&dir.path().join("absent.toml"))).unwrap();

        assert_eq!(settings.interfaces.client, "wlan0");
        assert_eq!(settings.interfaces.access_point, "wlan1");
        assert_eq!(settings.server.port, 8080);
        assert!(settings.auth.is_default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[interfaces]\nclient = \"wlx00c0ca\"\n\n[auth]\npassword = \"hunter2\"\n\n[ledger]\npath = \"/var/lib/wifi/saved.toml\"\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();

        assert_eq!(settings.interfaces.client, "wlx00c0ca");
        assert_eq!(settings.interfaces.access_point, "wlan1");
        assert_eq!(settings.auth.username, DEFAULT_USERNAME);
        assert!(settings.auth.verify("admin", "hunter2"));
        assert!(!settings.auth.is_default());
        assert_eq!(settings.ledger_path().unwrap(), PathBuf::from("/var/lib/wifi/saved.toml"));
        assert_eq!(settings.logger.level, "info");
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server\nport = 1").unwrap();

        let err = Settings::load(Some(&path)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WifiManagerError>(),
            Some(WifiManagerError::Settings { .. })
        ));
    }
}

use crate::TelloError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LOCAL_ADDR: &str = "0.0.0.0:8889";
pub const DEFAULT_REMOTE_ADDR: &str = "192.168.10.1:8889";

/// Long enough for a flip or a takeoff, which the device only acknowledges
/// once the manoeuvre has finished.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_local_addr")]
    pub local_addr: String,

    #[serde(default = "default_remote_addr")]
    pub remote_addr: String,

    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

fn default_local_addr() -> String {
    DEFAULT_LOCAL_ADDR.to_string()
}

fn default_remote_addr() -> String {
    DEFAULT_REMOTE_ADDR.to_string()
}

fn default_command_timeout_ms() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_MS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            local_addr: default_local_addr(),
            remote_addr: default_remote_addr(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl SessionConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Reads the session configuration from `<config dir>/tello/config.json`.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new() -> Result<Self, TelloError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| TelloError::Config("could not find config directory".into()))?;

        Ok(Self {
            path: config_dir.join("tello").join("config.json"),
        })
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Missing file means defaults.
    pub fn load(&self) -> Result<SessionConfig, TelloError> {
        if !self.path.exists() {
            return Ok(SessionConfig::default());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| TelloError::Config(format!("{}: {e}", self.path.display())))?;
        let config: SessionConfig = serde_json::from_str(&content)
            .map_err(|e| TelloError::Config(format!("{}: {e}", self.path.display())))?;

        Ok(config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::from_path(dir.path().join("config.json"));

        assert_eq!(store.load().unwrap(), SessionConfig::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "remote_addr": "10.0.0.7:8889" }"#).unwrap();

        let config = ConfigStore::from_path(&path).load().unwrap();
        assert_eq!(config.remote_addr, "10.0.0.7:8889");
        assert_eq!(config.local_addr, DEFAULT_LOCAL_ADDR);
        assert_eq!(
            config.command_timeout(),
            Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS)
        );
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = ConfigStore::from_path(&path).load().unwrap_err();
        assert!(matches!(err, TelloError::Config(_)));
    }
}

//! Optional TOML configuration file
//!
//! ```toml
//! [server]
//! ip = "0.0.0.0"
//! port = 61125
//! directory = "server-files"
//! read_only = false
//!
//! [client]
//! server = "127.0.0.1"
//! port = 61125
//! directory = "client-files"
//!
//! [transfer]
//! timeout = "1s"
//! max_retries = 10
//! block_size = 512
//! ```

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::tftp::core::TransferOptions;

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "XTFTP_CONFIG";

/// Config file picked up from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "xtftp.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerSection,
    pub client: ClientSection,
    pub transfer: TransferOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
    pub directory: Option<PathBuf>,
    pub read_only: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub server: Option<IpAddr>,
    pub port: Option<u16>,
    pub directory: Option<PathBuf>,
    pub mode: Option<String>,
}

impl FileConfig {
    /// Load the effective config file
    ///
    /// Lookup order: `explicit`, then `$XTFTP_CONFIG`, then `./xtftp.toml`.
    /// Without any of them the built-in defaults apply.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match Self::locate(explicit) {
            Some(path) => Self::from_path(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config
            .transfer
            .validate()
            .with_context(|| format!("Invalid [transfer] section in {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        local.is_file().then_some(local)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serial_test::serial;

    use super::*;

    #[test]
    fn parses_all_sections() {
        let config: FileConfig = toml::from_str(
            r#"
            [server]
            ip = "0.0.0.0"
            read_only = true

            [client]
            server = "10.0.0.2"
            mode = "octet"

            [transfer]
            timeout = "2s 500ms"
            max_retries = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.read_only, Some(true));
        assert_eq!(config.server.port, None);
        assert_eq!(config.client.server, Some("10.0.0.2".parse().unwrap()));
        assert_eq!(config.transfer.timeout, Duration::from_millis(2500));
        assert_eq!(config.transfer.max_retries, 5);
        assert_eq!(config.transfer.block_size, 512);
    }

    #[test]
    fn rejects_invalid_transfer_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[transfer]\nblock_size = 0\n").unwrap();
        assert!(FileConfig::from_path(&path).is_err());
    }

    #[test]
    #[serial]
    fn env_var_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.toml");
        std::fs::write(&path, "[server]\nport = 7000\n").unwrap();

        unsafe { std::env::set_var(CONFIG_ENV, &path) };
        let loaded = FileConfig::load(None);
        unsafe { std::env::remove_var(CONFIG_ENV) };

        assert_eq!(loaded.unwrap().server.port, Some(7000));
    }

    #[test]
    #[serial]
    fn explicit_path_wins_over_env() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("env.toml");
        let cli_path = dir.path().join("cli.toml");
        std::fs::write(&env_path, "[server]\nport = 7000\n").unwrap();
        std::fs::write(&cli_path, "[server]\nport = 7001\n").unwrap();

        unsafe { std::env::set_var(CONFIG_ENV, &env_path) };
        let loaded = FileConfig::load(Some(&cli_path));
        unsafe { std::env::remove_var(CONFIG_ENV) };

        assert_eq!(loaded.unwrap().server.port, Some(7001));
    }
}

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::config::FileConfig;
use crate::tftp::DEFAULT_PORT;
use crate::tftp::core::TransferOptions;

/// Default directory served by the server
pub const DEFAULT_SERVER_DIR: &str = "server-files";

/// TFTP server configuration
///
/// # Example
///
/// ```rust
/// use xtftp::tftp::server::Config;
/// use std::path::PathBuf;
///
/// let config = Config::new(
///     "127.0.0.1".parse().unwrap(),
///     61125,
///     PathBuf::from("/tmp/tftp"),
///     false,
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address to listen on
    pub ip_address: IpAddr,
    /// Port number to listen on
    pub port: u16,
    /// Directory files are served from and uploaded to
    pub directory: PathBuf,
    /// Whether to use read-only mode (reject all write requests)
    pub read_only: bool,
    /// Timeout, retry ceiling and block size for every session
    pub transfer: TransferOptions,
}

impl Config {
    /// Create a new configuration
    ///
    /// # Arguments
    ///
    /// * `ip_address` - IP address to listen on
    /// * `port` - Port number to listen on
    /// * `directory` - Root directory for files
    /// * `read_only` - Whether to use read-only mode
    pub fn new(ip_address: IpAddr, port: u16, directory: PathBuf, read_only: bool) -> Self {
        Self {
            ip_address,
            port,
            directory,
            read_only,
            transfer: TransferOptions::default(),
        }
    }

    /// Built-in defaults: all interfaces, the well-known port, `server-files/`
    pub fn with_defaults() -> Self {
        Self::new(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            DEFAULT_PORT,
            PathBuf::from(DEFAULT_SERVER_DIR),
            false,
        )
    }

    /// Overlay values from the `[server]` and `[transfer]` file sections
    pub fn merge_file(mut self, file: &FileConfig) -> Self {
        let section = &file.server;
        if let Some(ip) = section.ip {
            self.ip_address = ip;
        }
        if let Some(port) = section.port {
            self.port = port;
        }
        if let Some(directory) = &section.directory {
            self.directory = directory.clone();
        }
        if let Some(read_only) = section.read_only {
            self.read_only = read_only;
        }
        self.transfer = file.transfer;
        self
    }

    /// Overlay command line values, which win over everything else
    pub fn merge_cli(
        mut self,
        ip: Option<IpAddr>,
        port: Option<u16>,
        directory: Option<PathBuf>,
        read_only: bool,
    ) -> Self {
        if let Some(ip) = ip {
            self.ip_address = ip;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(directory) = directory {
            self.directory = directory;
        }
        self.read_only |= read_only;
        self
    }

    /// Set the per-session transfer options
    pub fn with_transfer(mut self, transfer: TransferOptions) -> Self {
        self.transfer = transfer;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            [server]
            port = 6969
            directory = "/srv/tftp"

            [transfer]
            max_retries = 4
            "#,
        )
        .unwrap();

        let config = Config::with_defaults().merge_file(&file).merge_cli(
            Some("127.0.0.1".parse().unwrap()),
            None,
            Some(PathBuf::from("/tmp/override")),
            true,
        );

        assert_eq!(config.ip_address, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(config.port, 6969);
        assert_eq!(config.directory, PathBuf::from("/tmp/override"));
        assert!(config.read_only);
        assert_eq!(config.transfer.max_retries, 4);
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.directory, PathBuf::from(DEFAULT_SERVER_DIR));
        assert!(!config.read_only);
    }
}

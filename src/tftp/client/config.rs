use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::FileConfig;
use crate::tftp::DEFAULT_PORT;
use crate::tftp::core::TransferOptions;

/// Default local directory for downloads and uploads
pub const DEFAULT_CLIENT_DIR: &str = "client-files";

/// TFTP client configuration
///
/// # Example
///
/// ```rust
/// use xtftp::tftp::client::ClientConfig;
///
/// let config = ClientConfig::new("192.168.1.100".parse().unwrap(), 69);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server IP address
    pub server_ip: IpAddr,
    /// Server port number
    pub server_port: u16,
    /// Local directory files are read from and stored into
    pub directory: PathBuf,
    /// Transfer mode (only octet is meaningful)
    pub mode: String,
    /// Timeout, retry ceiling and block size
    pub transfer: TransferOptions,
}

impl ClientConfig {
    /// Create new client configuration
    ///
    /// # Arguments
    ///
    /// * `server_ip` - Server IP address
    /// * `server_port` - Server port number
    pub fn new(server_ip: IpAddr, server_port: u16) -> Self {
        Self {
            server_ip,
            server_port,
            directory: PathBuf::from(DEFAULT_CLIENT_DIR),
            mode: "octet".to_string(),
            transfer: TransferOptions::default(),
        }
    }

    /// Set timeout duration
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transfer.timeout = timeout;
        self
    }

    /// Set the retry ceiling
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.transfer.max_retries = max_retries;
        self
    }

    /// Set the local files directory
    pub fn with_directory(mut self, directory: PathBuf) -> Self {
        self.directory = directory;
        self
    }

    /// Overlay values from the `[client]` and `[transfer]` file sections
    pub fn merge_file(mut self, file: &FileConfig) -> Self {
        let section = &file.client;
        if let Some(server) = section.server {
            self.server_ip = server;
        }
        if let Some(port) = section.port {
            self.server_port = port;
        }
        if let Some(directory) = &section.directory {
            self.directory = directory.clone();
        }
        if let Some(mode) = &section.mode {
            self.mode = mode.clone();
        }
        self.transfer = file.transfer;
        self
    }

    /// Overlay command line values
    pub fn merge_cli(
        mut self,
        server: Option<IpAddr>,
        port: Option<u16>,
        directory: Option<PathBuf>,
    ) -> Self {
        if let Some(server) = server {
            self.server_ip = server;
        }
        if let Some(port) = port {
            self.server_port = port;
        }
        if let Some(directory) = directory {
            self.directory = directory;
        }
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT)
    }
}

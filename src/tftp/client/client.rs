use std::fs::{self, File};
use std::io::{self, Write};
use std::net::{SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};

use super::config::ClientConfig;
use crate::tftp::core::{
    Packet, TftpError, TransferSession, await_ack, receive_file, send_file,
};

/// TFTP client
///
/// Supports file upload (PUT) and download (GET) operations
///
/// # Example
///
/// ```rust,no_run
/// use xtftp::tftp::client::{Client, ClientConfig};
/// use std::path::Path;
///
/// let config = ClientConfig::new("192.168.1.100".parse().unwrap(), 61125);
/// let client = Client::new(config).unwrap();
///
/// // Download file
/// client.get("remote.txt", Path::new("local.txt")).unwrap();
///
/// // Upload file
/// client.put(Path::new("local.txt"), "remote.txt").unwrap();
/// ```
pub struct Client {
    config: ClientConfig,
}

impl Client {
    /// Create a new TFTP client
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        config.transfer.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Download a file from the server (RRQ - Read Request)
    ///
    /// The local file is only created once the first block arrives, and is
    /// removed again if the transfer fails.
    ///
    /// # Arguments
    ///
    /// * `remote_file` - File name on the server
    /// * `local_file` - Local save path
    pub fn get(&self, remote_file: &str, local_file: &Path) -> anyhow::Result<u64> {
        log::info!("Downloading {} to {}", remote_file, local_file.display());

        let socket = self.bind()?;
        let mut session = self.session();

        let rrq = Packet::Rrq {
            filename: remote_file.to_string(),
            mode: self.config.mode.clone(),
        };
        session.transmit(&socket, &rrq)?;

        let mut sink = LazyFile::new(local_file);
        match receive_file(&socket, &mut session, &mut sink) {
            Ok(bytes) => {
                log::info!("Download complete: {} ({} bytes)", local_file.display(), bytes);
                Ok(bytes)
            }
            Err(e) => {
                sink.discard();
                Err(e.into())
            }
        }
    }

    /// Upload a file to the server (WRQ - Write Request)
    ///
    /// # Arguments
    ///
    /// * `local_file` - Local file path
    /// * `remote_file` - File name on the server
    pub fn put(&self, local_file: &Path, remote_file: &str) -> anyhow::Result<u64> {
        log::info!("Uploading {} to {}", local_file.display(), remote_file);

        if !local_file.is_file() {
            return Err(anyhow::anyhow!(
                "Local file does not exist: {}",
                local_file.display()
            ));
        }
        let mut file = File::open(local_file).map_err(TftpError::File)?;

        let socket = self.bind()?;
        let mut session = self.session();

        let wrq = Packet::Wrq {
            filename: remote_file.to_string(),
            mode: self.config.mode.clone(),
        };
        session.transmit(&socket, &wrq)?;

        // Wait for ACK 0
        await_ack(&socket, &mut session)?;
        let bytes = send_file(&socket, &mut session, &mut file)?;

        log::info!("Upload complete: {} ({} bytes)", remote_file, bytes);
        Ok(bytes)
    }

    fn session(&self) -> TransferSession {
        let server_addr = SocketAddr::new(self.config.server_ip, self.config.server_port);
        TransferSession::new(server_addr, self.config.transfer, 0).follow_first_reply()
    }

    /// Create local socket on an ephemeral port
    fn bind(&self) -> Result<UdpSocket, TftpError> {
        let local = if self.config.server_ip.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(local).map_err(TftpError::Bind)?;
        socket
            .set_write_timeout(Some(self.config.transfer.timeout))
            .map_err(TftpError::Socket)?;
        log::debug!("Bound local socket {:?}", socket.local_addr());
        Ok(socket)
    }
}

/// Output file opened on first use
struct LazyFile {
    path: PathBuf,
    file: Option<File>,
}

impl LazyFile {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: None,
        }
    }

    fn get(&mut self) -> io::Result<&mut File> {
        match self.file {
            Some(ref mut file) => Ok(file),
            None => Ok(self.file.insert(File::create(&self.path)?)),
        }
    }

    /// Remove whatever was written so far
    fn discard(self) {
        if let Some(file) = self.file {
            drop(file);
            if let Err(e) = fs::remove_file(&self.path) {
                log::warn!("Could not remove {}: {}", self.path.display(), e);
            }
        }
    }
}

impl Write for LazyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.get()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.get()?.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazy_file_is_created_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");

        let mut sink = LazyFile::new(&path);
        assert!(!path.exists());
        sink.write_all(&[]).unwrap();
        sink.flush().unwrap();
        assert!(path.exists());
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn discard_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.bin");

        let mut sink = LazyFile::new(&path);
        sink.write_all(b"half").unwrap();
        sink.discard();
        assert!(!path.exists());

        let untouched = LazyFile::new(&dir.path().join("never.bin"));
        untouched.discard();
    }
}

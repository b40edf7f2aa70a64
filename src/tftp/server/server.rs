use std::fs::{File, OpenOptions};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::path::{Component, Path, PathBuf};

use anyhow::Context;

use super::backlog::{Backlog, Pending, SessionSocket};
use super::config::Config;
use super::worker::Worker;
use crate::tftp::core::{ErrorCode, Packet, Socket, TftpError};

/// Largest request datagram read by the dispatcher
const MAX_REQUEST_LEN: usize = 65536;

/// What the dispatcher did with one inbound datagram
#[derive(Debug)]
pub enum Served {
    /// A read request completed; bytes sent
    Sent(u64),
    /// A write request completed; bytes stored
    Received(u64),
    /// The request was refused with an ERROR packet
    Rejected(ErrorCode),
    /// A session started but ended on a protocol error
    Failed(TftpError),
    /// The datagram did not warrant a reply
    Ignored,
}

/// TFTP server
///
/// Serves one transfer at a time on a single socket. Requests from other
/// peers that arrive while a session runs are queued and served in order
/// once it ends; any other foreign datagram is an unknown transfer ID.
pub struct Server {
    socket: UdpSocket,
    config: Config,
    backlog: Backlog,
}

impl Server {
    /// Bind the listening socket described by `config`
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        config.transfer.validate()?;
        let addr = SocketAddr::new(config.ip_address, config.port);
        let socket = UdpSocket::bind(addr)
            .map_err(TftpError::Bind)
            .with_context(|| format!("Failed to bind {}", addr))?;

        Ok(Self {
            socket,
            config: config.clone(),
            backlog: Backlog::default(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serve requests until the socket itself fails
    pub fn listen(&mut self) -> Result<(), TftpError> {
        loop {
            log::debug!("Waiting to receive request");
            self.handle_next()?;
        }
    }

    /// Wait for one request and run it to completion
    ///
    /// Only transport failures are returned as errors; everything that merely
    /// ends a session is reported through [`Served`].
    pub fn handle_next(&mut self) -> Result<Served, TftpError> {
        if let Some(Pending { bytes, from }) = self.backlog.pop() {
            log::debug!("Serving queued request from {}", from);
            return self.dispatch(&bytes, from);
        }

        let mut buf = vec![0u8; MAX_REQUEST_LEN];
        let (len, peer) = Socket::recv_from(&self.socket, &mut buf).map_err(TftpError::Receive)?;
        self.dispatch(&buf[..len], peer)
    }

    fn dispatch(&self, datagram: &[u8], peer: SocketAddr) -> Result<Served, TftpError> {
        match Packet::deserialize(datagram) {
            Ok(Packet::Rrq { filename, mode }) => self.serve_read(peer, &filename, &mode),
            Ok(Packet::Wrq { filename, mode }) => self.serve_write(peer, &filename, &mode),
            Ok(Packet::Error { code, msg }) => {
                log::warn!("Ignoring stray error {} from {}: {}", code, peer, msg);
                Ok(Served::Ignored)
            }
            Ok(other) => {
                log::warn!("Received {} from {} outside a transfer", other.kind(), peer);
                self.reject(peer, ErrorCode::IllegalOperation, "Illegal operation")
            }
            Err(e) => {
                log::warn!("Received message has an illegal opcode from {}: {}", peer, e);
                self.reject(peer, ErrorCode::IllegalOperation, "Illegal opcode")
            }
        }
    }

    fn serve_read(&self, peer: SocketAddr, filename: &str, mode: &str) -> Result<Served, TftpError> {
        log::info!("RRQ {} ({}) from {}", filename, mode, peer);
        if !is_supported_mode(mode) {
            return self.reject(peer, ErrorCode::IllegalOperation, "Unsupported mode");
        }
        let Some(path) = resolve_path(&self.config.directory, filename) else {
            return self.reject(peer, ErrorCode::AccessViolation, "Access violation");
        };

        let file = match path.is_file().then(|| File::open(&path)) {
            Some(Ok(file)) => file,
            Some(Err(e)) => {
                log::warn!("Unable to open {} for read: {}", path.display(), e);
                return self.reject(peer, ErrorCode::AccessViolation, "Unable to open file for read");
            }
            None => {
                log::info!("The file does not exist: {}", path.display());
                return self.reject(peer, ErrorCode::FileNotFound, "File does not exist");
            }
        };

        let socket = SessionSocket::new(&self.socket, peer, &self.backlog);
        let result = Worker::new(&socket, peer, self.config.transfer).send(file);
        finish(peer, filename, result.map(Served::Sent))
    }

    fn serve_write(&self, peer: SocketAddr, filename: &str, mode: &str) -> Result<Served, TftpError> {
        log::info!("WRQ {} ({}) from {}", filename, mode, peer);
        if !is_supported_mode(mode) {
            return self.reject(peer, ErrorCode::IllegalOperation, "Unsupported mode");
        }
        if self.config.read_only {
            return self.reject(peer, ErrorCode::AccessViolation, "Server is read-only");
        }
        let Some(path) = resolve_path(&self.config.directory, filename) else {
            return self.reject(peer, ErrorCode::AccessViolation, "Access violation");
        };

        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                log::info!("The file already exists: {}", path.display());
                return self.reject(peer, ErrorCode::FileExists, "File already exists");
            }
            Err(e) => {
                log::warn!("Unable to open {} for write: {}", path.display(), e);
                return self.reject(peer, ErrorCode::AccessViolation, "Unable to open file for write");
            }
        };

        let socket = SessionSocket::new(&self.socket, peer, &self.backlog);
        let result = Worker::new(&socket, peer, self.config.transfer).receive(file, &path);
        finish(peer, filename, result.map(Served::Received))
    }

    fn reject(&self, peer: SocketAddr, code: ErrorCode, msg: &str) -> Result<Served, TftpError> {
        let bytes = Packet::error(code, msg).serialize()?;
        Socket::send_to(&self.socket, &bytes, peer).map_err(TftpError::Send)?;
        Ok(Served::Rejected(code))
    }
}

fn finish(
    peer: SocketAddr,
    filename: &str,
    result: Result<Served, TftpError>,
) -> Result<Served, TftpError> {
    match result {
        Ok(served) => {
            log::info!("Transfer of {} with {} finished: {:?}", filename, peer, served);
            Ok(served)
        }
        Err(e) if e.is_transport() => Err(e),
        Err(e) => {
            log::error!("Transfer of {} with {} failed: {}", filename, peer, e);
            Ok(Served::Failed(e))
        }
    }
}

fn is_supported_mode(mode: &str) -> bool {
    mode.eq_ignore_ascii_case("octet") || mode.eq_ignore_ascii_case("netascii")
}

/// Map a requested filename into `root`, refusing anything that escapes it
fn resolve_path(root: &Path, filename: &str) -> Option<PathBuf> {
    let relative = Path::new(filename);
    let confined = !filename.is_empty()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    confined.then(|| root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_plain_names_inside_root() {
        let root = Path::new("/srv/tftp");
        assert_eq!(
            resolve_path(root, "boot/pxelinux.0"),
            Some(PathBuf::from("/srv/tftp/boot/pxelinux.0"))
        );
        assert_eq!(resolve_path(root, "../etc/passwd"), None);
        assert_eq!(resolve_path(root, "/etc/passwd"), None);
        assert_eq!(resolve_path(root, "a/../../b"), None);
        assert_eq!(resolve_path(root, ""), None);
    }

    #[test]
    fn modes() {
        assert!(is_supported_mode("octet"));
        assert!(is_supported_mode("OCTET"));
        assert!(is_supported_mode("netascii"));
        assert!(!is_supported_mode("mail"));
    }
}

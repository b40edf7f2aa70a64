use std::fs::{self, File};
use std::net::SocketAddr;
use std::path::Path;

use crate::tftp::core::{
    Packet, Result, Socket, TransferOptions, TransferSession, receive_file, send_file,
};

/// Runs one accepted transfer on the server's socket
///
/// A fresh [`TransferSession`] is built for every worker, so block numbers
/// and retry counts never carry over between requests.
pub struct Worker<'a, S: Socket + ?Sized> {
    socket: &'a S,
    peer: SocketAddr,
    options: TransferOptions,
}

impl<'a, S: Socket + ?Sized> Worker<'a, S> {
    pub fn new(socket: &'a S, peer: SocketAddr, options: TransferOptions) -> Self {
        Self {
            socket,
            peer,
            options,
        }
    }

    /// Serve a read request: push `file` to the peer starting at block 1
    pub fn send(self, mut file: File) -> Result<u64> {
        let mut session = TransferSession::new(self.peer, self.options, 0);
        send_file(self.socket, &mut session, &mut file)
    }

    /// Serve a write request: ACK 0, then store DATA blocks into `file`
    ///
    /// An upload that does not complete is deleted so a retry is not blocked
    /// by the "file already exists" check.
    pub fn receive(self, mut file: File, path: &Path) -> Result<u64> {
        let mut session = TransferSession::new(self.peer, self.options, 0);
        let result = session
            .transmit(self.socket, &Packet::Ack(0))
            .and_then(|_| receive_file(self.socket, &mut session, &mut file));

        if result.is_err() {
            drop(file);
            remove_partial(path);
        }
        result
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        log::warn!("Could not remove partial upload {}: {}", path.display(), e);
    } else {
        log::info!("Removed partial upload {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::tftp::core::mock::ScriptedSocket;

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[test]
    fn failed_upload_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.bin");
        let file = File::create(&path).unwrap();

        let socket = ScriptedSocket::new();
        socket.push_packet(
            Packet::Data {
                block_num: 1,
                data: vec![7; 512],
            },
            peer(),
        );
        let options = TransferOptions::default()
            .with_timeout(Duration::from_secs(5))
            .with_max_retries(1);

        let result = Worker::new(&socket, peer(), options).receive(file, &path);
        assert!(result.is_err());
        assert!(!path.exists());
        assert_eq!(
            socket.sent_packets(),
            vec![Packet::Ack(0), Packet::Ack(1), Packet::Ack(1)]
        );
    }
}

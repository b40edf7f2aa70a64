use std::net::SocketAddr;

use super::error::{Result, TftpError};
use super::options::TransferOptions;
use super::packet::{ErrorCode, Packet};
use super::retry::{RetryController, Wait};
use super::socket::Socket;

/// Lifecycle of one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Request sent or accepted, nothing heard back yet
    AwaitingFirstReply,
    /// At least one reply accepted
    Transferring,
    /// Final block exchanged
    Completed,
    /// Ended by a protocol error or retry exhaustion
    Failed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A reply that passed the transfer-ID check
#[derive(Debug)]
pub enum Reply {
    Packet(Packet),
    Timeout,
}

/// State of a single transfer
///
/// `block` is the number currently outstanding: the DATA block a receiver
/// waits for, or the block a sender waits to see acknowledged. The retry
/// counter and the retransmission copy live here and die with the session.
#[derive(Debug)]
pub struct TransferSession {
    peer: SocketAddr,
    peer_fixed: bool,
    options: TransferOptions,
    state: TransferState,
    block: u16,
    retry: RetryController,
    last_sent: Option<Vec<u8>>,
    bytes: u64,
}

impl TransferSession {
    /// New session with `peer`, `block` being the first outstanding number
    pub fn new(peer: SocketAddr, options: TransferOptions, block: u16) -> Self {
        Self {
            peer,
            peer_fixed: true,
            retry: RetryController::new(options.timeout, options.max_retries),
            options,
            state: TransferState::AwaitingFirstReply,
            block,
            last_sent: None,
            bytes: 0,
        }
    }

    /// Let the first reply move the session to the sender's port
    ///
    /// Used by the requesting side: a server may answer from a fresh port
    /// chosen for the transfer.
    pub fn follow_first_reply(mut self) -> Self {
        self.peer_fixed = false;
        self
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn block(&self) -> u16 {
        self.block
    }

    pub fn block_size(&self) -> usize {
        self.options.block_size
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes
    }

    pub(crate) fn add_bytes(&mut self, count: usize) {
        self.bytes += count as u64;
    }

    /// Send `packet` to the peer and keep it for retransmission
    pub fn transmit<S: Socket + ?Sized>(&mut self, socket: &S, packet: &Packet) -> Result<()> {
        if self.state.is_terminal() {
            return Err(TftpError::SessionClosed);
        }
        let bytes = packet.serialize()?;
        socket.send_to(&bytes, self.peer).map_err(TftpError::Send)?;
        self.last_sent = Some(bytes);
        self.retry.arm();
        Ok(())
    }

    /// Resend the last packet byte for byte
    pub fn retransmit<S: Socket + ?Sized>(&mut self, socket: &S) -> Result<()> {
        if self.state.is_terminal() {
            return Err(TftpError::SessionClosed);
        }
        if let Some(bytes) = &self.last_sent {
            socket.send_to(bytes, self.peer).map_err(TftpError::Send)?;
        }
        self.retry.arm();
        Ok(())
    }

    /// Count a timeout: retransmit within budget, fail beyond it
    pub fn on_timeout<S: Socket + ?Sized>(&mut self, socket: &S) -> Result<()> {
        if self.retry.should_abort() {
            log::error!(
                "No reply from {} for block {} after {} timeouts, giving up",
                self.peer,
                self.block,
                self.retry.timeouts()
            );
            self.state = TransferState::Failed;
            return Err(TftpError::RetriesExhausted {
                block: self.block,
                attempts: self.retry.timeouts(),
            });
        }
        log::warn!(
            "Timeout waiting on block {} ({}/{}), retransmitting",
            self.block,
            self.retry.timeouts(),
            self.options.max_retries
        );
        self.retransmit(socket)
    }

    /// Wait for the next packet from the peer
    ///
    /// Datagrams from other addresses are answered with "unknown transfer ID"
    /// and never reach the caller.
    pub fn wait_reply<S: Socket + ?Sized>(&mut self, socket: &S, buf: &mut [u8]) -> Result<Reply> {
        loop {
            let (len, from) = match self.retry.await_reply(socket, buf) {
                Ok(Wait::Received { len, from }) => (len, from),
                Ok(Wait::Timeout) => return Ok(Reply::Timeout),
                Err(e) => {
                    self.state = TransferState::Failed;
                    return Err(TftpError::Receive(e));
                }
            };

            if from != self.peer {
                let rebind = !self.peer_fixed
                    && self.state == TransferState::AwaitingFirstReply
                    && from.ip() == self.peer.ip();
                if rebind {
                    log::debug!("Peer moved from {} to {}", self.peer, from);
                    self.peer = from;
                    self.peer_fixed = true;
                } else {
                    log::warn!("Ignoring datagram from unknown peer {}", from);
                    let reject = Packet::error(ErrorCode::UnknownTransferId, "Unknown transfer ID");
                    if let Ok(bytes) = reject.serialize() {
                        socket.send_to(&bytes, from).map_err(TftpError::Send)?;
                    }
                    continue;
                }
            }

            return match Packet::deserialize(&buf[..len]) {
                Ok(packet) => Ok(Reply::Packet(packet)),
                Err(e) => {
                    self.abort(socket, ErrorCode::IllegalOperation, "Malformed packet");
                    Err(e)
                }
            };
        }
    }

    /// Accept a reply for `block` if it is the one outstanding
    pub fn accept(&mut self, block: u16) -> bool {
        if self.state.is_terminal() || block != self.block {
            return false;
        }
        self.retry.reset();
        self.state = TransferState::Transferring;
        true
    }

    /// Move on to the next block number, wrapping at 65536
    pub fn advance(&mut self) {
        self.block = self.block.wrapping_add(1);
    }

    /// Wait afresh after answering a duplicate
    pub fn restart_wait(&mut self) {
        self.retry.cancel();
    }

    pub fn complete(&mut self) {
        self.state = TransferState::Completed;
        self.last_sent = None;
    }

    pub fn fail(&mut self) {
        self.state = TransferState::Failed;
        self.last_sent = None;
    }

    /// Tell the peer why the transfer ends, then fail the session
    pub fn abort<S: Socket + ?Sized>(&mut self, socket: &S, code: ErrorCode, msg: &str) {
        if !self.state.is_terminal() {
            let result = Packet::error(code, msg)
                .serialize()
                .and_then(|bytes| socket.send_to(&bytes, self.peer).map_err(TftpError::Send));
            if let Err(e) = result {
                log::warn!("Could not report error to {}: {}", self.peer, e);
            }
        }
        self.fail();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::tftp::core::socket::mock::ScriptedSocket;

    fn peer() -> SocketAddr {
        "127.0.0.1:61125".parse().unwrap()
    }

    fn options() -> TransferOptions {
        TransferOptions::default().with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn accepts_only_the_outstanding_block() {
        let mut session = TransferSession::new(peer(), options(), 1);
        assert_eq!(session.state(), TransferState::AwaitingFirstReply);

        assert!(!session.accept(2));
        assert!(!session.accept(0));
        assert_eq!(session.block(), 1);
        assert_eq!(session.state(), TransferState::AwaitingFirstReply);

        assert!(session.accept(1));
        assert_eq!(session.state(), TransferState::Transferring);
        session.advance();
        assert_eq!(session.block(), 2);
    }

    #[test]
    fn block_number_wraps() {
        let mut session = TransferSession::new(peer(), options(), u16::MAX);
        assert!(session.accept(u16::MAX));
        session.advance();
        assert_eq!(session.block(), 0);
    }

    #[test]
    fn retransmission_is_byte_identical() {
        let socket = ScriptedSocket::new();
        let mut session = TransferSession::new(peer(), options(), 1);
        let data = Packet::Data {
            block_num: 1,
            data: vec![0, 1, 2, 0, 3],
        };
        session.transmit(&socket, &data).unwrap();
        session.retransmit(&socket).unwrap();

        let sent = socket.sent.borrow();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
        assert_eq!(sent[0].1, peer());
    }

    #[test]
    fn nothing_is_sent_after_completion() {
        let socket = ScriptedSocket::new();
        let mut session = TransferSession::new(peer(), options(), 1);
        session.transmit(&socket, &Packet::Ack(1)).unwrap();
        session.complete();

        assert!(matches!(
            session.transmit(&socket, &Packet::Ack(2)),
            Err(TftpError::SessionClosed)
        ));
        assert!(session.retransmit(&socket).is_err());
        session.abort(&socket, ErrorCode::NotDefined, "late");
        assert_eq!(socket.sent_count(), 1);
    }

    #[test]
    fn fails_after_retry_ceiling() {
        let socket = ScriptedSocket::new();
        let opts = options().with_max_retries(2);
        let mut session = TransferSession::new(peer(), opts, 1);
        session.transmit(&socket, &Packet::Ack(0)).unwrap();

        let mut buf = [0u8; 16];
        for _ in 0..2 {
            assert!(matches!(
                session.wait_reply(&socket, &mut buf).unwrap(),
                Reply::Timeout
            ));
            session.on_timeout(&socket).unwrap();
        }
        assert!(matches!(
            session.wait_reply(&socket, &mut buf).unwrap(),
            Reply::Timeout
        ));
        assert!(matches!(
            session.on_timeout(&socket),
            Err(TftpError::RetriesExhausted { block: 1, attempts: 3 })
        ));
        assert_eq!(session.state(), TransferState::Failed);
        assert_eq!(socket.sent_count(), 3);
    }

    #[test]
    fn foreign_datagrams_get_unknown_tid() {
        let socket = ScriptedSocket::new();
        let stranger: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        socket
            .push_packet(Packet::Ack(1), stranger)
            .push_packet(Packet::Ack(1), peer());
        let mut session = TransferSession::new(peer(), options(), 1);

        let mut buf = [0u8; 16];
        match session.wait_reply(&socket, &mut buf).unwrap() {
            Reply::Packet(Packet::Ack(1)) => {}
            other => panic!("unexpected reply {:?}", other),
        }
        let sent = socket.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, stranger);
        assert!(matches!(
            Packet::deserialize(&sent[0].0).unwrap(),
            Packet::Error {
                code: ErrorCode::UnknownTransferId,
                ..
            }
        ));
    }

    #[test]
    fn requester_follows_server_port_once() {
        let socket = ScriptedSocket::new();
        let moved: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        socket.push_packet(Packet::Ack(0), moved);
        let mut session = TransferSession::new(peer(), options(), 0).follow_first_reply();

        let mut buf = [0u8; 16];
        assert!(matches!(
            session.wait_reply(&socket, &mut buf).unwrap(),
            Reply::Packet(Packet::Ack(0))
        ));
        assert_eq!(session.peer(), moved);
        assert_eq!(socket.sent_count(), 0);
    }

    #[test]
    fn malformed_reply_aborts() {
        let socket = ScriptedSocket::new();
        socket.push_raw(&[0, 9, 0, 1], peer());
        let mut session = TransferSession::new(peer(), options(), 1);

        let mut buf = [0u8; 16];
        assert!(matches!(
            session.wait_reply(&socket, &mut buf),
            Err(TftpError::MalformedPacket(_))
        ));
        assert_eq!(session.state(), TransferState::Failed);
        assert!(matches!(
            socket.sent_packets()[0],
            Packet::Error {
                code: ErrorCode::IllegalOperation,
                ..
            }
        ));
    }
}

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::tftp::core::{Opcode, Socket};

/// Most requests held back while one transfer runs
const MAX_PENDING: usize = 16;

/// A request datagram that arrived during another peer's transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub bytes: Vec<u8>,
    pub from: SocketAddr,
}

/// Requests waiting for the dispatcher, oldest first
#[derive(Debug, Default)]
pub struct Backlog {
    queue: RefCell<VecDeque<Pending>>,
}

impl Backlog {
    pub fn pop(&self) -> Option<Pending> {
        self.queue.borrow_mut().pop_front()
    }

    /// Keep a request for later; false when there is no room for it
    fn push(&self, bytes: &[u8], from: SocketAddr) -> bool {
        let mut queue = self.queue.borrow_mut();
        // A client retransmitting its request while it waits is still one request
        if queue.iter().any(|p| p.from == from && p.bytes == bytes) {
            return true;
        }
        if queue.len() >= MAX_PENDING {
            return false;
        }
        queue.push_back(Pending {
            bytes: bytes.to_vec(),
            from,
        });
        true
    }
}

/// The listening socket as one transfer sees it
///
/// RRQ and WRQ datagrams from anyone but the session peer are moved into the
/// [`Backlog`] instead of reaching the session, so they are served once the
/// current transfer ends. Everything else passes through untouched.
pub struct SessionSocket<'a, S: Socket + ?Sized> {
    socket: &'a S,
    peer: SocketAddr,
    backlog: &'a Backlog,
}

impl<'a, S: Socket + ?Sized> SessionSocket<'a, S> {
    pub fn new(socket: &'a S, peer: SocketAddr, backlog: &'a Backlog) -> Self {
        Self {
            socket,
            peer,
            backlog,
        }
    }

    fn hold(&self, datagram: &[u8], from: SocketAddr) -> bool {
        if from == self.peer || !is_request(datagram) {
            return false;
        }
        if self.backlog.push(datagram, from) {
            log::info!("Request from {} queued until {} is served", from, self.peer);
            true
        } else {
            log::warn!("Request backlog full, turning away {}", from);
            false
        }
    }
}

impl<S: Socket + ?Sized> Socket for SessionSocket<'_, S> {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        loop {
            let (len, from) = self.socket.recv_from(buf)?;
            if !self.hold(&buf[..len], from) {
                return Ok((len, from));
            }
        }
    }

    fn recv_timeout(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match self.socket.recv_timeout(buf, remaining)? {
                Some((len, from)) if self.hold(&buf[..len], from) => continue,
                received => return Ok(received),
            }
        }
    }
}

fn is_request(datagram: &[u8]) -> bool {
    let Some(&[hi, lo]) = datagram.get(..2) else {
        return false;
    };
    matches!(
        Opcode::from_u16(u16::from_be_bytes([hi, lo])),
        Some(Opcode::Rrq | Opcode::Wrq)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tftp::core::Packet;
    use crate::tftp::core::mock::ScriptedSocket;

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn other() -> SocketAddr {
        "127.0.0.1:50001".parse().unwrap()
    }

    fn rrq(name: &str) -> Packet {
        Packet::Rrq {
            filename: name.to_string(),
            mode: "octet".to_string(),
        }
    }

    #[test]
    fn foreign_requests_are_set_aside() {
        let socket = ScriptedSocket::new();
        socket
            .push_packet(rrq("b"), other())
            .push_packet(rrq("b"), other())
            .push_packet(Packet::Ack(1), other())
            .push_packet(Packet::Ack(1), peer());
        let backlog = Backlog::default();
        let view = SessionSocket::new(&socket, peer(), &backlog);

        let mut buf = [0u8; 64];
        // Stray ACK from the other client still reaches the session
        let (_, from) = view
            .recv_timeout(&mut buf, Duration::from_secs(5))
            .unwrap()
            .unwrap();
        assert_eq!(from, other());
        let (_, from) = view
            .recv_timeout(&mut buf, Duration::from_secs(5))
            .unwrap()
            .unwrap();
        assert_eq!(from, peer());

        let pending = backlog.pop().unwrap();
        assert_eq!(pending.from, other());
        assert_eq!(Packet::deserialize(&pending.bytes).unwrap(), rrq("b"));
        assert!(backlog.pop().is_none());
    }

    #[test]
    fn peer_requests_pass_through() {
        let socket = ScriptedSocket::new();
        socket.push_packet(rrq("a"), peer());
        let backlog = Backlog::default();
        let view = SessionSocket::new(&socket, peer(), &backlog);

        let mut buf = [0u8; 64];
        assert!(
            view.recv_timeout(&mut buf, Duration::from_secs(5))
                .unwrap()
                .is_some()
        );
        assert!(backlog.pop().is_none());
    }

    #[test]
    fn full_backlog_lets_requests_through() {
        let socket = ScriptedSocket::new();
        for port in 0..=MAX_PENDING as u16 {
            let from = SocketAddr::new(other().ip(), 40000 + port);
            socket.push_packet(rrq("x"), from);
        }
        let backlog = Backlog::default();
        let view = SessionSocket::new(&socket, peer(), &backlog);

        let mut buf = [0u8; 64];
        let (_, from) = view
            .recv_timeout(&mut buf, Duration::from_secs(5))
            .unwrap()
            .unwrap();
        assert_eq!(from.port(), 40000 + MAX_PENDING as u16);
        assert_eq!(std::iter::from_fn(|| backlog.pop()).count(), MAX_PENDING);
    }

    #[test]
    fn request_opcodes() {
        assert!(is_request(&[0, 1, b'f', 0]));
        assert!(is_request(&[0, 2]));
        assert!(!is_request(&[0, 4, 0, 1]));
        assert!(!is_request(&[0]));
    }
}

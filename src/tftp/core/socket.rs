use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Datagram endpoint used by the transfer engine
///
/// The core never creates or binds sockets; it only needs to send a datagram
/// and to wait for one, either indefinitely or up to a deadline.
pub trait Socket {
    /// Send one datagram to `addr`
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;

    /// Block until a datagram arrives
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Wait up to `timeout` for a datagram, `Ok(None)` when none arrived
    fn recv_timeout(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>>;
}

impl Socket for UdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.set_read_timeout(None)?;
        UdpSocket::recv_from(self, buf)
    }

    fn recv_timeout(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        // A zero read timeout is rejected by the OS layer
        self.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        match UdpSocket::recv_from(self, buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

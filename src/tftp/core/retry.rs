use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::socket::Socket;

/// Outcome of waiting for a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// A datagram of `len` bytes arrived from `from`
    Received { len: usize, from: SocketAddr },
    /// The deadline passed without any datagram
    Timeout,
}

/// Bounded wait and consecutive-timeout accounting for one outstanding packet
///
/// Knows nothing about packet contents. The owner calls [`reset`](Self::reset)
/// once a reply has been accepted, so a stray datagram never refills the
/// retry budget.
#[derive(Debug)]
pub struct RetryController {
    timeout: Duration,
    max_retries: u32,
    timeouts: u32,
    deadline: Option<Instant>,
}

impl RetryController {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
            timeouts: 0,
            deadline: None,
        }
    }

    /// Start a fresh deadline for the packet just sent
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.timeout);
    }

    /// Drop the pending deadline; the next wait starts a full one
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Wait for a datagram until the armed deadline
    ///
    /// Datagrams that arrive early leave the deadline in place, so repeated
    /// calls share one timeout window until it expires or is cancelled.
    pub fn await_reply<S: Socket + ?Sized>(
        &mut self,
        socket: &S,
        buf: &mut [u8],
    ) -> io::Result<Wait> {
        let deadline = *self
            .deadline
            .get_or_insert_with(|| Instant::now() + self.timeout);
        let remaining = deadline.saturating_duration_since(Instant::now());

        let received = if remaining.is_zero() {
            None
        } else {
            socket.recv_timeout(buf, remaining)?
        };

        match received {
            Some((len, from)) => Ok(Wait::Received { len, from }),
            None => {
                self.timeouts += 1;
                self.deadline = None;
                Ok(Wait::Timeout)
            }
        }
    }

    /// A reply was accepted
    pub fn reset(&mut self) {
        self.timeouts = 0;
        self.deadline = None;
    }

    /// Whether the retry ceiling has been exceeded
    pub fn should_abort(&self) -> bool {
        self.timeouts > self.max_retries
    }

    /// Consecutive timeouts so far
    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }
}

use std::io;

use thiserror::Error;

use super::packet::ErrorCode;

/// Errors raised by the TFTP core
///
/// Transport failures (`Socket`, `Bind`, `Send`, `Receive`) are fatal for the
/// process. Everything else only ends the current transfer session.
#[derive(Debug, Error)]
pub enum TftpError {
    /// Socket could not be configured
    #[error("socket setup failed: {0}")]
    Socket(#[source] io::Error),

    /// Socket could not be bound to its local address
    #[error("bind failed: {0}")]
    Bind(#[source] io::Error),

    /// A datagram could not be sent
    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    /// A datagram could not be received
    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    /// The datagram does not decode as a TFTP packet
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// The peer sent an ERROR packet
    #[error("remote error {code}: {message}")]
    Remote { code: ErrorCode, message: String },

    /// A reply carried a block number that cannot be reconciled
    #[error("unexpected block {received}, expected {expected}")]
    UnexpectedBlock { expected: u16, received: u16 },

    /// A packet kind that makes no sense at this point of the transfer
    #[error("unexpected {0} packet")]
    UnexpectedPacket(&'static str),

    /// Consecutive timeouts on one block exceeded the retry ceiling
    #[error("no reply for block {block} after {attempts} timeouts")]
    RetriesExhausted { block: u16, attempts: u32 },

    /// A packet was offered to a session that already finished
    #[error("transfer session is closed")]
    SessionClosed,

    /// Reading or writing the local file failed
    #[error("file I/O failed: {0}")]
    File(#[from] io::Error),
}

impl TftpError {
    /// Whether the error comes from the datagram endpoint itself
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Socket(_) | Self::Bind(_) | Self::Send(_) | Self::Receive(_)
        )
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Socket(_) | Self::File(_) => 1,
            Self::Bind(_) => 2,
            Self::Send(_) => 4,
            Self::Receive(_) => 5,
            Self::MalformedPacket(_)
            | Self::Remote { .. }
            | Self::UnexpectedBlock { .. }
            | Self::UnexpectedPacket(_)
            | Self::RetriesExhausted { .. }
            | Self::SessionClosed => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, TftpError>;

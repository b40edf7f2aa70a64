//! TFTP core protocol implementation
//!
//! This module contains the core components of the TFTP protocol:
//! - `packet`: Packet serialization and deserialization
//! - `socket`: Datagram endpoint abstraction
//! - `options`: Per-session transfer parameters
//! - `retry`: Bounded reply wait and retry accounting
//! - `session`: Transfer state machine
//! - `transfer`: Read and write transfer drivers
//! - `error`: Error taxonomy shared by client and server

mod error;
pub mod options;
mod packet;
mod retry;
mod session;
mod socket;
pub mod transfer;

// Public core types
pub use error::{Result, TftpError};
pub use options::TransferOptions;
pub use packet::{ErrorCode, MAX_FILENAME_LEN, Opcode, Packet};
pub use retry::{RetryController, Wait};
pub use session::{Reply, TransferSession, TransferState};
pub use socket::Socket;
pub use transfer::{await_ack, receive_file, send_file};

#[cfg(test)]
pub(crate) use socket::mock;

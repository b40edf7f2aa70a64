//! TFTP (Trivial File Transfer Protocol) implementation
//!
//! Implements the lock-step core of [RFC 1350](https://www.rfc-editor.org/rfc/rfc1350):
//! octet transfers in fixed 512-byte blocks, one block outstanding at a time,
//! with timeout-driven retransmission. Option negotiation (RFC 2347 and
//! friends) is not supported.
//!
//! ## Module Structure
//!
//! ```text
//! tftp/
//! ├── core/           # Core protocol implementation
//! │   ├── packet      # Packet serialization/deserialization
//! │   ├── socket      # Datagram endpoint abstraction
//! │   ├── options     # Timeout, retry ceiling, block size
//! │   ├── retry       # Bounded reply wait and retry accounting
//! │   ├── session     # Transfer state machine
//! │   └── transfer    # Read and write transfer drivers
//! │
//! ├── server/         # TFTP server
//! │   ├── server      # Request dispatcher
//! │   ├── worker      # Runs one transfer
//! │   └── config      # Server configuration
//! │
//! └── client/         # TFTP client
//!     ├── client      # GET / PUT
//!     └── config      # Client configuration
//! ```
//!
//! ## Usage Examples
//!
//! ### Start TFTP Server
//!
//! ```rust,no_run
//! use xtftp::tftp::server::{Config, Server};
//! use std::path::PathBuf;
//!
//! let config = Config::with_defaults().merge_cli(
//!     Some("0.0.0.0".parse().unwrap()),
//!     Some(61125),
//!     Some(PathBuf::from("/var/tftp")),
//!     false,
//! );
//!
//! let mut server = Server::new(&config).unwrap();
//! server.listen().unwrap();
//! ```

// Submodules
pub mod client;
pub mod core;
pub mod server;

/// Port the server listens on unless configured otherwise
pub const DEFAULT_PORT: u16 = 61125;

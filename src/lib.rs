//! Lock-step TFTP client and server
//!
//! The protocol engine lives in [`tftp::core`]; [`tftp::client`] and
//! [`tftp::server`] wire it to UDP sockets and the local filesystem.

pub mod config;
pub mod tftp;

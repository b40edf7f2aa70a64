//! TFTP client implementation
//!
//! - `client`: Read (GET) and write (PUT) requests
//! - `config`: Client configuration

#[allow(clippy::module_inception)]
mod client;
mod config;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_CLIENT_DIR};

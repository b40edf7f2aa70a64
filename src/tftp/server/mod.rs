//! TFTP server implementation
//!
//! This module provides the request dispatcher and its collaborators:
//! - `server`: Main server logic, validates requests and dispatches them
//! - `worker`: Runs one accepted transfer to completion
//! - `backlog`: Holds requests that arrive during another transfer
//! - `config`: Server configuration

mod backlog;
mod config;
#[allow(clippy::module_inception)]
mod server;
mod worker;

use anyhow::Result;
use std::fs;

// Public server types
pub use config::{Config, DEFAULT_SERVER_DIR};
pub use server::{Served, Server};
pub use worker::Worker;

/// Run the TFTP server until its socket fails
pub fn run(config: Config) -> Result<()> {
    log::info!(
        "Starting TFTP server on {}:{}",
        config.ip_address,
        config.port
    );
    log::info!("Root directory: {}", config.directory.display());
    log::info!("Read-only mode: {}", config.read_only);

    // Ensure directory exists
    if !config.directory.exists() {
        fs::create_dir_all(&config.directory)?;
        log::info!("Created directory {}", config.directory.display());
    }

    let mut server = Server::new(&config)?;

    log::info!("TFTP server listening, press Ctrl+C to stop");
    server.listen()?;

    Ok(())
}

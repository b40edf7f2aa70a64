use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default data block size (RFC 1350)
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Largest block that fits in a UDP datagram with the 4-byte header
pub const MAX_BLOCK_SIZE: usize = 65464;

/// Per-session transfer parameters
///
/// Handed to every [`TransferSession`](super::TransferSession) at construction;
/// nothing about timing or retries is process-global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferOptions {
    /// How long to wait for a reply before retransmitting
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Consecutive timeouts tolerated for one block
    pub max_retries: u32,
    /// Payload bytes per DATA packet, both peers must agree
    pub block_size: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            max_retries: 10,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl TransferOptions {
    /// Reject values the protocol engine cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout.is_zero() {
            anyhow::bail!("timeout must be greater than zero");
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            anyhow::bail!(
                "block size {} is outside 1..={}",
                self.block_size,
                MAX_BLOCK_SIZE
            );
        }
        Ok(())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

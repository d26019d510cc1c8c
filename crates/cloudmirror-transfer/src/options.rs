//! Engine tuning knobs
//!
//! All sizes are in bytes. [`TransferOptions::from_config`] converts the
//! MiB-based configuration file values.

use std::time::Duration;

use cloudmirror_core::config::TransferConfig;

use crate::retry::RetryPolicy;

/// Settings shared by every component of one engine run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    /// Files of at least this size use a resumable session
    pub threshold: u64,
    /// Range size for chunked downloads
    pub download_chunk_size: u64,
    pub retry: RetryPolicy,
    /// Skip uploads whose remote copy has the same size and mtime
    pub skip_unchanged: bool,
}

impl TransferOptions {
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            threshold: config.threshold_bytes(),
            download_chunk_size: config.download_chunk_size_bytes(),
            retry: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.retry_base_delay_ms),
                Duration::from_millis(config.retry_max_delay_ms),
            ),
            skip_unchanged: config.skip_unchanged,
        }
    }
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}

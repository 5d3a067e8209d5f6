//! Write coalescing configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::coalescer::CoalescerConfig;
use crate::storage::MAX_BATCH_WRITE;

/// Debounce, chunking and retry settings for queued writes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Quiet window after the last enqueue before a collection flushes.
    pub debounce_ms: u64,
    /// Optional ceiling on how long the first queued write may wait.
    pub max_wait_ms: Option<u64>,
    /// Operations per bulk-write call. Clamped to the store limit.
    pub chunk_size: usize,
    /// Retry policy for failed bulk writes.
    pub retry: RetrySettings,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            max_wait_ms: None,
            chunk_size: MAX_BATCH_WRITE,
            retry: RetrySettings::default(),
        }
    }
}

impl BatchConfig {
    pub fn coalescer(&self) -> CoalescerConfig {
        CoalescerConfig::with_debounce(Duration::from_millis(self.debounce_ms))
            .max_wait(self.max_wait_ms.map(Duration::from_millis))
    }

    /// Chunk size in `1..=MAX_BATCH_WRITE`.
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(1, MAX_BATCH_WRITE)
    }
}

/// Retry settings as they appear in configuration files.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retry attempts after the first. 0 drops a failed chunk immediately.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Randomize each delay to spread out concurrent retries.
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 50,
            max_delay_ms: 2000,
            jitter: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalescer_config() {
        let config = BatchConfig {
            debounce_ms: 120,
            max_wait_ms: Some(900),
            ..Default::default()
        };
        let coalescer = config.coalescer();
        assert_eq!(coalescer.debounce, Duration::from_millis(120));
        assert_eq!(coalescer.max_wait, Some(Duration::from_millis(900)));
    }

    #[test]
    fn test_chunk_size_clamped() {
        let mut config = BatchConfig {
            chunk_size: 100,
            ..Default::default()
        };
        assert_eq!(config.effective_chunk_size(), 25);
        config.chunk_size = 0;
        assert_eq!(config.effective_chunk_size(), 1);
        config.chunk_size = 10;
        assert_eq!(config.effective_chunk_size(), 10);
    }

    #[test]
    fn test_retry_defaults_to_single_attempt() {
        let retry = RetrySettings::default();
        assert_eq!(retry.max_retries, 0);
        assert!(retry.jitter);
    }
}

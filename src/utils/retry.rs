//! Retry utilities: backoff builders and retryable error classification.
//!
//! Bulk writes that fail transiently or come back with unprocessed
//! operations are re-sent on a `backon` exponential schedule.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::config::RetrySettings;
use crate::storage::StorageError;

/// Backoff for re-sending a bulk-write chunk.
///
/// `max_retries` counts attempts after the first; 0 yields an empty schedule.
pub fn write_backoff(settings: &RetrySettings) -> ExponentialBuilder {
    let builder = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(settings.base_delay_ms))
        .with_max_delay(Duration::from_millis(
            settings.max_delay_ms.max(settings.base_delay_ms),
        ))
        .with_max_times(settings.max_retries as usize);
    if settings.jitter {
        builder.with_jitter()
    } else {
        builder
    }
}

/// Determines if a store error is worth another attempt.
///
/// Only an unavailable store is transient. A missing table or a rejected
/// record fails the same way on every attempt.
pub fn is_retryable(error: &StorageError) -> bool {
    matches!(error, StorageError::Unavailable(_))
}

#[cfg(test)]
mod tests {
    use backon::BackoffBuilder;

    use super::*;

    fn settings(max_retries: u32) -> RetrySettings {
        RetrySettings {
            max_retries,
            base_delay_ms: 10,
            max_delay_ms: 15,
            jitter: false,
        }
    }

    #[test]
    fn test_no_retries_yields_empty_schedule() {
        assert_eq!(write_backoff(&settings(0)).build().count(), 0);
    }

    #[test]
    fn test_schedule_is_bounded_and_capped() {
        let delays: Vec<Duration> = write_backoff(&settings(4)).build().collect();
        assert_eq!(delays.len(), 4);
        assert_eq!(delays[0], Duration::from_millis(10));
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(15)));
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&StorageError::Unavailable("throttled".into())));
        assert!(!is_retryable(&StorageError::TableNotFound("users".into())));
        assert!(!is_retryable(&StorageError::InvalidRecord("bad".into())));
    }
}

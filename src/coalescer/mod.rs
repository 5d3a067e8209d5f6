//! Debounced per-channel batching.
//!
//! A [`Coalescer`] buffers homogeneous items per named channel and hands each
//! buffer to a [`FlushHandler`] once the channel has been quiet for the
//! debounce window. Every enqueue restarts the channel's timer, so a burst of
//! items arriving closer together than the window is flushed as one batch.
//!
//! # Channel lifecycle
//!
//! ```text
//! Idle --enqueue--> Buffering --timer expires--> Flushing --> Idle
//!                     ^    |
//!                     +----+ enqueue (cancel timer, schedule a new one)
//! ```
//!
//! The buffer is swapped out under the channel lock when the timer fires, so
//! items enqueued while a flush runs start a fresh buffer with a fresh timer.
//! No item is ever part of two flushes and none is dropped at the boundary.
//!
//! With `max_wait` unset a channel under continuous load defers its flush
//! indefinitely. Setting it caps how long the oldest buffered item waits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Receives drained buffers.
///
/// Runs on a spawned task; an enqueue never waits for it. Once started a
/// flush is never cancelled.
#[async_trait]
pub trait FlushHandler<T>: Send + Sync + 'static {
    async fn flush(&self, channel: &str, batch: Vec<T>);
}

/// Timing policy for a coalescer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerConfig {
    /// Quiet period after the last enqueue before a channel flushes.
    pub debounce: Duration,
    /// Upper bound on how long the first buffered item may wait.
    pub max_wait: Option<Duration>,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            max_wait: None,
        }
    }
}

impl CoalescerConfig {
    pub fn with_debounce(debounce: Duration) -> Self {
        Self {
            debounce,
            ..Default::default()
        }
    }

    pub fn max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Delay for a timer scheduled at `now` on a channel buffering since `since`.
    fn delay(&self, since: Instant, now: Instant) -> Duration {
        match self.max_wait {
            Some(max_wait) => {
                let remaining = max_wait.saturating_sub(now.saturating_duration_since(since));
                self.debounce.min(remaining)
            }
            None => self.debounce,
        }
    }
}

struct Channel<T> {
    buffer: Vec<T>,
    timer: Option<JoinHandle<()>>,
    /// Identifies the currently scheduled timer; stale timers do nothing.
    /// Drawn from a coalescer-wide counter so a recreated channel never
    /// reuses a number an older timer still holds.
    generation: u64,
    buffering_since: Instant,
}

struct Inner<T> {
    name: &'static str,
    config: CoalescerConfig,
    handler: Arc<dyn FlushHandler<T>>,
    channels: Mutex<HashMap<String, Channel<T>>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
    next_generation: AtomicU64,
}

/// Debounced batch queue keyed by channel name.
///
/// Cloning is cheap and yields a handle to the same queues.
pub struct Coalescer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Coalescer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Coalescer<T> {
    /// Create a coalescer; `name` only labels log lines.
    pub fn new(
        name: &'static str,
        config: CoalescerConfig,
        handler: Arc<dyn FlushHandler<T>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                config,
                handler,
                channels: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(Vec::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> CoalescerConfig {
        self.inner.config
    }

    /// Append `item` to `channel` and restart the channel's timer.
    ///
    /// Returns as soon as the item is buffered. Must be called from within a
    /// Tokio runtime.
    pub fn enqueue(&self, channel: &str, item: T) {
        let now = Instant::now();
        let mut channels = self.inner.lock_channels();
        let entry = channels
            .entry(channel.to_string())
            .or_insert_with(|| Channel {
                buffer: Vec::new(),
                timer: None,
                generation: 0,
                buffering_since: now,
            });

        entry.buffer.push(item);
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        entry.generation = generation;
        let delay = self.inner.config.delay(entry.buffering_since, now);

        let inner = Arc::clone(&self.inner);
        let name = channel.to_string();
        entry.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            Inner::fire(&inner, &name, generation);
        }));
    }

    /// Inspect the buffered (not yet flushed) items of `channel`.
    pub fn with_pending<R>(&self, channel: &str, f: impl FnOnce(&[T]) -> R) -> R {
        let channels = self.inner.lock_channels();
        match channels.get(channel) {
            Some(entry) => f(&entry.buffer),
            None => f(&[]),
        }
    }

    pub fn pending_len(&self, channel: &str) -> usize {
        self.with_pending(channel, |items| items.len())
    }

    /// Names of channels currently buffering.
    pub fn channels(&self) -> Vec<String> {
        self.inner.lock_channels().keys().cloned().collect()
    }

    /// Flush every buffering channel now and wait for all flushes to finish.
    pub async fn flush_all(&self) {
        let drained: Vec<(String, Vec<T>)> = {
            let mut channels = self.inner.lock_channels();
            channels
                .drain()
                .map(|(name, entry)| {
                    if let Some(timer) = entry.timer {
                        timer.abort();
                    }
                    (name, entry.buffer)
                })
                .collect()
        };

        for (name, batch) in drained {
            if !batch.is_empty() {
                Inner::spawn_flush(&self.inner, name, batch);
            }
        }

        self.settle().await;
    }

    /// Wait for flushes already running to finish.
    pub async fn settle(&self) {
        loop {
            let handles = {
                let mut in_flight = self
                    .inner
                    .in_flight
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *in_flight)
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(coalescer = self.inner.name, error = %e, "Flush task failed");
                }
            }
        }
    }
}

impl<T: Send + 'static> Inner<T> {
    fn lock_channels(&self) -> std::sync::MutexGuard<'_, HashMap<String, Channel<T>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Timer expiry: swap the buffer out and flush it, unless superseded.
    fn fire(inner: &Arc<Self>, channel: &str, generation: u64) {
        let batch = {
            let mut channels = inner.lock_channels();
            match channels.get(channel) {
                Some(entry) if entry.generation == generation => {}
                _ => return,
            }
            match channels.remove(channel) {
                Some(entry) => entry.buffer,
                None => return,
            }
        };

        if batch.is_empty() {
            return;
        }
        Self::spawn_flush(inner, channel.to_string(), batch);
    }

    fn spawn_flush(inner: &Arc<Self>, channel: String, batch: Vec<T>) {
        debug!(
            coalescer = inner.name,
            channel = %channel,
            size = batch.len(),
            "Flushing batch"
        );
        let handler = Arc::clone(&inner.handler);
        let handle = tokio::spawn(async move {
            handler.flush(&channel, batch).await;
        });

        let mut in_flight = inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }
}

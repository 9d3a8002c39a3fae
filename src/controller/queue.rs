//! Level-triggered work queue with per-key mutual exclusion
//!
//! Every key is in one of three phases. A notification moves an idle key to
//! `Queued`; repeated notifications for a queued key collapse into the one
//! pending pass. A notification for a `Running` key marks it stale, and the
//! key goes straight back to `Queued` when its worker calls [`WorkQueue::done`],
//! so the last pass always starts after the last observed change. A key is
//! handed to at most one worker at a time.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyPhase {
    Idle,
    Queued,
    Running,
}

#[derive(Debug)]
enum KeyState {
    Queued,
    Running { stale: bool },
}

struct QueueInner<K> {
    /// Idle keys have no entry
    states: HashMap<K, KeyState>,
    ready: VecDeque<K>,
    failures: HashMap<K, u32>,
    shutdown: bool,
}

pub struct WorkQueue<K> {
    inner: Mutex<QueueInner<K>>,
    notify: Notify,
}

impl<K> Default for WorkQueue<K>
where
    K: Clone + Eq + Hash + std::fmt::Debug + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + std::fmt::Debug + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                states: HashMap::new(),
                ready: VecDeque::new(),
                failures: HashMap::new(),
                shutdown: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner<K>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a change notification for `key`
    pub fn add(&self, key: K) {
        let mut inner = self.lock();
        if inner.shutdown {
            return;
        }

        match inner.states.get_mut(&key) {
            None => {
                inner.states.insert(key.clone(), KeyState::Queued);
                inner.ready.push_back(key);
                drop(inner);
                self.notify.notify_one();
            }
            Some(KeyState::Queued) => {}
            Some(KeyState::Running { stale }) => {
                debug!(?key, "Key changed while running, marking stale");
                *stale = true;
            }
        }
    }

    /// Add `key` once `delay` has elapsed
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Wait for the next queued key and mark it running
    ///
    /// Returns `None` once the queue has been shut down.
    pub async fn next(&self) -> Option<K> {
        loop {
            // Register interest before inspecting the state so a shutdown or
            // add between the check and the await is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if inner.shutdown {
                    return None;
                }
                if let Some(key) = inner.ready.pop_front() {
                    inner
                        .states
                        .insert(key.clone(), KeyState::Running { stale: false });
                    let more = !inner.ready.is_empty();
                    drop(inner);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Release a key previously returned by [`WorkQueue::next`]
    pub fn done(&self, key: &K) {
        let mut inner = self.lock();
        match inner.states.remove(key) {
            Some(KeyState::Running { stale: true }) if !inner.shutdown => {
                inner.states.insert(key.clone(), KeyState::Queued);
                inner.ready.push_back(key.clone());
                drop(inner);
                self.notify.notify_one();
            }
            _ => {}
        }
    }

    /// Count a failed pass and return the number of consecutive failures
    pub fn record_failure(&self, key: &K) -> u32 {
        let mut inner = self.lock();
        let count = inner.failures.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Reset the failure count after a successful pass
    pub fn forget(&self, key: &K) {
        self.lock().failures.remove(key);
    }

    pub fn phase(&self, key: &K) -> KeyPhase {
        match self.lock().states.get(key) {
            None => KeyPhase::Idle,
            Some(KeyState::Queued) => KeyPhase::Queued,
            Some(KeyState::Running { .. }) => KeyPhase::Running,
        }
    }

    /// Number of keys waiting for a worker
    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop handing out keys and wake every waiting worker
    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.notify.notify_waiters();
    }
}

/// Calculate exponential backoff delay for retry attempts
///
/// # Arguments
/// * `attempt` - Consecutive failures so far (0-indexed)
/// * `base_delay_secs` - Base delay in seconds (default: 5)
/// * `max_delay_secs` - Maximum delay cap in seconds (default: 300 = 5 minutes)
pub fn calculate_backoff(
    attempt: u32,
    base_delay_secs: Option<u64>,
    max_delay_secs: Option<u64>,
) -> Duration {
    let base = base_delay_secs.unwrap_or(5);
    let max = max_delay_secs.unwrap_or(300);

    // Exponential: base * 2^attempt, capped at max
    let delay_secs = base.saturating_mul(2_u64.saturating_pow(attempt.min(5)));
    Duration::from_secs(delay_secs.min(max))
}

//! Retry Subsystem (C7), redesigned per spec §9 "Timer-based retries" as a
//! dedicated per-key timer list rather than a generic scheduler, so
//! shutdown/removal is `O(keys)` and cancellation can await in-flight
//! firings instead of racing them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::action::{Action, RetryKey};
use crate::queue::ActionQueue;

/// `INITIAL_SECONDS_BEFORE_RETRY << N`: 10, 20, 40, 80, ... seconds, no cap
/// (spec §3, §4.5; §9 notes a production target may want to cap this, but
/// the source does not and this reimplementation follows the source).
pub const INITIAL_SECONDS_BEFORE_RETRY: u64 = 10;

struct ArmedTimer {
    id: u64,
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Timers {
    by_key: HashMap<RetryKey, Vec<ArmedTimer>>,
}

/// Computes the delay for the N-th retry of a key (0-indexed by the number
/// of timers currently armed for that key).
pub fn delay_for_attempt(attempt: u32) -> Duration {
    Duration::from_secs(INITIAL_SECONDS_BEFORE_RETRY << attempt)
}

pub struct RetryTable {
    queue: ActionQueue,
    timers: Arc<Mutex<Timers>>,
    next_id: AtomicU64,
}

impl RetryTable {
    pub fn new(queue: ActionQueue) -> Self {
        Self {
            queue,
            timers: Arc::new(Mutex::new(Timers::default())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Arms a new timer for `action`'s retry key and returns the delay it
    /// was scheduled with (callers use this to format the "trying again in
    /// <delay>s..." message, spec §4.4 step 7).
    #[instrument(skip(self, action), fields(key = ?action.retry_key()))]
    pub async fn schedule(&self, action: Action) -> Duration {
        let key = action.retry_key();
        let mut timers = self.timers.lock().await;
        let attempt = timers.by_key.get(&key).map_or(0, Vec::len) as u32;
        let delay = delay_for_attempt(attempt);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let queue = self.queue.clone();
        let timers_handle = self.timers.clone();
        let fire_key = key.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    queue.push(action);
                    let mut timers = timers_handle.lock().await;
                    remove_armed(&mut timers, &fire_key, id);
                }
                _ = cancel_rx => {}
            }
        });

        timers.by_key.entry(key).or_default().push(ArmedTimer {
            id,
            cancel: cancel_tx,
            handle,
        });
        delay
    }

    /// Cancels and forgets every timer for `key`, awaiting any that were
    /// already firing so no re-enqueue can survive this call returning.
    #[instrument(skip(self))]
    pub async fn cancel_key(&self, key: &RetryKey) {
        let armed = {
            let mut timers = self.timers.lock().await;
            timers.by_key.remove(key).unwrap_or_default()
        };
        for timer in armed {
            let _ = timer.cancel.send(());
            let _ = timer.handle.await;
        }
    }

    /// Cancels every timer whose retry key is scoped to `work_id` (spec
    /// §4.5: user removal cancels timers for that identifier).
    pub async fn cancel_for_work_id(&self, work_id: u64) {
        self.cancel_key(&RetryKey::LoadWork(work_id)).await;
        self.cancel_key(&RetryKey::DownloadWork(work_id)).await;
    }

    /// Cancels every armed timer (spec §4.8 shutdown step 4).
    pub async fn cancel_all(&self) {
        let keys: Vec<RetryKey> = {
            let timers = self.timers.lock().await;
            timers.by_key.keys().cloned().collect()
        };
        for key in keys {
            self.cancel_key(&key).await;
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.timers.lock().await.by_key.is_empty()
    }

    pub async fn armed_count(&self, key: &RetryKey) -> usize {
        self.timers
            .lock()
            .await
            .by_key
            .get(key)
            .map_or(0, Vec::len)
    }
}

fn remove_armed(timers: &mut Timers, key: &RetryKey, id: u64) {
    if let Some(list) = timers.by_key.get_mut(key) {
        list.retain(|timer| timer.id != id);
        if list.is_empty() {
            timers.by_key.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    #[test]
    fn delay_schedule_doubles_from_ten_seconds() {
        assert_eq!(delay_for_attempt(0), Duration::from_secs(10));
        assert_eq!(delay_for_attempt(1), Duration::from_secs(20));
        assert_eq!(delay_for_attempt(2), Duration::from_secs(40));
        assert_eq!(delay_for_attempt(3), Duration::from_secs(80));
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_reenqueues_after_delay() {
        let queue = ActionQueue::new();
        let table = RetryTable::new(queue.clone());
        let delay = table.schedule(Action::LoadWork(1)).await;
        assert_eq!(delay, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::time::advance(Duration::from_millis(1)).await;
        let reenqueued = queue.pop().await;
        assert!(matches!(reenqueued, Some(Action::LoadWork(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn second_retry_for_same_key_doubles_delay() {
        let queue = ActionQueue::new();
        let table = RetryTable::new(queue.clone());
        table.schedule(Action::LoadWork(1)).await;
        let second_delay = table.schedule(Action::LoadWork(1)).await;
        assert_eq!(second_delay, Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_key_prevents_reenqueue() {
        let queue = ActionQueue::new();
        let table = RetryTable::new(queue.clone());
        table.schedule(Action::LoadWork(1)).await;
        table.cancel_key(&RetryKey::LoadWork(1)).await;
        assert!(table.is_empty().await);

        tokio::time::advance(Duration::from_secs(20)).await;
        // give any (cancelled) spawned task a chance to run; nothing should
        // have been pushed onto the queue.
        tokio::task::yield_now().await;
        assert!(queue.pop().now_or_never().flatten().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_empties_table_across_keys() {
        let queue = ActionQueue::new();
        let table = RetryTable::new(queue.clone());
        table.schedule(Action::LoadWork(1)).await;
        table.schedule(Action::DownloadWork(2)).await;
        table.cancel_all().await;
        assert!(table.is_empty().await);
    }
}

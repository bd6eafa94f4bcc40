//! # Keyed Monitors
//!
//! Background tasks (lock tracking, quantity polling) registered under a key.
//! Starting a monitor for a key that already has one cancels the old one
//! first, so at most one monitor per key is active.
//!
//! Cancellation is cooperative: the task receives a [`CancelToken`] and is
//! expected to return once `cancelled()` resolves.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Cooperative cancellation signal handed to each monitor task.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the monitor has been asked to stop.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

struct MonitorEntry {
    generation: u64,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Registry of running monitors keyed by `K`.
pub struct MonitorRegistry<K> {
    name: &'static str,
    monitors: Arc<Mutex<HashMap<K, MonitorEntry>>>,
    generation: AtomicU64,
}

impl<K> MonitorRegistry<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            monitors: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Start a monitor for `key`, replacing any running one.
    pub fn start<F, Fut>(&self, key: K, task: F)
    where
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (cancel, rx) = watch::channel(false);
        let fut = task(CancelToken { rx });

        let monitors = self.monitors.clone();
        let mut guard = self.monitors.lock();

        if let Some(previous) = guard.remove(&key) {
            let _ = previous.cancel.send(true);
            debug!(monitor = self.name, ?key, "Replacing running monitor");
        }

        let owned_key = key.clone();
        let handle = tokio::spawn(async move {
            fut.await;
            // Only forget our own entry; a replacement may already be registered.
            let mut map = monitors.lock();
            if map.get(&owned_key).is_some_and(|e| e.generation == generation) {
                map.remove(&owned_key);
            }
        });

        guard.insert(
            key,
            MonitorEntry {
                generation,
                cancel,
                handle,
            },
        );
    }

    /// Signal the monitor for `key` to stop. Returns false if none was running.
    pub fn stop(&self, key: &K) -> bool {
        match self.monitors.lock().remove(key) {
            Some(entry) => {
                let _ = entry.cancel.send(true);
                debug!(monitor = self.name, ?key, "Monitor stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, key: &K) -> bool {
        self.monitors
            .lock()
            .get(key)
            .is_some_and(|e| !e.handle.is_finished())
    }

    pub fn active_count(&self) -> usize {
        self.monitors
            .lock()
            .values()
            .filter(|e| !e.handle.is_finished())
            .count()
    }

    /// Cancel every monitor and wait for the tasks to return.
    pub async fn shutdown(&self) {
        let entries: Vec<(K, MonitorEntry)> = self.monitors.lock().drain().collect();
        let count = entries.len();

        let mut handles = Vec::with_capacity(count);
        for (_, entry) in entries {
            let _ = entry.cancel.send(true);
            handles.push(entry.handle);
        }
        for handle in handles {
            let _ = handle.await;
        }

        if count > 0 {
            debug!(monitor = self.name, count, "Monitors shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_task(
        counter: Arc<AtomicUsize>,
    ) -> impl FnOnce(CancelToken) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
        move |mut token| {
            Box::pin(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_millis(100)) => {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_replaces_existing_monitor() {
        let registry = MonitorRegistry::<String>::new("test");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        registry.start("tx-1".into(), counting_task(first.clone()));
        tokio::time::sleep(Duration::from_millis(250)).await;
        registry.start("tx-1".into(), counting_task(second.clone()));

        let frozen = first.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(first.load(Ordering::SeqCst), frozen);
        assert!(second.load(Ordering::SeqCst) >= 4);
        assert_eq!(registry.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_finished_monitors_are_forgotten() {
        let registry = MonitorRegistry::<u32>::new("test");
        registry.start(1, |_token| async {});
        registry.start(2, counting_task(Arc::new(AtomicUsize::new(0))));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!registry.is_active(&1));
        assert!(registry.is_active(&2));

        assert!(registry.stop(&2));
        assert!(!registry.stop(&2));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_everything() {
        let registry = MonitorRegistry::<u32>::new("test");
        for key in 0..3 {
            registry.start(key, counting_task(Arc::new(AtomicUsize::new(0))));
        }
        registry.shutdown().await;
        assert_eq!(registry.active_count(), 0);
    }
}

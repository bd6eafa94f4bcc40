//! # Pending Request Store
//!
//! Correlates point-to-point bus requests with their replies.
//!
//! Flow:
//! 1. Caller registers and receives a correlation id plus a oneshot receiver
//! 2. Caller publishes the request event carrying the correlation id
//! 3. The responder publishes a reply with the same id
//! 4. A reply listener calls `complete()`
//! 5. Caller awaits with `wait()`, which removes the entry on timeout

use crate::error::{BusError, BusResult};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

struct PendingRequest<R> {
    sender: oneshot::Sender<R>,
    created_at: Instant,
    method: String,
    timeout: Duration,
}

/// Counters for the store.
#[derive(Debug, Default)]
pub struct PendingStats {
    pub total_registered: AtomicU64,
    pub total_completed: AtomicU64,
    pub total_timeouts: AtomicU64,
    pub total_cancelled: AtomicU64,
}

/// Map of correlation id to waiting caller.
pub struct PendingRequestStore<R> {
    pending: DashMap<Uuid, PendingRequest<R>>,
    default_timeout: Duration,
    stats: PendingStats,
}

impl<R: Send + 'static> PendingRequestStore<R> {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            default_timeout,
            stats: PendingStats::default(),
        }
    }

    /// Register a pending request and return its correlation id and receiver.
    pub fn register(
        &self,
        method: &str,
        timeout: Option<Duration>,
    ) -> (Uuid, oneshot::Receiver<R>) {
        let correlation_id = Uuid::new_v4();
        let (sender, receiver) = oneshot::channel();

        self.pending.insert(
            correlation_id,
            PendingRequest {
                sender,
                created_at: Instant::now(),
                method: method.to_string(),
                timeout: timeout.unwrap_or(self.default_timeout),
            },
        );
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(%correlation_id, method, "Registered pending request");
        (correlation_id, receiver)
    }

    /// Await the reply for `correlation_id`.
    pub async fn wait(
        &self,
        correlation_id: Uuid,
        receiver: oneshot::Receiver<R>,
    ) -> BusResult<R> {
        let (method, timeout) = match self.pending.get(&correlation_id) {
            Some(entry) => (entry.method.clone(), entry.timeout),
            // Already completed before we started waiting.
            None => ("unknown".to_string(), self.default_timeout),
        };

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BusError::Dropped { method }),
            Err(_) => {
                self.pending.remove(&correlation_id);
                self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    %correlation_id,
                    method = %method,
                    timeout_ms = timeout.as_millis() as u64,
                    "Pending request timed out"
                );
                Err(BusError::Timeout {
                    method,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Deliver a reply. Returns false for unknown, expired or abandoned ids.
    pub fn complete(&self, correlation_id: Uuid, reply: R) -> bool {
        let Some((_, pending)) = self.pending.remove(&correlation_id) else {
            debug!(%correlation_id, "Reply for unknown or expired correlation id");
            return false;
        };

        let elapsed = pending.created_at.elapsed();
        if pending.sender.send(reply).is_ok() {
            self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
            debug!(
                %correlation_id,
                method = %pending.method,
                response_time_ms = elapsed.as_millis() as u64,
                "Completed pending request"
            );
            true
        } else {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Remove entries older than their timeout. Returns how many were removed.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.pending.retain(|id, request| {
            if now.duration_since(request.created_at) > request.timeout {
                warn!(correlation_id = %id, method = %request.method, "Removing expired pending request");
                removed += 1;
                false
            } else {
                true
            }
        });

        self.stats
            .total_timeouts
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn cancel(&self, correlation_id: &Uuid) -> bool {
        if self.pending.remove(correlation_id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self, correlation_id: &Uuid) -> bool {
        self.pending.contains_key(correlation_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_complete() {
        let store = PendingRequestStore::<u32>::new(Duration::from_secs(30));

        let (id, rx) = store.register("lock/open", None);
        assert!(store.is_pending(&id));

        assert!(store.complete(id, 7));
        assert_eq!(store.wait(id, rx).await, Ok(7));
        assert_eq!(store.pending_count(), 0);
        assert_eq!(store.stats().total_completed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_complete_unknown_id() {
        let store = PendingRequestStore::<u32>::new(Duration::from_secs(30));
        assert!(!store.complete(Uuid::new_v4(), 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_and_forgets_entry() {
        let store = PendingRequestStore::<u32>::new(Duration::from_secs(30));
        let (id, rx) = store.register("lock/status", Some(Duration::from_millis(250)));

        let err = store.wait(id, rx).await.unwrap_err();
        assert_eq!(
            err,
            BusError::Timeout {
                method: "lock/status".into(),
                timeout_ms: 250
            }
        );
        assert!(!store.is_pending(&id));
        // A late reply is ignored.
        assert!(!store.complete(id, 1));
    }

    #[tokio::test]
    async fn test_cancel_drops_waiter() {
        let store = PendingRequestStore::<u32>::new(Duration::from_secs(30));
        let (id, rx) = store.register("lock/open", None);

        assert!(store.cancel(&id));
        assert!(!store.cancel(&id));
        assert!(matches!(
            store.wait(id, rx).await,
            Err(BusError::Dropped { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_expired() {
        let store = PendingRequestStore::<u32>::new(Duration::from_millis(5));
        let (_a, _rx_a) = store.register("lock/open", None);
        let (_b, _rx_b) = store.register("lock/open", Some(Duration::from_secs(60)));

        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(store.remove_expired(), 1);
        assert_eq!(store.pending_count(), 1);
    }
}

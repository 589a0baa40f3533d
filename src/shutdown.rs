//! Graceful shutdown coordination.
//!
//! A watch channel broadcasts the shutdown signal to accept loops and
//! in-flight streams; an atomic counter tracks streams still open.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};

use crate::emitter::Event;

/// Shutdown coordinator shared by the server and every stream.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<ShutdownInner>,
}

struct ShutdownInner {
    /// Broadcast channel for shutdown signal.
    shutdown_tx: watch::Sender<bool>,
    /// Kept so the channel never closes while the coordinator lives.
    shutdown_rx: watch::Receiver<bool>,
    active_streams: AtomicU64,
    drain_notify: Notify,
    next_stream_id: AtomicU64,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            inner: Arc::new(ShutdownInner {
                shutdown_tx,
                shutdown_rx,
                active_streams: AtomicU64::new(0),
                drain_notify: Notify::new(),
                next_stream_id: AtomicU64::new(1),
            }),
        }
    }

    /// Signal shutdown to all listeners and streams.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.inner.shutdown_rx.borrow()
    }

    /// Get a receiver to watch for shutdown.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.shutdown_rx.clone()
    }

    /// Resolves once shutdown has been signaled.
    pub async fn signaled(&self) {
        let mut rx = self.subscribe();
        // The coordinator holds a receiver, so the sender outlives this wait.
        let _ = rx.wait_for(|shutdown| *shutdown).await.map(|_| ());
    }

    pub fn active_streams(&self) -> u64 {
        self.inner.active_streams.load(Ordering::Relaxed)
    }

    /// Register a new stream and return a guard that unregisters on drop.
    pub fn register_stream(&self) -> StreamGuard {
        let id = self.inner.next_stream_id.fetch_add(1, Ordering::Relaxed);
        self.inner.active_streams.fetch_add(1, Ordering::Relaxed);

        StreamGuard {
            coordinator: self.clone(),
            id,
            chunks_sent: 0,
            completed: false,
        }
    }

    /// Wait for all streams to drain.
    pub async fn wait_for_drain(&self) {
        loop {
            // Create the notification future before checking the count to avoid
            // missing a notify that happens after the load but before awaiting.
            let notified = self.inner.drain_notify.notified();
            if self.inner.active_streams.load(Ordering::Relaxed) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn unregister_stream(&self) {
        let result = self.inner.active_streams.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |curr| curr.checked_sub(1),
        );

        match result {
            Ok(1) => self.inner.drain_notify.notify_waiters(),
            Ok(_) => {}
            Err(_) => {
                tracing::error!("unregister_stream called with active_streams already at 0");
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one response stream.
///
/// Records what the stream emitted so the drop can tell a completed stream
/// from one the client abandoned.
pub struct StreamGuard {
    coordinator: ShutdownCoordinator,
    id: u64,
    chunks_sent: usize,
    completed: bool,
}

impl StreamGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Note an event handed to the transport.
    pub fn record(&mut self, event: &Event) {
        match event {
            Event::Delta(_) => self.chunks_sent += 1,
            Event::Done => self.completed = true,
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let outcome = if self.completed {
            "completed"
        } else if self.coordinator.is_shutdown() {
            "cut short by shutdown"
        } else {
            "dropped before completion"
        };
        tracing::debug!(
            stream_id = self.id,
            chunks = self.chunks_sent,
            outcome,
            "Stream finished"
        );
        self.coordinator.unregister_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stream_tracking() {
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.active_streams(), 0);

        let guard1 = coordinator.register_stream();
        assert_eq!(coordinator.active_streams(), 1);

        let guard2 = coordinator.register_stream();
        assert_eq!(coordinator.active_streams(), 2);
        assert_ne!(guard1.id(), guard2.id());

        drop(guard1);
        assert_eq!(coordinator.active_streams(), 1);

        drop(guard2);
        assert_eq!(coordinator.active_streams(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let coordinator = ShutdownCoordinator::new();
        let rx = coordinator.subscribe();
        assert!(!coordinator.is_shutdown());

        coordinator.shutdown();
        assert!(coordinator.is_shutdown());
        assert!(*rx.borrow());

        tokio::time::timeout(Duration::from_secs(1), coordinator.signaled())
            .await
            .expect("signaled should resolve after shutdown");
    }

    #[tokio::test]
    async fn test_wait_for_drain() {
        let coordinator = ShutdownCoordinator::new();
        let guard = coordinator.register_stream();

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.wait_for_drain().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("drain should complete")
            .unwrap();
    }

    #[test]
    fn test_guard_records_events() {
        let coordinator = ShutdownCoordinator::new();
        let mut guard = coordinator.register_stream();

        guard.record(&Event::Delta("a b c".to_string()));
        guard.record(&Event::Delta(" d".to_string()));
        assert_eq!(guard.chunks_sent, 2);
        assert!(!guard.completed);

        guard.record(&Event::Done);
        assert!(guard.completed);
    }
}

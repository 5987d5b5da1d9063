//! Process-wide count of open client connections.

use metrics::gauge;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Number of currently open connections.
#[derive(Debug, Default)]
pub struct ConnectionCounter {
    active: AtomicU64,
}

impl ConnectionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a new connection. The returned guard uncounts it on drop.
    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        let active = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        gauge!("gateway_active_connections").set(active as f64);
        ConnectionGuard {
            counter: Arc::clone(self),
        }
    }

    /// Snapshot of the open connection count.
    pub fn read(&self) -> u64 {
        self.active.load(Ordering::Acquire)
    }

    fn release(&self) {
        let previous = self.active.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "connection counter underflow");
        gauge!("gateway_active_connections").set(previous.saturating_sub(1) as f64);
    }
}

/// Registration of one open connection.
#[derive(Debug)]
pub struct ConnectionGuard {
    counter: Arc<ConnectionCounter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_restores_count() {
        let counter = Arc::new(ConnectionCounter::new());
        let a = counter.register();
        let b = counter.register();
        assert_eq!(counter.read(), 2);

        drop(a);
        assert_eq!(counter.read(), 1);
        drop(b);
        assert_eq!(counter.read(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations() {
        let counter = Arc::new(ConnectionCounter::new());
        let tasks: Vec<_> = (0..100)
            .map(|_| {
                let counter = counter.clone();
                tokio::spawn(async move {
                    let guard = counter.register();
                    tokio::task::yield_now().await;
                    assert!(counter.read() >= 1);
                    drop(guard);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(counter.read(), 0);
    }
}

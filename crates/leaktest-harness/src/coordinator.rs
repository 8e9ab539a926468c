//! Termination coordinator.
//!
//! A passive listener on the container's lifecycle channel. Events arrive
//! on the container's own delivery task; the coordinator does nothing but
//! flip two monotonic flags, so it can never delay the container's
//! shutdown sequence. Teardown logic reads the flags to decide whether an
//! active stop/destroy call is still necessary.

use leaktest_container::LifecycleEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Observes container lifecycle events and records termination progress.
pub struct TerminationCoordinator {
    context_destroyed: Arc<AtomicBool>,
    container_stopped: Arc<AtomicBool>,
    listener: JoinHandle<()>,
}

impl TerminationCoordinator {
    /// Attach to a container's lifecycle event stream.
    pub fn attach(mut events: broadcast::Receiver<LifecycleEvent>) -> Self {
        let context_destroyed = Arc::new(AtomicBool::new(false));
        let container_stopped = Arc::new(AtomicBool::new(false));

        let destroyed_flag = context_destroyed.clone();
        let stopped_flag = container_stopped.clone();
        let listener = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(LifecycleEvent::ContextDestroyed) => {
                        tracing::trace!("Context destroyed event received");
                        destroyed_flag.store(true, Ordering::SeqCst);
                    }
                    Ok(LifecycleEvent::ServerStopped) => {
                        tracing::trace!("Server stopped event received");
                        stopped_flag.store(true, Ordering::SeqCst);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Lifecycle listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self {
            context_destroyed,
            container_stopped,
            listener,
        }
    }

    /// Has the container released its deployment context references?
    pub fn context_destroyed(&self) -> bool {
        self.context_destroyed.load(Ordering::SeqCst)
    }

    /// Has the container stopped serving?
    pub fn container_stopped(&self) -> bool {
        self.container_stopped.load(Ordering::SeqCst)
    }

    /// Have both termination flags been set?
    pub fn terminated(&self) -> bool {
        self.context_destroyed() && self.container_stopped()
    }
}

impl Drop for TerminationCoordinator {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_for(check: impl Fn() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 1s");
    }

    #[tokio::test]
    async fn test_flags_start_false() {
        let (_tx, rx) = broadcast::channel(4);
        let coordinator = TerminationCoordinator::attach(rx);
        assert!(!coordinator.context_destroyed());
        assert!(!coordinator.container_stopped());
        assert!(!coordinator.terminated());
    }

    #[tokio::test]
    async fn test_events_set_matching_flags() {
        let (tx, rx) = broadcast::channel(4);
        let coordinator = TerminationCoordinator::attach(rx);

        tx.send(LifecycleEvent::ServerStopped).expect("send");
        wait_for(|| coordinator.container_stopped()).await;
        assert!(!coordinator.context_destroyed());

        tx.send(LifecycleEvent::ContextDestroyed).expect("send");
        wait_for(|| coordinator.terminated()).await;
    }

    #[tokio::test]
    async fn test_flags_are_monotonic_after_channel_close() {
        let (tx, rx) = broadcast::channel(4);
        let coordinator = TerminationCoordinator::attach(rx);
        tx.send(LifecycleEvent::ServerStopped).expect("send");
        tx.send(LifecycleEvent::ContextDestroyed).expect("send");
        drop(tx);

        wait_for(|| coordinator.terminated()).await;
        assert!(coordinator.terminated());
    }
}

//! Graceful shutdown handling
//!
//! Lets the periodic service stop between passes on SIGINT or SIGTERM.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Shutdown coordinator for graceful termination
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_requested: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("shutdown_requested", &self.is_shutdown_requested())
            .finish()
    }
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new() -> Self {
        Self {
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        }
    }

    /// Request shutdown
    pub fn request_shutdown(&self) {
        if !self.shutdown_requested.swap(true, Ordering::SeqCst) {
            info!("Shutdown requested");
            self.shutdown_notify.notify_waiters();
        }
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Wait for shutdown. Returns at once if it was already requested.
    pub async fn wait_for_shutdown(&self) {
        let notified = self.shutdown_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }

    /// Sleep for `duration` unless shutdown arrives first.
    ///
    /// Returns `true` if the full duration elapsed.
    pub async fn sleep_or_shutdown(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_shutdown_requested(),
            _ = self.wait_for_shutdown() => false,
        }
    }

    /// Install signal handlers for SIGINT and SIGTERM
    ///
    /// Spawns a background task that calls `request_shutdown()` on the first signal.
    pub fn install_signal_handlers(&self) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();

        tokio::spawn(async move {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};

                let (mut sigint, mut sigterm) =
                    match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                        (Err(e), _) | (_, Err(e)) => {
                            error!(error = %e, "Failed to install signal handlers");
                            return;
                        }
                    };

                tokio::select! {
                    _ = sigint.recv() => {
                        warn!("Received SIGINT, finishing current pass before exit");
                        coordinator.request_shutdown();
                    }
                    _ = sigterm.recv() => {
                        warn!("Received SIGTERM, finishing current pass before exit");
                        coordinator.request_shutdown();
                    }
                }
            }

            #[cfg(not(unix))]
            {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        warn!("Received Ctrl+C, finishing current pass before exit");
                        coordinator.request_shutdown();
                    }
                    Err(e) => error!(error = %e, "Failed to install Ctrl+C handler"),
                }
            }
        })
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shutdown_is_idempotent() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutdown_requested());

        coordinator.request_shutdown();
        coordinator.request_shutdown();
        assert!(coordinator.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_wait_for_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let waiter_side = coordinator.clone();

        let waiter = tokio::spawn(async move {
            waiter_side.wait_for_shutdown().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        coordinator.request_shutdown();

        let result = tokio::time::timeout(Duration::from_millis(500), waiter).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_wait_after_request_returns_immediately() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.request_shutdown();

        let result =
            tokio::time::timeout(Duration::from_millis(100), coordinator.wait_for_shutdown()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let trigger = coordinator.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.request_shutdown();
        });

        let completed = coordinator.sleep_or_shutdown(Duration::from_secs(30)).await;
        assert!(!completed);
    }

    #[tokio::test]
    async fn test_sleep_completes_without_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        assert!(coordinator.sleep_or_shutdown(Duration::from_millis(5)).await);
    }
}

//! Generic shutdown coordination
//!
//! One cooperative, application-wide cancellation signal. Components observe
//! it either by polling [`ShutdownCoordinator::is_shutdown_requested`] at
//! their next timer tick or by awaiting a broadcast subscription; nothing is
//! pre-empted mid-transaction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Coordinates graceful shutdown across producers, consumers and applications.
///
/// Cloning is cheap; every clone observes and triggers the same signal.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        // Channel sized above 1 so a burst of triggers is never dropped
        let (shutdown_tx, _) = broadcast::channel(8);
        Self {
            shutdown_tx,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Trigger shutdown. Idempotent; every subscriber is woken once.
    pub fn trigger_shutdown(&self) {
        // Release pairs with the Acquire in is_shutdown_requested
        self.shutdown_requested.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Wait until shutdown is triggered.
    pub async fn wait(&self) {
        if self.is_shutdown_requested() {
            return;
        }
        let mut rx = self.subscribe();
        // Closed means every sender is gone; treat that as shutdown too
        let _ = rx.recv().await;
    }

    /// Install OS signal handlers that trigger this coordinator.
    ///
    /// A second signal forces immediate process exit for unresponsive runs.
    pub fn install_signal_handlers(&self) {
        #[cfg(unix)]
        {
            unsafe {
                libc::signal(libc::SIGPIPE, libc::SIG_DFL);
            }

            use tokio::signal::unix::{signal, SignalKind};
            for kind in [SignalKind::interrupt(), SignalKind::terminate()] {
                let coordinator = self.clone();
                tokio::spawn(async move {
                    if let Ok(mut sig) = signal(kind) {
                        if sig.recv().await.is_some() {
                            if coordinator.is_shutdown_requested() {
                                std::process::exit(130);
                            }
                            log::info!("Shutdown signal received");
                            coordinator.trigger_shutdown();
                        }
                    }
                });
            }
        }

        #[cfg(not(unix))]
        {
            let coordinator = self.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("Shutdown signal received");
                    coordinator.trigger_shutdown();
                }
            });
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

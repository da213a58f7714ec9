//! Start-once/stop-once resource ownership
//!
//! A [`Lifecycle`] guards one component's start/stop pair and owns the
//! release actions of everything the component acquired while running.
//! Release actions run exactly once, on the owner's `stop` or on the shared
//! shutdown signal firing, whichever comes first.

use crate::core::shutdown::ShutdownCoordinator;
use crate::core::sync::recover_mutex;
use std::sync::{Arc, Mutex};
use strum_macros::Display;
use tokio::sync::broadcast::error::RecvError;

/// Phase of a lifecycle-managed component. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LifecyclePhase {
    NotStarted,
    Running,
    Stopped,
}

/// A release action boxed for the child registry.
pub type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Wraps a release action so it runs at most once, no matter how many
/// owners (registry, cancellation watcher) try to trigger it.
pub struct ReleaseOnce {
    action: Mutex<Option<ReleaseFn>>,
}

impl ReleaseOnce {
    pub fn new(action: ReleaseFn) -> Self {
        Self {
            action: Mutex::new(Some(action)),
        }
    }

    /// Run the action if nobody has yet; otherwise a no-op.
    pub fn release(&self) {
        let action = recover_mutex(self.action.lock()).take();
        if let Some(action) = action {
            action();
        }
    }
}

struct Inner {
    phase: LifecyclePhase,
    children: Vec<Arc<ReleaseOnce>>,
}

/// Start-once/stop-once guard with a registry of child release actions.
///
/// All operations are safe under concurrent callers: the already-done check
/// and the registry mutation happen inside the same critical section.
pub struct Lifecycle {
    inner: Mutex<Inner>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: LifecyclePhase::NotStarted,
                children: Vec::new(),
            }),
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        recover_mutex(self.inner.lock()).phase
    }

    pub fn is_stopped(&self) -> bool {
        self.phase() == LifecyclePhase::Stopped
    }

    /// Transition NotStarted→Running exactly once.
    ///
    /// Returns whether this call performed the transition, so callers can
    /// guard one-time side effects. Idempotent.
    pub fn start(&self) -> bool {
        let mut inner = recover_mutex(self.inner.lock());
        if inner.phase == LifecyclePhase::NotStarted {
            inner.phase = LifecyclePhase::Running;
            true
        } else {
            false
        }
    }

    /// Construct a child resource and register its release action.
    ///
    /// While Running and before the shutdown signal has fired, `factory` is
    /// invoked and its release action registered; the action runs exactly
    /// once, on [`Lifecycle::stop`] or on shutdown, whichever is first.
    /// After stop (or after shutdown fired) this is a no-op and the factory
    /// is never invoked, so no resource can leak past teardown.
    pub fn add_child<F>(&self, shutdown: &ShutdownCoordinator, factory: F)
    where
        F: FnOnce() -> ReleaseFn,
    {
        // Subscribe before re-checking the flag: a trigger landing between
        // the check and the watcher spawn must still reach the receiver.
        let mut shutdown_rx = shutdown.subscribe();

        let once = {
            let mut inner = recover_mutex(self.inner.lock());
            if inner.phase != LifecyclePhase::Running {
                log::debug!(
                    "Ignoring child registration while lifecycle is {}",
                    inner.phase
                );
                return;
            }
            if shutdown.is_shutdown_requested() {
                log::debug!("Ignoring child registration after shutdown was requested");
                return;
            }

            let once = Arc::new(ReleaseOnce::new(factory()));
            inner.children.push(Arc::clone(&once));
            once
        };

        tokio::spawn(async move {
            match shutdown_rx.recv().await {
                Ok(()) | Err(RecvError::Lagged(_)) => once.release(),
                Err(RecvError::Closed) => {}
            }
        });
    }

    /// Transition to Stopped exactly once and synchronously release every
    /// registered child in registration order.
    ///
    /// Returns whether this call performed the stop. Idempotent; releases
    /// run outside the critical section so a child may own lifecycles of
    /// its own.
    pub fn stop(&self) -> bool {
        let children = {
            let mut inner = recover_mutex(self.inner.lock());
            if inner.phase == LifecyclePhase::Stopped {
                return false;
            }
            inner.phase = LifecyclePhase::Stopped;
            std::mem::take(&mut inner.children)
        };

        for child in children {
            child.release();
        }
        true
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

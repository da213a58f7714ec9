//! Synchronisation utilities for robust mutex handling

use std::sync::{LockResult, MutexGuard};

/// Convert a poisoned mutex into an application-specific error.
///
/// A poisoned lock means a thread panicked while holding it; callers that
/// return `Result` map this to their own error type instead of panicking in
/// turn.
pub fn handle_mutex_poison<T, E>(
    result: LockResult<MutexGuard<'_, T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<MutexGuard<'_, T>, E> {
    result.map_err(|poison_err| {
        error_constructor(format!(
            "internal synchronisation error (mutex poisoned): {:?}",
            poison_err
        ))
    })
}

/// Recover the guard from a possibly poisoned mutex.
///
/// Used where the caller has no error channel (lifecycle bookkeeping,
/// metrics); the protected state is simple enough that a panic elsewhere
/// cannot leave it torn.
pub fn recover_mutex<T>(result: LockResult<MutexGuard<'_, T>>) -> MutexGuard<'_, T> {
    result.unwrap_or_else(|poisoned| poisoned.into_inner())
}

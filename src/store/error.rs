//! Store Error Types

use crate::store::traits::HandlerError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying storage could not serve the transaction. Propagated to
    /// the caller as-is; the store performs no internal retry.
    #[error("queue storage unavailable: {reason}")]
    Unavailable { reason: String },

    /// The consume handler failed; the selection was rolled back and the
    /// events remain eligible for redelivery.
    #[error("consume handler failed: {0}")]
    Handler(#[source] HandlerError),
}

impl StoreError {
    /// Whether this failure rolled back a consume transaction (the events
    /// stay queued) rather than signalling storage loss.
    pub fn is_handler_failure(&self) -> bool {
        matches!(self, StoreError::Handler(_))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

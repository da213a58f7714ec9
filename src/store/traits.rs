//! Queue storage contract
//!
//! Any transactional row-store with row-level locking can satisfy this
//! trait; the crate ships the in-memory implementation in
//! [`crate::store::memory`]. Schema bootstrap (`clear`) is a setup
//! operation run before steady state, not part of the consume contract.

use crate::store::error::StoreResult;
use crate::store::event::{EnqueueRequest, InputEvent};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

/// Error produced by a consume handler; opaque to the store, which only
/// cares that it forces a rollback.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult = Result<(), HandlerError>;

/// Handler invoked once per consume transaction with the full ordered batch.
pub type BatchHandler =
    Box<dyn FnOnce(Vec<InputEvent>) -> BoxFuture<'static, HandlerResult> + Send>;

/// Handler invoked with the single selected event.
pub type EventHandler = Box<dyn FnOnce(InputEvent) -> BoxFuture<'static, HandlerResult> + Send>;

/// Durable, transactionally safe event queue.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Durably append `request`, assign the next sequence id and the
    /// insertion timestamp, and return the stored event. An accepted record
    /// is never lost or duplicated.
    async fn enqueue(&self, request: EnqueueRequest) -> StoreResult<InputEvent>;

    /// Within one transaction, select up to `batch_size` of the oldest
    /// events not locked by a concurrent in-flight consume, remove them and
    /// invoke `handler` once with the ordered batch.
    ///
    /// The removal commits only if the handler returns `Ok`; any handler
    /// error rolls back the entire batch (at-least-once redelivery).
    /// Returns `Ok(true)` if events were processed, `Ok(false)` if nothing
    /// was eligible.
    async fn consume_many(&self, batch_size: usize, handler: BatchHandler) -> StoreResult<bool>;

    /// Single-event variant of [`EventStore::consume_many`] with the same
    /// transactional contract.
    async fn consume_one(&self, handler: EventHandler) -> StoreResult<bool> {
        self.consume_many(
            1,
            Box::new(move |mut events| {
                async move {
                    match events.pop() {
                        Some(event) => handler(event).await,
                        None => Ok(()),
                    }
                }
                .boxed()
            }),
        )
        .await
    }

    /// Number of events currently stored.
    async fn len(&self) -> StoreResult<usize>;

    /// Remove all stored events. Bootstrap/teardown surface; sequence ids
    /// are not reset.
    async fn clear(&self) -> StoreResult<()>;
}

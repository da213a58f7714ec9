//! Public API for the event queue store
//!
//! External modules should import from here rather than directly from the
//! internal modules.

pub use crate::store::error::{StoreError, StoreResult};
pub use crate::store::event::{EnqueueRequest, EventPayload, InputEvent};
pub use crate::store::memory::MemoryStore;
pub use crate::store::traits::{
    BatchHandler, EventHandler, EventStore, HandlerError, HandlerResult,
};

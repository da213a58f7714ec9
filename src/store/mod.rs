//! Durable event queue store
//!
//! An ordered, transactionally safe event log with an atomic, lock-skipping
//! dequeue. Producers append through [`api::EventStore::enqueue`]; consumers
//! compete for the backlog through `consume_one`/`consume_many`, whose
//! transactions commit the removal only after the handler succeeds.
//!
//! # Concurrency policy ("skip-locked, read-past")
//!
//! A row claimed by an in-flight consume transaction is skipped by every
//! other consume, never awaited. Concurrent consumers therefore never block
//! each other and never observe the same row, which is what allows consumers
//! to scale horizontally against a single store.
//!
//! # Delivery guarantees
//!
//! At-least-once: a handler failure rolls the whole selection back, leaving
//! the events eligible for redelivery. Handlers must tolerate duplicates;
//! exactly-once is explicitly not provided.

pub(crate) mod error;
pub(crate) mod event;
pub(crate) mod memory;
pub(crate) mod traits;

// Public API module - the only public interface for the store
pub mod api;

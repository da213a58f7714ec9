//! Producer/consumer event workflow
//!
//! Wires the queue store into a running system: producers synthesize and
//! enqueue events on a timer, consumers compete for the backlog through the
//! store's skip-locked dequeue, and an application composes both sides under
//! one lifecycle and one cancellation signal.
//!
//! # Data flow
//!
//! ```text
//! Producer ──enqueue──▶ EventStore ──batch──▶ Consumer handler ──▶ consumed
//!    │                                                              observers
//!    └──produced notification──▶ Application fan-out
//!                                     │
//!                                     ▼
//!                        Consumer::notify_event_produced
//!                                     │
//!                                     ▼
//!                        ConsumerStateMachine signal
//! ```
//!
//! The consumer's polling/consuming decisions live in a compare-and-swap
//! guarded state machine ([`state`]); see that module for the transition
//! table and its latency/idle trade-offs.

pub(crate) mod application;
pub(crate) mod config;
pub(crate) mod consumer;
pub(crate) mod producer;
pub(crate) mod state;

// Public API module - the only public interface for the workflow
pub mod api;

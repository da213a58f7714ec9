//! In-process notification fan-out
//!
//! Producers announce stored events, consumers announce handled events;
//! both go through an [`registry::ObserverRegistry`] scoped to the owning
//! component. Subscriptions are registered when a component starts and
//! removed by its lifecycle release, so no callback outlives its owner.

pub(crate) mod registry;

// Public API module - the only public interface for notifications
pub mod api;

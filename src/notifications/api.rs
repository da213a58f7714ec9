//! Public API for the notification system

pub use crate::notifications::registry::{ObserverRegistry, SubscriptionId};

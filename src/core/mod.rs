//! Core ambient services shared by every component
//!
//! Cross-cutting utilities with no workflow knowledge: logging setup,
//! shutdown coordination, lifecycle (start-once/stop-once) ownership,
//! instance id allocation and lock-poison handling.

pub mod ids;
pub mod lifecycle;
pub mod logging;
pub mod shutdown;
pub mod sync;

//! Per-application instance id allocation
//!
//! Numbers producers, consumers and event payloads within one application
//! instance. Explicitly constructed and passed down instead of a process
//! global so tests get isolated counters.

use crate::core::sync::recover_mutex;
use std::collections::HashMap;
use std::sync::Mutex;

/// Allocates monotonically increasing ids per component name, starting at 1.
#[derive(Default)]
pub struct IdAllocator {
    counters: Mutex<HashMap<&'static str, u64>>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, component: &'static str) -> u64 {
        let mut counters = recover_mutex(self.counters.lock());
        let counter = counters.entry(component).or_insert(0);
        *counter += 1;
        *counter
    }
}

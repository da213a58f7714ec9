//! In-memory transactional queue store
//!
//! Models the skip-locked dequeue of a row-store: an in-flight consume marks
//! its selection locked, releases the store lock while the handler runs,
//! then commits (delete) or rolls back (unlock). Other consumers read past
//! locked rows instead of waiting on them.

use crate::core::sync::handle_mutex_poison;
use crate::store::error::{StoreError, StoreResult};
use crate::store::event::{EnqueueRequest, InputEvent};
use crate::store::traits::{BatchHandler, EventStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

struct Row {
    event: InputEvent,
    /// Claimed by an in-flight consume transaction; skipped by every other
    /// consume until committed or rolled back.
    locked: bool,
}

struct Inner {
    /// Append order equals sequence order; oldest-first selection is plain
    /// front-to-back iteration.
    rows: VecDeque<Row>,
    next_sequence: i64,
}

/// In-process [`EventStore`] with skip-locked consume transactions.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                rows: VecDeque::new(),
                next_sequence: 1,
            }),
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        // A poisoned store lock is indistinguishable from losing the
        // storage connection; surface it the same way.
        handle_mutex_poison(self.inner.lock(), |reason| StoreError::Unavailable {
            reason,
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn enqueue(&self, request: EnqueueRequest) -> StoreResult<InputEvent> {
        log::debug!("Enqueueing event {}", request.event_id);

        let stored = {
            let mut inner = self.lock()?;
            let sequence_id = inner.next_sequence;
            inner.next_sequence += 1;

            let event = InputEvent {
                sequence_id,
                event_id: request.event_id,
                application_id: request.application_id,
                created_at: request.created_at,
                inserted_at: Utc::now(),
                payload: request.payload,
            };
            inner.rows.push_back(Row {
                event: event.clone(),
                locked: false,
            });
            event
        };

        log::info!("Inserted {}", stored);
        Ok(stored)
    }

    async fn consume_many(&self, batch_size: usize, handler: BatchHandler) -> StoreResult<bool> {
        log::debug!("Trying to consume next batch...");

        // Select and lock up to batch_size of the oldest unlocked rows.
        let selected: Vec<InputEvent> = {
            let mut inner = self.lock()?;
            let mut picked = Vec::new();
            for row in inner.rows.iter_mut() {
                if picked.len() == batch_size {
                    break;
                }
                if !row.locked {
                    row.locked = true;
                    picked.push(row.event.clone());
                }
            }
            picked
        };

        if selected.is_empty() {
            log::debug!("Nothing to read");
            return Ok(false);
        }

        log::debug!("Read {} entries, handing off to handler", selected.len());
        let sequence_ids: Vec<i64> = selected.iter().map(|e| e.sequence_id).collect();

        // The store lock is not held across the handler; only the row locks
        // keep the selection invisible to concurrent consumers.
        let outcome = handler(selected).await;

        let mut inner = self.lock()?;
        match outcome {
            Ok(()) => {
                inner
                    .rows
                    .retain(|row| !sequence_ids.contains(&row.event.sequence_id));
                log::debug!("Committed removal of {} event(s)", sequence_ids.len());
                Ok(true)
            }
            Err(source) => {
                for row in inner.rows.iter_mut() {
                    if sequence_ids.contains(&row.event.sequence_id) {
                        row.locked = false;
                    }
                }
                log::warn!(
                    "Handler failed, rolled back {} event(s) for redelivery",
                    sequence_ids.len()
                );
                Err(StoreError::Handler(source))
            }
        }
    }

    async fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.rows.len())
    }

    async fn clear(&self) -> StoreResult<()> {
        log::debug!("Removing all stored events");
        let mut inner = self.lock()?;
        inner.rows.clear();
        // next_sequence is deliberately untouched: ids are never reused
        Ok(())
    }
}

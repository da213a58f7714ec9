//! Event consumer
//!
//! Wraps the skip-locked store behind a [`ConsumerStateMachine`]: the
//! machine decides when to fetch, the consumer decides what a fetch does.
//! Each fetched batch is handled inside the store's consume transaction, so
//! a handler failure leaves the events in place for redelivery.

use crate::core::lifecycle::Lifecycle;
use crate::core::shutdown::ShutdownCoordinator;
use crate::metrics::api::MetricsSink;
use crate::notifications::api::{ObserverRegistry, SubscriptionId};
use crate::store::api::{EventStore, HandlerResult, InputEvent, StoreError, StoreResult};
use crate::workflow::config::ConsumerConfig;
use crate::workflow::state::{ConsumerState, ConsumerStateMachine, FetchFn};
use chrono::Utc;
use futures::FutureExt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Sentinel for "no event consumed yet"; real sequence ids start at 1.
const NO_SEQUENCE: i64 = i64::MIN;

struct ConsumerShared {
    id: u64,
    store: Arc<dyn EventStore>,
    application_id: Uuid,
    config: ConsumerConfig,
    metrics: Arc<MetricsSink>,
    consumed: ObserverRegistry<InputEvent>,
    last_consumed_sequence: AtomicI64,
}

impl ConsumerShared {
    /// One fetch attempt: run a consume transaction over up to
    /// `batch_fetch_size` events. A handler failure is the transaction's
    /// problem (rolled back, events redelivered later) and reports "nothing
    /// consumed"; only storage trouble propagates and corrupts the machine.
    async fn fetch_once(self: Arc<Self>) -> StoreResult<bool> {
        let shared = Arc::clone(&self);
        let handler = Box::new(move |events: Vec<InputEvent>| {
            async move { shared.handle_batch(events).await }.boxed()
        });

        match self
            .store
            .consume_many(self.config.batch_fetch_size, handler)
            .await
        {
            Ok(found) => Ok(found),
            Err(StoreError::Handler(source)) => {
                log::error!(
                    "Consumer {} handler failed, batch rolled back: {source}",
                    self.id
                );
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    async fn handle_batch(&self, events: Vec<InputEvent>) -> HandlerResult {
        self.metrics.record_fetched_batch_size(events.len());

        for event in &events {
            log::trace!("Consumer {} handling {}", self.id, event);

            // Sequences must arrive in strictly increasing order per
            // consumer; an anomaly is counted, not fatal.
            let previous = self.last_consumed_sequence.load(Ordering::Relaxed);
            if previous != NO_SEQUENCE && event.sequence_id <= previous {
                log::warn!(
                    "Consumer {} got {} after sequence {}",
                    self.id,
                    event,
                    previous
                );
                self.metrics.record_invalid_consume_order();
            }
            self.last_consumed_sequence
                .store(event.sequence_id, Ordering::Relaxed);

            let same_app = event.application_id == self.application_id;
            let now = Utc::now();
            self.metrics.record_create_consume_latency(
                (now - event.created_at).num_milliseconds().max(0) as u64,
                same_app,
            );
            self.metrics.record_insert_consume_latency(
                (now - event.inserted_at).num_milliseconds().max(0) as u64,
                same_app,
            );
            self.metrics.record_handled();

            self.consumed.notify(event);
        }

        if !self.config.handler_duration.is_zero() {
            // Simulated downstream work, charged once per batch.
            tokio::time::sleep(self.config.handler_duration).await;
        }
        Ok(())
    }
}

pub struct Consumer {
    shared: Arc<ConsumerShared>,
    lifecycle: Lifecycle,
    state_machine: ConsumerStateMachine,
}

impl Consumer {
    pub(crate) fn new(
        id: u64,
        store: Arc<dyn EventStore>,
        application_id: Uuid,
        config: ConsumerConfig,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        let shared = Arc::new(ConsumerShared {
            id,
            store,
            application_id,
            config: config.clone(),
            metrics,
            consumed: ObserverRegistry::new(),
            last_consumed_sequence: AtomicI64::new(NO_SEQUENCE),
        });

        let fetch_shared = Arc::clone(&shared);
        let fetch: FetchFn = Arc::new(move || {
            let shared = Arc::clone(&fetch_shared);
            async move { shared.fetch_once().await }.boxed()
        });

        Self {
            shared,
            lifecycle: Lifecycle::new(),
            state_machine: ConsumerStateMachine::new(
                config.polling_interval,
                config.pick_next_interval,
                fetch,
            ),
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn current_state(&self) -> ConsumerState {
        self.state_machine.current_state()
    }

    /// Register an observer for every handled event.
    pub fn on_event_consumed(
        &self,
        observer: impl Fn(&InputEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.shared.consumed.subscribe(observer)
    }

    pub fn remove_consumed_observer(&self, id: SubscriptionId) {
        self.shared.consumed.unsubscribe(id);
    }

    /// Hint that a producer just published. Wakes an idle machine; a busy
    /// one latches the hint for its post-fetch decision.
    pub fn notify_event_produced(&self) {
        self.state_machine.handle_produced_signal();
    }

    /// Start the polling/consuming loop. Idempotent; the loop also winds
    /// down on coordinated shutdown.
    pub fn start_consuming(&self, shutdown: &ShutdownCoordinator) {
        if !self.lifecycle.start() {
            log::warn!(
                "Ignoring consumer {} start while lifecycle is {}",
                self.shared.id,
                self.lifecycle.phase()
            );
            return;
        }

        let machine = self.state_machine.clone();
        let id = self.shared.id;
        self.lifecycle.add_child(shutdown, move || {
            Box::new(move || {
                log::debug!("Consumer {id} stopping");
                machine.stop();
            })
        });

        self.state_machine.start();
    }

    /// Stop consuming. Safe before start and after a prior stop.
    pub fn stop(&self) {
        self.lifecycle.stop();
    }
}

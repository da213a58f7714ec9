//! Event producer
//!
//! Publishes numbered events into the store on a fixed interval and fans
//! each published event out to registered observers. Stopping never
//! interrupts a publish in flight; the producer finishes the current
//! enqueue and then exits its loop.

use crate::core::ids::IdAllocator;
use crate::core::lifecycle::Lifecycle;
use crate::core::shutdown::ShutdownCoordinator;
use crate::metrics::api::MetricsSink;
use crate::notifications::api::{ObserverRegistry, SubscriptionId};
use crate::store::api::{EnqueueRequest, EventPayload, EventStore, InputEvent, StoreResult};
use crate::workflow::config::ProducerConfig;
use std::sync::Arc;
use uuid::Uuid;

struct ProducerShared {
    id: u64,
    store: Arc<dyn EventStore>,
    application_id: Uuid,
    config: ProducerConfig,
    metrics: Arc<MetricsSink>,
    ids: Arc<IdAllocator>,
    produced: ObserverRegistry<InputEvent>,
}

impl ProducerShared {
    /// Enqueue one event and notify observers of the stored row.
    async fn publish_once(&self) -> StoreResult<InputEvent> {
        let number = self.ids.next("event-number") as i64;
        let request = EnqueueRequest::new(self.application_id, EventPayload { number });
        let event = self.store.enqueue(request).await?;

        self.metrics.record_produced();
        log::trace!("Producer {} published {}", self.id, event);
        self.produced.notify(&event);
        Ok(event)
    }
}

pub struct Producer {
    shared: Arc<ProducerShared>,
    lifecycle: Lifecycle,
}

impl Producer {
    pub(crate) fn new(
        id: u64,
        store: Arc<dyn EventStore>,
        application_id: Uuid,
        config: ProducerConfig,
        metrics: Arc<MetricsSink>,
        ids: Arc<IdAllocator>,
    ) -> Self {
        Self {
            shared: Arc::new(ProducerShared {
                id,
                store,
                application_id,
                config,
                metrics,
                ids,
                produced: ObserverRegistry::new(),
            }),
            lifecycle: Lifecycle::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Publish a single event outside the continuous loop.
    pub async fn publish_once(&self) -> StoreResult<InputEvent> {
        self.shared.publish_once().await
    }

    /// Register an observer for every event this producer publishes.
    pub fn on_event_produced(
        &self,
        observer: impl Fn(&InputEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.shared.produced.subscribe(observer)
    }

    pub fn remove_produced_observer(&self, id: SubscriptionId) {
        self.shared.produced.unsubscribe(id);
    }

    /// Start the publish loop. Idempotent across repeated calls; the loop
    /// also winds down on coordinated shutdown.
    pub fn start_continuous(&self, shutdown: &ShutdownCoordinator) {
        if !self.lifecycle.start() {
            log::warn!(
                "Ignoring producer {} start while lifecycle is {}",
                self.shared.id,
                self.lifecycle.phase()
            );
            return;
        }

        let shared = Arc::clone(&self.shared);
        self.lifecycle.add_child(shutdown, move || {
            let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();

            tokio::spawn(async move {
                if !shared.config.start_delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(shared.config.start_delay) => {}
                        _ = &mut stop_rx => {
                            log::debug!("Producer {} stopped before first publish", shared.id);
                            return;
                        }
                    }
                }

                let mut ticker = tokio::time::interval(shared.config.interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = &mut stop_rx => {
                            log::debug!("Producer {} stopping", shared.id);
                            return;
                        }
                    }
                    // Publish outside the select: a stop arriving now takes
                    // effect on the next iteration, after the enqueue lands.
                    // A failed publish does not cancel the schedule.
                    if let Err(err) = shared.publish_once().await {
                        log::error!("Producer {} failed to publish: {err}", shared.id);
                    }
                }
            });

            Box::new(move || {
                let _ = stop_tx.send(());
            })
        });
    }

    /// Stop the publish loop. Safe before start and after a prior stop.
    pub fn stop(&self) {
        self.lifecycle.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::api::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn make_producer(store: Arc<MemoryStore>, config: ProducerConfig) -> Producer {
        Producer::new(
            1,
            store,
            Uuid::new_v4(),
            config,
            Arc::new(MetricsSink::new()),
            Arc::new(IdAllocator::new()),
        )
    }

    fn fast_config() -> ProducerConfig {
        ProducerConfig {
            start_delay: Duration::ZERO,
            interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_publish_once_stores_and_notifies() {
        let store = Arc::new(MemoryStore::new());
        let producer = make_producer(Arc::clone(&store), fast_config());

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        producer.on_event_produced(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        let first = producer.publish_once().await.unwrap();
        let second = producer.publish_once().await.unwrap();

        assert_eq!(first.payload.number, 1);
        assert_eq!(second.payload.number, 2);
        assert!(second.sequence_id > first.sequence_id);
        assert_eq!(store.len().await.unwrap(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_continuous_loop_publishes_until_stopped() {
        let store = Arc::new(MemoryStore::new());
        let producer = make_producer(Arc::clone(&store), fast_config());
        let shutdown = ShutdownCoordinator::new();

        producer.start_continuous(&shutdown);
        tokio::time::sleep(Duration::from_millis(50)).await;
        producer.stop();

        let count_at_stop = store.len().await.unwrap();
        assert!(count_at_stop > 0, "loop never published");

        // No further publishes after stop.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.len().await.unwrap(), count_at_stop);
    }

    #[tokio::test]
    async fn test_start_delay_defers_first_publish() {
        let store = Arc::new(MemoryStore::new());
        let producer = make_producer(
            Arc::clone(&store),
            ProducerConfig {
                start_delay: Duration::from_millis(80),
                interval: Duration::from_millis(1),
            },
        );
        let shutdown = ShutdownCoordinator::new();

        producer.start_continuous(&shutdown);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.len().await.unwrap(), 0);

        producer.stop();
    }

    #[tokio::test]
    async fn test_unsubscribed_observer_sees_nothing_further() {
        let store = Arc::new(MemoryStore::new());
        let producer = make_producer(store, fast_config());

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let sub = producer.on_event_produced(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        producer.publish_once().await.unwrap();
        producer.remove_produced_observer(sub);
        producer.publish_once().await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_coordinated_shutdown_stops_loop() {
        let store = Arc::new(MemoryStore::new());
        let producer = make_producer(Arc::clone(&store), fast_config());
        let shutdown = ShutdownCoordinator::new();

        producer.start_continuous(&shutdown);
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.trigger_shutdown();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let count_at_stop = store.len().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.len().await.unwrap(), count_at_stop);
    }
}

//! Application assembly
//!
//! An application owns a set of producers and consumers sharing one store
//! and one metrics sink. Starting it wires the produced-event fan-out:
//! every consumer in the application gets a wakeup hint for every event any
//! of the application's producers publishes. Consumers start before
//! producers so the first published event already has someone listening;
//! teardown runs in the same order.

use crate::core::ids::IdAllocator;
use crate::core::lifecycle::Lifecycle;
use crate::core::shutdown::ShutdownCoordinator;
use crate::metrics::api::MetricsSink;
use crate::store::api::EventStore;
use crate::workflow::config::ApplicationConfig;
use crate::workflow::consumer::Consumer;
use crate::workflow::producer::Producer;
use std::sync::Arc;
use uuid::Uuid;

pub struct Application {
    application_id: Uuid,
    lifecycle: Lifecycle,
    producers: Vec<Arc<Producer>>,
    consumers: Vec<Arc<Consumer>>,
    metrics: Arc<MetricsSink>,
}

impl Application {
    pub fn new(store: Arc<dyn EventStore>, config: &ApplicationConfig) -> Self {
        Self::with_metrics(store, config, Arc::new(MetricsSink::new()))
    }

    pub fn with_metrics(
        store: Arc<dyn EventStore>,
        config: &ApplicationConfig,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        let application_id = Uuid::new_v4();
        let ids = Arc::new(IdAllocator::new());

        let producers = config
            .producers
            .iter()
            .map(|producer_config| {
                Arc::new(Producer::new(
                    ids.next("producer"),
                    Arc::clone(&store),
                    application_id,
                    producer_config.clone(),
                    Arc::clone(&metrics),
                    Arc::clone(&ids),
                ))
            })
            .collect();

        let consumers = config
            .consumers
            .iter()
            .map(|consumer_config| {
                Arc::new(Consumer::new(
                    ids.next("consumer"),
                    Arc::clone(&store),
                    application_id,
                    consumer_config.clone(),
                    Arc::clone(&metrics),
                ))
            })
            .collect();

        Self {
            application_id,
            lifecycle: Lifecycle::new(),
            producers,
            consumers,
            metrics,
        }
    }

    pub fn application_id(&self) -> Uuid {
        self.application_id
    }

    pub fn metrics(&self) -> &Arc<MetricsSink> {
        &self.metrics
    }

    pub fn producers(&self) -> &[Arc<Producer>] {
        &self.producers
    }

    pub fn consumers(&self) -> &[Arc<Consumer>] {
        &self.consumers
    }

    /// Start consumers, then producers, and wire the produced-event fan-out.
    /// Idempotent; everything started here is released on [`Application::stop`]
    /// or on coordinated shutdown.
    pub fn start(&self, shutdown: &ShutdownCoordinator) {
        if !self.lifecycle.start() {
            log::warn!(
                "Ignoring application {} start while lifecycle is {}",
                self.application_id,
                self.lifecycle.phase()
            );
            return;
        }
        log::info!(
            "Starting application {} with {} producer(s) and {} consumer(s)",
            self.application_id,
            self.producers.len(),
            self.consumers.len()
        );

        for consumer in &self.consumers {
            let consumer = Arc::clone(consumer);
            let shutdown_for_child = shutdown.clone();
            self.lifecycle.add_child(shutdown, move || {
                consumer.start_consuming(&shutdown_for_child);
                Box::new(move || consumer.stop())
            });
        }

        for producer in &self.producers {
            let producer = Arc::clone(producer);
            let consumers = self.consumers.clone();
            let shutdown_for_child = shutdown.clone();
            self.lifecycle.add_child(shutdown, move || {
                let subscription = producer.on_event_produced(move |_| {
                    for consumer in &consumers {
                        consumer.notify_event_produced();
                    }
                });
                producer.start_continuous(&shutdown_for_child);

                Box::new(move || {
                    producer.remove_produced_observer(subscription);
                    producer.stop();
                })
            });
        }
    }

    /// Stop producers and consumers. Idempotent.
    pub fn stop(&self) {
        if self.lifecycle.stop() {
            log::info!("Stopped application {}", self.application_id);
        }
    }
}

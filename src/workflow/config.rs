//! Workflow configuration surface
//!
//! Loaded from a TOML file or built from the default benchmark composition.
//! Every interval/duration is configured in milliseconds.

use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

/// Deserialize a `Duration` from an integer number of milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProducerConfig {
    /// Delay before the first publish.
    #[serde(with = "duration_ms", default)]
    pub start_delay: Duration,
    /// Fixed period between publishes.
    #[serde(with = "duration_ms")]
    pub interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    /// Idle retry baseline; kept long to conserve resources while the queue
    /// is empty and no produced-signal arrives.
    #[serde(with = "duration_ms")]
    pub polling_interval: Duration,
    /// Eager retry delay used while more backlog is plausible.
    #[serde(with = "duration_ms", default)]
    pub pick_next_interval: Duration,
    /// Simulated per-batch handler work.
    #[serde(with = "duration_ms", default)]
    pub handler_duration: Duration,
    /// Upper bound on events taken per consume transaction.
    #[serde(default = "default_batch_fetch_size")]
    pub batch_fetch_size: usize,
}

fn default_batch_fetch_size() -> usize {
    10
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default)]
    pub producers: Vec<ProducerConfig>,
    #[serde(default)]
    pub consumers: Vec<ConsumerConfig>,
}

/// Top-level configuration: one entry per application instance sharing the
/// queue store.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    pub applications: Vec<ApplicationConfig>,
}

impl WorkflowConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot honor: the producer ticker requires
    /// a non-zero period.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, application) in self.applications.iter().enumerate() {
            for producer in &application.producers {
                if producer.interval.is_zero() {
                    return Err(ConfigError::Invalid {
                        reason: format!(
                            "applications[{index}]: producer interval must be at least 1 ms"
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// The built-in benchmark composition: a primary application that both
    /// produces and consumes, plus a secondary produce-only application so
    /// cross-application consumption shows up in the `same_app=false`
    /// latency series. Producer timing is jittered so publishes do not
    /// arrive in lockstep.
    pub fn default_benchmark() -> Self {
        let mut rng = rand::rng();
        let mut jittered_producers = |count: usize| -> Vec<ProducerConfig> {
            (0..count)
                .map(|_| ProducerConfig {
                    start_delay: Duration::from_millis(rng.random_range(0..100)),
                    interval: Duration::from_millis(rng.random_range(300..1000)),
                })
                .collect()
        };

        let primary = ApplicationConfig {
            producers: jittered_producers(10),
            consumers: vec![ConsumerConfig {
                // Long enough that only produced-signals drive the consumer;
                // the poll is a fallback for lost signals.
                polling_interval: Duration::from_secs(3000),
                pick_next_interval: Duration::ZERO,
                handler_duration: Duration::ZERO,
                batch_fetch_size: default_batch_fetch_size(),
            }],
        };
        let secondary = ApplicationConfig {
            producers: jittered_producers(6),
            consumers: Vec::new(),
        };

        Self {
            applications: vec![primary, secondary],
        }
    }
}

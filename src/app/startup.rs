//! Benchmark assembly and run loop.

use crate::app::cli::Args;
use crate::core::logging::init_logging;
use crate::core::shutdown::ShutdownCoordinator;
use crate::metrics::api::MetricsSink;
use crate::store::api::{EventStore, MemoryStore, StoreError};
use crate::workflow::api::{Application, ConfigError, WorkflowConfig};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("logging setup failed: {0}")]
    Logging(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Parse the command line, build the configured applications over a shared
/// store and run them until a signal or the `--run-for` deadline.
pub async fn run() -> Result<(), StartupError> {
    let args = Args::parse();

    init_logging(args.log_level.as_deref(), args.log_file.as_deref())
        .map_err(|err| StartupError::Logging(err.to_string()))?;
    log::info!(
        "eventflow {} starting (built {}, {})",
        env!("CARGO_PKG_VERSION"),
        crate::BUILD_TIME,
        crate::GIT_HASH
    );

    let config = match &args.config {
        Some(path) => {
            log::info!("Loading workflow configuration from {}", path.display());
            WorkflowConfig::load(path)?
        }
        None => {
            log::info!("No configuration file given, using built-in benchmark topology");
            WorkflowConfig::default_benchmark()
        }
    };

    let store: Arc<dyn EventStore> = Arc::new(MemoryStore::new());
    store.clear().await?;

    let shutdown = ShutdownCoordinator::new();
    shutdown.install_signal_handlers();

    let applications: Vec<Application> = config
        .applications
        .iter()
        .map(|app_config| {
            Application::with_metrics(
                Arc::clone(&store),
                app_config,
                Arc::new(MetricsSink::new()),
            )
        })
        .collect();

    for application in &applications {
        application.start(&shutdown);
    }
    log::info!("Running {} application(s)", applications.len());

    match args.run_for {
        Some(seconds) => {
            tokio::select! {
                _ = shutdown.wait() => {}
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {
                    log::info!("Run deadline of {seconds}s reached, shutting down");
                    shutdown.trigger_shutdown();
                }
            }
        }
        None => shutdown.wait().await,
    }

    for (index, application) in applications.iter().enumerate() {
        application.stop();
        application
            .metrics()
            .log_summary(&format!("application #{index}"));
    }

    let remaining = store.len().await?;
    log::info!("Shutdown complete, {remaining} event(s) left in the queue");
    Ok(())
}

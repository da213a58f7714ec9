use clap::Parser;
use std::path::PathBuf;

/// Producer/consumer event-queue workflow benchmark.
#[derive(Debug, Parser)]
#[command(name = "eventflow", version, about)]
pub struct Args {
    /// Workflow configuration file (TOML). Without it a built-in benchmark
    /// topology is used.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for a signal.
    #[arg(long, value_name = "SECONDS")]
    pub run_for: Option<u64>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Write log output to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<String>,
}

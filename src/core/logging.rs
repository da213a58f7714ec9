//! Logging initialisation via flexi_logger
//!
//! All modules log through the `log` facade; the binary wires the facade to
//! flexi_logger here. Tests leave logging uninitialised and the facade
//! silently discards records.

use flexi_logger::{FileSpec, Logger, LoggerHandle};
use std::sync::OnceLock;

static LOGGER_HANDLE: OnceLock<LoggerHandle> = OnceLock::new();

/// Initialise the process-wide logger.
///
/// `log_level` accepts a flexi_logger level spec (`info`, `debug`, ...);
/// `log_file` redirects output to a file instead of stdout. Calling this a
/// second time is a no-op so integration tests can share one process.
pub fn init_logging(
    log_level: Option<&str>,
    log_file: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    if LOGGER_HANDLE.get().is_some() {
        return Ok(());
    }

    let level_str = log_level.unwrap_or("info");
    let mut logger = Logger::try_with_str(level_str)?.format(plain_format);

    if let Some(file_path) = log_file {
        let file_spec = FileSpec::try_from(std::path::Path::new(file_path))?;
        logger = logger.log_to_file(file_spec);
    }

    let handle = logger.start()?;
    let _ = LOGGER_HANDLE.set(handle);

    Ok(())
}

fn plain_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    let level_abbr = match record.level() {
        log::Level::Error => "ERR",
        log::Level::Warn => "WRN",
        log::Level::Info => "INF",
        log::Level::Debug => "DBG",
        log::Level::Trace => "TRC",
    };

    write!(
        w,
        "{} [{}] {}: {}",
        now.format("%Y-%m-%d %H:%M:%S%.3f"),
        level_abbr,
        record.target(),
        record.args()
    )
}

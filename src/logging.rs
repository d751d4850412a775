//! Structured logging for the Caravan forcing pipeline.
//!
//! Every event carries the data source and, where relevant, the gauge id, so
//! a multi-gauge run can be filtered per gauge. Events go through `tracing`;
//! [`init`] installs a console (or append-mode file) subscriber.

use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Target used for this crate's default log filter.
const CRATE_TARGET: &str = "caravan_forcing";

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Era5Land,
    Hydstra,
    MelbourneWater,
    Pipeline,
    Filesystem,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Era5Land => write!(f, "ERA5L"),
            DataSource::Hydstra => write!(f, "HYDSTRA"),
            DataSource::MelbourneWater => write!(f, "MELBWATER"),
            DataSource::Pipeline => write!(f, "PIPE"),
            DataSource::Filesystem => write!(f, "FS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - no data published for the requested period
    Expected,
    /// Unexpected failure - service degradation, API change or bad configuration
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Initialize tracing from CLI verbosity.
///
/// Mapping:
/// - 0 (none) -> info
/// - 1 (-v)   -> debug
/// - 2+ (-vv) -> trace
///
/// `RUST_LOG` overrides the flag if set. With `log_file`, events are appended
/// to that file instead of printed.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> std::io::Result<()> {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{CRATE_TARGET}={level}")));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Log a general informational message
pub fn info(source: DataSource, site_id: Option<&str>, message: &str) {
    tracing::info!(source = %source, site = site_id.unwrap_or("-"), "{}", message);
}

/// Log a warning message
pub fn warn(source: DataSource, site_id: Option<&str>, message: &str) {
    tracing::warn!(source = %source, site = site_id.unwrap_or("-"), "{}", message);
}

/// Log an error message
pub fn error(source: DataSource, site_id: Option<&str>, message: &str) {
    tracing::error!(source = %source, site = site_id.unwrap_or("-"), "{}", message);
}

/// Log a debug message
pub fn debug(source: DataSource, site_id: Option<&str>, message: &str) {
    tracing::debug!(source = %source, site = site_id.unwrap_or("-"), "{}", message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a fetch or load failure from its error message.
pub fn classify_fetch_failure(error_message: &str) -> FailureType {
    if error_message.contains("not found") || error_message.contains("No data") {
        // Years before a gauge opened, or ERA5 exports not yet produced
        FailureType::Expected
    } else if error_message.contains("HTTP error")
        || error_message.contains("API error")
        || error_message.contains("Parse error")
        || error_message.contains("Unknown variable")
    {
        FailureType::Unexpected
    } else {
        FailureType::Unknown
    }
}

/// Log a failure with automatic classification
pub fn log_fetch_failure(source: DataSource, site_id: &str, operation: &str, err: &dyn std::error::Error) {
    let error_msg = err.to_string();
    let failure_type = classify_fetch_failure(&error_msg);

    let message = format!("{} failed [{}]: {}", operation, failure_type, error_msg);

    match failure_type {
        FailureType::Expected => debug(source, Some(site_id), &message),
        FailureType::Unexpected => error(source, Some(site_id), &message),
        FailureType::Unknown => warn(source, Some(site_id), &message),
    }
}

// ---------------------------------------------------------------------------
// Backfill Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a multi-gauge or multi-year run
pub fn log_backfill_summary(source: DataSource, total: usize, successful: usize, failed: usize) {
    let message = format!(
        "Backfill complete: {}/{} successful, {} failed",
        successful, total, failed
    );

    if failed == 0 {
        info(source, None, &message);
    } else if successful == 0 {
        error(source, None, &message);
    } else {
        warn(source, None, &message);
    }
}

//! Logging initialization

use crate::config::LoggingSettings;
use crate::error::{EngineError, Result};
use tracing_subscriber::FmtSubscriber;

/// Install the global `tracing` subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.log_level())
        .with_target(settings.show_target)
        .with_thread_ids(settings.show_thread_ids)
        .with_file(settings.show_location)
        .with_line_number(settings.show_location)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| EngineError::Logging(e.to_string()))
}

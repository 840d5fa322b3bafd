//! Observability for fnctl
//!
//! Structured logs through `tracing`. Each line names its [`Event`] in the
//! `event` field; everything else is a plain key/value field.
//!
//! # Usage
//!
//! ```ignore
//! use fnctl::observability::{self, Event};
//!
//! observability::init(LogFormat::Text);
//! tracing::info!(event = %Event::DeployBegin, function = "ping", stage = "dev");
//! ```

mod events;

pub use events::Event;

use tracing_subscriber::EnvFilter;

/// Environment variable selecting the log line format
pub const LOG_FORMAT_ENV: &str = "FNCTL_LOG_FORMAT";

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines
    Text,
    /// One JSON object per line
    Json,
}

impl LogFormat {
    /// Read the format from [`LOG_FORMAT_ENV`], defaulting to text
    pub fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV) {
            Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Returns false,
/// and logs at debug, when a subscriber was already installed.
pub fn init(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    match installed {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "log subscriber already installed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init(LogFormat::Text);
        assert!(!init(LogFormat::Json));
        tracing::info!(event = %Event::ConfigLoaded, "still logging");
    }
}

//! Logging initialization.
//!
//! Structured logging via `tracing`, configured from the environment:
//! `VAULTSYNC_LOG` (or `RUST_LOG`) sets the filter, `--verbose` on the CLI
//! lowers the default to debug. Output goes to stderr so command output on
//! stdout stays machine-readable.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, defaulting to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Initializes the global tracing subscriber. Safe to call more than once;
/// only the first call takes effect.
pub fn init_logging(verbose: bool) {
    LOGGING_INIT.get_or_init(|| {
        let default_level = if verbose { "debug" } else { "info" };
        let filter = EnvFilter::try_from_env("VAULTSYNC_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        let format = std::env::var("VAULTSYNC_LOG_FORMAT")
            .map(|v| LogFormat::parse(&v))
            .unwrap_or_default();

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false);

        // Ignore the error if a subscriber is already installed (tests).
        let _ = match format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Text => builder.try_init(),
        };
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Text);
    }

    #[test]
    fn test_init_is_idempotent() {
        init_logging(false);
        init_logging(true);
    }
}

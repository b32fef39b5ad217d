//! Tracing subscriber setup shared by chainping binaries

use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Compact,
    Json,
}

impl Format {
    fn parse(value: &str) -> Option<Format> {
        match value {
            "json" => Some(Format::Json),
            "compact" => Some(Format::Compact),
            _ => None,
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `level` and `RUST_LOG_FORMAT` overrides `format`.
/// An unparsable `level` falls back to INFO.
pub fn init_tracing(level: &str, format: Format) {
    let parsed = level.parse::<LevelFilter>().ok();
    let requested = var("RUST_LOG_FORMAT").ok();
    let format = requested.as_deref().and_then(Format::parse).unwrap_or(format);

    initialize_tracing(parsed.unwrap_or(LevelFilter::INFO), format);

    if parsed.is_none() {
        warn!(level, "Unknown log level, falling back to info");
    }
    if let Some(value) = requested.as_deref().filter(|v| Format::parse(v).is_none()) {
        warn!(value, "Unknown RUST_LOG_FORMAT, falling back to {:?}", format);
    }
}

fn initialize_tracing(level: LevelFilter, format: Format) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_layer = match format {
        Format::Json => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        Format::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(log_layer).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(Format::parse("json"), Some(Format::Json));
        assert_eq!(Format::parse("compact"), Some(Format::Compact));
        assert_eq!(Format::parse("pretty"), None);
        assert_eq!(Format::default(), Format::Compact);
    }
}

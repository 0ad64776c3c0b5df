//! Tracing setup for processes embedding the entity and trend core.
//!
//! Newsdesk crates log at the configured level and every other target stays
//! at `warn`. The store emits one debug line per recorded mention, so it only
//! goes below `info` when `trace` is requested. `RUST_LOG` replaces all of it.

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::ObservabilityConfig;

/// Crates whose targets follow the configured level.
pub const NEWSDESK_TARGETS: &[&str] = &["newsdesk_common", "newsdesk_entities"];

/// Per-row store logging, held at `info` unless tracing.
pub const STORE_TARGET: &str = "newsdesk_entities::store";

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Colored single-line output for terminals
    #[default]
    Pretty,
    /// One JSON object per event, span close events included
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Directives used when `RUST_LOG` is unset. Unknown levels fall back to `info`.
pub fn default_directives(log_level: &str) -> String {
    let level: Level = log_level.trim().parse().unwrap_or(Level::INFO);
    let store_level = if level == Level::TRACE { Level::TRACE } else { level.min(Level::INFO) };

    let mut directives = vec!["warn".to_string()];
    directives.extend(NEWSDESK_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.push(format!("{STORE_TARGET}={store_level}"));
    directives.join(",").to_lowercase()
}

fn fmt_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .boxed(),
    }
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed; the existing one
/// is kept. An unknown `log_format` selects [`LogFormat::Pretty`].
pub fn init_logging(log_level: &str, log_format: &str) -> bool {
    let format = LogFormat::parse(log_format).unwrap_or_default();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    let installed = tracing_subscriber::registry()
        .with(fmt_layer(format))
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(log_level, ?format, "Logging initialized");
    }
    installed
}

/// Install the global subscriber from the observability config section.
pub fn init_from_config(config: &ObservabilityConfig) -> bool {
    init_logging(&config.log_level, &config.log_format)
}

/// Trace ID correlating the log lines of one ingested document.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

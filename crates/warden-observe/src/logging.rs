//! Structured logging utilities
//!
//! Log format selection plus span helpers carrying the fields of a
//! permission check.

use std::str::FromStr;

use tracing::Span;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};
use warden_config::ObservabilityConfig;

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors (for development)
    Pretty,
    /// Compact format without colors
    Compact,
    /// JSON format (for production)
    Json,
}

#[allow(clippy::derivable_impls)]
impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        {
            LogFormat::Pretty
        }
        #[cfg(not(debug_assertions))]
        {
            LogFormat::Json
        }
    }
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow::anyhow!("Unknown log format: {}", other)),
        }
    }
}

/// Configuration for logging behavior
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Whether to include file/line numbers
    pub include_location: bool,
    pub include_target: bool,
    pub include_thread_id: bool,
    /// Whether to log span events (enter/exit/close)
    pub log_spans: bool,
    /// Environment filter (e.g., "info,warden=debug")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            include_location: cfg!(debug_assertions),
            include_target: true,
            include_thread_id: false,
            log_spans: false,
            filter: None,
        }
    }
}

impl LogConfig {
    /// Logging settings from the observability section.
    ///
    /// The configured level becomes the default directive for warden crates.
    pub fn from_config(config: &ObservabilityConfig) -> anyhow::Result<Self> {
        let format = match &config.log_format {
            Some(format) => format.parse()?,
            None => LogFormat::default(),
        };
        let level = config.log_level.to_lowercase();

        Ok(Self {
            format,
            filter: Some(format!("{level},warden={level}")),
            ..Self::default()
        })
    }
}

/// Initialize structured logging with configuration
pub fn init_logging(config: LogConfig) -> anyhow::Result<()> {
    let env_filter = if let Some(filter) = config.filter {
        EnvFilter::try_new(filter)?
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,warden=debug"))
    };

    let fmt_span = if config.log_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_id)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(fmt_span);

    match config.format {
        LogFormat::Pretty => {
            subscriber
                .pretty()
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize pretty logger: {}", e))?;
        }
        LogFormat::Compact => {
            subscriber
                .compact()
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize compact logger: {}", e))?;
        }
        LogFormat::Json => {
            subscriber
                .json()
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize JSON logger: {}", e))?;
        }
    }

    tracing::info!(format = ?config.format, "Logging initialized");

    Ok(())
}

/// Span for one permission check
pub fn check_span(resource: &str, permission: &str) -> Span {
    tracing::debug_span!(
        "permission_check",
        resource = resource,
        permission = permission,
        decision = tracing::field::Empty,
        cached = tracing::field::Empty,
    )
}

/// Span for one evaluator run
pub fn eval_span(permission: &str, depth: usize) -> Span {
    tracing::trace_span!(
        "evaluation",
        permission = permission,
        depth = depth,
        result = tracing::field::Empty,
    )
}

/// Record the decision in a check span
pub fn record_check_decision(span: &Span, decision: &str, cached: bool) {
    span.record("decision", decision);
    span.record("cached", cached);
}

pub fn record_eval_result(span: &Span, result: bool) {
    span.record("result", result);
}

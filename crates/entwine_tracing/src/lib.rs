//! Tracing setup for entwine.
//!
//! Every entwine crate reports through the `tracing` macros: dev-mode
//! diagnostics (a middleware that never called `next`, an after hook that
//! dropped a result) at `warn`, edge materialization, re-wrap merges and
//! ordering decisions at `debug`, slot creation at `trace`. Nothing is printed
//! unless a subscriber is installed. [`TracingSetup`] installs one and can
//! switch the diagnostics on at the same time.
//!
//! # Example
//!
//! ```
//! use entwine_tracing::{TracingFormat, TracingSetup};
//! use tracing::Level;
//!
//! // Development: pretty output, debug level, dev-mode diagnostics on.
//! let dev = TracingSetup::new()
//!     .with_level(Level::DEBUG)
//!     .with_format(TracingFormat::Pretty)
//!     .with_diagnostics(true);
//!
//! // Production: JSON output for log aggregation.
//! let prod = TracingSetup::new()
//!     .with_format(TracingFormat::Json)
//!     .with_env_filter("entwine_hooks=warn,entwine_feature=info");
//! # let _ = (dev, prod);
//! ```

use std::sync::Arc;

use entwine_state::config::{ConfigContext, ConfigError};
use serde_json::json;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ─────────────────────────────────────────────────────────────────────────────
// TracingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable colored output (default).
    #[default]
    Pretty,
    /// Compact single-line output.
    Compact,
    /// JSON structured output for log aggregation.
    Json,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// The settings a [`TracingSetup`] was installed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracingConfig {
    /// The configured log level.
    pub level: Level,
    /// The configured output format.
    pub format: TracingFormat,
    /// Whether dev-mode diagnostics were switched on.
    pub diagnostics: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingSetup
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for the process-wide `tracing` subscriber.
///
/// # Environment Filter
///
/// Use `with_env_filter` to set target-specific log levels:
///
/// ```
/// use entwine_tracing::TracingSetup;
///
/// TracingSetup::default()
///     .with_env_filter("entwine_hooks=debug,entwine_state=info")
/// # ;
/// ```
#[derive(Debug, Clone)]
pub struct TracingSetup {
    /// Maximum log level.
    level: Level,
    /// Output format.
    format: TracingFormat,
    /// Environment filter (e.g., "`entwine_hooks=debug`").
    env_filter: Option<String>,
    /// Whether to include span events (enter/exit).
    span_events: bool,
    /// Whether to enable dev-mode diagnostics on `context`.
    diagnostics: bool,
    /// Context the diagnostics switch is applied to.
    context: Option<Arc<ConfigContext>>,
}

impl Default for TracingSetup {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::Pretty,
            env_filter: None,
            span_events: false,
            diagnostics: false,
            context: None,
        }
    }
}

impl TracingSetup {
    /// Creates a new `TracingSetup` with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum log level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets a custom environment filter string.
    ///
    /// Format: `target=level,target=level,...`. An invalid string falls back
    /// to the configured level.
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Enables span enter/exit events in output.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Turns dev-mode diagnostics on (or off) when installing.
    #[must_use]
    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Applies the diagnostics switch to `context` instead of the global one.
    #[must_use]
    pub fn with_context(mut self, context: Arc<ConfigContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Returns the settings this builder describes.
    #[must_use]
    pub fn config(&self) -> TracingConfig {
        TracingConfig {
            level: self.level,
            format: self.format,
            diagnostics: self.diagnostics,
        }
    }

    /// Builds the environment filter.
    #[must_use]
    pub fn filter(&self) -> EnvFilter {
        match &self.env_filter {
            Some(filter) => match EnvFilter::try_new(filter) {
                Ok(filter) => filter,
                Err(_) => self.level_filter(),
            },
            None => self.level_filter(),
        }
    }

    fn level_filter(&self) -> EnvFilter {
        EnvFilter::new(self.level.as_str())
    }

    /// Writes the diagnostics switch into the configuration context.
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigError`] from [`ConfigContext::set`].
    pub fn apply_diagnostics(&self) -> Result<(), ConfigError> {
        let context = self.context.clone().unwrap_or_else(ConfigContext::global);
        context.set(json!({ "dev_mode": self.diagnostics }))?;
        Ok(())
    }

    /// Installs the subscriber and applies the diagnostics switch.
    ///
    /// Installing twice keeps the first subscriber.
    ///
    /// # Errors
    ///
    /// See [`apply_diagnostics`](Self::apply_diagnostics).
    pub fn init(&self) -> Result<TracingConfig, ConfigError> {
        let env_filter = self.filter();

        let span_events = if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        };

        // try_init().ok() ignores errors if already initialized
        match self.format {
            TracingFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .pretty()
                            .with_span_events(span_events),
                    )
                    .try_init()
                    .ok();
            }
            TracingFormat::Compact => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_span_events(span_events),
                    )
                    .try_init()
                    .ok();
            }
            TracingFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_span_events(span_events),
                    )
                    .try_init()
                    .ok();
            }
        }

        self.apply_diagnostics()?;

        tracing::info!(
            level = %self.level,
            format = ?self.format,
            diagnostics = self.diagnostics,
            "tracing initialized"
        );
        Ok(self.config())
    }
}

//! Tracing configuration for structured logging
//!
//! The binary configures the subscriber; library code only emits `log`
//! records and `tracing` events, which end up in the same output.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output format of the console subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable colored output (default)
    Console,
    /// Plain output for CI and log files
    Compact,
    /// JSON structured logging
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Tracing configuration builder
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Verbosity level from repeated `-v`
    pub verbosity: u8,
    /// `--debug` flag; raises the level to at least debug
    pub debug: bool,
    pub format: TracingFormat,
    /// Explicit filter directive (overrides verbosity if set)
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            debug: false,
            format: TracingFormat::Console,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Convert verbosity and the debug flag to a level directive
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match (self.verbosity, self.debug) {
            (0, false) => "info",
            (0 | 1, _) => "debug",
            _ => "trace",
        }
    }

    /// Filter directive in effect: explicit filter, then verbosity
    ///
    /// Noisy HTTP internals stay at `warn` unless asked for explicitly.
    #[must_use]
    pub fn filter_directive(&self) -> String {
        match &self.env_filter {
            Some(filter) => filter.clone(),
            None => format!(
                "{},hyper=warn,reqwest=warn,tract_core=warn,ort=warn",
                self.verbosity_to_filter()
            ),
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directive
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = EnvFilter::try_new(self.filter_directive())?;
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_level(true)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(self.debug)
                    .with_file(false)
                    .with_line_number(false)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(fmt_layer).try_init()?;
            },
        }

        Ok(())
    }
}

/// Initialize tracing with CLI defaults; `RUST_LOG` takes precedence
///
/// # Errors
/// - Invalid filter directive
/// - A global subscriber is already installed
#[cfg(feature = "cli")]
pub fn init_cli_tracing(verbosity: u8, debug: bool) -> anyhow::Result<()> {
    let mut config = TracingConfig::new()
        .with_verbosity(verbosity)
        .with_debug(debug);
    if let Ok(directive) = std::env::var(EnvFilter::DEFAULT_ENV) {
        if !directive.trim().is_empty() {
            config = config.with_env_filter(directive);
        }
    }
    config.init()
}

/// Span helpers for server operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span covering the lifetime of the HTTP server
    #[must_use]
    pub fn server(address: &str, model: &str, device: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "server",
            address = %address,
            model = %model,
            device = %device
        )
    }

    /// Span for a single inpaint request
    #[must_use]
    pub fn inpaint_request(image_bytes: usize, mask_bytes: usize, size_limit: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "inpaint_request",
            image_bytes,
            mask_bytes,
            size_limit = %size_limit
        )
    }

    /// Span for a weights download
    #[must_use]
    pub fn download(url: &str) -> Span {
        tracing::span!(Level::INFO, "download", url = %url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(TracingConfig::new().verbosity_to_filter(), "info");
        assert_eq!(TracingConfig::new().with_verbosity(1).verbosity_to_filter(), "debug");
        assert_eq!(TracingConfig::new().with_verbosity(2).verbosity_to_filter(), "trace");
        assert_eq!(TracingConfig::new().with_verbosity(5).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_debug_flag_raises_level() {
        let config = TracingConfig::new().with_debug(true);
        assert_eq!(config.verbosity_to_filter(), "debug");
        assert!(config.filter_directive().starts_with("debug,"));
        assert_eq!(config.with_verbosity(2).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_explicit_filter_overrides() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_env_filter("lama_cleaner=trace");
        assert_eq!(config.filter_directive(), "lama_cleaner=trace");
    }

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.verbosity, 0);
        assert!(!config.debug);
        assert_eq!(config.format, TracingFormat::Console);
        assert!(config.env_filter.is_none());
    }
}

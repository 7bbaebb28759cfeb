//! Logging setup
//!
//! The validator and the uploader emit `tracing` events: `debug` for rules
//! that pass or are skipped, `warn` for rejections and exhausted moves,
//! `info` for stored files. Applications that already install a subscriber
//! need nothing from this module.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with the default configuration
///
/// Sets up:
/// - Structured logging with JSON formatting (release) or pretty formatting (debug)
/// - Environment-based log level filtering via `RUST_LOG`
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
///
/// # Example
///
/// ```rust,no_run
/// use upload_gate::observability;
///
/// # fn main() -> anyhow::Result<()> {
/// observability::init()?;
/// tracing::info!("Application started");
/// # Ok(())
/// # }
/// ```
pub fn init() -> anyhow::Result<()> {
    init_with(&ObservabilityConfig::default())
}

/// Initialize logging with an explicit configuration
///
/// `RUST_LOG` still takes precedence over [`ObservabilityConfig::default_filter`].
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
pub fn init_with(config: &ObservabilityConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))?;

    #[cfg(debug_assertions)]
    {
        // Pretty formatting for development
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?;
    }

    #[cfg(not(debug_assertions))]
    {
        // JSON formatting for production
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    }

    tracing::debug!(service = %config.service_name, "Logging initialized");
    Ok(())
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name attached to the startup event
    pub service_name: String,

    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "upload-gate".to_string(),
            default_filter: if cfg!(debug_assertions) {
                "info,upload_gate=debug".to_string()
            } else {
                "info".to_string()
            },
        }
    }
}

impl ObservabilityConfig {
    /// Create new observability config
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the filter used when `RUST_LOG` is unset
    #[must_use]
    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }
}

//! Logging setup using the tracing ecosystem.
//!
//! Logs go to stderr so stdout stays free for command output such as the
//! dry-run plan.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{DeployError, Result};

/// Env var holding a tracing filter directive
pub const LOG_ENV: &str = "MAGENTO_SCD_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive (e.g. "info", "magento_cloud_scd=debug")
    pub filter: String,
    /// Include file/line in logs
    pub file_line: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            file_line: false,
        }
    }
}

impl LogConfig {
    /// `--verbose` forces debug; otherwise [`LOG_ENV`] or "info"
    pub fn from_env(verbose: bool) -> Self {
        Self::resolve(verbose, std::env::var(LOG_ENV).ok())
    }

    fn resolve(verbose: bool, env_filter: Option<String>) -> Self {
        if verbose {
            return Self {
                filter: "debug".into(),
                file_line: true,
            };
        }
        Self {
            filter: env_filter
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| "info".into()),
            file_line: false,
        }
    }
}

/// Install the global subscriber. Fails on an invalid filter or when a
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|e| DeployError::Logging {
        message: format!("Invalid log filter: {}", e),
    })?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(config.file_line)
        .with_line_number(config.file_line);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| DeployError::Logging {
            message: e.to_string(),
        })
}

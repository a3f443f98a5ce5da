//! CLI configuration

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use storefront::config::CheckoutConfig;
use url::Url;

/// Log output format.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    /// Compact, human-readable logs.
    Compact,

    /// Structured JSON logs.
    Json,
}

/// Logging settings.
#[derive(Debug, Args)]
pub(crate) struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG", default_value = "warn")]
    pub(crate) log_level: String,

    /// Log format (compact, json)
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub(crate) log_format: LogFormat,
}

/// Where the storefront's collaborators live.
#[derive(Debug, Args)]
pub(crate) struct BackendConfig {
    /// JSON backend for carts, products, coupons, stock and shipping; the scenario's fixture is
    /// used when omitted
    #[arg(long, env = "BACKEND_URL")]
    pub(crate) backend_url: Option<Url>,

    /// Payment gateway; defaults to the backend URL
    #[arg(long, env = "PAYMENT_URL")]
    pub(crate) payment_url: Option<Url>,

    /// Directory for the persistent cache; kept in memory when omitted
    #[arg(long, env = "CACHE_DIR")]
    pub(crate) cache_dir: Option<PathBuf>,
}

impl BackendConfig {
    /// Backend and gateway URLs, when a backend is configured.
    pub(crate) fn remote(&self) -> Option<(Url, Url)> {
        let backend = self.backend_url.clone()?;
        let payments = self.payment_url.clone().unwrap_or_else(|| backend.clone());

        Some((backend, payments))
    }
}

/// Storefront CLI configuration
#[derive(Debug, Parser)]
#[command(name = "storefront-cli", about = "Storefront checkout CLI", long_about = None)]
pub(crate) struct Config {
    /// Logging output settings.
    #[command(flatten)]
    pub(crate) logging: LoggingConfig,

    /// Checkout business rules.
    #[command(flatten)]
    pub(crate) checkout: CheckoutConfig,

    /// Backend locations.
    #[command(flatten)]
    pub(crate) backend: BackendConfig,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run a checkout scenario from a YAML file
    Run {
        /// Scenario file
        scenario: PathBuf,
    },
}

impl Config {
    /// Load configuration from environment and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed
    pub(crate) fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse()
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn payment_url_defaults_to_backend() -> TestResult {
        let config = Config::try_parse_from([
            "storefront-cli",
            "--backend-url",
            "https://api.example/",
            "run",
            "checkout.yml",
        ])?;

        let (backend, payments) = config.backend.remote().ok_or("backend should be set")?;

        assert_eq!(backend, payments);

        Ok(())
    }

    #[test]
    fn checkout_rules_are_flattened() -> TestResult {
        let config = Config::try_parse_from([
            "storefront-cli",
            "--min-order-amount",
            "1000",
            "--payment-max-retries",
            "3",
            "run",
            "checkout.yml",
        ])?;

        assert_eq!(config.checkout.min_order_amount, 1_000);
        assert_eq!(config.checkout.payment_max_retries, 3);

        Ok(())
    }
}

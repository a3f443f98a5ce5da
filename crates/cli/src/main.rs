//! Storefront checkout CLI
//!
//! Runs checkout scenarios end to end against a YAML fixture or a live backend.

use std::{io, process};

use tracing::error;

use crate::{
    config::{Command, Config},
    scenario::{Scenario, Verdict},
};

mod config;
mod logging;
mod report;
mod scenario;

/// Storefront CLI entry point
#[tokio::main]
pub async fn main() {
    let config = Config::load().unwrap_or_else(|e| {
        #[expect(
            clippy::print_stderr,
            reason = "logging not initialized yet, must use eprintln for config errors"
        )]
        {
            eprintln!("Configuration error: {e}");
        }

        process::exit(2);
    });

    if let Err(e) = logging::init_subscriber(&config.logging) {
        #[expect(
            clippy::print_stderr,
            reason = "logging failed to initialize, must use eprintln"
        )]
        {
            eprintln!("Logging error: {e}");
        }

        process::exit(2);
    }

    match run(config).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(message) => {
            error!("{message}");

            process::exit(2);
        }
    }
}

/// Returns whether the shopper reached the payment page.
async fn run(config: Config) -> Result<bool, String> {
    match config.command {
        Command::Run { scenario } => {
            let scenario = Scenario::load(&scenario)
                .map_err(|error| format!("{}: {error}", scenario.display()))?;

            let outcome = scenario::run(scenario, &config.checkout, &config.backend)
                .await
                .map_err(|error| error.to_string())?;

            report::write_to(io::stdout().lock(), &outcome)
                .map_err(|error| format!("failed to write report: {error}"))?;

            Ok(matches!(outcome.verdict, Verdict::Redirected(_)))
        }
    }
}

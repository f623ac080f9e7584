//! Tebex headless command line client

use std::process;

use tracing::error;

use crate::config::CliConfig;

mod commands;
mod config;
mod logging;
mod render;

/// Tebex headless client entry point
#[tokio::main]
pub async fn main() {
    // Load configuration from .env and CLI arguments
    let config = CliConfig::load().unwrap_or_else(|error| error.exit());

    if let Err(error) = logging::init_subscriber(&config.logging) {
        #[expect(
            clippy::print_stderr,
            reason = "logging failed to initialise, must use eprintln"
        )]
        {
            eprintln!("Logging error: {error}");
        }

        process::exit(1);
    }

    match commands::run(config).await {
        Ok(output) => {
            #[expect(clippy::print_stdout, reason = "command output goes to stdout")]
            {
                println!("{output}");
            }
        }
        Err(error) => {
            error!("command failed: {error}");

            #[expect(clippy::print_stderr, reason = "errors are reported to the terminal")]
            {
                eprintln!("error: {error}");
            }

            process::exit(1);
        }
    }
}

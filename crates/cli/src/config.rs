//! Command line configuration

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser};

use tebex_headless::{SdkConfig, http::DEFAULT_BASE_URL};

use crate::commands::Command;

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Compact, human-readable logs.
    Compact,

    /// Structured JSON logs.
    Json,
}

/// Logging settings.
#[derive(Debug, Args)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG", default_value = "warn", global = true)]
    pub log_level: String,

    /// Log format (compact, json)
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact, global = true)]
    pub log_format: LogFormat,
}

/// Webstore connection settings.
#[derive(Debug, Args)]
pub struct TebexConfig {
    /// Public webstore token
    #[arg(long, env = "TEBEX_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Headless API root
    #[arg(long, env = "TEBEX_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Redirect target after payment
    #[arg(long, env = "TEBEX_COMPLETE_URL", default_value = "")]
    pub complete_url: String,

    /// Redirect target when checkout is abandoned
    #[arg(long, env = "TEBEX_CANCEL_URL", default_value = "")]
    pub cancel_url: String,

    /// Directory holding the stored user and basket
    #[arg(long, env = "TEBEX_STATE_DIR", default_value = ".tebex")]
    pub state_dir: PathBuf,

    /// Request timeout in seconds
    #[arg(long, env = "TEBEX_TIMEOUT_SECONDS", default_value_t = 10_u64)]
    pub timeout_seconds: u64,
}

impl TebexConfig {
    /// SDK settings for this webstore.
    pub fn sdk_config(&self) -> SdkConfig {
        let mut config = SdkConfig::new(self.token.clone());

        config.base_url.clone_from(&self.base_url);
        config.complete_url.clone_from(&self.complete_url);
        config.cancel_url.clone_from(&self.cancel_url);
        config.timeout = Some(Duration::from_secs(self.timeout_seconds));

        config
    }
}

/// Tebex headless client configuration
#[derive(Debug, Parser)]
#[command(name = "tebex-headless", about = "Tebex headless basket client", long_about = None)]
pub struct CliConfig {
    /// Webstore settings.
    #[command(flatten)]
    pub tebex: TebexConfig,

    /// Logging output settings.
    #[command(flatten)]
    pub logging: LoggingConfig,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// Load configuration from environment and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed
    pub fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse()
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::commands::BasketCommand;

    use super::*;

    #[test]
    fn parses_basket_add_with_variables() -> TestResult {
        let config = CliConfig::try_parse_from([
            "tebex-headless",
            "--token",
            "abc",
            "--log-format",
            "json",
            "basket",
            "add",
            "101",
            "--quantity",
            "2",
            "--var",
            "server=survival",
        ])?;

        assert_eq!(config.logging.log_format, LogFormat::Json);

        let Command::Basket(BasketCommand::Add {
            package_id,
            quantity,
            variables,
            ..
        }) = config.command
        else {
            return Err("expected basket add".into());
        };

        assert_eq!(package_id, 101);
        assert_eq!(quantity, 2);
        assert_eq!(variables, [("server".to_string(), "survival".to_string())]);

        Ok(())
    }

    #[test]
    fn sdk_config_carries_connection_settings() -> TestResult {
        let config = CliConfig::try_parse_from([
            "tebex-headless",
            "--token",
            "abc",
            "--base-url",
            "http://localhost:9000",
            "--timeout-seconds",
            "3",
            "logout",
        ])?;

        let sdk = config.tebex.sdk_config();

        assert_eq!(sdk.token, "abc");
        assert_eq!(sdk.base_url, "http://localhost:9000");
        assert_eq!(sdk.timeout, Some(Duration::from_secs(3)));

        Ok(())
    }
}

//! Subcommands.

use std::{path::PathBuf, sync::Arc};

use clap::Subcommand;
use thiserror::Error;

use tebex_headless::{TebexError, TebexHeadless, identity::FileStorage, models::PackageId};

use crate::{config::CliConfig, render};

mod basket;

pub(crate) use basket::BasketCommand;

/// Command to run against the webstore.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Show webstore details
    Webstore,

    /// List categories
    Categories {
        /// Include each category's packages
        #[arg(long)]
        packages: bool,
    },

    /// Show one category with its packages
    Category {
        /// Category id
        id: u64,
    },

    /// List packages
    Packages,

    /// Show one package
    Package {
        /// Package id
        id: PackageId,
    },

    /// Store the user that owns new baskets
    Login {
        /// Username
        username: String,
    },

    /// Forget the user and their basket
    Logout,

    /// Inspect or change the basket
    #[command(subcommand)]
    Basket(BasketCommand),
}

/// Failure of a command.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// The state directory could not be created.
    #[error("failed to create state directory {path}: {source}")]
    StateDir {
        /// Directory path.
        path: PathBuf,

        /// Underlying error.
        source: std::io::Error,
    },

    /// The state file could not be read.
    #[error("failed to open state in {0}")]
    Storage(PathBuf),

    /// SDK failure.
    #[error(transparent)]
    Tebex(#[from] TebexError),
}

/// Run the configured command, returning what to print.
pub(crate) async fn run(config: CliConfig) -> Result<String, CliError> {
    let state_dir = config.tebex.state_dir.clone();

    std::fs::create_dir_all(&state_dir).map_err(|source| CliError::StateDir {
        path: state_dir.clone(),
        source,
    })?;

    let storage = FileStorage::new(&state_dir).ok_or(CliError::Storage(state_dir))?;
    let sdk = TebexHeadless::new(config.tebex.sdk_config(), Arc::new(storage))?;

    match config.command {
        Command::Webstore => Ok(render::webstore(&sdk.catalog().webstore().await?)),
        Command::Categories { packages } => Ok(render::categories(
            &sdk.catalog().categories(packages).await?,
        )),
        Command::Category { id } => Ok(render::category(&sdk.catalog().category(id).await?)),
        Command::Packages => Ok(render::packages(&sdk.catalog().packages().await?)),
        Command::Package { id } => Ok(render::package(&sdk.catalog().package(id).await?)),
        Command::Login { username } => {
            sdk.identity().set_user_id(&username);

            Ok(format!("user: {username}"))
        }
        Command::Logout => {
            sdk.identity().clear_user();

            Ok("logged out".to_string())
        }
        Command::Basket(command) => basket::run(&sdk, command).await,
    }
}

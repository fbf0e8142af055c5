//! `memefold`: manage a user's image folders from the command line.

mod cli;
mod commands;
mod error;
mod logging;

use crate::cli::Cli;
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use memefold_config::Config;
use memefold_library::{Context, FolderManager};
use memefold_records::{Repository, UserId};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    logging::init(&config.logging.level, cli.verbose, cli.quiet)?;

    let db = config.database().await.or_raise(|| ErrorKind::Config)?;
    let storage = config.storage_backend().await.or_raise(|| ErrorKind::Config)?;
    let repository = Arc::new(Repository::from(&db));
    let user = UserId::from(cli.user);
    repository.ensure_profile(&user).await.or_raise(|| ErrorKind::Account(user.to_string()))?;

    let manager = FolderManager::new(Context::new(repository, storage, config.limits()));
    let result = match manager.sign_in(user).await {
        Ok(_) => commands::run(&manager, cli.command, &mut std::io::stdout().lock()).await,
        Err(err) => Err(err.raise(ErrorKind::SignIn)),
    };
    manager.sign_out().await;
    db.close().await;
    result
}

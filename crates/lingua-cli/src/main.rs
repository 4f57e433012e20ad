mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lingua_config::{AppConfig, ConfigLoader};

#[derive(Parser, Debug)]
#[command(name = "lingua", version, about = "Schema migrations for the Lingua language portal")]
struct Cli {
    /// Config file (defaults to config.{yml,yaml,toml} in the config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true, env = "LINGUA_DB_PATH")]
    database: Option<PathBuf>,

    /// Directory holding the .sql migration units
    #[arg(long, global = true, env = "LINGUA_MIGRATIONS_DIR")]
    migrations_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new migration skeleton
    Create {
        /// Short description, e.g. add_audit_log
        slug: String,
    },
    /// Apply all pending migrations
    Run {
        /// Use the compiled-in portal schema instead of the migrations dir
        #[arg(long)]
        embedded: bool,
        /// Hold the migration lock for the duration of the run
        #[arg(long)]
        lock: bool,
    },
    /// List applied, pending and orphaned migrations
    Status {
        #[arg(long)]
        embedded: bool,
    },
    /// Remove a lock left behind by a crashed run
    Unlock,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.log);

    match dispatch(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = ConfigLoader::from_default_dir()
        .load(cli.config.as_deref())
        .context("failed to load configuration")?;

    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    if let Some(dir) = &cli.migrations_dir {
        config.migrations.dir = dir.clone();
    }
    Ok(config)
}

fn dispatch(command: Command, config: &AppConfig) -> Result<()> {
    match command {
        Command::Create { slug } => commands::create(config, &slug),
        Command::Run { embedded, lock } => commands::run(config, embedded, lock),
        Command::Status { embedded } => commands::status(config, embedded),
        Command::Unlock => commands::unlock(config),
    }
}

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tl_cli::commands::{delete, items, last_update, put, resync, status, timeline};
use tl_cli::{App, Cli, Commands, Config};

/// Load config and open the engine over the configured database.
fn open_app(config_path: Option<&Path>) -> Result<App> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    App::open(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let app = open_app(cli.config.as_deref())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Status => status::run(&mut out, &app)?,
        Commands::Timeline {
            user,
            type_name,
            limit,
            json,
        } => {
            let feed = timeline::Feed {
                user: user.clone(),
                type_name: type_name.clone(),
                limit: *limit,
            };
            timeline::run(&mut out, &app, &feed, *json)?;
        }
        Commands::Items { limit } => items::run(&mut out, &app, *limit)?,
        Commands::Put {
            type_name,
            id,
            fields,
        } => put::run(&mut out, &app, type_name, *id, fields)?,
        Commands::Delete { type_name, id } => delete::run(&mut out, &app, type_name, *id)?,
        Commands::Resync { type_name } => resync::run(&mut out, &app, type_name.as_deref())?,
        Commands::LastUpdate {
            type_name,
            user,
            before,
            after,
        } => {
            let window = last_update::Window {
                user: user.clone(),
                before: before.clone(),
                after: after.clone(),
            };
            last_update::run(&mut out, &app, type_name, &window)?;
        }
    }

    out.flush()?;
    Ok(())
}

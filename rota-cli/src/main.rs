//! Rota CLI - Command line interface for Rota
//!
//! Assigns pull request reviewers across team members and keeps their
//! workload balanced.

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rota_core::{Config, LogFormat};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{App, HealArgs, PrArgs, StatsArgs, TeamArgs, UserArgs};

/// Rota: balanced reviewer assignment for pull requests
#[derive(Parser, Debug)]
#[command(name = "rota")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the SQLite database (overrides config and env)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Deadline for each operation, e.g. "3s" (overrides config and env)
    #[arg(long, global = true, value_parser = humantime_serde::re::humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Manage teams and their members
    #[command(visible_alias = "t")]
    Team(TeamArgs),

    /// Manage users
    #[command(visible_alias = "u")]
    User(UserArgs),

    /// Create pull requests and change their reviewers
    Pr(PrArgs),

    /// Replace inactive reviewers on open pull requests
    Heal(HealArgs),

    /// Show workload and assignment statistics
    Stats(StatsArgs),

    /// Show current configuration
    Config,
}

fn init_tracing(config: &Config, verbose: bool) {
    let default_level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match config.logging.format {
        LogFormat::Full => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .with(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration with overrides
    let config = Config::load_with_overrides(cli.database.clone(), cli.timeout)?;
    init_tracing(&config, cli.verbose);

    if cli.verbose {
        tracing::info!(
            database = %config.database.path.display(),
            timeout = ?config.operation.timeout,
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("rota {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Team(args)) => {
            let app = App::open(&config, cli.json).await?;
            args.execute(&app).await?;
        }
        Some(Commands::User(args)) => {
            let app = App::open(&config, cli.json).await?;
            args.execute(&app).await?;
        }
        Some(Commands::Pr(args)) => {
            let app = App::open(&config, cli.json).await?;
            args.execute(&app).await?;
        }
        Some(Commands::Heal(args)) => {
            let app = App::open(&config, cli.json).await?;
            args.execute(&app).await?;
        }
        Some(Commands::Stats(args)) => {
            let app = App::open(&config, cli.json).await?;
            args.execute(&app).await?;
        }
        Some(Commands::Config) => {
            println!("Rota Configuration");
            println!("==================");
            println!();
            println!("Database:");
            println!("  path: {}", config.database.path.display());
            println!("  max_connections: {}", config.database.max_connections);
            println!("  busy_timeout: {:?}", config.database.busy_timeout);
            println!();
            println!("Assignment:");
            println!(
                "  reviewers_per_pull_request: {}",
                config.assignment.reviewers_per_pull_request
            );
            println!("  min_reviewers: {}", config.assignment.min_reviewers);
            println!();
            println!("Operation:");
            match config.operation.timeout {
                Some(t) => println!("  timeout: {:?}", t),
                None => println!("  timeout: (none)"),
            }
            println!();
            if let Some(path) = Config::default_config_path() {
                println!("Config file: {}", path.display());
                if path.exists() {
                    println!("  (exists)");
                } else {
                    println!("  (not found - using defaults)");
                }
            }
        }
        None => {
            println!("Rota - balanced reviewer assignment for pull requests");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

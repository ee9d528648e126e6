//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::Result;
use args::{Cli, Commands};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::{self, Overrides};

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let ctx = commands::Context {
        config_path: config::resolve_path(cli.config.as_deref())?,
        overrides: Overrides {
            server: cli.server,
            token: cli.token,
        },
        json: cli.json,
    };

    match cli.command {
        Commands::Sync(args) => commands::sync::execute(ctx, args).await,
        Commands::Status => commands::status::execute(ctx).await,
        Commands::List(args) => commands::list::execute(ctx, args).await,
        Commands::Release(args) => commands::release::execute(ctx, args).await,
        Commands::Config(args) => commands::config::execute(&ctx, args),
    }
}

/// Log to stderr; `RUST_LOG` overrides `level`.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

//! `banshare config` - agent configuration file management.

use anyhow::Result;
use colored::Colorize;

use super::Context;
use crate::cli::args::{ConfigArgs, ConfigCommands};
use crate::config;
use crate::output;

pub fn execute(ctx: &Context, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(ctx),
        ConfigCommands::Path => {
            println!("{}", ctx.config_path.display());
            Ok(())
        }
        ConfigCommands::Init { force } => {
            config::init(&ctx.config_path, force)?;
            println!(
                "{} wrote {}; set server_url and token before syncing.",
                "Success:".green().bold(),
                ctx.config_path.display()
            );
            Ok(())
        }
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    let mut agent_config = ctx.agent_config()?;
    agent_config.token = config::mask_token(&agent_config.token);

    if ctx.json {
        output::print_json(&agent_config)?;
    } else {
        println!("{} {}", "#".dimmed(), ctx.config_path.display().to_string().dimmed());
        print!("{}", toml::to_string_pretty(&agent_config)?);
    }
    Ok(())
}

//! `banshare release` - manually allow a blocked IP.

use anyhow::Result;
use colored::Colorize;

use super::Context;
use crate::cli::args::ReleaseArgs;
use crate::output;

pub async fn execute(ctx: Context, args: ReleaseArgs) -> Result<()> {
    let client = ctx.client()?;
    let response = client.release().allow(&args.ip.to_string()).await?;

    if ctx.json {
        output::print_json(&response)?;
    } else {
        println!("{} {}", "Released:".green().bold(), response.message);
    }
    Ok(())
}

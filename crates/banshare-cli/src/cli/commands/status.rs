//! `banshare status` - record counts per status.

use anyhow::Result;
use banshare_core::{PageRequest, StatusKind};
use colored::Colorize;
use std::collections::BTreeMap;

use super::Context;
use crate::output;

pub async fn execute(ctx: Context) -> Result<()> {
    let client = ctx.client()?;

    let mut counts = Vec::with_capacity(StatusKind::ALL.len());
    for status in StatusKind::ALL {
        let page = client.list().page(status, &PageRequest::first(1)).await?;
        counts.push((status, page.total));
    }

    if ctx.json {
        let by_name: BTreeMap<&str, u64> =
            counts.iter().map(|(status, n)| (status.as_str(), *n)).collect();
        output::print_json(&by_name)?;
    } else {
        println!("{} {}", "Registry:".bold(), client.base_url());
        print!("{}", output::render_counts(&counts));
    }
    Ok(())
}

//! `banshare sync` - run synchronization cycles.

use anyhow::Result;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use super::Context;
use crate::cli::args::SyncArgs;
use crate::output;

pub async fn execute(ctx: Context, args: SyncArgs) -> Result<()> {
    let config = ctx.agent_config()?;
    let agent = banshare_agent::from_config(&config)?;

    if args.watch {
        let interval = args
            .interval
            .map_or_else(|| config.sync_interval(), Duration::from_secs);
        info!(
            agent = %config.agent_name(),
            jail = %config.jail,
            interval_secs = interval.as_secs(),
            "starting sync loop"
        );
        agent.run_until(interval, shutdown_signal()).await;
        return Ok(());
    }

    let report = agent.run_cycle().await;
    if ctx.json {
        output::print_json(&report)?;
    } else {
        print!("{}", output::render_cycle(&report));
    }

    if !report.fetch_failures.is_empty() || !report.failed_items().is_empty() {
        anyhow::bail!(
            "cycle incomplete: {} fetch failure(s), {} failed item(s)",
            report.fetch_failures.len(),
            report.failed_items().len()
        );
    }
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

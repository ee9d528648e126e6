//! Text and JSON rendering for command results.

use anyhow::Result;
use banshare_agent::CycleReport;
use banshare_core::{RecordView, StatusKind};
use colored::Colorize;
use serde::Serialize;
use std::fmt::Write as _;

/// Print `value` as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One line per record: IP, status time, block count, reporter.
pub fn render_records(records: &[RecordView]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        format!("{:<40} {:<8} {:<25} {:>6}  {}", "IP", "STATUS", "SINCE/UNTIL", "BLOCKS", "REPORTED BY")
            .bold()
    );
    for record in records {
        let when = record
            .blocked_until
            .or(record.allowed_since)
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string());
        let _ = writeln!(
            out,
            "{:<40} {:<8} {:<25} {:>6}  {}",
            record.ip,
            record.status.as_str(),
            when,
            record.block_count,
            record.reported_by
        );
    }
    out
}

/// Status counts, in lifecycle order.
pub fn render_counts(counts: &[(StatusKind, u64)]) -> String {
    let mut out = String::new();
    for (status, count) in counts {
        let label = format!("{:<10}", status.as_str());
        let label = match status {
            StatusKind::Blocked => label.red(),
            StatusKind::Allowed => label.green(),
            StatusKind::Known => label.dimmed(),
        };
        let _ = writeln!(out, "  {label} {count}");
    }
    out
}

/// Human summary of one cycle.
pub fn render_cycle(report: &CycleReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "local {}  registry blocked {}  registry allowed {}",
        report.local_banned, report.remote_blocked, report.remote_allowed
    );
    let _ = writeln!(out, "unbanned {}  banned {}", report.unbanned.len(), report.banned.len());
    if let Some(pushed) = &report.pushed {
        let _ = writeln!(
            out,
            "pushed {} in {} chunk(s), {} failed",
            pushed.accepted, pushed.chunks_sent, pushed.chunks_failed
        );
    }
    if !report.skipped_allowed.is_empty() {
        let _ = writeln!(out, "skipped {} allowed IP(s)", report.skipped_allowed.len());
    }
    for key in &report.stale {
        let _ = writeln!(out, "{} {key} served from an expired cache entry", "stale:".yellow());
    }
    for failure in &report.fetch_failures {
        let _ = writeln!(
            out,
            "{} {} ({}): {}",
            "error:".red().bold(),
            failure.key,
            failure.class,
            failure.error
        );
    }
    for (ip, reason) in report.unban_failures.iter().chain(&report.ban_failures) {
        let _ = writeln!(out, "{} {ip}: {reason}", "failed:".red());
    }
    if let Some(pushed) = report.pushed.as_ref().filter(|p| !p.failed_items.is_empty()) {
        let _ = writeln!(
            out,
            "{} {} IP(s) not pushed",
            "failed:".red(),
            pushed.failed_items.len()
        );
        for (chunk, reason) in &pushed.errors {
            let _ = writeln!(out, "  chunk {chunk}: {reason}");
        }
    }
    out
}

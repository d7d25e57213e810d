//! Terminal summaries for CLI commands.

use std::path::Path;

use console::style;

use crate::{
    ActivateReport, InstallReport, Namespace, Request, Response, Source, StatsSnapshot,
    format_bytes, format_duration, format_percent,
};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// One line of `status` output.
pub struct StatusRow {
    pub namespace: Namespace,
    pub entries: usize,
    pub current: bool,
}

/// Prints the outcome of an install phase.
pub fn print_install(report: &InstallReport) {
    println!(
        "{} Installed {}: {} entries, {} in {}",
        style("✓").green(),
        style(&report.namespace).bold(),
        report.entries,
        format_bytes(report.bytes),
        format_duration(report.elapsed),
    );
}

/// Prints the outcome of an activate phase.
pub fn print_activate(report: &ActivateReport) {
    println!(
        "{} Activated {}",
        style("✓").green(),
        style(&report.namespace).bold()
    );
    for ns in &report.deleted {
        println!("  removed {ns}");
    }
    for (ns, reason) in &report.failed {
        println!("  {} could not remove {ns}: {reason}", style("!").yellow());
    }
}

/// Prints a one-line description of an intercepted request.
pub fn print_fetch(request: &Request, response: &Response, source: Source, stored: bool) {
    let origin = match source {
        Source::Cache => style("cache").green(),
        Source::Network => style("network").cyan(),
    };
    let note = if stored { " (stored)" } else { "" };
    println!(
        "{} {} -> {} from {origin}, {}{note}",
        request.method,
        request.url,
        response.status,
        format_bytes(response.body.len() as u64),
    );
}

/// Prints traffic served by a gateway, e.g. when the proxy shuts down.
#[cfg_attr(not(feature = "server"), allow(dead_code))]
pub fn print_traffic(namespace: &Namespace, stats: &StatsSnapshot) {
    println!("{SEPARATOR}");
    println!(
        "{} served {} hits, {} misses ({} hit ratio)",
        style(namespace).bold(),
        stats.hits,
        stats.misses,
        format_percent(stats.hit_ratio()),
    );
    println!(
        "  {} from cache, {} from network, {} stored, {} store failures, {} network errors",
        format_bytes(stats.bytes_from_cache),
        format_bytes(stats.bytes_from_network),
        stats.stored,
        stats.store_failures,
        stats.network_errors,
    );
    println!("{SEPARATOR}");
}

/// Prints the namespaces present under `root`.
pub fn print_status(root: &Path, current: &Namespace, rows: &[StatusRow]) {
    println!("{SEPARATOR}");
    println!("Cache root: {}", root.display());
    println!("Configured version: {current}");
    println!("{SEPARATOR}");

    if rows.is_empty() {
        println!("  (no namespaces)");
    }
    for row in rows {
        let marker = if row.current {
            style("*").green().to_string()
        } else {
            " ".to_string()
        };
        println!("{marker} {} ({} entries)", row.namespace, row.entries);
    }

    println!("{SEPARATOR}");
    let stale = rows.iter().filter(|r| !r.current).count();
    if stale > 0 {
        println!("  {stale} stale namespace(s); run `shorecache activate` to remove");
    }
}

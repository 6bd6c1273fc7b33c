//! Plain text output formatting.
//!
//! Produces human-readable output with colors and formatting.

use crate::sweep::{Reachability, SweepReport};
use console::{style, Style};
use std::io::{self, Write};

const RULE: &str = "═══════════════════════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────────";

/// Print a report in human-readable plain text format.
pub fn print_plain(report: &SweepReport) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out)?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(
        out,
        "                    {} Sweep Results",
        style("Pingboard").cyan().bold()
    )?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out)?;

    writeln!(
        out,
        "  {} {}",
        style("Started:").bold(),
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(
        out,
        "  {} {} addresses probed in {:.2}s",
        style("Statistics:").bold(),
        report.probed,
        report.duration_ms as f64 / 1000.0
    )?;
    writeln!(
        out,
        "               {} reachable, {} unreachable",
        style(report.reachable).green().bold(),
        style(report.unreachable).red()
    )?;
    writeln!(out)?;

    if report.results.is_empty() {
        writeln!(out, "  {}", style("No addresses to display.").dim())?;
    } else {
        writeln!(out, "  {}", style(THIN_RULE).dim())?;
        writeln!(
            out,
            "  {:<39}  {:^12}  {:>10}  {}",
            style("ADDRESS").bold(),
            style("STATE").bold(),
            style("RTT").bold(),
            style("TARGET").bold()
        )?;
        writeln!(out, "  {}", style(THIN_RULE).dim())?;

        for entry in &report.results {
            let status_style = match entry.status {
                Reachability::Reachable => Style::new().green().bold(),
                Reachability::Unreachable => Style::new().red(),
            };

            let rtt = entry
                .rtt_micros
                .map(format_rtt)
                .or_else(|| entry.error.clone())
                .unwrap_or_default();

            writeln!(
                out,
                "  {:<39}  {:^12}  {:>10}  {}",
                entry.address,
                status_style.apply_to(entry.status.to_string()),
                rtt,
                style(truncate_string(&entry.target, 30)).dim()
            )?;
        }

        writeln!(out, "  {}", style(THIN_RULE).dim())?;
    }

    writeln!(out)?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out)?;

    Ok(())
}

/// Print a sweep header before probing begins.
pub fn print_sweep_header(targets: usize, timeout_ms: u64) {
    println!();
    println!(
        "{} {} v{}",
        style("Starting").cyan(),
        style("Pingboard").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!(
        "{} Timeout: {}",
        style("•").dim(),
        style(format!("{}ms", timeout_ms)).yellow()
    );
    println!(
        "{} Probing {} addresses...",
        style("•").dim(),
        style(targets).white().bold()
    );
    println!();
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), msg);
}

/// Print a warning message.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", style("Warning:").yellow().bold(), msg);
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an info message.
pub fn print_info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Render microseconds as milliseconds with three decimals.
fn format_rtt(micros: i64) -> String {
    format!("{:.3}ms", micros as f64 / 1000.0)
}

/// Truncate a string to a maximum length, adding ellipsis if truncated.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

//! JSON output formatting.

use crate::sweep::SweepReport;
use std::io;

/// Print a report in JSON format.
pub fn print_json(report: &SweepReport) -> io::Result<()> {
    let json = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
    println!("{}", json);
    Ok(())
}

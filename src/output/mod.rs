//! Output formatting module.
//!
//! Provides formatters for plain text, JSON, and CSV output of sweep reports.

mod csv_format;
mod json_format;
mod plain;

pub use csv_format::{print_csv, write_csv};
pub use json_format::print_json;
pub use plain::{
    print_error, print_info, print_plain, print_sweep_header, print_success, print_warning,
};

use crate::cli::OutputFormat;
use crate::sweep::SweepReport;
use std::io;

/// Format and print a sweep report according to the specified format.
pub fn print_report(report: &SweepReport, format: OutputFormat) -> io::Result<()> {
    match format {
        OutputFormat::Plain => plain::print_plain(report),
        OutputFormat::Json => json_format::print_json(report),
        OutputFormat::Csv => csv_format::print_csv(report),
    }
}

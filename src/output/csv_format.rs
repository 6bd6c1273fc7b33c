//! CSV output formatting.

use crate::sweep::SweepReport;
use std::io::{self, Write};

/// Print a report in CSV format.
pub fn print_csv(report: &SweepReport) -> io::Result<()> {
    write_csv(report, io::stdout().lock())
}

/// Write one row per address to `out`.
pub fn write_csv<W: Write>(report: &SweepReport, out: W) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    wtr.write_record(["target", "address", "status", "rtt_us", "error"])?;

    for entry in &report.results {
        wtr.write_record([
            entry.target.as_str(),
            &entry.address.to_string(),
            &entry.status.to_string(),
            &entry.rtt_micros.map_or(String::new(), |rtt| rtt.to_string()),
            entry.error.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::{Reachability, SweepEntry};
    use chrono::Utc;

    #[test]
    fn test_csv_rows() {
        let report = SweepReport {
            started_at: Utc::now(),
            duration_ms: 12,
            probed: 2,
            reachable: 1,
            unreachable: 1,
            results: vec![
                SweepEntry {
                    target: "a.example".to_string(),
                    address: "10.0.0.2".parse().unwrap(),
                    status: Reachability::Reachable,
                    rtt_micros: Some(420),
                    error: None,
                },
                SweepEntry {
                    target: "10.0.0.3".to_string(),
                    address: "10.0.0.3".parse().unwrap(),
                    status: Reachability::Unreachable,
                    rtt_micros: None,
                    error: Some("no response".to_string()),
                },
            ],
        };

        let mut buf = Vec::new();
        write_csv(&report, &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "target,address,status,rtt_us,error\n\
             a.example,10.0.0.2,reachable,420,\n\
             10.0.0.3,10.0.0.3,unreachable,,no response\n"
        );
    }
}

//! Probe subcommand implementation.
//!
//! Handles `pingboard probe <target>...`: a one-shot sweep through the probe
//! engine.

use crate::cli::OutputFormat;
use crate::config::AppSettings;
use crate::error::{CliError, CliResult};
use crate::output;
use crate::ping::{ErrorHandler, PingEngine, Prober};
use crate::scan::{DnsResolver, NameResolver};
use crate::sweep::{self, SweepConfig};
use crate::types::{ProbeTarget, TargetSpec};
use clap::Parser;
use std::sync::Arc;
use tracing::{debug, warn};

/// Probe targets once and print a reachability report.
#[derive(Parser, Debug)]
pub struct ProbeCommand {
    /// Targets to probe (IP, hostname, or CIDR notation)
    ///
    /// Examples:
    ///   192.168.1.1        Single IP address
    ///   example.com        Hostname (every address is probed)
    ///   192.168.1.0/24     CIDR range
    #[arg(value_name = "TARGET", required = true, num_args = 1..)]
    pub targets: Vec<String>,

    /// Probe timeout in milliseconds
    #[arg(short = 't', long, env = "PINGBOARD_TIMEOUT_MS")]
    pub timeout: Option<u64>,

    /// Maximum number of probes in flight
    #[arg(short = 'c', long, default_value = "256")]
    pub concurrency: usize,

    /// Rate limit in probes per second (0 = unlimited)
    #[arg(short = 'r', long = "rate", default_value = "0")]
    pub rate_limit: u32,

    /// Output format for results
    #[arg(short, long, value_enum, default_value = "plain")]
    pub output: OutputFormat,

    /// List unreachable addresses too
    #[arg(long)]
    pub show_unreachable: bool,
}

impl ProbeCommand {
    /// Execute the probe command.
    pub async fn execute(&self, mut settings: AppSettings, verbose: bool, quiet: bool) -> CliResult<()> {
        if let Some(timeout) = self.timeout {
            settings.timeout_ms = timeout;
        }
        settings.validate()?;

        let resolver = DnsResolver::from_system();
        let targets = expand_targets(&self.targets, &resolver).await?;
        if targets.is_empty() {
            return Err(CliError::Other("No valid targets resolved".to_string()));
        }

        if !super::is_root() {
            output::print_warning("raw ICMP sockets usually require root/sudo privileges.");
        }

        let handler: ErrorHandler = Box::new(|e| warn!("probe engine: {}", e));
        let (engine, bound) = PingEngine::start(settings.engine_config(), Some(handler))?;
        debug!("listening on {} addresses", bound.len());
        let engine = Arc::new(engine);

        let distinct = sweep::distinct_targets(targets);
        if !quiet && self.output == OutputFormat::Plain {
            output::print_sweep_header(distinct.len(), settings.timeout_ms);
        }

        let config = SweepConfig {
            concurrency: self.concurrency,
            rate_limit: self.rate_limit,
            show_unreachable: self.show_unreachable,
            verbose,
        };
        let report = sweep::run_sweep(
            Arc::clone(&engine) as Arc<dyn Prober>,
            distinct,
            &config,
        )
        .await;
        engine.shutdown().await;

        output::print_report(&report, self.output)?;
        Ok(())
    }
}

/// Parse and expand every target argument, in order.
///
/// A hostname that fails to resolve is reported and skipped; a malformed
/// argument is an error.
async fn expand_targets<R>(args: &[String], resolver: &R) -> CliResult<Vec<ProbeTarget>>
where
    R: NameResolver + ?Sized,
{
    let mut targets = Vec::new();
    for arg in args {
        let spec = TargetSpec::parse(arg)?;
        match spec.resolve(resolver).await {
            Ok(expanded) => targets.extend(expanded),
            Err(e) => output::print_warning(&format!("skipping {}: {}", arg, e)),
        }
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::StaticResolver;
    use std::net::IpAddr;

    #[tokio::test]
    async fn test_expand_targets_mixes_kinds() {
        let resolver = StaticResolver::default()
            .with_host("two.example", vec!["192.0.2.1".parse().unwrap(), "192.0.2.2".parse().unwrap()]);
        let args = vec![
            "10.0.0.0/30".to_string(),
            "two.example".to_string(),
            "::1".to_string(),
            "gone.example".to_string(),
        ];

        let targets = expand_targets(&args, &resolver).await.unwrap();
        let ips: Vec<IpAddr> = targets.iter().map(|t| t.ip).collect();
        assert_eq!(
            ips,
            vec![
                "10.0.0.1".parse::<IpAddr>().unwrap(),
                "10.0.0.2".parse().unwrap(),
                "192.0.2.1".parse().unwrap(),
                "192.0.2.2".parse().unwrap(),
                "::1".parse().unwrap(),
            ]
        );
        assert_eq!(targets[2].original, "two.example");
    }

    #[tokio::test]
    async fn test_expand_targets_rejects_malformed() {
        let resolver = StaticResolver::default();
        let args = vec!["not a target!".to_string()];
        assert!(matches!(
            expand_targets(&args, &resolver).await,
            Err(CliError::Target(_))
        ));
    }
}

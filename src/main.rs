use anyhow::{Context, Result};
use clap::Parser;
use pingboard::cli::{Cli, Commands};
use pingboard::config::AppSettings;
use pingboard::output;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise the level follows `--verbose` / `--quiet`.
fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => AppSettings::load_from(path)
            .with_context(|| format!("could not load settings from {}", path.display()))?,
        None => AppSettings::load().context("could not load settings")?,
    };

    match &cli.command {
        Commands::Serve(cmd) => cmd
            .execute(settings, cli.quiet)
            .await
            .context("serve failed")?,
        Commands::Probe(cmd) => cmd
            .execute(settings, cli.verbose, cli.quiet)
            .await
            .context("probe failed")?,
    }

    Ok(())
}

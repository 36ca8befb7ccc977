use analytics_scanner::{
    AnalyticsClient, MetadataProvider, Orchestrator, ScanEnv, ScanType, ScannerConfig,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Registers mounted container images with the analytics server.
#[derive(Parser, Debug)]
#[command(name = "scanner-analytics-integration")]
#[command(version, about, long_about = None)]
struct Cli {
    /// register | scan (anything else is treated as register)
    #[arg(default_value = "register")]
    scan_type: String,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let scan_type = ScanType::from_arg(&cli.scan_type);
    let config = ScannerConfig::from_env();
    let env = ScanEnv::from_env();
    tracing::debug!(?config, ?env, %scan_type, "starting");

    let provider = MetadataProvider::from_config(&config);
    let client = AnalyticsClient::new().context("build HTTP client")?;

    let summary = Orchestrator::new(&config, env, &provider, &client)
        .run(scan_type)
        .context("scan run aborted")?;

    tracing::info!(
        total = summary.total(),
        succeeded = summary.succeeded,
        failed = summary.failed,
        unpersisted = summary.unpersisted,
        "all targets processed"
    );
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

mod collectors;
mod config;
mod monitor;
mod parse;
mod report;
mod runner;
mod session;

use clap::Parser;
use config::Config;
use monitor::{collect_all, Collection};
use report::{append_log_records, render_summary, HostReport};
use session::ssh::SshConnector;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::SystemTime;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Some host could not be connected; its report carries the reason.
const EXIT_HOST_UNREACHABLE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "remmon")]
#[command(version, about = "Collects cron and resource statistics from remote hosts over SSH")]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    #[arg(long, conflicts_with = "stats_only")]
    cron_only: bool,
    #[arg(long, conflicts_with = "cron_only")]
    stats_only: bool,
    /// Print reports as JSON instead of the text summary.
    #[arg(long)]
    json: bool,
    /// Overrides `log_file` from the config.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return ExitCode::SUCCESS;
    }

    let mut cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    apply_overrides(&cli, &mut cfg);
    if let Err(err) = cfg.validate() {
        error!(error = %err, "invalid configuration");
        return ExitCode::FAILURE;
    }

    let targets = cfg.targets(|name| std::env::var(name).ok());
    let collection = Collection::from_config(&cfg);
    let log_path = cli
        .log_file
        .unwrap_or_else(|| PathBuf::from(&cfg.log_file));

    info!(
        hosts = targets.len(),
        max_concurrent_hosts = cfg.max_concurrent_hosts,
        cron = collection.cron.is_some(),
        stats = collection.stats.is_some(),
        "starting collection"
    );

    let connector = SshConnector::new(cfg.connect_timeout()).await;
    let reports = collect_all(&connector, &targets, &collection, cfg.max_concurrent_hosts).await;

    if let Err(code) = print_reports(&reports, cli.json) {
        return code;
    }

    if let Err(err) = append_log_records(&log_path, &reports, SystemTime::now()) {
        warn!(error = %err, path = %log_path.display(), "failed to append run log");
    }

    let unreachable = reports.iter().filter(|r| !r.is_connected()).count();
    info!(hosts = reports.len(), unreachable, "collection finished");
    if unreachable > 0 {
        ExitCode::from(EXIT_HOST_UNREACHABLE)
    } else {
        ExitCode::SUCCESS
    }
}

fn apply_overrides(cli: &Cli, cfg: &mut Config) {
    if cli.cron_only {
        cfg.cron.enabled = true;
        cfg.stats.enabled = false;
    } else if cli.stats_only {
        cfg.cron.enabled = false;
        cfg.stats.enabled = true;
    }
}

fn print_reports(reports: &[HostReport], json: bool) -> Result<(), ExitCode> {
    if json {
        match serde_json::to_string_pretty(reports) {
            Ok(text) => println!("{text}"),
            Err(err) => {
                error!(error = %err, "failed to serialize reports");
                return Err(ExitCode::FAILURE);
            }
        }
        return Ok(());
    }

    for report in reports {
        println!("{}", render_summary(report));
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

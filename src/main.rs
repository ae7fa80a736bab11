/*!
 * Ballast CLI - Command Line Interface
 */

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use ballast::{
    audit::AuditLog,
    config::{BallastConfig, LogLevel},
    cycle::{Cycle, Upstream},
    error::{BallastError, EXIT_FATAL, EXIT_PARTIAL, EXIT_SUCCESS},
    logging,
    stats::CycleReport,
};
use ballast_core_catalog::open_store;
use ballast_core_ingest::JsonDirClient;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser)]
#[command(name = "ballast")]
#[command(version, about = "Popularity-driven dataset replica placement", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short = 'c', long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides the configuration file)
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Upstream data directory (overrides paths.data_root)
    #[arg(long, value_name = "DIR", global = true)]
    data_root: Option<PathBuf>,

    /// Catalog database (overrides paths.store_path)
    #[arg(long, value_name = "PATH", global = true)]
    store: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest, rank, balance and submit
    Cycle(RunArgs),
    /// Refresh sites, datasets and popularity only
    Ingest(RunArgs),
    /// Score datasets and sites and print the targets
    Rank(RunArgs),
    /// Rank, balance and submit against the current catalog
    Balance(RunArgs),
}

impl Commands {
    fn args(&self) -> &RunArgs {
        match self {
            Commands::Cycle(a) | Commands::Ingest(a) | Commands::Rank(a) | Commands::Balance(a) => a,
        }
    }
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Run date, YYYY-MM-DD (defaults to today, UTC)
    #[arg(long, value_name = "DATE")]
    date: Option<NaiveDate>,

    /// Compute and audit actions without submitting them
    #[arg(long)]
    dry_run: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<BallastError>()
                .map(BallastError::exit_code)
                .unwrap_or(EXIT_FATAL)
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BallastConfig::from_file(path)?,
        None => BallastConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level.into();
    }
    if let Some(root) = cli.data_root.clone() {
        config.paths.data_root = root;
    }
    if let Some(store) = cli.store.clone() {
        config.paths.store_path = store;
    }
    let args = cli.command.args().clone();
    if args.dry_run {
        config.dry_run = true;
    }
    config.validate()?;

    if let Err(e) = logging::init_logging(&config.logging) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let config = Arc::new(config);
    let date = args.date.unwrap_or_else(|| Utc::now().date_naive());

    let store = open_store(&config.paths.store_path)
        .await
        .map_err(BallastError::from)
        .with_context(|| format!("opening catalog {}", config.paths.store_path))?;
    let client = JsonDirClient::open(&config.paths.data_root)
        .await
        .map_err(|e| BallastError::Connectivity {
            service: format!("data directory {}", config.paths.data_root.display()),
            reason: e.to_string(),
        })?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling the cycle");
                cancel.cancel();
            }
        }
    });

    let mut cycle = Cycle::new(config.clone(), store, Upstream::from_client(Arc::new(client)))
        .with_cancel_token(cancel);
    if let Some(path) = &config.paths.audit_log {
        cycle = cycle.with_audit_log(AuditLog::open(path)?);
    }

    match cli.command {
        Commands::Cycle(_) => {
            cycle.probe().await?;
            let report = cycle.run(date).await?;
            print_report(&report);
            Ok(report.exit_code())
        }
        Commands::Ingest(_) => {
            cycle.probe().await?;
            let summary = cycle.ingest(date).await?;
            println!(
                "{} sites, {} datasets created, {} updated, {} removed, {} popularity records, {} failed items",
                summary.sites.listed,
                summary.datasets.created,
                summary.datasets.updated,
                summary.datasets.removed.len(),
                summary.popularity.records,
                summary.failed(),
            );
            Ok(if summary.failed() == 0 {
                EXIT_SUCCESS
            } else {
                EXIT_PARTIAL
            })
        }
        Commands::Rank(_) => {
            let (scores, site_ranks) = cycle.rank(date).await?;
            println!("Dataset targets for {} ({}):", date, config.ranking.strategy);
            for (name, target) in &scores.targets {
                let popularity = scores.popularity.get(name).copied().unwrap_or(0.0);
                println!("  {:>2}  {:>10.4}  {}", target, popularity, name);
            }
            println!("Site ranks:");
            for (name, rank) in &site_ranks {
                println!("  {:>12.6}  {}", rank, name);
            }
            Ok(EXIT_SUCCESS)
        }
        Commands::Balance(_) => {
            let report = cycle.rebalance(date).await?;
            print_report(&report);
            Ok(report.exit_code())
        }
    }
}

fn print_report(report: &CycleReport) {
    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!("Cycle {} [{}]{}", report.date, report.strategy, mode);
    for action in report.subscriptions.iter().chain(report.deletions.iter()) {
        println!("  {}", action);
    }
    println!("{}", report.stats.summary());
    for entry in &report.dead_letters {
        println!(
            "  failed [{}] {}: {}",
            entry.stage, entry.item_key, entry.last_error
        );
    }
}

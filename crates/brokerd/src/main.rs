//! brokerd — the broker daemon binary.
//!
//! # Usage
//!
//! ```text
//! brokerd --config /etc/broker/broker.toml run
//! brokerd --data-dir /var/lib/broker jobs --state in-progress --instance i1
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use broker_core::{BrokerConfig, State};
use broker_jobs::LoggingTracker;
use brokerd::{Daemon, apply_overrides, jobs, logging, open_dao};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "brokerd", about = "Service broker job tracking daemon")]
struct Cli {
    /// Path to broker.toml. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the state store file.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Namespace all broker objects live in.
    #[arg(long, global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon until Ctrl-C.
    Run,
    /// Print job states from the recovery index as JSON lines.
    Jobs {
        /// Lifecycle state, e.g. `in-progress` or `failed`.
        #[arg(long)]
        state: State,

        /// Only jobs owned by this service instance.
        #[arg(long)]
        instance: Option<String>,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BrokerConfig::from_file(path)?,
        None => BrokerConfig::default(),
    };
    apply_overrides(&mut config, cli.data_dir.as_deref(), cli.namespace.as_deref());

    logging::init(&config.log)?;

    match cli.command {
        Command::Run => run(config).await,
        Command::Jobs { state, instance } => list_jobs(&config, state, instance.as_deref()),
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run(config: BrokerConfig) -> anyhow::Result<()> {
    info!("broker daemon starting");

    let (daemon, report) = Daemon::start(&config, Arc::new(LoggingTracker))?;
    info!(
        in_progress = report.in_progress.len(),
        not_yet_started = report.not_yet_started.len(),
        "startup recovery complete"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    daemon.shutdown().await;
    Ok(())
}

fn list_jobs(config: &BrokerConfig, state: State, instance: Option<&str>) -> anyhow::Result<()> {
    let dao = open_dao(config)?;
    let found = jobs::query(&dao, state, instance)?;
    if !found.errors.is_empty() {
        warn!(errors = %found.errors, "some job states could not be read");
    }

    let mut items = found.items;
    let stdout = std::io::stdout();
    jobs::write_json_lines(&mut stdout.lock(), &mut items)?;
    Ok(())
}

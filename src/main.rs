//! Crawl-Fleet main entry point
//!
//! One binary, three modes: `supervise` runs the pool, `worker` is what the
//! supervisor re-executes for each worker process, and `check-connection`
//! probes the queue API.

use anyhow::Context;
use clap::{Parser, Subcommand};
use crawl_fleet::config::{
    load_config_with_hash, validate_queue_connection, validate_supervisor, validate_worker, Config,
};
use crawl_fleet::crawler::{CrawlWorkerLoop, FetchChain, WorkerOptions};
use crawl_fleet::queue::RemoteQueueClient;
use crawl_fleet::supervisor::{
    ProcProbe, ProcessLauncher, ResourceMonitor, SupervisorOptions, WorkerSupervisor,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;

/// Crawl-Fleet: a resource-aware pool of crawl workers
///
/// Workers lease URLs from a remote job queue, fetch them through an
/// escalating chain of strategies, and report content and discovered links
/// back. The supervisor sizes the pool against memory and temperature.
#[derive(Parser, Debug)]
#[command(name = "crawl-fleet")]
#[command(version)]
#[command(about = "A resource-aware pool of crawl workers", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the worker pool
    Supervise {
        /// Target number of worker processes
        #[arg(short = 'w', long)]
        workers: Option<usize>,

        /// Memory ceiling, percent of host memory
        #[arg(long, value_name = "PERCENT")]
        max_memory: Option<f64>,

        /// Temperature ceiling in °C
        #[arg(long, value_name = "CELSIUS")]
        max_temp: Option<f64>,

        /// Crawl session to lease under
        #[arg(short, long)]
        session: Option<String>,

        /// Restrict leases to one institution
        #[arg(long)]
        institution_id: Option<String>,

        /// Print the effective configuration and exit
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a single crawl worker (started by `supervise`)
    Worker {
        #[arg(long)]
        worker_id: String,

        #[arg(long)]
        session: String,

        #[arg(long)]
        institution_id: Option<String>,
    },

    /// Check that the queue API is reachable with the configured credentials
    CheckConnection,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let worker_id = match &cli.command {
        Command::Worker { worker_id, .. } => Some(worker_id.clone()),
        _ => None,
    };

    // Worker output is re-logged by the supervisor, so no colours there
    setup_logging(cli.verbose, cli.quiet, worker_id.is_none());

    let result = match worker_id {
        Some(id) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build runtime")
            .and_then(|rt| {
                let span = tracing::info_span!("worker", id = %id);
                rt.block_on(run(cli).instrument(span))
            }),
        None => tokio::runtime::Runtime::new()
            .context("Failed to build runtime")
            .and_then(|rt| rt.block_on(run(cli))),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool, ansi: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawl_fleet=info,warn"),
            1 => EnvFilter::new("crawl_fleet=debug,info"),
            2 => EnvFilter::new("crawl_fleet=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_ansi(ansi)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load(cli.config.as_deref())?;

    match cli.command {
        Command::Supervise {
            workers,
            max_memory,
            max_temp,
            session,
            institution_id,
            dry_run,
        } => {
            let mut config = config;
            if let Some(workers) = workers {
                config.supervisor.num_workers = workers;
            }
            if let Some(max_memory) = max_memory {
                config.supervisor.max_memory_percent = max_memory;
            }
            if let Some(max_temp) = max_temp {
                config.supervisor.max_temp = max_temp;
            }
            override_session(&mut config, session, institution_id);

            validate_supervisor(&config).context("Invalid configuration")?;

            if dry_run {
                print_dry_run(&config);
                return Ok(ExitCode::SUCCESS);
            }

            handle_supervise(config, cli.config).await
        }
        Command::Worker {
            worker_id,
            session,
            institution_id,
        } => {
            let mut config = config;
            override_session(&mut config, Some(session), institution_id);
            validate_worker(&config).context("Invalid configuration")?;
            handle_worker(config, worker_id).await
        }
        Command::CheckConnection => {
            validate_queue_connection(&config.queue).context("Invalid configuration")?;
            handle_check_connection(&config).await
        }
    }
}

fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = path {
        tracing::info!("Loading configuration from: {}", path.display());
    }

    let (config, hash) = load_config_with_hash(path).context("Failed to load configuration")?;
    match hash {
        Some(hash) => tracing::info!("Configuration loaded (hash: {})", hash),
        None => tracing::info!("No configuration file, using defaults and environment"),
    }

    Ok(config)
}

fn override_session(config: &mut Config, session: Option<String>, institution_id: Option<String>) {
    if session.is_some() {
        config.queue.session = session;
    }
    if institution_id.is_some() {
        config.queue.institution_id = institution_id;
    }
}

/// Sends `true` on the stop channel at the first SIGTERM or ctrl-c
fn spawn_stop_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("Stop signal received");
        let _ = tx.send(true);
    });

    rx
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Handles `supervise`: runs the pool until stopped
async fn handle_supervise(config: Config, config_path: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let session = config
        .queue
        .session
        .clone()
        .context("No crawl session configured")?;

    let options =
        SupervisorOptions::from_config(&config.supervisor, session, config.queue.institution_id.clone());
    let launcher =
        ProcessLauncher::current_exe(config_path).context("Cannot locate own executable")?;
    let monitor = ResourceMonitor::new(
        Box::new(ProcProbe::new()),
        config.supervisor.max_memory_percent,
        config.supervisor.max_temp,
    );

    tracing::info!(
        "Max workers: {}, memory ceiling: {}%, temperature ceiling: {}°C, policy: {:?}",
        config.supervisor.num_workers,
        config.supervisor.max_memory_percent,
        config.supervisor.max_temp,
        config.supervisor.pressure_policy
    );

    let mut supervisor = WorkerSupervisor::new(Box::new(launcher), monitor, options);
    supervisor.run(spawn_stop_listener()).await;

    Ok(ExitCode::SUCCESS)
}

/// Handles `worker`: runs the crawl loop in this process
async fn handle_worker(config: Config, worker_id: String) -> anyhow::Result<ExitCode> {
    let session = config
        .queue
        .session
        .clone()
        .context("No crawl session configured")?;

    let queue = Arc::new(RemoteQueueClient::new(&config.queue).context("Failed to build queue client")?);
    let chain = FetchChain::from_config(&config.fetch).context("Failed to build fetch chain")?;
    let options = WorkerOptions::from_config(
        worker_id,
        session,
        config.queue.institution_id.clone(),
        &config.worker,
    );

    let (exit, _stats) = CrawlWorkerLoop::new(queue, chain, options)
        .run(spawn_stop_listener())
        .await;

    // Exit codes are small non-negative constants
    Ok(ExitCode::from(exit.exit_code() as u8))
}

/// Handles `check-connection`
async fn handle_check_connection(config: &Config) -> anyhow::Result<ExitCode> {
    let client = RemoteQueueClient::new(&config.queue).context("Failed to build queue client")?;

    match client.check_connection().await {
        Ok(status) => {
            println!("✓ Queue API reachable at {} (HTTP {})", config.queue.base_url, status.as_u16());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("✗ Queue API check failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Handles `supervise --dry-run`
fn print_dry_run(config: &Config) {
    println!("=== Crawl-Fleet Dry Run ===\n");

    println!("Supervisor:");
    println!("  Workers: {}", config.supervisor.num_workers);
    println!("  Memory ceiling: {}%", config.supervisor.max_memory_percent);
    println!("  Temperature ceiling: {}°C", config.supervisor.max_temp);
    println!("  Tick interval: {}s", config.supervisor.tick_interval_secs);
    println!("  Restart interval: {}s", config.supervisor.restart_interval_secs);
    println!("  Pressure policy: {:?}", config.supervisor.pressure_policy);

    println!("\nQueue:");
    println!("  Base URL: {}", config.queue.base_url);
    println!("  Session: {}", config.queue.session.as_deref().unwrap_or("-"));
    println!(
        "  Institution: {}",
        config.queue.institution_id.as_deref().unwrap_or("any")
    );
    println!("  Lease attempts: {}", config.queue.lease_max_attempts);

    println!("\nWorker:");
    println!("  Idle interval: {}s", config.worker.idle_interval_secs);
    println!("  Task pause: {}ms", config.worker.task_pause_ms);

    println!("\nFetch tiers:");
    println!("  lightweight (timeout {}s)", config.fetch.lightweight_timeout_secs);
    println!("  asynchronous (timeout {}s)", config.fetch.async_timeout_secs);
    if config.fetch.browser_enabled {
        println!("  browser via {}", config.fetch.webdriver_url);
    } else {
        println!("  browser disabled");
    }

    println!("\n✓ Configuration is valid");
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use snapward_core::config::{
    default_config_path, expand_home, LoggingConfig, DEFAULT_CONFIG_TEMPLATE,
};
use snapward_core::SnapwardConfig;
use snapward_scheduler::SchedulerEngine;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;

#[derive(Parser)]
#[command(name = "snapward", version, about = "Scheduled RDS and Aurora snapshot rotation")]
struct Cli {
    /// Config file (TOML, or YAML by extension)
    #[arg(short, long, global = true, env = "SNAPWARD_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until interrupted
    Run,
    /// Snapshot and prune targets once, then exit
    Once {
        /// Limit the run to these target identifiers
        #[arg(short, long)]
        target: Vec<String>,
    },
    /// List configured jobs and their next run
    Jobs,
    /// Show recent job runs from the run log
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = expand_home(&cli.config.unwrap_or_else(default_config_path));

    if let Commands::Init { force } = cli.command {
        let _log_guard = init_tracing(&LoggingConfig::default())?;
        return write_default_config(&config_path, force);
    }

    let config = SnapwardConfig::load(Some(config_path.as_str()))
        .with_context(|| format!("loading config from {config_path}"))?;
    let _log_guard = init_tracing(&config.logging)?;
    info!(path = %config_path, targets = config.targets.len(), jobs = config.jobs.len(), "configuration loaded");
    let config = Arc::new(config);

    match cli.command {
        Commands::Run => run_scheduler(config).await,
        Commands::Once { target } => run_once(&config, &target).await,
        Commands::Jobs => list_jobs(config).await,
        Commands::History { limit } => show_history(&config, limit).await,
        Commands::Init { .. } => Ok(()),
    }
}

/// Stderr plus an optional plain-text log file. Keep the guard alive until exit.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let level = &logging.level;
    let fallback = ["snapward", "snapward_core", "snapward_scheduler", "snapward_snapshot"]
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let (file_layer, guard) = match logging.file.as_deref() {
        Some(path) => {
            let (dir, name) = app::split_log_path(&expand_home(path))?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(name)
                .build(&dir)
                .with_context(|| format!("opening log file {path}"))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

async fn run_scheduler(config: Arc<SnapwardConfig>) -> anyhow::Result<()> {
    let runner = app::build_runner(&config, app::client_factory(&config.aws));
    let registry = app::build_registry(Arc::clone(&config), runner).await;

    let mut engine =
        SchedulerEngine::new(registry, Duration::from_secs(config.scheduler.tick_secs));
    if let Some(log) = app::open_run_log(&config)? {
        engine = engine.with_run_log(log);
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut handle = tokio::spawn(engine.run(shutdown_rx));

    let interrupted = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            true
        }
        joined = &mut handle => {
            joined.context("scheduler engine task failed")?;
            false
        }
    };
    anyhow::ensure!(interrupted, "scheduler engine stopped unexpectedly");

    info!("interrupt received; finishing the current job");
    let _ = shutdown_tx.send(true);
    handle.await.context("scheduler engine task failed")?;
    Ok(())
}

async fn run_once(config: &SnapwardConfig, identifiers: &[String]) -> anyhow::Result<()> {
    let targets = app::resolve_targets(config, identifiers)?;
    if targets.is_empty() {
        warn!("no snapshot targets configured");
    }
    let runner = app::build_runner(config, app::client_factory(&config.aws));
    let summary = runner.run_all(&targets).await;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    anyhow::ensure!(
        summary.failed == 0,
        "{} of {} targets failed",
        summary.failed,
        summary.attempted
    );
    Ok(())
}

async fn list_jobs(config: Arc<SnapwardConfig>) -> anyhow::Result<()> {
    let runner = app::build_runner(&config, app::client_factory(&config.aws));
    let registry = app::build_registry(Arc::clone(&config), runner).await;
    let jobs = registry.list().await;
    if jobs.is_empty() {
        println!("no jobs registered");
        return Ok(());
    }
    for job in jobs {
        let next = job
            .next_run
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "-".into());
        let state = if job.enabled { "enabled" } else { "disabled" };
        println!(
            "{:<24} {:<8} {:<20} next: {}",
            job.name,
            state,
            job.cadence.to_string(),
            next
        );
        if !job.description.is_empty() {
            println!("    {}", job.description);
        }
    }
    Ok(())
}

async fn show_history(config: &SnapwardConfig, limit: u32) -> anyhow::Result<()> {
    let Some(log) = app::open_run_log(config)? else {
        anyhow::bail!("run log disabled; set scheduler.history_path");
    };
    for run in log.recent(limit).await? {
        let elapsed = (run.finished_at - run.started_at).num_seconds();
        println!(
            "{} {:<24} {:<9} {:>5}s {}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.job_name,
            run.status.to_string(),
            elapsed,
            run.error.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn write_default_config(path: &str, force: bool) -> anyhow::Result<()> {
    if std::path::Path::new(path).exists() && !force {
        anyhow::bail!("{path} already exists (use --force to overwrite)");
    }
    app::ensure_parent_dir(path);
    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE).with_context(|| format!("writing {path}"))?;
    info!(%path, "wrote default configuration");
    println!("wrote {path}");
    Ok(())
}

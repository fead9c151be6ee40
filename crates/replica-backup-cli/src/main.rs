use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use replica_backup_core::archive::SnapshotArchiver;
use replica_backup_core::config::{self, Config};
use replica_backup_core::prune::RetentionPruner;
use replica_backup_core::rotation;
use replica_backup_process::{BackupCommand, ProcessSpec, Supervisor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cycle;
mod scheduler;

use cycle::BackupCycleRunner;

#[derive(Parser)]
#[command(name = "replica-backup", version, about = "Rotating backups of a live data store, coordinated through a disposable replica")]
struct Cli {
    #[arg(long, default_value = "/etc/replica-backup/config.toml")]
    config: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Init,
    Run {
        #[arg(long)]
        interval: Option<u64>,
    },
    Once,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Init => init(&cli.config),
        Command::Run { interval } => run(&cli.config, interval).await,
        Command::Once => once(&cli.config).await,
    }
}

fn load_config(path: &str) -> Result<Config> {
    Config::load(path).with_context(|| format!("config required at {path}"))
}

fn init(config_path: &str) -> Result<()> {
    let cfg = load_config(config_path)?;
    let mut dirs = vec![PathBuf::from(&cfg.backup_root)];
    for process in [&cfg.primary, &cfg.replica] {
        if let Some(parent) = Path::new(&process.pid_file).parent() {
            dirs.push(parent.to_path_buf());
        }
        if let Some(parent) = process.log_file.as_deref().and_then(|f| Path::new(f).parent()) {
            dirs.push(parent.to_path_buf());
        }
    }
    for dir in dirs.iter().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory: {}", dir.display()))?;
    }
    info!(root = %cfg.backup_root, "backup layout initialized");
    Ok(())
}

async fn run(config_path: &str, interval_override: Option<u64>) -> Result<()> {
    let cfg = load_config(config_path)?;
    let interval_minutes = interval_override.unwrap_or(cfg.interval_minutes);
    ensure_backup_root(&cfg)?;

    let runner = Arc::new(build_runner(&cfg));
    runner.supervisor().recover_stale().await;
    runner.supervisor().start_primary().await?;
    let first_pid = runner.supervisor().start_replica().await?;

    info!(interval_minutes, "scheduler started");
    let dispatch = {
        let runner = runner.clone();
        move |pid| {
            let runner = runner.clone();
            async move { runner.run(Some(pid)).await }
        }
    };
    scheduler::run(
        Duration::from_secs(interval_minutes * 60),
        first_pid,
        dispatch,
        async {
            let _ = tokio::signal::ctrl_c().await;
        },
    )
    .await
}

async fn once(config_path: &str) -> Result<()> {
    let cfg = load_config(config_path)?;
    ensure_backup_root(&cfg)?;

    let runner = build_runner(&cfg);
    let prev_pid = runner.supervisor().last_replica_pid();
    let pid = runner.run(prev_pid).await?;
    info!(pid, "single backup cycle finished");
    Ok(())
}

fn ensure_backup_root(cfg: &Config) -> Result<()> {
    std::fs::create_dir_all(&cfg.backup_root)
        .with_context(|| format!("failed to create backup root: {}", cfg.backup_root))
}

fn build_runner(cfg: &Config) -> BackupCycleRunner {
    let supervisor = Supervisor::new(
        process_spec(&cfg.primary),
        process_spec(&cfg.replica),
        Duration::from_secs(cfg.warmup_secs),
    );
    let backup = BackupCommand::new(
        cfg.backup.command.clone(),
        cfg.datastore.url.clone(),
        cfg.datastore.user.clone(),
        cfg.datastore.password.clone(),
    );
    let root = Path::new(&cfg.backup_root);
    BackupCycleRunner::new(
        supervisor,
        backup,
        SnapshotArchiver::new(root),
        RetentionPruner::new(root),
        Duration::from_secs(cfg.backup.quiesce_secs),
        root.join(rotation::LAST_ARCHIVE),
    )
}

fn process_spec(process: &config::Process) -> ProcessSpec {
    ProcessSpec {
        command: process.command.clone(),
        args: process.args.clone(),
        pid_file: PathBuf::from(&process.pid_file),
        log_file: process.log_file.as_ref().map(PathBuf::from),
    }
}

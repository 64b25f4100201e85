//! Palisade CLI - daemon entry point and operator commands.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

use palisade_hive::{Correlator, Hive, HiveConfig, PlaybookEngine};
use palisade_hive::scheduler::Scheduler;
use palisade_shield::{Shield, ShieldConfig};

#[derive(Parser)]
#[command(name = "palisade")]
#[command(about = "Palisade - defensive infrastructure for AI workloads")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start the hive daemon
    Start {
        /// Configuration file path
        #[arg(short, long, default_value = "config/palisade.toml")]
        config: String,
    },
    /// Check configuration validity
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "config/palisade.toml")]
        config: String,
    },
    /// Show hive status
    Status {
        /// Configuration file path
        #[arg(short, long, default_value = "config/palisade.toml")]
        config: String,
    },
}

/// On-disk configuration: hive and shield sections, both optional.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    hive: HiveConfig,
    #[serde(default)]
    shield: ShieldConfig,
}

impl FileConfig {
    fn load(path: &str) -> anyhow::Result<Self> {
        let path = PathBuf::from(path);
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Start { config }) => start(&config),
        Some(Commands::Check { config }) => check(&config),
        Some(Commands::Status { config }) => status(&config),
        None => {
            println!("palisade - use --help for commands");
            Ok(())
        }
    }
}

fn start(config_path: &str) -> anyhow::Result<()> {
    let config = FileConfig::load(config_path)?;

    let hive = Arc::new(Hive::new(config.hive));
    if let Err(err) = hive.load_state() {
        tracing::info!(?err, "no previous state loaded");
    }

    let _shield = Shield::new(config.shield).context("building shield")?;
    let _playbooks = PlaybookEngine::with_defaults();
    let correlator = Arc::new(Correlator::new(hive.config().correlation.clone()));

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .context("installing signal handler")?;
    }

    // Monitor and snapshot tasks.
    let scheduler = Scheduler::new();
    {
        let hive = hive.clone();
        scheduler.add_task("check-heartbeats", 10, move || {
            hive.check_heartbeats();
        })?;
    }
    {
        let hive = hive.clone();
        scheduler.add_task("save-state", 300, move || {
            if let Err(err) = hive.save_state() {
                tracing::warn!(?err, "state save failed");
            }
        })?;
    }
    scheduler.start();
    let correlator_handle = correlator.clone().spawn(hive.clone(), running.clone());

    tracing::info!(hive = hive.id(), "palisade started");
    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
    }

    tracing::info!("shutting down");
    scheduler.stop();
    let _ = correlator_handle.join();
    hive.save_state().context("final state save")?;
    Ok(())
}

fn check(config_path: &str) -> anyhow::Result<()> {
    let config = FileConfig::load(config_path)?;
    println!(
        "config ok: agent port {}, api port {}, correlation window {}s",
        config.hive.agent_port, config.hive.api_port, config.hive.correlation.window_secs
    );
    Ok(())
}

fn status(config_path: &str) -> anyhow::Result<()> {
    let config = FileConfig::load(config_path)?;
    let hive = Hive::new(config.hive);
    match hive.load_state() {
        Ok(()) => println!("{}", hive.status_report()),
        Err(err) => println!("no saved state ({err}); hive would start fresh"),
    }
    Ok(())
}

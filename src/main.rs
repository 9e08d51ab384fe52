//! AU instance host - interactive demo binary
//!
//! Hosts N instances of the configured plugin on the simulated platform and
//! exposes the instance manager, playback and presets through a REPL.

use anyhow::{Context, Result};
use au_instance_host::app::{restore_session, HostSession};
use au_instance_host::cli::{self, ConsoleObserver};
use au_instance_host::config::AppConfig;
use au_instance_host::host::{HostObserver, InstanceManagerHandle};
use au_instance_host::paths::AppPaths;
use au_instance_host::platform::sim::{SimAudioRouter, SimInstantiator, SimRegistry};
use au_instance_host::platform::{AudioRouter, Platform};
use au_instance_host::playback::{PlaybackDriver, PlaybackSettings};
use au_instance_host::state::{PresetStore, SledBlobStore, PRESETS_KEY, SESSION_KEY};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// AU instance host - replicate one plugin, play it and keep state presets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the app data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Also write daily-rotated log files to the logs directory
    #[arg(long)]
    log_file: bool,

    /// Instance count at startup, overriding the saved session
    #[arg(short, long)]
    instances: Option<usize>,

    /// Print the saved presets and exit
    #[arg(long)]
    list_presets: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let paths = AppPaths::detect();
    paths.ensure_directories()?;

    let logs_dir = args.log_file.then_some(paths.logs_dir.as_path());
    let _log_guard = init_logging(&args.log_level, logs_dir)?;

    info!("Starting AU instance host v{}...", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    let config = load_config(&config_path).await?;

    let db_path = config
        .storage
        .path
        .clone()
        .unwrap_or_else(|| paths.sled_db_path());
    let db = sled::open(&db_path)
        .with_context(|| format!("Failed to open state database at: {}", db_path.display()))?;
    info!("State database: {}", db_path.display());

    let presets = PresetStore::open(SledBlobStore::with_db(db.clone(), PRESETS_KEY));
    if args.list_presets {
        cli::print_presets(&presets.list());
        return Ok(());
    }

    let session_store = SledBlobStore::with_db(db.clone(), SESSION_KEY);
    let instance_count = args
        .instances
        .or_else(|| restore_session(&session_store).map(|r| r.instance_count))
        .unwrap_or(config.host.instance_count);
    info!(instance_count, "Initial instance count");

    let component = config.plugin.description();
    let router = SimAudioRouter::new();
    router.start().context("Failed to start audio engine")?;
    let platform = Platform {
        registry: SimRegistry::with_component(component.clone()),
        instantiator: SimInstantiator::new(),
        router: router.clone(),
    };

    let playback = Arc::new(PlaybackDriver::new(PlaybackSettings::from(&config.playback)));
    let observer: Arc<dyn HostObserver> = Arc::new(ConsoleObserver::new(playback.clone()));
    let manager = InstanceManagerHandle::spawn(
        config.manager_config(instance_count),
        platform,
        Arc::downgrade(&observer) as Weak<dyn HostObserver>,
    );

    let session = HostSession::new(manager, presets, playback, Box::new(session_store));
    info!("Hosting {}", component);

    cli::run_repl(&session).await?;

    info!("Shutting down...");
    session.shutdown();
    router.stop();
    if let Err(e) = db.flush_async().await {
        warn!("Failed to flush state database: {}", e);
    }
    drop(observer);

    info!("AU instance host shutdown complete");
    Ok(())
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        info!("No config at {}, using defaults", path.display());
        return Ok(AppConfig::default());
    }

    let config = AppConfig::load(path).await?;
    info!("Configuration loaded from {}", path.display());
    Ok(config)
}

fn init_logging(level: &str, logs_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level: {}", level))?;

    let (file_layer, guard) = match logs_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "au-instance-host.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

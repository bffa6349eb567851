//! Router configuration manager daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   templates.toml ──▶ SchemaTree ──┐
//!                                    ▼
//!   config.boot ──▶ ConfigManager::bootstrap ──▶ CommitCoordinator ──▶ modules
//!                        ▲                              │
//!   SIGHUP / file watch ─┘  load over running           └── ChannelRpc ──▶ module tasks
//!
//!   SIGTERM / Ctrl+C ──▶ Shutdown broadcast ──▶ exit
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use router_manager::commit::{ChannelRpc, CommitCoordinator};
use router_manager::lifecycle::{spawn_signal_listener, Shutdown, SignalEvent};
use router_manager::manager::ConfigManager;
use router_manager::modules::ModuleRegistry;
use router_manager::observability;
use router_manager::settings::{load_settings, ConfigFileWatcher, ManagerSettings};
use router_manager::template::load_schema;

#[derive(Debug, Parser)]
#[command(name = "router-manager", version, about = "Router configuration manager")]
struct Args {
    /// Daemon settings file
    #[arg(short, long, default_value = "etc/router-manager.toml")]
    settings: PathBuf,

    /// Schema file, overriding the settings
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Boot configuration file, overriding the settings
    #[arg(short, long)]
    boot: Option<PathBuf>,

    /// Log level, overriding the settings
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let settings = if args.settings.exists() {
        load_settings(&args.settings)?
    } else {
        ManagerSettings::default()
    };
    let level = args.log_level.as_deref().unwrap_or(&settings.observability.log_level);
    observability::logging::init(level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "router-manager starting");
    if !args.settings.exists() {
        tracing::warn!(path = ?args.settings, "settings file not found, using defaults");
    }

    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let schema_path = args.schema.unwrap_or_else(|| PathBuf::from(&settings.paths.schema_file));
    let schema = Arc::new(load_schema(&schema_path)?);
    tracing::info!(path = ?schema_path, nodes = schema.len(), "schema loaded");

    let coordinator = CommitCoordinator::new(
        Arc::new(ChannelRpc::new()),
        Arc::new(ModuleRegistry::new()),
        Duration::from_millis(settings.commit.action_timeout_ms),
    );
    let mut manager = ConfigManager::new(schema, coordinator).with_settings(&settings);

    let boot_path = args.boot.unwrap_or_else(|| PathBuf::from(&settings.paths.boot_file));
    match manager.bootstrap_file(&boot_path).await {
        Ok(report) => tracing::info!(
            path = ?boot_path,
            modules = ?report.modules,
            actions = report.actions,
            "boot configuration committed"
        ),
        Err(e) => {
            tracing::error!(path = ?boot_path, error = %e, "boot configuration failed");
            return Err(e.into());
        }
    }

    let shutdown = Shutdown::new();
    let mut signals = spawn_signal_listener(shutdown.clone())?;
    let mut stop = shutdown.subscribe();

    let (_watcher, mut reload_rx) = if settings.watcher.enabled {
        let (watcher, rx) =
            ConfigFileWatcher::new(&boot_path, Duration::from_secs(settings.watcher.poll_interval_secs));
        (Some(watcher.run()?), Some(rx))
    } else {
        (None, None)
    };

    loop {
        tokio::select! {
            Some(request) = async { reload_rx.as_mut()?.recv().await } => {
                reload(&mut manager, &request.path).await;
            }
            Some(SignalEvent::Reload) = signals.recv() => {
                reload(&mut manager, &boot_path).await;
            }
            _ = stop.recv() => break,
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Load `path` over the running configuration. Failures keep the running
/// configuration and are only logged.
async fn reload(manager: &mut ConfigManager, path: &Path) {
    match manager.load_config(path).await {
        Ok(outcome) if outcome.report.modules.is_empty() && outcome.deltas.is_empty() && outcome.deletions.is_empty() => {
            tracing::info!(path = ?path, "reload: no changes");
        }
        Ok(outcome) => tracing::info!(
            path = ?path,
            modules = ?outcome.report.modules,
            actions = outcome.report.actions,
            "reload committed"
        ),
        Err(e) => tracing::error!(path = ?path, error = %e, "reload failed, running configuration kept"),
    }
}

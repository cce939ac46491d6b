//! The collector daemon: the central process that collects, persists, and
//! evaluates the quality of monitor elements while a run is in progress.
//! Wires storage, run control, archiving, and plugins behind one of the
//! two transport back-ends; a thin CLI/config layer over library crates
//! that do the actual work.

mod config;
mod control;
mod lifecycle;

use std::sync::Arc;

use clap::Parser;
use dqm_archive::Archiver;
use dqm_core::MonitorElementManager;
use dqm_plugin::PluginManager;
use dqm_runcontrol::RunControl;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = config::Cli::parse();
    init_tracing(cli.log_level);

    let settings = config::load(&cli)?;
    info!(bind = %settings.collector.bind, "starting dqm-collector");

    let manager = Arc::new(MonitorElementManager::new());
    let run_control = Arc::new(RunControl::new());
    run_control.set_password(settings.run_control.password.clone())?;
    std::fs::create_dir_all(&settings.collector.archive_dir)?;
    let archiver = Arc::new(Archiver::new());
    lifecycle::wire(&run_control, manager.clone(), archiver.clone(), settings.collector.archive_dir.clone());

    let plugins = PluginManager::new();
    if settings.collector.plugin_dir.is_dir() {
        match plugins.load_dir(&settings.collector.plugin_dir) {
            Ok(count) => info!(count, dir = %settings.collector.plugin_dir.display(), "loaded plugins"),
            Err(error) => warn!(%error, dir = %settings.collector.plugin_dir.display(), "failed to load plugins"),
        }
    } else {
        info!(dir = %settings.collector.plugin_dir.display(), "plugin directory not present, skipping");
    }

    let transport = dqm_transport::from_addr(&settings.collector.bind).await?;
    control::register(transport.as_ref(), run_control.clone()).await?;

    info!("dqm-collector ready");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

fn init_tracing(log_level: Option<tracing::Level>) {
    let default_directive = log_level.unwrap_or(tracing::Level::INFO);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().compact())
        .with(
            EnvFilter::builder()
                .with_default_directive(default_directive.into())
                .from_env()
                .expect("invalid RUST_LOG"),
        )
        .init();
}

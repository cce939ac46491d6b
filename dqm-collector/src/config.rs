//! Command-line arguments and layered configuration for the collector
//! daemon: a base TOML baked into the binary, overridden by a config file
//! path, overridden again by CLI flags, all layered with
//! `config::Config::builder`.

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

#[derive(Debug, Parser)]
#[command(name = "dqm-collector", about = "Online data quality monitoring collector")]
pub struct Cli {
    /// Path to the collector's TOML config file.
    #[arg(long, default_value = "dqm-collector.toml")]
    pub config: PathBuf,

    /// Overrides `[collector].bind`.
    #[arg(long, env = "DQM_BIND")]
    pub bind: Option<String>,

    /// Overrides `[collector].archive_dir`.
    #[arg(long, env = "DQM_ARCHIVE_DIR")]
    pub archive_dir: Option<PathBuf>,

    /// Overrides `[collector].plugin_dir`.
    #[arg(long, env = "DQM_PLUGIN_DIR")]
    pub plugin_dir: Option<PathBuf>,

    /// Overrides `[run_control].password`.
    #[arg(long, env = "DQM_RUN_CONTROL_PASSWORD")]
    pub run_control_password: Option<String>,

    /// A global log level; `RUST_LOG` (parsed by `EnvFilter`) always wins.
    #[arg(long)]
    pub log_level: Option<tracing::Level>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub collector: CollectorSection,
    #[serde(default)]
    pub run_control: RunControlSection,
}

#[derive(Debug, Deserialize)]
pub struct CollectorSection {
    pub bind: String,
    pub archive_dir: PathBuf,
    pub plugin_dir: PathBuf,
}

#[derive(Debug, Deserialize, Default)]
pub struct RunControlSection {
    pub password: Option<String>,
}

/// Builds the effective config: baked-in defaults, then `cli.config` (if
/// present), then CLI-flag overrides, in that order.
pub fn load(cli: &Cli) -> anyhow::Result<Config> {
    let mut builder = config::Config::builder()
        .add_source(config::File::from_str(
            include_str!("../default_config.toml"),
            config::FileFormat::Toml,
        ))
        .add_source(config::File::from(cli.config.clone()).required(false));

    if let Some(bind) = &cli.bind {
        builder = builder.set_override("collector.bind", bind.as_str())?;
    }
    if let Some(archive_dir) = &cli.archive_dir {
        builder = builder.set_override("collector.archive_dir", archive_dir.display().to_string())?;
    }
    if let Some(plugin_dir) = &cli.plugin_dir {
        builder = builder.set_override("collector.plugin_dir", plugin_dir.display().to_string())?;
    }
    if let Some(password) = &cli.run_control_password {
        builder = builder.set_override("run_control.password", password.as_str())?;
    }

    Ok(builder.build()?.try_deserialize()?)
}

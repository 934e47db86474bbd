//! SliceVault server entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Command-line options.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Opts {
    /// TOML configuration file; created with defaults if missing.
    #[arg(long, default_value = "./etc/slicevault.toml")]
    config_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();

    // Logging is set up after the config load so `log_level` can apply.
    let loaded = config::Config::load(&opts.config_path);
    let level = loaded
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".into());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting SliceVault server"
    );

    let config = loaded?;
    tracing::info!(
        path = %opts.config_path.display(),
        store = %config.store_dir.display(),
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("server shut down cleanly");
    Ok(())
}

use clap::Parser;
use eyre::{Context, Result};
use log::info;

mod cli;

use cli::Cli;
use rapidpy::config::Config;
use rapidpy::source::prepare_workdir;

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                log::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    setup_logging(cli.is_verbose());

    // Load configuration
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.apply_env(std::env::var("RAPIDPY_ENV").ok().as_deref());
    if let Some(secs) = cli.poll_interval {
        config.poll_interval_secs = secs;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        "Starting with deployment {:?}, workdir {}",
        config.deployment,
        config.workdir.display()
    );

    prepare_workdir(&config.workdir, config.clean_workdir).context("Failed to prepare working directory")?;

    let mut reconciler = config.build_reconciler().context("Failed to build reconciler")?;
    reconciler.run_until(shutdown_signal()).await;

    info!("Supervisor stopped");
    Ok(())
}

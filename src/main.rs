mod classify;
mod config;
mod hub;
mod models;
mod serve;
mod snapshot;
mod tailer;
mod watchdog;

use clap::Parser;
use config::MonitorConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Local monitoring companion for an OpenClaw agent gateway: tails the
/// daily log, streams classified events to connected dashboards, and
/// restarts the gateway when a failure signature keeps recurring.
#[derive(Parser, Debug)]
#[command(name = "clawmon", version, about)]
struct Cli {
    /// Env file with PORT / OPENCLAW_HOME / LOG_DIR / RESTART_CMD (default: .env)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Listen port (overrides env)
    #[arg(short, long)]
    port: Option<u16>,

    /// Gateway state root (overrides env)
    #[arg(long)]
    home: Option<PathBuf>,

    /// Daily log directory (overrides env)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Extra logging (tail polls, watchdog counters)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "clawmon=debug" } else { "clawmon=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let mut config = MonitorConfig::load(cli.env_file.as_deref());
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(home) = cli.home {
        config.home = home;
    }
    if let Some(log_dir) = cli.log_dir {
        config.log_dir = log_dir;
    }

    tracing::info!(
        port = config.port,
        home = %config.home.display(),
        log_dir = %config.log_dir.display(),
        "clawmon starting"
    );

    if let Err(e) = serve::run(config).await {
        tracing::error!(error = %e, "server exited");
        std::process::exit(1);
    }
}

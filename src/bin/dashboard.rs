//! RewardScope dashboard server
//!
//! Run with: rewardscope-dashboard --run-name <run> --data-dir <dir>

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rewardscope::types::{
    DashboardConfig, LiveConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_WINDOW,
    DEFAULT_QUERY_TIMEOUT_MS,
};
use rewardscope::DashboardServer;

#[derive(Parser, Debug)]
#[command(name = "rewardscope-dashboard")]
#[command(about = "Live dashboard for RL training runs", version)]
struct Args {
    /// Name of the run to display
    #[arg(long, env = "REWARDSCOPE_RUN_NAME", default_value = "unknown")]
    run_name: String,

    /// Directory containing the collector's run databases
    #[arg(
        long,
        env = "REWARDSCOPE_DATA_DIR",
        default_value = "~/.local/share/rewardscope/runs"
    )]
    data_dir: String,

    /// Host to bind to
    #[arg(long, env = "REWARDSCOPE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to run the server on
    #[arg(long, env = "REWARDSCOPE_PORT", default_value = "8050")]
    port: u16,

    /// Live channel poll interval in ms
    #[arg(long, env = "REWARDSCOPE_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    poll_interval_ms: u64,

    /// Number of recent steps each live poll reads
    #[arg(long, env = "REWARDSCOPE_POLL_WINDOW", default_value_t = DEFAULT_POLL_WINDOW)]
    poll_window: usize,

    /// Upper bound on one store read in ms
    #[arg(long, env = "REWARDSCOPE_QUERY_TIMEOUT_MS", default_value_t = DEFAULT_QUERY_TIMEOUT_MS)]
    query_timeout_ms: u64,

    /// Upper bound on pushing one live message in ms (defaults to the poll interval)
    #[arg(long, env = "REWARDSCOPE_SEND_TIMEOUT_MS")]
    send_timeout_ms: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, env = "REWARDSCOPE_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<DashboardConfig> {
        if self.poll_interval_ms == 0 {
            anyhow::bail!("--poll-interval-ms must be greater than zero");
        }
        if self.poll_window == 0 {
            anyhow::bail!("--poll-window must be greater than zero");
        }

        let data_dir = PathBuf::from(shellexpand::tilde(&self.data_dir).to_string());
        let poll_interval = Duration::from_millis(self.poll_interval_ms);

        Ok(DashboardConfig {
            run_name: self.run_name,
            data_dir,
            host: self.host,
            port: self.port,
            live: LiveConfig {
                poll_interval,
                poll_window: self.poll_window,
                query_timeout: Duration::from_millis(self.query_timeout_ms),
                send_timeout: self
                    .send_timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(poll_interval),
            },
        })
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));

    if json {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    let config = args.into_config()?;
    tracing::info!(
        run = %config.run_name,
        db = %config.db_path().display(),
        "RewardScope dashboard starting"
    );

    let server = DashboardServer::open(config);
    server.run_until(shutdown_signal()).await?;

    Ok(())
}

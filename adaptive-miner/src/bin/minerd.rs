//! Demo mining daemon.

use adaptive_miner::{config::MinerConfig, daemon::Daemon, tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();

    let config = MinerConfig::from_env();
    Daemon::new(config).run().await
}

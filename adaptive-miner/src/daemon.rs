//! Demo daemon: mines against an in-process solo chain.
//!
//! Wires a [`MiningEngine`] to [`SoloNode`], drives `on_idle` from a tokio
//! interval, refreshes the template whenever the solo chain grows, and stops
//! everything on SIGINT or SIGTERM.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::Notify;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::config::MinerConfig;
use crate::engine::MiningEngine;
use crate::node::{
    BlockCandidate, BlockTemplate, MinerHandler, MiningAddress, PowHasher, Sha256dHasher,
    TemplateError,
};
use crate::resource;
use crate::tracing::prelude::*;
use crate::types::{hash_meets_difficulty, Difficulty, Hash};

/// Difficulty of every solo block; a few seconds of work on a laptop core.
const SOLO_DIFFICULTY: Difficulty = Difficulty::new(1 << 22);

const IDLE_INTERVAL: Duration = Duration::from_secs(1);

/// Chain that exists only in memory and accepts any block extending its
/// tip with enough work.
pub struct SoloNode {
    hasher: Sha256dHasher,
    difficulty: Difficulty,
    height: AtomicU64,
    tip: Mutex<Hash>,
    tip_changed: Notify,
}

impl SoloNode {
    pub fn new(difficulty: Difficulty) -> Self {
        Self {
            hasher: Sha256dHasher,
            difficulty,
            height: AtomicU64::new(1),
            tip: Mutex::new(Hash::ZERO),
            tip_changed: Notify::new(),
        }
    }

    pub fn height(&self) -> u64 {
        self.height.load(Ordering::Acquire)
    }

    /// Resolves after the next accepted block.
    pub async fn tip_changed(&self) {
        self.tip_changed.notified().await;
    }
}

impl MinerHandler for SoloNode {
    fn get_block_template(
        &self,
        address: &MiningAddress,
        extra_nonce: &[u8],
    ) -> Result<BlockTemplate, TemplateError> {
        let tip = self.tip.lock();
        let height = self.height();

        // Header: previous hash, height, payout address, extra nonce.
        let mut header = tip.0.to_vec();
        header.extend_from_slice(&height.to_le_bytes());
        header.extend_from_slice(address.as_str().as_bytes());
        header.extend_from_slice(extra_nonce);

        Ok(BlockTemplate {
            candidate: BlockCandidate::new(header),
            difficulty: self.difficulty,
            height,
        })
    }

    fn handle_block_found(&self, block: &BlockCandidate) -> bool {
        let mut tip = self.tip.lock();
        if !block.header.starts_with(&tip.0) {
            debug!("Rejecting block built on a stale tip");
            return false;
        }

        let height = self.height();
        let hash = self.hasher.block_hash(block, height);
        if !hash_meets_difficulty(&hash, self.difficulty) {
            warn!(%hash, "Rejecting block with insufficient work");
            return false;
        }

        *tip = hash;
        self.height.store(height + 1, Ordering::Release);
        info!(height, %hash, "Solo chain extended");
        self.tip_changed.notify_one();
        true
    }
}

/// The main daemon.
pub struct Daemon {
    config: MinerConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    pub fn new(config: MinerConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Run until SIGINT or SIGTERM.
    pub async fn run(self) -> anyhow::Result<()> {
        let node = Arc::new(SoloNode::new(SOLO_DIFFICULTY));
        let engine = Arc::new(MiningEngine::new(
            node.clone(),
            Arc::new(Sha256dHasher),
            resource::native(),
            self.config.controller.clone(),
        ));
        engine.set_print_hashrate(true);
        engine.init(&self.config.options)?;

        // The solo chain is synchronized from the start.
        if self.config.options.start_mining.is_some() {
            engine.on_synchronized()?;
        } else {
            info!("No mining address set (ADAPTIVE_MINER_ADDRESS), idling.");
        }

        self.tracker.spawn({
            let engine = engine.clone();
            let shutdown = self.shutdown.clone();
            async move {
                let mut interval = tokio::time::interval(IDLE_INTERVAL);
                loop {
                    tokio::select! {
                        _ = interval.tick() => engine.on_idle(),
                        _ = node.tip_changed() => engine.on_block_chain_update(),
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        });

        self.tracker.close();

        info!("Started.");
        info!("For debugging, set RUST_LOG=adaptive_miner=debug or trace.");

        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT.");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM.");
            },
        }

        self.shutdown.cancel();
        self.tracker.wait().await;

        // Joining the mining threads blocks.
        tokio::task::spawn_blocking(move || engine.stop()).await?;
        info!("Exiting.");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash_thread::find_nonce_for_given_block;

    fn address() -> MiningAddress {
        "4AdUndXHHZ6cfufTMvppY6JwXNouMBzSkbLYfpAV5Usx".parse().unwrap()
    }

    #[test]
    fn solo_node_accepts_valid_block_and_advances() {
        let node = SoloNode::new(Difficulty::new(64));
        let template = node.get_block_template(&address(), b"hi").unwrap();
        assert_eq!(template.height, 1);

        let mut block = template.candidate;
        assert!(find_nonce_for_given_block(
            &Sha256dHasher,
            &mut block,
            template.difficulty,
            template.height
        ));
        assert!(node.handle_block_found(&block));
        assert_eq!(node.height(), 2);

        // Same block again no longer extends the tip.
        assert!(!node.handle_block_found(&block));
    }

    #[test]
    fn solo_node_rejects_insufficient_work() {
        let node = SoloNode::new(Difficulty::new(u64::MAX));
        let template = node.get_block_template(&address(), b"").unwrap();
        assert!(!node.handle_block_found(&template.candidate));
        assert_eq!(node.height(), 1);
    }
}

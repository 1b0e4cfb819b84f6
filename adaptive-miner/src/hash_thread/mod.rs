//! Pool of CPU hashing threads.
//!
//! Every worker searches its own residue class of the nonce space against the
//! shared template: worker `i` of `n` tries `starter + i`, `starter + i + n`,
//! `starter + i + 2n`, ... (all wrapping). Workers never talk to each other;
//! they only share the template store, the hash counter, and the stop and
//! pause signals.

mod worker;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::hashrate::HashRateTracker;
use crate::node::{BlockCandidate, PowHasher};
use crate::signal::{PauseGate, StopSignal};
use crate::template::BlockTemplateStore;
use crate::tracing::prelude::*;
use crate::types::{hash_meets_difficulty, Difficulty};

/// Where workers hand in blocks that met the difficulty.
pub trait BlockSink: Send + Sync {
    /// Returns whether the node accepted the block.
    fn submit(&self, block: &BlockCandidate, height: u64) -> bool;
}

/// Everything a worker thread shares with the engine.
#[derive(Clone)]
pub struct WorkerContext {
    pub templates: Arc<BlockTemplateStore>,
    pub hashrate: Arc<HashRateTracker>,
    pub pause: Arc<PauseGate>,
    pub stop: Arc<StopSignal>,
    pub hasher: Arc<dyn PowHasher>,
    pub sink: Arc<dyn BlockSink>,
}

/// Handles of the running workers.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers with indices `0..count` and stride `count`.
    pub fn spawn(context: &WorkerContext, count: u32) -> Self {
        let workers = (0..count)
            .map(|index| {
                let context = context.clone();
                thread::Builder::new()
                    .name(format!("miner-{index}"))
                    .spawn(move || worker::run(context, index, count))
                    .expect("failed to spawn mining thread")
            })
            .collect();

        info!(threads = count, "Mining threads started");
        Self { workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker to exit. Callers signal stop first.
    pub fn join(self) {
        let count = self.workers.len();
        for handle in self.workers {
            if handle.join().is_err() {
                error!("Mining thread panicked");
            }
        }
        info!(threads = count, "Mining threads finished");
    }
}

/// Scan nonces upward from `block.nonce` until the hash meets `difficulty`.
///
/// Returns `false` if the scan reaches `u32::MAX` without a hit. On success
/// `block.nonce` holds the winning nonce.
pub fn find_nonce_for_given_block(
    hasher: &dyn PowHasher,
    block: &mut BlockCandidate,
    difficulty: Difficulty,
    height: u64,
) -> bool {
    while block.nonce != u32::MAX {
        let hash = hasher.block_hash(block, height);
        if hash_meets_difficulty(&hash, difficulty) {
            return true;
        }
        block.nonce += 1;
    }
    false
}

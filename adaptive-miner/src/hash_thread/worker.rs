//! The hashing loop run by each pool thread.

use std::time::Duration;

use super::WorkerContext;
use crate::node::BlockCandidate;
use crate::tracing::prelude::*;
use crate::types::{hash_meets_difficulty, Difficulty};

/// Longest a paused worker sleeps before looking at the signals again.
const PAUSE_POLL: Duration = Duration::from_millis(100);

/// Back-off while the node has not produced a first template.
const NO_TEMPLATE_BACKOFF: Duration = Duration::from_secs(1);

/// Local copy of the template being searched.
struct Work {
    candidate: BlockCandidate,
    difficulty: Difficulty,
    height: u64,
    version: u64,
}

pub(super) fn run(context: WorkerContext, index: u32, stride: u32) {
    debug!(thread = index, stride, "Mining thread started");

    let mut work: Option<Work> = None;
    let mut nonce = 0u32;

    while !context.stop.is_stopped() {
        if context.pause.is_paused() {
            context.pause.wait(PAUSE_POLL);
            continue;
        }

        let cached = work.as_ref().map_or(0, |w| w.version);
        if context.templates.version() != cached {
            let snapshot = context.templates.snapshot();
            trace!(thread = index, version = snapshot.version, "Switching to new template");
            nonce = snapshot.starter_nonce.wrapping_add(index);
            work = Some(Work {
                candidate: snapshot.candidate,
                difficulty: snapshot.difficulty,
                height: snapshot.height,
                version: snapshot.version,
            });
        }

        let Some(work) = work.as_mut() else {
            context.stop.sleep(NO_TEMPLATE_BACKOFF);
            continue;
        };

        work.candidate.nonce = nonce;
        let hash = context.hasher.block_hash(&work.candidate, work.height);
        if hash_meets_difficulty(&hash, work.difficulty) {
            info!(
                thread = index,
                height = work.height,
                nonce,
                difficulty = %work.difficulty,
                %hash,
                "Found block"
            );
            context.sink.submit(&work.candidate, work.height);
        }

        nonce = nonce.wrapping_add(stride);
        context.hashrate.record_hashes(1);
    }

    debug!(thread = index, "Mining thread stopped");
}

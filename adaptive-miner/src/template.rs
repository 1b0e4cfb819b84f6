//! Versioned holder of the current mining candidate.
//!
//! The node installs a new template whenever the chain tip changes. Each
//! install bumps the version; workers compare their cached version with
//! [`BlockTemplateStore::version`] and re-snapshot only when it differs.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::node::BlockCandidate;
use crate::types::Difficulty;

/// Consistent copy of the installed template.
#[derive(Debug, Clone)]
pub struct TemplateSnapshot {
    pub candidate: BlockCandidate,
    pub difficulty: Difficulty,
    pub height: u64,
    /// Zero means no template has been installed yet.
    pub version: u64,
    pub starter_nonce: u32,
}

#[derive(Debug, Default)]
struct Slot {
    candidate: BlockCandidate,
    difficulty: Difficulty,
    height: u64,
    version: u64,
    starter_nonce: u32,
}

/// Thread-safe template store.
///
/// The lock covers only the copy in or out. The version is mirrored into an
/// atomic so the hot loop can poll it without locking; the mirror is always
/// written while the lock is held, so a snapshot taken after observing
/// version V carries V or something newer.
#[derive(Debug, Default)]
pub struct BlockTemplateStore {
    slot: Mutex<Slot>,
    version: AtomicU64,
}

impl BlockTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new template and return its version.
    pub fn set(&self, candidate: BlockCandidate, difficulty: Difficulty, height: u64) -> u64 {
        let mut slot = self.slot.lock();
        slot.candidate = candidate;
        slot.difficulty = difficulty;
        slot.height = height;
        slot.version += 1;
        slot.starter_nonce = rand::random();
        self.version.store(slot.version, Ordering::Release);
        slot.version
    }

    /// Draw a fresh starter nonce without changing the version.
    pub fn reseed(&self) {
        self.slot.lock().starter_nonce = rand::random();
    }

    pub fn snapshot(&self) -> TemplateSnapshot {
        let slot = self.slot.lock();
        TemplateSnapshot {
            candidate: slot.candidate.clone(),
            difficulty: slot.difficulty,
            height: slot.height,
            version: slot.version,
            starter_nonce: slot.starter_nonce,
        }
    }

    /// Current version; zero until the first [`set`](Self::set).
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn has_template(&self) -> bool {
        self.version() != 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn candidate(tag: u8) -> BlockCandidate {
        BlockCandidate::new(vec![tag; 8])
    }

    #[test]
    fn test_empty_store() {
        let store = BlockTemplateStore::new();
        assert!(!store.has_template());
        assert_eq!(store.snapshot().version, 0);
    }

    #[test]
    fn test_version_strictly_increases() {
        let store = BlockTemplateStore::new();
        let mut last = store.version();
        for i in 0..50u8 {
            let v = store.set(candidate(i), Difficulty::new(i as u64), i as u64);
            assert!(v > last);
            assert_eq!(store.version(), v);
            last = v;
        }
        assert_eq!(last, 50);
    }

    #[test]
    fn test_reseed_keeps_version() {
        let store = BlockTemplateStore::new();
        store.set(candidate(1), Difficulty::new(10), 1);
        store.reseed();
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_snapshot_is_never_torn() {
        // Every template encodes its own version in all three fields, so a
        // torn read would show a mismatch.
        let store = Arc::new(BlockTemplateStore::new());

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for v in 1..=2000u64 {
                    let tag = (v % 251) as u8;
                    store.set(candidate(tag), Difficulty::new(v), v);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut last_seen = 0;
                    for _ in 0..2000 {
                        let observed = store.version();
                        let snap = store.snapshot();
                        if snap.version == 0 {
                            continue;
                        }
                        assert!(snap.version >= observed);
                        assert!(snap.version >= last_seen);
                        assert_eq!(snap.difficulty.as_u64(), snap.version);
                        assert_eq!(snap.height, snap.version);
                        assert_eq!(snap.candidate.header[0], (snap.version % 251) as u8);
                        last_seen = snap.version;
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}

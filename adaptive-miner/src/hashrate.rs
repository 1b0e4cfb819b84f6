//! Hash counting and rolling hash-rate estimate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::types::HashRate;

/// Number of merged samples kept for the displayed average.
pub const HASHRATE_WINDOW: usize = 20;

#[derive(Debug, Default)]
struct MergeState {
    last_merge: Option<Instant>,
    window: VecDeque<u64>,
}

/// Counts hashes from all workers and folds them into per-interval rates.
///
/// Workers only ever add to the counter. [`merge_at`](Self::merge_at) swaps it
/// with zero, so a hash lands in exactly one merge interval no matter how the
/// increments interleave with the merge.
#[derive(Debug, Default)]
pub struct HashRateTracker {
    hashes: AtomicU64,
    current: AtomicU64,
    state: Mutex<MergeState>,
}

impl HashRateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hashes(&self, n: u64) {
        self.hashes.fetch_add(n, Ordering::Relaxed);
    }

    /// Hashes counted since the last merge.
    pub fn pending_hashes(&self) -> u64 {
        self.hashes.load(Ordering::Relaxed)
    }

    pub fn merge(&self) -> Option<HashRate> {
        self.merge_at(Instant::now())
    }

    /// Fold the hashes counted since the previous merge into a rate sample.
    ///
    /// The first merge after construction or [`reset`](Self::reset) only
    /// starts the clock and returns `None`.
    pub fn merge_at(&self, now: Instant) -> Option<HashRate> {
        let mut state = self.state.lock();
        let hashes = self.hashes.swap(0, Ordering::AcqRel);

        let rate = state.last_merge.map(|last| {
            let elapsed_ms = now.saturating_duration_since(last).as_millis().max(1);
            let rate = (hashes as u128 * 1000 / elapsed_ms) as u64;

            state.window.push_back(rate);
            if state.window.len() > HASHRATE_WINDOW {
                state.window.pop_front();
            }
            self.current.store(rate, Ordering::Relaxed);
            HashRate(rate)
        });

        state.last_merge = Some(now);
        rate
    }

    /// Restart the merge clock and drop uncounted hashes. The window is kept
    /// for display.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.last_merge = None;
        self.hashes.store(0, Ordering::Relaxed);
        self.current.store(0, Ordering::Relaxed);
    }

    /// Most recent merged rate.
    pub fn current_rate(&self) -> HashRate {
        HashRate(self.current.load(Ordering::Relaxed))
    }

    /// Mean of the sliding window, zero when empty.
    pub fn average_rate(&self) -> HashRate {
        let state = self.state.lock();
        if state.window.is_empty() {
            return HashRate(0);
        }
        let total: u128 = state.window.iter().map(|&r| r as u128).sum();
        HashRate((total / state.window.len() as u128) as u64)
    }

    pub fn window(&self) -> Vec<u64> {
        self.state.lock().window.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_first_merge_starts_clock() {
        let tracker = HashRateTracker::new();
        tracker.record_hashes(500);
        assert_eq!(tracker.merge_at(Instant::now()), None);
        assert_eq!(tracker.pending_hashes(), 0);
        assert!(tracker.window().is_empty());
    }

    #[test]
    fn test_window_holds_newest_twenty_rates() {
        let tracker = HashRateTracker::new();
        let mut now = Instant::now();
        tracker.merge_at(now);

        let mut expected = Vec::new();
        for i in 1..=27u64 {
            let count = i * 100;
            let interval_ms = 500 + i * 10;
            tracker.record_hashes(count);
            now += Duration::from_millis(interval_ms);

            let rate = tracker.merge_at(now).unwrap();
            assert_eq!(rate.0, count * 1000 / interval_ms);
            expected.push(rate.0);

            let window = tracker.window();
            assert_eq!(window.len(), expected.len().min(HASHRATE_WINDOW));
            assert_eq!(window, expected[expected.len() - window.len()..]);
        }

        assert_eq!(tracker.current_rate().0, *expected.last().unwrap());
    }

    #[test]
    fn test_average_rate() {
        let tracker = HashRateTracker::new();
        let mut now = Instant::now();
        tracker.merge_at(now);

        for count in [1000u64, 3000] {
            tracker.record_hashes(count);
            now += Duration::from_secs(1);
            tracker.merge_at(now);
        }
        assert_eq!(tracker.average_rate(), HashRate(2000));
    }

    #[test]
    fn test_reset_restarts_clock() {
        let tracker = HashRateTracker::new();
        let now = Instant::now();
        tracker.merge_at(now);
        tracker.record_hashes(10);
        tracker.reset();

        assert_eq!(tracker.pending_hashes(), 0);
        assert_eq!(tracker.current_rate(), HashRate(0));
        assert_eq!(tracker.merge_at(now + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_concurrent_merges_never_double_count() {
        let tracker = Arc::new(HashRateTracker::new());
        let start = Instant::now();
        tracker.merge_at(start);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for _ in 0..50_000 {
                        tracker.record_hashes(1);
                    }
                })
            })
            .collect();

        // One merge per simulated second, so each rate equals its hash count.
        let mut merged = 0u64;
        let mut now = start;
        for _ in 0..50 {
            now += Duration::from_secs(1);
            merged += tracker.merge_at(now).unwrap().0;
        }
        for worker in workers {
            worker.join().unwrap();
        }
        now += Duration::from_secs(1);
        merged += tracker.merge_at(now).unwrap().0;

        assert_eq!(merged, 200_000);
    }
}

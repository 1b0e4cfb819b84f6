//! CPU tick snapshots and the circular history they are buffered in.

use super::StatsError;

/// History length used by the monitor: one slot per second for a minute.
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

/// Cumulative CPU time counters since boot.
///
/// Two snapshots taken at different times give the load over the interval
/// between them, see [`CpuSnapshot::load_since`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuSnapshot {
    /// Per-category tick counters, as reported by Linux `/proc/stat`.
    Ticks {
        user: u64,
        user_low: u64,
        sys: u64,
        idle: u64,
    },

    /// Idle and total tick counters.
    Totals { idle: u64, total: u64 },
}

impl CpuSnapshot {
    /// Busy percentage (0–100) between `earlier` and `self`.
    ///
    /// Fails with [`StatsError::CounterOverflow`] if any counter went
    /// backwards. An interval with no elapsed ticks reads as idle.
    pub fn load_since(&self, earlier: &CpuSnapshot) -> Result<f64, StatsError> {
        let (busy, total) = match (earlier, self) {
            (
                CpuSnapshot::Ticks {
                    user: u0,
                    user_low: l0,
                    sys: s0,
                    idle: i0,
                },
                CpuSnapshot::Ticks {
                    user: u1,
                    user_low: l1,
                    sys: s1,
                    idle: i1,
                },
            ) => {
                let busy = delta(*u0, *u1)? + delta(*l0, *l1)? + delta(*s0, *s1)?;
                (busy, busy + delta(*i0, *i1)?)
            }
            (
                CpuSnapshot::Totals {
                    idle: i0,
                    total: t0,
                },
                CpuSnapshot::Totals {
                    idle: i1,
                    total: t1,
                },
            ) => {
                let idle = delta(*i0, *i1)?;
                let total = delta(*t0, *t1)?;
                (total.saturating_sub(idle), total)
            }
            _ => return Err(StatsError::MismatchedSnapshots),
        };

        if total == 0 {
            return Ok(0.0);
        }
        Ok(busy as f64 * 100.0 / total as f64)
    }
}

fn delta(before: u64, after: u64) -> Result<u64, StatsError> {
    after.checked_sub(before).ok_or(StatsError::CounterOverflow)
}

/// Fixed-capacity ring of snapshots, newest overwriting oldest.
#[derive(Debug, Clone)]
pub struct ResourceHistory {
    slots: Vec<CpuSnapshot>,
    capacity: usize,
    /// Index the next push writes to.
    head: usize,
    count: usize,
}

impl ResourceHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            count: 0,
        }
    }

    pub fn push(&mut self, snapshot: CpuSnapshot) {
        if self.slots.len() < self.capacity {
            self.slots.push(snapshot);
        } else {
            self.slots[self.head] = snapshot;
        }
        self.head = (self.head + 1) % self.capacity;
        self.count = (self.count + 1).min(self.capacity);
    }

    /// True once the ring has been filled.
    pub fn is_buffered(&self) -> bool {
        self.count == self.capacity
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
        self.count = 0;
    }

    /// Snapshot taken `age` pushes before the newest one.
    pub fn get(&self, age: usize) -> Option<CpuSnapshot> {
        if age >= self.count {
            return None;
        }
        let newest = (self.head + self.capacity - 1) % self.capacity;
        let index = (newest + self.capacity - age) % self.capacity;
        Some(self.slots[index])
    }

    /// Load over roughly the last `seconds` seconds.
    ///
    /// Returns `None` when the history cannot answer without blocking: fewer
    /// than `seconds` samples held, or `seconds` beyond capacity. The span is
    /// clamped to the oldest sample held, so a full 60-slot ring answers a
    /// 60 second query from 59 seconds of data.
    pub fn usage_over(&self, seconds: usize) -> Option<Result<f64, StatsError>> {
        if self.count == 0 || seconds > self.capacity || self.count < seconds {
            return None;
        }
        let age = seconds.min(self.count - 1);
        let newest = self.get(0)?;
        let older = self.get(age)?;
        Some(newest.load_since(&older))
    }
}

impl Default for ResourceHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

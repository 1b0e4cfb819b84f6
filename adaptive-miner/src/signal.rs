//! Blocking coordination primitives for the miner's OS threads.
//!
//! The engine runs plain `std::thread`s rather than Tokio tasks, so these
//! play the part a `CancellationToken` plays elsewhere: a flag that loops
//! poll cheaply, plus a condition variable so sleeping threads wake as soon
//! as the flag changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Cooperative stop flag with interruptible sleeps.
#[derive(Debug)]
pub struct StopSignal {
    stopped: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
}

impl StopSignal {
    /// Create a signal in the running state.
    pub fn new() -> Self {
        Self::with_state(false)
    }

    /// Create a signal that starts out stopped.
    pub fn stopped() -> Self {
        Self::with_state(true)
    }

    fn with_state(stopped: bool) -> Self {
        Self {
            stopped: AtomicBool::new(stopped),
            lock: Mutex::new(()),
            cvar: Condvar::new(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Set the flag and wake every sleeper.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let _guard = self.lock.lock();
        self.cvar.notify_all();
    }

    /// Clear the flag so loops can run again.
    pub fn reset(&self) {
        self.stopped.store(false, Ordering::Release);
    }

    /// Sleep for `duration` or until stopped. Returns whether the signal is
    /// stopped on return.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.lock.lock();
        while !self.is_stopped() {
            if self.cvar.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_stopped()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Reference-counted pause shared by independent callers.
///
/// Each [`pause`](Self::pause) must be matched by one
/// [`resume`](Self::resume); hashing continues only when the count is back
/// at zero. The count saturates at zero instead of going negative.
#[derive(Debug, Default)]
pub struct PauseGate {
    count: Mutex<u32>,
    paused: AtomicBool,
    cvar: Condvar,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pauser. Returns the new count.
    pub fn pause(&self) -> u32 {
        let mut count = self.count.lock();
        *count = count.saturating_add(1);
        self.paused.store(true, Ordering::Release);
        *count
    }

    /// Remove a pauser. Returns the new count, or `None` if there was no
    /// pauser to remove.
    pub fn resume(&self) -> Option<u32> {
        let mut count = self.count.lock();
        if *count == 0 {
            return None;
        }
        *count -= 1;
        if *count == 0 {
            self.paused.store(false, Ordering::Release);
            self.cvar.notify_all();
        }
        Some(*count)
    }

    pub fn pausers(&self) -> u32 {
        *self.count.lock()
    }

    /// Lock-free check for the hashing loop.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Block while paused, for at most `timeout`.
    pub fn wait(&self, timeout: Duration) {
        let mut count = self.count.lock();
        if *count > 0 {
            self.cvar.wait_for(&mut count, timeout);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_sleep_times_out_when_running() {
        let signal = StopSignal::new();
        let start = Instant::now();
        assert!(!signal.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_stop_interrupts_sleep() {
        let signal = Arc::new(StopSignal::new());
        let sleeper = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                let start = Instant::now();
                let stopped = signal.sleep(Duration::from_secs(30));
                (stopped, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        signal.stop();
        let (stopped, elapsed) = sleeper.join().unwrap();
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_stopped_signal_returns_immediately() {
        let signal = StopSignal::stopped();
        assert!(signal.sleep(Duration::from_secs(30)));
        signal.reset();
        assert!(!signal.is_stopped());
    }

    #[test]
    fn test_pause_is_reference_counted() {
        let gate = PauseGate::new();
        assert_eq!(gate.pause(), 1);
        assert_eq!(gate.pause(), 2);
        assert_eq!(gate.resume(), Some(1));
        assert!(gate.is_paused());
        assert_eq!(gate.resume(), Some(0));
        assert!(!gate.is_paused());
    }

    #[test]
    fn test_resume_without_pause_saturates() {
        let gate = PauseGate::new();
        assert_eq!(gate.resume(), None);
        assert_eq!(gate.pausers(), 0);
        assert_eq!(gate.pause(), 1);
        assert!(gate.is_paused());
    }

    #[test]
    fn test_resume_wakes_waiter() {
        let gate = Arc::new(PauseGate::new());
        gate.pause();

        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let start = Instant::now();
                gate.wait(Duration::from_secs(30));
                start.elapsed()
            })
        };

        thread::sleep(Duration::from_millis(50));
        gate.resume();
        assert!(waiter.join().unwrap() < Duration::from_secs(5));
    }
}

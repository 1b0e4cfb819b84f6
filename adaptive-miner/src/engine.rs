//! The mining coordinator the node talks to.
//!
//! [`MiningEngine`] owns the template store, the worker pool, the hash-rate
//! tracker, the resource monitor and (when CPU or battery saving is on) the
//! adaptive controller thread. The node drives it through `start`/`stop`,
//! `pause`/`resume`, template updates and a periodic `on_idle` call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use crate::config::MinerOptions;
use crate::controller::{AdaptiveController, ControlCommand, ControllerConfig, ControllerState};
use crate::extra_nonce::{ExtraMessagesError, ExtraNonceRotation};
use crate::hash_thread::{BlockSink, WorkerContext, WorkerPool};
use crate::hashrate::HashRateTracker;
use crate::node::{
    AddressError, BlockCandidate, MinerHandler, MiningAddress, PowHasher, TemplateError,
};
use crate::resource::{PlatformStats, ResourceMonitor, UsageProbe};
use crate::signal::{PauseGate, StopSignal};
use crate::template::BlockTemplateStore;
use crate::tracing::prelude::*;
use crate::types::{Difficulty, HashRate};

const TEMPLATE_REFRESH_PERIOD: Duration = Duration::from_secs(5);
const HASHRATE_MERGE_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum MinerError {
    #[error("miner is already running")]
    AlreadyMining,

    #[error("mining threads from a previous run are still active")]
    ThreadsActive,

    #[error("thread count must be at least 1")]
    InvalidThreadCount,

    #[error("invalid mining address: {0}")]
    Address(#[from] AddressError),

    #[error("no mining address configured")]
    NoAddress,

    #[error(transparent)]
    ExtraMessages(#[from] ExtraMessagesError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Point-in-time view for the operator surface.
#[derive(Debug, Clone)]
pub struct MinerStatus {
    pub mining: bool,
    pub paused: bool,
    pub threads: u32,
    pub address: Option<MiningAddress>,
    pub speed: HashRate,
    pub average_speed: HashRate,
    pub cpu_saving: bool,
    pub battery_saving: bool,
    /// `None` unless the adaptive controller is running.
    pub controller: Option<ControllerState>,
}

#[derive(Debug, Default)]
struct Settings {
    address: Option<MiningAddress>,
    threads: u32,
    cpu_saving: bool,
    battery_saving: bool,
    /// Set by `init` when the operator asked to mine from startup.
    mining_requested: bool,
}

/// Fires at most once per period; the first call always fires.
#[derive(Debug)]
struct IntervalGate {
    period: Duration,
    last: Option<Instant>,
}

impl IntervalGate {
    fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    fn due(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[derive(Debug)]
struct IdleTimers {
    template_refresh: IntervalGate,
    hashrate_merge: IntervalGate,
}

/// State shared with worker and controller threads.
struct Shared {
    handler: Arc<dyn MinerHandler>,
    hasher: Arc<dyn PowHasher>,
    templates: Arc<BlockTemplateStore>,
    hashrate: Arc<HashRateTracker>,
    pause: Arc<PauseGate>,
    stop: Arc<StopSignal>,
    monitor: Arc<ResourceMonitor>,
    controller_config: ControllerConfig,
    settings: Mutex<Settings>,
    rotation: Mutex<ExtraNonceRotation>,
    /// Serializes found-block submissions.
    found_lock: Mutex<()>,
    controller_state: Mutex<Option<ControllerState>>,
    print_hashrate: AtomicBool,
    timers: Mutex<IdleTimers>,
}

#[derive(Default)]
struct Threads {
    workers: Option<WorkerPool>,
    controller: Option<JoinHandle<()>>,
}

pub struct MiningEngine {
    shared: Arc<Shared>,
    threads: Mutex<Threads>,
}

impl MiningEngine {
    pub fn new(
        handler: Arc<dyn MinerHandler>,
        hasher: Arc<dyn PowHasher>,
        platform: Arc<dyn PlatformStats>,
        controller_config: ControllerConfig,
    ) -> Self {
        let controller_config = controller_config.covering_history();
        let monitor = ResourceMonitor::with_capacity(platform, controller_config.history_capacity);
        Self {
            shared: Arc::new(Shared {
                handler,
                hasher,
                templates: Arc::new(BlockTemplateStore::new()),
                hashrate: Arc::new(HashRateTracker::new()),
                pause: Arc::new(PauseGate::new()),
                stop: Arc::new(StopSignal::stopped()),
                monitor: Arc::new(monitor),
                controller_config,
                settings: Mutex::new(Settings {
                    threads: 1,
                    ..Settings::default()
                }),
                rotation: Mutex::new(ExtraNonceRotation::disabled()),
                found_lock: Mutex::new(()),
                controller_state: Mutex::new(None),
                print_hashrate: AtomicBool::new(false),
                timers: Mutex::new(IdleTimers {
                    template_refresh: IntervalGate::new(TEMPLATE_REFRESH_PERIOD),
                    hashrate_merge: IntervalGate::new(HASHRATE_MERGE_PERIOD),
                }),
            }),
            threads: Mutex::new(Threads::default()),
        }
    }

    /// Apply startup options: load extra messages and remember the address
    /// to mine to once the node is synchronized.
    pub fn init(&self, options: &MinerOptions) -> Result<(), MinerError> {
        if let Some(path) = &options.extra_messages_file {
            *self.shared.rotation.lock() = ExtraNonceRotation::load(path)?;
        }

        if let Some(address) = &options.start_mining {
            let address: MiningAddress = address.parse()?;
            let threads = options.mining_threads.unwrap_or(1);
            if threads == 0 {
                return Err(MinerError::InvalidThreadCount);
            }

            info!(%address, threads, "Mining requested, waiting for node to synchronize");
            let mut settings = self.shared.settings.lock();
            settings.address = Some(address);
            settings.threads = threads;
            settings.cpu_saving = options.cpu_saving;
            settings.battery_saving = options.battery_saving;
            settings.mining_requested = true;
        }

        Ok(())
    }

    /// Start mining if `init` asked for it.
    pub fn on_synchronized(&self) -> Result<(), MinerError> {
        let (address, threads, cpu_saving, battery_saving) = {
            let settings = self.shared.settings.lock();
            match (&settings.address, settings.mining_requested) {
                (Some(address), true) => (
                    address.clone(),
                    settings.threads,
                    settings.cpu_saving,
                    settings.battery_saving,
                ),
                _ => return Ok(()),
            }
        };
        self.start(address, threads, cpu_saving, battery_saving)
    }

    /// Start `threads` workers mining to `address`.
    ///
    /// With CPU or battery saving on, a controller thread launches the
    /// workers and then pauses and resumes them as host conditions change.
    pub fn start(
        &self,
        address: MiningAddress,
        threads: u32,
        cpu_saving: bool,
        battery_saving: bool,
    ) -> Result<(), MinerError> {
        if threads == 0 {
            return Err(MinerError::InvalidThreadCount);
        }

        let mut running = self.threads.lock();
        let adaptive = cpu_saving || battery_saving;
        if self.is_mining() && !adaptive {
            error!("Starting miner but it is already running");
            return Err(MinerError::AlreadyMining);
        }
        if running.workers.is_some() || running.controller.is_some() {
            error!("Unable to start miner, mining threads are still active");
            return Err(MinerError::ThreadsActive);
        }

        {
            let mut settings = self.shared.settings.lock();
            settings.address = Some(address.clone());
            settings.threads = threads;
            settings.cpu_saving = cpu_saving;
            settings.battery_saving = battery_saving;
        }

        if let Err(e) = self.shared.request_block_template() {
            warn!(error = %e, "No block template yet, workers will wait for one");
        }
        self.shared.templates.reseed();
        self.shared.hashrate.reset();
        self.shared.stop.reset();

        if adaptive {
            if cpu_saving {
                self.shared.monitor.start();
            }
            let probe: Arc<dyn UsageProbe> = self.shared.monitor.clone();
            let controller = AdaptiveController::new(
                self.shared.controller_config.clone(),
                probe,
                cpu_saving,
                battery_saving,
            );
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name("adaptive-controller".into())
                .spawn(move || shared.run_controller(controller, threads))
                .expect("failed to spawn adaptive controller thread");
            running.controller = Some(handle);
        } else {
            running.workers = Some(WorkerPool::spawn(&self.shared.worker_context(), threads));
        }

        info!(%address, threads, cpu_saving, battery_saving, "Mining started");
        Ok(())
    }

    /// Stop all mining threads and wait for them. Returns `false` if nothing
    /// was running.
    pub fn stop(&self) -> bool {
        // Raised under the lock so a concurrent `start` cannot clear it.
        let mut running = self.threads.lock();
        self.shared.stop.stop();

        let controller = running.controller.take();
        let workers = running.workers.take();
        if controller.is_none() && workers.is_none() {
            trace!("Not mining, nothing to stop");
            return false;
        }

        if let Some(handle) = controller {
            if handle.join().is_err() {
                error!("Adaptive controller thread panicked");
            }
        }
        if let Some(pool) = workers {
            pool.join();
        }
        self.shared.monitor.stop();

        {
            let mut settings = self.shared.settings.lock();
            settings.cpu_saving = false;
            settings.battery_saving = false;
        }

        info!("Mining stopped");
        true
    }

    pub fn pause(&self) {
        self.shared.pause_mining();
    }

    pub fn resume(&self) {
        self.shared.resume_mining();
    }

    pub fn is_mining(&self) -> bool {
        self.shared.is_mining()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.pause.is_paused()
    }

    /// Most recent merged hash rate; zero when not mining.
    pub fn speed(&self) -> HashRate {
        if self.is_mining() {
            self.shared.hashrate.current_rate()
        } else {
            HashRate(0)
        }
    }

    pub fn average_speed(&self) -> HashRate {
        self.shared.hashrate.average_rate()
    }

    pub fn address(&self) -> Option<MiningAddress> {
        self.shared.settings.lock().address.clone()
    }

    pub fn thread_count(&self) -> u32 {
        self.shared.settings.lock().threads
    }

    pub fn controller_state(&self) -> Option<ControllerState> {
        *self.shared.controller_state.lock()
    }

    pub fn status(&self) -> MinerStatus {
        let settings = self.shared.settings.lock();
        MinerStatus {
            mining: self.is_mining(),
            paused: self.is_paused(),
            threads: settings.threads,
            address: settings.address.clone(),
            speed: self.speed(),
            average_speed: self.average_speed(),
            cpu_saving: settings.cpu_saving,
            battery_saving: settings.battery_saving,
            controller: self.controller_state(),
        }
    }

    /// Log the hash rate after every merge.
    pub fn set_print_hashrate(&self, enabled: bool) {
        self.shared.print_hashrate.store(enabled, Ordering::Relaxed);
    }

    /// Install a template built by the caller. Returns its version.
    pub fn set_block_template(
        &self,
        candidate: BlockCandidate,
        difficulty: Difficulty,
        height: u64,
    ) -> u64 {
        self.shared.templates.set(candidate, difficulty, height)
    }

    /// Fetch a fresh template from the node and install it.
    pub fn request_block_template(&self) -> Result<u64, MinerError> {
        self.shared.request_block_template()
    }

    /// The chain tip changed; refresh the template if mining.
    pub fn on_block_chain_update(&self) {
        if !self.is_mining() {
            return;
        }
        if let Err(e) = self.shared.request_block_template() {
            warn!(error = %e, "Failed to refresh block template");
        }
    }

    /// Periodic housekeeping. The node calls this from its idle loop.
    pub fn on_idle(&self) {
        self.on_idle_at(Instant::now());
    }

    /// [`on_idle`](Self::on_idle) at an explicit time.
    pub fn on_idle_at(&self, now: Instant) {
        let (refresh, merge) = {
            let mut timers = self.shared.timers.lock();
            (
                timers.template_refresh.due(now),
                timers.hashrate_merge.due(now),
            )
        };

        if refresh {
            self.on_block_chain_update();
        }
        if merge {
            self.shared.merge_hashrate(now);
        }
    }
}

impl Drop for MiningEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn is_mining(&self) -> bool {
        !self.stop.is_stopped()
    }

    fn worker_context(self: &Arc<Self>) -> WorkerContext {
        WorkerContext {
            templates: Arc::clone(&self.templates),
            hashrate: Arc::clone(&self.hashrate),
            pause: Arc::clone(&self.pause),
            stop: Arc::clone(&self.stop),
            hasher: Arc::clone(&self.hasher),
            sink: Arc::clone(self) as Arc<dyn BlockSink>,
        }
    }

    fn request_block_template(&self) -> Result<u64, MinerError> {
        let address = self
            .settings
            .lock()
            .address
            .clone()
            .ok_or(MinerError::NoAddress)?;
        let extra_nonce = self.rotation.lock().current().to_vec();

        let template = self.handler.get_block_template(&address, &extra_nonce)?;
        let height = template.height;
        let difficulty = template.difficulty;
        let version = self
            .templates
            .set(template.candidate, template.difficulty, template.height);
        debug!(version, height, %difficulty, "Installed block template");
        Ok(version)
    }

    fn pause_mining(&self) {
        let pausers = self.pause.pause();
        if pausers == 1 && self.is_mining() {
            info!("Mining paused");
        } else {
            debug!(pausers, "Pause requested");
        }
    }

    fn resume_mining(&self) {
        match self.pause.resume() {
            None => warn!("Resume requested but mining is not paused"),
            Some(0) => {
                if self.is_mining() {
                    info!("Mining resumed");
                }
            }
            Some(pausers) => debug!(pausers, "Still paused by other callers"),
        }
    }

    fn merge_hashrate(&self, now: Instant) {
        if !self.is_mining() {
            // Keep the last run's window; restart the clock for the next one.
            self.hashrate.reset();
            return;
        }
        let Some(rate) = self.hashrate.merge_at(now) else {
            return;
        };
        if self.print_hashrate.load(Ordering::Relaxed) {
            info!(
                current = %rate,
                average = %self.hashrate.average_rate(),
                "Hash rate"
            );
        }
    }

    /// Controller thread body: launch the workers, then steer them until
    /// stop. The workers are joined here so `stop` only waits on this thread.
    fn run_controller(self: Arc<Self>, controller: AdaptiveController, threads: u32) {
        let pool = WorkerPool::spawn(&self.worker_context(), threads);

        let held_pause = controller.run(&self.stop, |command, state| {
            *self.controller_state.lock() = Some(state);
            match command {
                Some(ControlCommand::Pause(reason)) => {
                    info!(%reason, "Adaptive controller pausing mining");
                    self.pause_mining();
                }
                Some(ControlCommand::Resume) => {
                    info!("Adaptive controller resuming mining");
                    self.resume_mining();
                }
                None => {}
            }
        });

        if held_pause {
            self.resume_mining();
        }
        pool.join();
        *self.controller_state.lock() = None;
    }
}

impl BlockSink for Shared {
    fn submit(&self, block: &BlockCandidate, height: u64) -> bool {
        let _serialized = self.found_lock.lock();

        self.rotation.lock().advance();
        let accepted = self.handler.handle_block_found(block);

        let mut rotation = self.rotation.lock();
        if accepted {
            info!(height, nonce = block.nonce, "Block accepted by node");
            if let Err(e) = rotation.persist() {
                warn!(error = %e, "Failed to persist extra message index");
            }
        } else {
            warn!(height, nonce = block.nonce, "Block rejected by node");
            rotation.rollback();
        }
        accepted
    }
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::ControllerConfig;
use super::state::{ControllerState, PauseReason};
use super::trigger::DebouncedTrigger;
use crate::resource::UsageProbe;
use crate::signal::StopSignal;
use crate::tracing::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause(PauseReason),
    Resume,
}

/// Pauses and resumes mining based on CPU load and battery state.
///
/// Each [`tick`](Self::tick) looks at the host once. Adverse readings arm a
/// trigger; the transition commits only if a fresh reading taken after
/// `double_check_period` still agrees. Readings that cannot be taken count
/// as unknown: nothing arms and nothing commits.
pub struct AdaptiveController {
    config: ControllerConfig,
    probe: Arc<dyn UsageProbe>,
    cpu_saving: bool,
    battery_saving: bool,
    paused: bool,
    cpu_trigger: DebouncedTrigger,
    battery_trigger: DebouncedTrigger,
    resume_trigger: DebouncedTrigger,
}

impl AdaptiveController {
    pub fn new(
        config: ControllerConfig,
        probe: Arc<dyn UsageProbe>,
        cpu_saving: bool,
        battery_saving: bool,
    ) -> Self {
        let debounce = config.double_check_period;
        Self {
            config,
            probe,
            cpu_saving,
            battery_saving,
            paused: false,
            cpu_trigger: DebouncedTrigger::new(debounce),
            battery_trigger: DebouncedTrigger::new(debounce),
            resume_trigger: DebouncedTrigger::new(debounce),
        }
    }

    /// Run until `stop` fires. After every tick `on_tick` receives the
    /// committed transition, if any, and the resulting state. Returns whether
    /// the controller still holds a pause.
    pub fn run(
        mut self,
        stop: &StopSignal,
        mut on_tick: impl FnMut(Option<ControlCommand>, ControllerState),
    ) -> bool {
        debug!(
            cpu_saving = self.cpu_saving,
            battery_saving = self.battery_saving,
            period_s = self.config.system_check_period.as_secs(),
            "Adaptive controller started"
        );

        while !stop.is_stopped() {
            let command = self.tick(Instant::now());
            on_tick(command, self.state());
            if stop.sleep(self.config.system_check_period) {
                break;
            }
        }

        debug!(state = self.state().name(), "Adaptive controller stopped");
        self.paused
    }

    pub fn state(&self) -> ControllerState {
        if self.paused {
            return match self.resume_trigger.armed_at() {
                Some(since) => ControllerState::PendingResume { since },
                None => ControllerState::Paused,
            };
        }

        if let Some(since) = self.cpu_trigger.armed_at() {
            ControllerState::PendingPause {
                reason: PauseReason::CpuUsage,
                since,
            }
        } else if let Some(since) = self.battery_trigger.armed_at() {
            ControllerState::PendingPause {
                reason: PauseReason::Battery,
                since,
            }
        } else {
            ControllerState::Running
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Probe the host once and return the transition to apply, if any.
    pub fn tick(&mut self, now: Instant) -> Option<ControlCommand> {
        if self.paused {
            self.watch_for_resume(now)
        } else {
            self.watch_for_pause(now)
        }
    }

    fn watch_for_pause(&mut self, now: Instant) -> Option<ControlCommand> {
        if self.cpu_saving {
            if self.cpu_trigger.is_due(now) {
                match self.cpu_usage(self.config.double_check_period) {
                    Some(usage) if usage > self.config.cpu_usage_threshold => {
                        info!(usage_pct = %format!("{usage:.1}"), "Pausing miner due to high CPU usage");
                        return Some(self.commit_pause(PauseReason::CpuUsage));
                    }
                    Some(usage) => {
                        debug!(usage_pct = %format!("{usage:.1}"), "CPU usage settled, pause cancelled");
                        self.cpu_trigger.disarm();
                    }
                    None => {}
                }
            } else if !self.cpu_trigger.is_armed() {
                if let Some(usage) = self.cpu_usage(self.config.cpu_usage_check_period) {
                    if usage > self.config.cpu_usage_threshold {
                        debug!(usage_pct = %format!("{usage:.1}"), "High CPU usage, double-checking");
                        self.cpu_trigger.arm(now);
                    }
                }
            }
        }

        if self.battery_saving {
            if self.battery_trigger.is_due(now) {
                match self.battery_charging() {
                    Some(false) => {
                        info!("Pausing miner because battery is discharging");
                        return Some(self.commit_pause(PauseReason::Battery));
                    }
                    Some(true) => {
                        debug!("Battery charging again, pause cancelled");
                        self.battery_trigger.disarm();
                    }
                    None => {}
                }
            } else if !self.battery_trigger.is_armed() && self.battery_charging() == Some(false) {
                debug!("Battery not charging, double-checking");
                self.battery_trigger.arm(now);
            }
        }

        None
    }

    fn watch_for_resume(&mut self, now: Instant) -> Option<ControlCommand> {
        if self.resume_trigger.is_due(now) {
            match self.conditions_favorable(self.config.double_check_period) {
                Some(true) => {
                    info!("Resuming miner");
                    self.paused = false;
                    self.clear_triggers();
                    return Some(ControlCommand::Resume);
                }
                Some(false) => {
                    debug!("Conditions turned adverse again, resume cancelled");
                    self.resume_trigger.disarm();
                }
                None => {}
            }
        } else if !self.resume_trigger.is_armed()
            && self.conditions_favorable(self.config.cpu_usage_check_period) == Some(true)
        {
            debug!("Conditions favorable, double-checking before resuming");
            self.resume_trigger.arm(now);
        }

        None
    }

    fn commit_pause(&mut self, reason: PauseReason) -> ControlCommand {
        self.paused = true;
        self.clear_triggers();
        ControlCommand::Pause(reason)
    }

    fn clear_triggers(&mut self) {
        self.cpu_trigger.disarm();
        self.battery_trigger.disarm();
        self.resume_trigger.disarm();
    }

    /// Both signals favorable, with CPU averaged over `cpu_period`. A
    /// disabled feature is always favorable. `None` if either is unknown.
    fn conditions_favorable(&self, cpu_period: Duration) -> Option<bool> {
        let cpu_ok = if self.cpu_saving {
            self.cpu_usage(cpu_period)? <= self.config.cpu_usage_threshold
        } else {
            true
        };
        let battery_ok = if self.battery_saving {
            self.battery_charging()?
        } else {
            true
        };
        Some(cpu_ok && battery_ok)
    }

    /// CPU usage over `period`, or `None` when it cannot be read without
    /// blocking the controller.
    fn cpu_usage(&self, period: Duration) -> Option<f64> {
        if !self.probe.is_buffered() {
            trace!("CPU usage history not buffered yet");
            return None;
        }
        match self.probe.usage_over(period.as_secs() as u32) {
            Ok(usage) => Some(usage),
            Err(e) => {
                warn!(error = %e, "CPU usage unavailable");
                None
            }
        }
    }

    fn battery_charging(&self) -> Option<bool> {
        match self.probe.battery_charging() {
            Ok(charging) => Some(charging),
            Err(e) => {
                warn!(error = %e, "Battery state unavailable");
                None
            }
        }
    }
}

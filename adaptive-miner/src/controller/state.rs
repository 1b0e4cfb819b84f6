use std::time::Instant;

/// Why the controller wants mining paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum PauseReason {
    #[strum(serialize = "high CPU usage")]
    CpuUsage,

    #[strum(serialize = "battery discharging")]
    Battery,
}

/// Observable state of the adaptive controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Mining, no adverse reading pending.
    Running,

    /// Mining, an adverse reading is waiting for its confirming re-check.
    PendingPause { reason: PauseReason, since: Instant },

    /// Paused by the controller, conditions not yet favorable.
    Paused,

    /// Paused, favorable readings are waiting for their re-check.
    PendingResume { since: Instant },
}

impl ControllerState {
    /// Whether the controller currently holds a pause.
    pub fn is_paused(&self) -> bool {
        matches!(
            self,
            ControllerState::Paused | ControllerState::PendingResume { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControllerState::Running => "running",
            ControllerState::PendingPause { .. } => "pending-pause",
            ControllerState::Paused => "paused",
            ControllerState::PendingResume { .. } => "pending-resume",
        }
    }
}

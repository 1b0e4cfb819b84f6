//! Adaptive pause/resume of mining based on host conditions.

mod adaptive;
mod config;
mod state;
mod trigger;

pub use adaptive::{AdaptiveController, ControlCommand};
pub use config::ControllerConfig;
pub use state::{ControllerState, PauseReason};
pub use trigger::DebouncedTrigger;

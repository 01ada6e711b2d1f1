//! Asynchronous host bridge
//!
//! Hosts that do not own a frame loop push [`HostInput`]s into a channel and
//! receive one [`FrameReport`](crate::system::FrameReport) per frame. The
//! [`frame_driver`] machine collects, processes and publishes on a fixed
//! interval. [`session`] reads scripted inputs for offline replay.

pub mod frame_driver;
pub mod session;

pub use frame_driver::{FrameDriver, FrameDriverHandle, FrameState};
pub use session::{ReplayFrame, ReplaySession};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;
use crate::controller::{Axis2, ControllerHandle, LogicalButton, RawSample};
use crate::interaction::{CandidateId, OverlapSource, Request};
use crate::system::InteractionSystem;

/// One host report, applied to the system before the next tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostInput {
    Connect {
        controller: ControllerHandle,
    },
    Disconnect {
        controller: ControllerHandle,
    },
    Sample {
        controller: ControllerHandle,
        button: LogicalButton,
        #[serde(default)]
        pressed: bool,
        #[serde(default)]
        touched: bool,
        #[serde(default)]
        axis: Axis2,
    },
    OverlapEnter {
        source: OverlapSource,
        candidate: CandidateId,
    },
    OverlapExit {
        source: OverlapSource,
        candidate: CandidateId,
    },
    /// Pointer ray target, missing for nothing hit
    Hover {
        controller: ControllerHandle,
        target: Option<CandidateId>,
    },
    /// Pulse schedule, fields left out fall back to the configured defaults
    Haptic {
        controller: ControllerHandle,
        strength: Option<f32>,
        duration: Option<f32>,
        interval: Option<f32>,
    },
    Request {
        request: Request,
    },
}

impl HostInput {
    pub fn sample(controller: ControllerHandle, button: LogicalButton, sample: RawSample) -> Self {
        HostInput::Sample {
            controller,
            button,
            pressed: sample.pressed,
            touched: sample.touched,
            axis: sample.axis,
        }
    }

    /// Hands the input to the system; takes effect on its next tick
    pub fn apply(self, system: &mut InteractionSystem) {
        match self {
            HostInput::Connect { controller } => {
                if !system.connect_controller(controller) {
                    debug!("{} was already connected", controller);
                }
            }
            HostInput::Disconnect { controller } => {
                if !system.disconnect_controller(controller) {
                    debug!("{} was not connected", controller);
                }
            }
            HostInput::Sample {
                controller,
                button,
                pressed,
                touched,
                axis,
            } => system.report_button_sample(
                controller,
                button,
                RawSample::new(pressed, touched, axis),
            ),
            HostInput::OverlapEnter { source, candidate } => {
                system.report_overlap_enter(source, candidate)
            }
            HostInput::OverlapExit { source, candidate } => {
                system.report_overlap_exit(source, candidate)
            }
            HostInput::Hover { controller, target } => {
                system.report_pointer_hover(controller, target)
            }
            HostInput::Haptic {
                controller,
                strength,
                duration,
                interval,
            } => {
                let defaults = system.haptic_defaults();
                system.request_haptic_pulse(
                    controller,
                    strength.unwrap_or(defaults.strength),
                    duration.unwrap_or(defaults.duration),
                    interval.unwrap_or(defaults.interval),
                );
            }
            HostInput::Request { request } => system.request(request),
        }
    }
}

/// Timing and buffering of the frame driver task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub frame_interval_ms: u64,
    pub input_buffer: usize,
    pub report_buffer: usize,
    pub stats_interval_secs: i64,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            frame_interval_ms: 11,
            input_buffer: 1000,
            report_buffer: 100,
            stats_interval_secs: 30,
        }
    }
}

impl HostSettings {
    /// Fixed timestep handed to every tick, in seconds
    pub fn frame_delta(&self) -> f32 {
        self.frame_interval_ms as f32 / 1000.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Host input channel disconnected")]
    InputDisconnected,

    #[error("Frame report channel closed")]
    ReportChannelClosed,

    #[error("Failed to set up the interaction system: {0}")]
    Config(#[from] ConfigError),

    #[error("Frame driver task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

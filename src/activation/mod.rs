//! Timed activation helpers
//!
//! Countdown based behaviour shared by pointers and haptics. Nothing in here
//! reads a clock; every timer advances by the delta passed to `tick`.

pub mod haptics;
pub mod pointer;
pub mod timer;

pub use haptics::{
    clamp_strength, HapticPulse, HapticScheduler, HapticSettings, HapticSink, TracingHapticSink,
};
pub use pointer::{ActivationMode, ClickMethod, Pointer, PointerConfig};
pub use timer::{TimedActivation, TimerSet, TimerStatus};

use crate::controller::ControllerHandle;
use crate::interaction::{CandidateId, Request};

#[derive(Debug, Clone, PartialEq)]
pub enum ActivationEvent {
    PointerActivated {
        controller: ControllerHandle,
    },
    PointerDeactivated {
        controller: ControllerHandle,
    },
    HoverEntered {
        controller: ControllerHandle,
        candidate: CandidateId,
    },
    HoverExited {
        controller: ControllerHandle,
        candidate: CandidateId,
    },
    HapticPulse(HapticPulse),
}

/// Events and arbiter requests produced by one activation step
#[derive(Debug, Default)]
pub struct ActivationOutput {
    pub events: Vec<ActivationEvent>,
    pub requests: Vec<Request>,
}

impl ActivationOutput {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.requests.is_empty()
    }
}

//! Haptic pulse scheduling
//!
//! One schedule per controller. A new request cancels the running schedule
//! before it is installed, so nothing from the old schedule can fire after the
//! request returns. Pulses go out through a [`HapticSink`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::timer::{TimedActivation, TimerSet, TimerStatus};
use crate::controller::ControllerHandle;

/// One dispatched pulse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HapticPulse {
    pub controller: ControllerHandle,
    pub strength: f32,
}

/// Hardware side of haptic output
pub trait HapticSink: Send {
    fn pulse(&mut self, controller: ControllerHandle, strength: f32);
}

/// Sink that only logs, for hosts without rumble support
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHapticSink;

impl HapticSink for TracingHapticSink {
    fn pulse(&mut self, controller: ControllerHandle, strength: f32) {
        debug!("Haptic pulse on {} at {:.2}", controller, strength);
    }
}

/// Values used when a request leaves them out
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HapticSettings {
    pub strength: f32,
    /// Seconds
    pub duration: f32,
    /// Seconds between pulses; `0.0` pulses every frame
    pub interval: f32,
}

impl Default for HapticSettings {
    fn default() -> Self {
        Self {
            strength: 0.5,
            duration: 0.1,
            interval: 0.05,
        }
    }
}

/// Clamps to `[0, 1]`; NaN becomes silence
pub fn clamp_strength(strength: f32) -> f32 {
    if strength.is_nan() {
        0.0
    } else {
        strength.clamp(0.0, 1.0)
    }
}

#[derive(Debug)]
struct PulseTrain {
    strength: f32,
    interval: f32,
    /// Countdown to the next pulse, `None` until the first one went out
    next: Option<TimedActivation>,
}

impl PulseTrain {
    fn due(&mut self, dt: f32) -> bool {
        match self.next.as_mut() {
            None => {
                self.next = Some(TimedActivation::new(self.interval));
                true
            }
            Some(timer) => match timer.tick(dt) {
                TimerStatus::Fired => {
                    timer.reset();
                    true
                }
                _ => false,
            },
        }
    }
}

/// Schedule lifetimes live in a [`TimerSet`] keyed by controller, so the
/// token handed out by `request` is the one that ends the schedule.
#[derive(Debug, Default)]
pub struct HapticScheduler {
    lifetimes: TimerSet<ControllerHandle>,
    trains: BTreeMap<ControllerHandle, PulseTrain>,
}

impl HapticScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the controller's schedule. The first pulse fires on the next tick.
    pub fn request(
        &mut self,
        controller: ControllerHandle,
        strength: f32,
        duration: f32,
        interval: f32,
    ) -> CancellationToken {
        let train = PulseTrain {
            strength: clamp_strength(strength),
            interval,
            next: None,
        };
        if self.trains.insert(controller, train).is_some() {
            debug!("Cancelling running haptic schedule on {}", controller);
        }
        self.lifetimes.start(controller, duration)
    }

    pub fn cancel(&mut self, controller: ControllerHandle) -> bool {
        self.trains.remove(&controller);
        self.lifetimes.cancel(controller)
    }

    pub fn is_active(&self, controller: ControllerHandle) -> bool {
        self.lifetimes.is_running(controller)
    }

    /// Advances every schedule and sends due pulses to `sink`, in controller order
    ///
    /// A pulse due on the tick a schedule runs out still goes out.
    pub fn tick(&mut self, dt: f32, sink: &mut dyn HapticSink) -> Vec<HapticPulse> {
        let expired = self.lifetimes.tick(dt);
        let lifetimes = &self.lifetimes;
        let mut pulses = Vec::new();
        self.trains.retain(|controller, train| {
            let finished = expired.contains(controller);
            if !finished && !lifetimes.is_running(*controller) {
                return false;
            }
            if train.due(dt) {
                sink.pulse(*controller, train.strength);
                pulses.push(HapticPulse {
                    controller: *controller,
                    strength: train.strength,
                });
            }
            !finished
        });
        pulses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RIGHT: ControllerHandle = ControllerHandle::right(1);
    const LEFT: ControllerHandle = ControllerHandle::left(0);

    #[derive(Default)]
    struct Recorder(Vec<(ControllerHandle, f32)>);

    impl HapticSink for Recorder {
        fn pulse(&mut self, controller: ControllerHandle, strength: f32) {
            self.0.push((controller, strength));
        }
    }

    #[test]
    fn pulses_every_interval_until_duration() {
        let mut scheduler = HapticScheduler::new();
        let mut sink = Recorder::default();
        scheduler.request(RIGHT, 0.8, 1.0, 0.25);
        let mut count = 0;
        for _ in 0..8 {
            count += scheduler.tick(0.25, &mut sink).len();
        }
        assert_eq!(count, 4);
        assert!(!scheduler.is_active(RIGHT));
        assert_eq!(sink.0.len(), 4);
    }

    #[test]
    fn strength_is_clamped() {
        let mut scheduler = HapticScheduler::new();
        let mut sink = Recorder::default();
        scheduler.request(RIGHT, 3.0, 0.0, 0.1);
        scheduler.request(LEFT, -1.0, 0.0, 0.1);
        let pulses = scheduler.tick(0.1, &mut sink);
        assert_eq!(pulses[0].strength, 0.0);
        assert_eq!(pulses[1].strength, 1.0);
        assert_eq!(clamp_strength(f32::NAN), 0.0);
    }

    #[test]
    fn zero_duration_is_a_single_pulse() {
        let mut scheduler = HapticScheduler::new();
        let mut sink = Recorder::default();
        scheduler.request(RIGHT, 0.5, 0.0, 0.1);
        assert_eq!(scheduler.tick(0.1, &mut sink).len(), 1);
        assert!(scheduler.tick(0.1, &mut sink).is_empty());
    }

    #[test]
    fn non_positive_interval_pulses_each_tick() {
        let mut scheduler = HapticScheduler::new();
        let mut sink = Recorder::default();
        scheduler.request(RIGHT, 0.5, 1.0, 0.0);
        let counts: Vec<usize> = (0..5)
            .map(|_| scheduler.tick(0.25, &mut sink).len())
            .collect();
        assert_eq!(counts, vec![1, 1, 1, 1, 0]);
    }

    #[test]
    fn cancelled_token_stops_the_schedule() {
        let mut scheduler = HapticScheduler::new();
        let mut sink = Recorder::default();
        let token = scheduler.request(RIGHT, 0.5, 1.0, 0.0);
        assert_eq!(scheduler.tick(0.25, &mut sink).len(), 1);
        token.cancel();
        assert!(!scheduler.is_active(RIGHT));
        assert!(scheduler.tick(0.25, &mut sink).is_empty());
        assert!(!scheduler.cancel(RIGHT));
    }

    #[test]
    fn new_request_silences_the_old_schedule() {
        let mut scheduler = HapticScheduler::new();
        let mut sink = Recorder::default();
        let old = scheduler.request(RIGHT, 0.25, 1.0, 0.25);
        scheduler.tick(0.25, &mut sink);
        let new = scheduler.request(RIGHT, 0.75, 0.0, 0.25);
        assert!(old.is_cancelled());
        assert!(!new.is_cancelled());

        for _ in 0..4 {
            scheduler.tick(0.25, &mut sink);
        }
        let after_request: Vec<f32> = sink.0.iter().skip(1).map(|(_, s)| *s).collect();
        assert_eq!(after_request, vec![0.75]);
    }
}

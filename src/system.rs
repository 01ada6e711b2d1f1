//! Frame-driven facade over the whole interaction core
//!
//! The host reports samples, overlaps and pointer hits between frames; nothing
//! is applied until [`InteractionSystem::tick`]. One tick runs these stages in
//! order:
//!
//! 1. Button samples are captured into the sampler, controllers in ascending
//!    handle order, buttons in report order.
//! 2. Overlap reports are applied in report order. Snap tie-breaks use this order.
//! 3. Edges are routed to aliases, dispatched to subscribers, pointers and the
//!    arbiter.
//! 4. Pointer hits are applied, then host requests.
//! 5. Pointer timers, haptic schedules and queued follow-up requests advance.
//!
//! Every stage decides against the samples captured in stage 1.

use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activation::{
    ActivationEvent, ActivationOutput, HapticScheduler, HapticSettings, HapticSink, Pointer,
};
use crate::config::{ConfigError, InteractionConfig};
use crate::controller::{ButtonSampler, ControllerHandle, LogicalButton, PressType, RawSample};
use crate::interaction::{
    CandidateId, InteractionArbiter, InteractionCallback, InteractionEvent, OverlapSource,
    OwnershipState, Request, TransitionOutcome,
};
use crate::mapping::{
    AliasCallback, AliasEvent, AliasRouter, AliasSignal, AliasSnapshot, ButtonAlias, SubscriptionId,
};

/// Anything the core reports back to the host during a frame
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticEvent {
    Alias(AliasEvent),
    Interaction(InteractionEvent),
    Activation(ActivationEvent),
}

/// Everything that happened during one tick, in emission order
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame: u64,
    pub delta: f32,
    pub captured_at: DateTime<Local>,
    pub events: Vec<SemanticEvent>,
}

impl FrameReport {
    pub fn interactions(&self) -> impl Iterator<Item = &InteractionEvent> {
        self.events.iter().filter_map(|event| match event {
            SemanticEvent::Interaction(event) => Some(event),
            _ => None,
        })
    }

    pub fn aliases(&self) -> impl Iterator<Item = &AliasEvent> {
        self.events.iter().filter_map(|event| match event {
            SemanticEvent::Alias(event) => Some(event),
            _ => None,
        })
    }

    pub fn activations(&self) -> impl Iterator<Item = &ActivationEvent> {
        self.events.iter().filter_map(|event| match event {
            SemanticEvent::Activation(event) => Some(event),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Overlap {
    Enter(OverlapSource, CandidateId),
    Exit(OverlapSource, CandidateId),
}

pub struct InteractionSystem {
    sampler: ButtonSampler,
    router: AliasRouter,
    arbiter: InteractionArbiter,
    pointers: BTreeMap<ControllerHandle, Pointer>,
    haptics: HapticScheduler,
    haptic_defaults: HapticSettings,
    sink: Box<dyn HapticSink>,
    samples: Vec<(ControllerHandle, LogicalButton, RawSample)>,
    overlaps: Vec<Overlap>,
    hovers: Vec<(ControllerHandle, Option<CandidateId>)>,
    requests: Vec<Request>,
    /// Events raised between ticks, reported with the next frame
    carried: Vec<SemanticEvent>,
    frame: u64,
}

impl InteractionSystem {
    pub fn new(config: InteractionConfig, sink: Box<dyn HapticSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        let router = config.build_router()?;
        let arbiter = InteractionArbiter::from_config(&config.candidates, &config.zones)?;
        let pointers = config
            .pointers
            .iter()
            .map(|pointer| (pointer.controller, Pointer::new(pointer.clone())))
            .collect();

        info!(
            "Interaction system ready with {} pointers",
            config.pointers.len()
        );
        Ok(Self {
            sampler: ButtonSampler::new(config.sampler.clone()),
            router,
            arbiter,
            pointers,
            haptics: HapticScheduler::new(),
            haptic_defaults: config.haptics,
            sink,
            samples: Vec::new(),
            overlaps: Vec::new(),
            hovers: Vec::new(),
            requests: Vec::new(),
            carried: Vec::new(),
            frame: 0,
        })
    }

    pub fn connect_controller(&mut self, controller: ControllerHandle) -> bool {
        let sampled = self.sampler.connect(controller);
        let arbitrated = self.arbiter.connect_controller(controller);
        sampled || arbitrated
    }

    /// Releases everything the controller owned; later reports for it are ignored
    pub fn disconnect_controller(&mut self, controller: ControllerHandle) -> bool {
        if !self.sampler.disconnect(controller) {
            return false;
        }
        self.haptics.cancel(controller);
        self.samples.retain(|(sampled, _, _)| *sampled != controller);
        self.hovers.retain(|(hovering, _)| *hovering != controller);

        let mut out = ActivationOutput::default();
        if let Some(pointer) = self.pointers.get_mut(&controller) {
            pointer.reset(&mut out);
        }
        self.carried
            .extend(out.events.into_iter().map(SemanticEvent::Activation));
        let snapshot = AliasSnapshot::new(&self.router, &self.sampler);
        self.arbiter
            .submit(Request::DropController { controller }, &snapshot);
        true
    }

    pub fn is_connected(&self, controller: ControllerHandle) -> bool {
        self.sampler.is_connected(controller)
    }

    /// Buffers one raw sample for the next tick
    pub fn report_button_sample(
        &mut self,
        controller: ControllerHandle,
        button: LogicalButton,
        sample: RawSample,
    ) {
        self.samples.push((controller, button, sample));
    }

    pub fn report_overlap_enter(&mut self, source: OverlapSource, candidate: CandidateId) {
        self.overlaps.push(Overlap::Enter(source, candidate));
    }

    pub fn report_overlap_exit(&mut self, source: OverlapSource, candidate: CandidateId) {
        self.overlaps.push(Overlap::Exit(source, candidate));
    }

    /// What the controller's pointer ray hits this frame, `None` for nothing
    pub fn report_pointer_hover(&mut self, controller: ControllerHandle, target: Option<CandidateId>) {
        self.hovers.push((controller, target));
    }

    /// Queues a host request (force snap, clone completion, removal, ...) for the next tick
    pub fn request(&mut self, request: Request) {
        self.requests.push(request);
    }

    /// Starts a pulse schedule, replacing the controller's running one
    pub fn request_haptic_pulse(
        &mut self,
        controller: ControllerHandle,
        strength: f32,
        duration: f32,
        interval: f32,
    ) -> CancellationToken {
        self.haptics.request(controller, strength, duration, interval)
    }

    /// Pulse schedule with the configured defaults
    pub fn request_default_haptic_pulse(&mut self, controller: ControllerHandle) -> CancellationToken {
        let HapticSettings {
            strength,
            duration,
            interval,
        } = self.haptic_defaults;
        self.request_haptic_pulse(controller, strength, duration, interval)
    }

    pub fn haptic_defaults(&self) -> HapticSettings {
        self.haptic_defaults
    }

    pub fn subscribe_alias(
        &mut self,
        controller: ControllerHandle,
        alias: ButtonAlias,
        press_type: PressType,
        callback: AliasCallback,
    ) -> SubscriptionId {
        self.router.subscribe(controller, alias, press_type, callback)
    }

    pub fn unsubscribe_alias(&mut self, id: SubscriptionId) -> bool {
        self.router.unsubscribe(id)
    }

    pub fn on_interaction(&mut self, callback: InteractionCallback) -> SubscriptionId {
        self.arbiter.subscribe(callback)
    }

    pub fn unsubscribe_interaction(&mut self, id: SubscriptionId) -> bool {
        self.arbiter.unsubscribe(id)
    }

    pub fn is_alias_active(&self, controller: ControllerHandle, alias: ButtonAlias) -> bool {
        self.router.is_alias_active(&self.sampler, controller, alias)
    }

    pub fn ownership(&self, candidate: CandidateId) -> OwnershipState {
        self.arbiter.ownership(candidate)
    }

    pub fn pointer_active(&self, controller: ControllerHandle) -> bool {
        self.pointers
            .get(&controller)
            .map(Pointer::is_active)
            .unwrap_or(false)
    }

    pub fn pointer(&self, controller: ControllerHandle) -> Option<&Pointer> {
        self.pointers.get(&controller)
    }

    pub fn sampler(&self) -> &ButtonSampler {
        &self.sampler
    }

    pub fn router(&self) -> &AliasRouter {
        &self.router
    }

    /// Runtime rebinding; takes effect on the next routed edge
    pub fn router_mut(&mut self) -> &mut AliasRouter {
        &mut self.router
    }

    pub fn arbiter(&self) -> &InteractionArbiter {
        &self.arbiter
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Runs one frame with `dt` seconds of elapsed time
    pub fn tick(&mut self, dt: f32) -> FrameReport {
        self.frame += 1;
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        let mut events = std::mem::take(&mut self.carried);
        // Setup and disconnects may have left events behind
        self.collect_interactions(&mut events);

        // Capture
        let mut samples = std::mem::take(&mut self.samples);
        samples.sort_by_key(|(controller, _, _)| *controller);
        let mut edges = Vec::new();
        for (controller, button, sample) in samples {
            edges.extend(self.sampler.update(controller, button, sample));
        }

        // Overlaps
        for overlap in std::mem::take(&mut self.overlaps) {
            let request = match overlap {
                Overlap::Enter(source, candidate) => Request::OverlapEnter { source, candidate },
                Overlap::Exit(source, candidate) => Request::OverlapExit { source, candidate },
            };
            self.submit(request);
        }
        self.collect_interactions(&mut events);

        // Aliases
        for edge in edges {
            let routed = self.router.route(&edge);
            self.router.dispatch(&routed);
            for alias_event in routed {
                events.push(SemanticEvent::Alias(alias_event));
                self.handle_activation(&alias_event, &mut events);
            }
        }

        // Pointer hits and host requests
        for (controller, target) in std::mem::take(&mut self.hovers) {
            let mut out = ActivationOutput::default();
            match self.pointers.get_mut(&controller) {
                Some(pointer) => pointer.set_target(target, &mut out),
                None => debug!("Hover report for {} without a pointer", controller),
            }
            self.apply_output(out, &mut events);
        }
        for request in std::mem::take(&mut self.requests) {
            self.submit(request);
            self.collect_interactions(&mut events);
        }

        // Timers
        let controllers: Vec<ControllerHandle> = self.pointers.keys().copied().collect();
        for controller in controllers {
            let mut out = ActivationOutput::default();
            if let Some(pointer) = self.pointers.get_mut(&controller) {
                pointer.tick(dt, &mut out);
            }
            self.apply_output(out, &mut events);
        }
        for pulse in self.haptics.tick(dt, self.sink.as_mut()) {
            events.push(SemanticEvent::Activation(ActivationEvent::HapticPulse(pulse)));
        }

        let snapshot = AliasSnapshot::new(&self.router, &self.sampler);
        self.arbiter.process_pending(&snapshot);
        self.collect_interactions(&mut events);

        debug!("Frame {} produced {} events", self.frame, events.len());
        FrameReport {
            frame: self.frame,
            delta: dt,
            captured_at: Local::now(),
            events,
        }
    }

    fn handle_activation(&mut self, alias_event: &AliasEvent, events: &mut Vec<SemanticEvent>) {
        if !alias_event.activation {
            return;
        }
        let mut out = ActivationOutput::default();
        if let Some(pointer) = self.pointers.get_mut(&alias_event.controller) {
            pointer.handle_alias(alias_event, &mut out);
        }
        self.apply_output(out, events);

        let controller = alias_event.controller;
        let alias = alias_event.alias;
        let request = match alias_event.signal {
            AliasSignal::Down => Request::AliasDown { controller, alias },
            AliasSignal::Up => Request::AliasUp { controller, alias },
            AliasSignal::Axis { .. } => return,
        };
        self.submit(request);
        self.collect_interactions(events);
    }

    fn apply_output(&mut self, out: ActivationOutput, events: &mut Vec<SemanticEvent>) {
        events.extend(out.events.into_iter().map(SemanticEvent::Activation));
        for request in out.requests {
            self.submit(request);
        }
        self.collect_interactions(events);
    }

    fn submit(&mut self, request: Request) -> TransitionOutcome {
        let snapshot = AliasSnapshot::new(&self.router, &self.sampler);
        let outcome = self.arbiter.submit(request, &snapshot);
        if let TransitionOutcome::Rejected(reason) = outcome {
            warn!("Frame {}: request rejected ({:?})", self.frame, reason);
        }
        outcome
    }

    fn collect_interactions(&mut self, events: &mut Vec<SemanticEvent>) {
        events.extend(
            self.arbiter
                .take_events()
                .into_iter()
                .map(SemanticEvent::Interaction),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::{ActivationMode, PointerConfig, TracingHapticSink};
    use crate::interaction::{CandidateConfig, CapacityPolicy, ZoneConfig, ZoneId};

    const RIGHT: ControllerHandle = ControllerHandle::right(1);
    const CUBE: CandidateId = CandidateId(1);

    fn system(config: InteractionConfig) -> InteractionSystem {
        let mut system = InteractionSystem::new(config, Box::new(TracingHapticSink)).unwrap();
        system.connect_controller(RIGHT);
        system
    }

    fn with_cube() -> InteractionConfig {
        InteractionConfig {
            candidates: vec![CandidateConfig::grabbable(CUBE)],
            ..InteractionConfig::default()
        }
    }

    #[test]
    fn nothing_happens_before_tick() {
        let mut system = system(with_cube());
        system.report_overlap_enter(OverlapSource::Contact(RIGHT), CUBE);
        assert_eq!(system.ownership(CUBE), OwnershipState::Idle);
        system.tick(0.016);
        assert_eq!(system.ownership(CUBE), OwnershipState::Touched);
    }

    #[test]
    fn grip_edge_grabs_the_touched_candidate() {
        let mut system = system(with_cube());
        system.report_overlap_enter(OverlapSource::Contact(RIGHT), CUBE);
        system.report_button_sample(RIGHT, LogicalButton::Grip, RawSample::pressed());
        let report = system.tick(0.016);
        assert_eq!(system.ownership(CUBE), OwnershipState::Grabbed);
        assert!(report.aliases().any(|event| event.alias == ButtonAlias::GrabAction));

        system.report_button_sample(RIGHT, LogicalButton::Grip, RawSample::released());
        system.tick(0.016);
        assert_eq!(system.ownership(CUBE), OwnershipState::Touched);
    }

    #[test]
    fn default_occupant_events_show_up_in_the_first_report() {
        let mut config = with_cube();
        config
            .zones
            .push(ZoneConfig::new(ZoneId(1), CapacityPolicy::Single).with_default_occupant(CUBE));
        let mut system = system(config);
        let report = system.tick(0.016);
        assert!(report
            .interactions()
            .any(|event| matches!(event, InteractionEvent::Snapped { .. })));
    }

    #[test]
    fn disconnect_releases_and_ignores_later_samples() {
        let mut system = system(with_cube());
        system.report_overlap_enter(OverlapSource::Contact(RIGHT), CUBE);
        system.report_button_sample(RIGHT, LogicalButton::Grip, RawSample::pressed());
        system.tick(0.016);
        assert!(system.disconnect_controller(RIGHT));
        let report = system.tick(0.016);
        assert!(report.interactions().any(|event| matches!(
            event,
            InteractionEvent::Ungrabbed { forced: true, .. }
        )));
        assert_eq!(system.ownership(CUBE), OwnershipState::Idle);

        system.report_button_sample(RIGHT, LogicalButton::Grip, RawSample::released());
        let report = system.tick(0.016);
        assert!(report.events.is_empty());
        assert!(!system.is_alias_active(RIGHT, ButtonAlias::GrabAction));
    }

    #[test]
    fn pointer_selection_clicks_its_target() {
        let mut config = with_cube();
        config
            .pointers
            .push(PointerConfig::new(RIGHT, ActivationMode::AlwaysOn));
        let mut system = system(config);
        system.report_pointer_hover(RIGHT, Some(CUBE));
        system.tick(0.016);

        system.report_button_sample(RIGHT, LogicalButton::Trigger, RawSample::pressed());
        let report = system.tick(0.016);
        assert!(report.interactions().any(|event| matches!(
            event,
            InteractionEvent::Clicked {
                synthetic: false,
                ..
            }
        )));
        assert_eq!(system.arbiter().grabbed_by(CUBE), Some(RIGHT));
    }

    #[test]
    fn haptic_pulses_are_reported() {
        let mut system = system(InteractionConfig::default());
        system.request_default_haptic_pulse(RIGHT);
        let report = system.tick(0.016);
        assert_eq!(
            report.activations().collect::<Vec<_>>(),
            vec![&ActivationEvent::HapticPulse(crate::activation::HapticPulse {
                controller: RIGHT,
                strength: 0.5
            })]
        );
    }
}

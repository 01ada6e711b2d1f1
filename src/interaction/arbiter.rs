//! Interaction Ownership Arbiter
//!
//! Decides which candidate a controller touches, grabs and uses, and which snap
//! zone owns a released candidate. Per (controller, candidate) the lifecycle is
//!
//! ```text
//! Idle ─► NearTouched ─► Touched ─► Grabbed / Used ─► Touched ─► NearTouched ─► Idle
//!                                      │
//!                                      └─ release over a valid zone ─► Snapped
//! ```
//!
//! Invariants:
//!
//! - At most one controller grabs a candidate, at most one uses it.
//! - A controller touches, grabs and uses at most one candidate each.
//! - Zone occupancy only changes through snap and unsnap transitions here.
//!
//! All work enters as a [`Request`]. Event callbacks receive a [`RequestQueue`]
//! instead of the arbiter, so a callback can never re-enter a running transition;
//! whatever it queues runs once that transition is complete.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::config::ConfigError;
use crate::controller::ControllerHandle;
use crate::mapping::{AliasState, ButtonAlias, Observers, SubscriptionId};

use super::candidate::{CandidateConfig, CandidateId, HoldMode, OwnershipState, SecondaryGrab, ValidDrop};
use super::events::{
    InteractionCallback, InteractionEvent, OverlapSource, Rejection, Request, RequestQueue,
    TransitionOutcome,
};
use super::snap_zone::{CapacityPolicy, SnapTransition, SnapZone, ZoneConfig, ZoneId};

/// Follow-up requests processed per pass before the rest is deferred
pub const MAX_CHAINED_REQUESTS: usize = 64;

use TransitionOutcome::{Applied, Ignored, Rejected};

#[derive(Debug, Default)]
struct ControllerSlot {
    /// Proximity overlaps in entry order
    near: Vec<CandidateId>,
    /// Contact overlaps in entry order
    contacts: Vec<CandidateId>,
    touched: Option<CandidateId>,
    grabbed: Option<CandidateId>,
    used: Option<CandidateId>,
}

#[derive(Debug)]
struct CandidateSlot {
    config: CandidateConfig,
    near_by: BTreeSet<ControllerHandle>,
    touched_by: BTreeSet<ControllerHandle>,
    grabbed_by: Option<ControllerHandle>,
    used_by: Option<ControllerHandle>,
    snapped_in: Option<ZoneId>,
    /// Zones whose capture volume holds the candidate, with entry sequence
    hovering: BTreeMap<ZoneId, u64>,
}

impl CandidateSlot {
    fn new(config: CandidateConfig) -> Self {
        Self {
            config,
            near_by: BTreeSet::new(),
            touched_by: BTreeSet::new(),
            grabbed_by: None,
            used_by: None,
            snapped_in: None,
            hovering: BTreeMap::new(),
        }
    }
}

#[derive(Default)]
pub struct InteractionArbiter {
    controllers: BTreeMap<ControllerHandle, ControllerSlot>,
    candidates: BTreeMap<CandidateId, CandidateSlot>,
    zones: BTreeMap<ZoneId, SnapZone>,
    listeners: Observers<(), InteractionCallback>,
    follow_ups: RequestQueue,
    outbox: Vec<InteractionEvent>,
    next_sequence: u64,
}

impl InteractionArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an arbiter and snaps every zone's default occupant
    pub fn from_config(
        candidates: &[CandidateConfig],
        zones: &[ZoneConfig],
    ) -> Result<Self, ConfigError> {
        let mut arbiter = Self::new();
        for candidate in candidates {
            arbiter.register_candidate(candidate.clone())?;
        }
        for zone in zones {
            arbiter.register_zone(zone.clone())?;
        }
        info!(
            "Arbiter ready with {} candidates and {} zones",
            arbiter.candidates.len(),
            arbiter.zones.len()
        );
        Ok(arbiter)
    }

    pub fn register_candidate(&mut self, config: CandidateConfig) -> Result<(), ConfigError> {
        if self.candidates.contains_key(&config.id) {
            return Err(ConfigError::DuplicateCandidate(config.id));
        }
        debug!("Registering {} ({})", config.id, config.name);
        self.candidates.insert(config.id, CandidateSlot::new(config));
        Ok(())
    }

    pub fn register_zone(&mut self, config: ZoneConfig) -> Result<(), ConfigError> {
        let zone = config.id;
        if self.zones.contains_key(&zone) {
            return Err(ConfigError::DuplicateZone(zone));
        }
        if config.snap_duration.is_nan() || config.snap_duration < 0.0 {
            return Err(ConfigError::InvalidSnapDuration(zone, config.snap_duration));
        }
        let default_occupant = config.default_occupant;
        self.zones.insert(zone, SnapZone::new(config));

        if let Some(candidate) = default_occupant {
            if !self.candidates.contains_key(&candidate) {
                self.zones.remove(&zone);
                return Err(ConfigError::UnknownDefaultOccupant { zone, candidate });
            }
            let occupied = self
                .candidates
                .get(&candidate)
                .and_then(|slot| slot.snapped_in)
                .is_some();
            if occupied || !self.zone_accepts(zone, candidate) {
                self.zones.remove(&zone);
                return Err(ConfigError::DefaultOccupantRejected { zone, candidate });
            }
            self.snap_into(zone, candidate, None, SnapTransition::Instant);
        }
        debug!("Registered {}", zone);
        Ok(())
    }

    /// Starts tracking a controller. Returns `false` if it was already known.
    pub fn connect_controller(&mut self, controller: ControllerHandle) -> bool {
        if self.controllers.contains_key(&controller) {
            return false;
        }
        self.controllers.insert(controller, ControllerSlot::default());
        true
    }

    pub fn is_connected(&self, controller: ControllerHandle) -> bool {
        self.controllers.contains_key(&controller)
    }

    pub fn subscribe(&mut self, callback: InteractionCallback) -> SubscriptionId {
        self.listeners.subscribe((), callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Events emitted since the last call, in emission order
    pub fn take_events(&mut self) -> Vec<InteractionEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Follow-up requests still waiting for a processing pass
    pub fn pending_requests(&self) -> usize {
        self.follow_ups.len()
    }

    /// Applies `request`, then drains follow-ups raised by event callbacks
    pub fn submit(&mut self, request: Request, aliases: &dyn AliasState) -> TransitionOutcome {
        let outcome = self.apply(request, aliases);
        self.process_pending(aliases);
        outcome
    }

    /// Runs queued follow-up requests, at most [`MAX_CHAINED_REQUESTS`] per call
    pub fn process_pending(&mut self, aliases: &dyn AliasState) -> usize {
        let mut processed = 0;
        while processed < MAX_CHAINED_REQUESTS {
            let Some(request) = self.follow_ups.pop() else {
                break;
            };
            processed += 1;
            self.apply(request, aliases);
        }
        if !self.follow_ups.is_empty() {
            warn!(
                "Deferring {} chained requests to the next processing pass",
                self.follow_ups.len()
            );
        }
        processed
    }

    // ---- queries ------------------------------------------------------------

    /// Aggregate ownership; unknown or destroyed candidates report `Idle`
    pub fn ownership(&self, candidate: CandidateId) -> OwnershipState {
        let Some(slot) = self.candidates.get(&candidate) else {
            return OwnershipState::Idle;
        };
        if slot.snapped_in.is_some() {
            OwnershipState::Snapped
        } else if slot.grabbed_by.is_some() {
            OwnershipState::Grabbed
        } else if slot.used_by.is_some() {
            OwnershipState::Used
        } else if !slot.touched_by.is_empty() {
            OwnershipState::Touched
        } else if !slot.near_by.is_empty() {
            OwnershipState::NearTouched
        } else {
            OwnershipState::Idle
        }
    }

    /// Ownership as seen from one controller
    pub fn ownership_for(
        &self,
        controller: ControllerHandle,
        candidate: CandidateId,
    ) -> OwnershipState {
        let Some(slot) = self.candidates.get(&candidate) else {
            return OwnershipState::Idle;
        };
        if slot.snapped_in.is_some() {
            OwnershipState::Snapped
        } else if slot.grabbed_by == Some(controller) {
            OwnershipState::Grabbed
        } else if slot.used_by == Some(controller) {
            OwnershipState::Used
        } else if slot.touched_by.contains(&controller) {
            OwnershipState::Touched
        } else if slot.near_by.contains(&controller) {
            OwnershipState::NearTouched
        } else {
            OwnershipState::Idle
        }
    }

    pub fn grabbed_by(&self, candidate: CandidateId) -> Option<ControllerHandle> {
        self.candidates.get(&candidate)?.grabbed_by
    }

    pub fn used_by(&self, candidate: CandidateId) -> Option<ControllerHandle> {
        self.candidates.get(&candidate)?.used_by
    }

    pub fn touched_by(&self, candidate: CandidateId) -> Vec<ControllerHandle> {
        self.candidates
            .get(&candidate)
            .map(|slot| slot.touched_by.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn touched_object(&self, controller: ControllerHandle) -> Option<CandidateId> {
        self.controllers.get(&controller)?.touched
    }

    pub fn grabbed_object(&self, controller: ControllerHandle) -> Option<CandidateId> {
        self.controllers.get(&controller)?.grabbed
    }

    pub fn used_object(&self, controller: ControllerHandle) -> Option<CandidateId> {
        self.controllers.get(&controller)?.used
    }

    pub fn snapped_zone(&self, candidate: CandidateId) -> Option<ZoneId> {
        self.candidates.get(&candidate)?.snapped_in
    }

    /// Zones hovered by `candidate`, oldest entry first
    pub fn hovering_zones(&self, candidate: CandidateId) -> Vec<ZoneId> {
        let Some(slot) = self.candidates.get(&candidate) else {
            return Vec::new();
        };
        let mut entries: Vec<(u64, ZoneId)> = slot
            .hovering
            .iter()
            .map(|(zone, sequence)| (*sequence, *zone))
            .collect();
        entries.sort();
        entries.into_iter().map(|(_, zone)| zone).collect()
    }

    pub fn zone(&self, zone: ZoneId) -> Option<&SnapZone> {
        self.zones.get(&zone)
    }

    pub fn candidate(&self, candidate: CandidateId) -> Option<&CandidateConfig> {
        self.candidates.get(&candidate).map(|slot| &slot.config)
    }

    // ---- dispatch -----------------------------------------------------------

    fn apply(&mut self, request: Request, aliases: &dyn AliasState) -> TransitionOutcome {
        let outcome = match request {
            Request::OverlapEnter { source, candidate } => {
                self.overlap_enter(source, candidate, aliases)
            }
            Request::OverlapExit { source, candidate } => {
                self.overlap_exit(source, candidate, aliases)
            }
            Request::AliasDown { controller, alias } => self.alias_down(controller, alias, aliases),
            Request::AliasUp { controller, alias } => self.alias_up(controller, alias, aliases),
            Request::Grab {
                controller,
                candidate,
            } => self.grab(controller, candidate, aliases),
            Request::Release { controller } => self.release(controller, false, aliases),
            Request::ForceRelease { candidate } => self.force_release(candidate, aliases),
            Request::Use {
                controller,
                candidate,
            } => self.start_use(controller, candidate),
            Request::Unuse { controller } => self.stop_use(controller),
            Request::Click {
                controller,
                candidate,
                synthetic,
            } => self.click(controller, candidate, synthetic, aliases),
            Request::ForceSnap { zone, candidate } => self.force_snap(zone, candidate, aliases),
            Request::Unsnap { zone } => self.unsnap(zone, None),
            Request::CompleteClone { zone, clone } => self.complete_clone(zone, clone),
            Request::RegisterCandidate { ref config } => self.register_spawned(config.clone()),
            Request::RemoveCandidate { candidate } => self.remove_candidate(candidate, aliases),
            Request::DropController { controller } => self.drop_controller(controller, aliases),
        };

        match outcome {
            // Disconnects race with reports; stale handles stay silent
            Rejected(Rejection::StaleController) => {
                debug!("Dropping {:?} for a stale controller", request);
            }
            Rejected(reason) => {
                warn!("Rejected {:?}: {:?}", request, reason);
                self.emit(InteractionEvent::TransitionRejected { request, reason });
            }
            Applied | Ignored => {}
        }
        outcome
    }

    fn emit(&mut self, event: InteractionEvent) {
        debug!("Interaction event: {:?}", event);
        for callback in self.listeners.for_key_mut(&()) {
            callback(&event, &mut self.follow_ups);
        }
        self.outbox.push(event);
    }

    fn next_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    // ---- overlaps -----------------------------------------------------------

    fn overlap_enter(
        &mut self,
        source: OverlapSource,
        candidate: CandidateId,
        aliases: &dyn AliasState,
    ) -> TransitionOutcome {
        let Some(slot) = self.candidates.get(&candidate) else {
            return Rejected(Rejection::UnknownCandidate);
        };
        let touchable = slot.config.can_touch();

        let (controller, contact) = match source {
            OverlapSource::Zone(zone) => return self.zone_enter(zone, candidate),
            OverlapSource::Near(controller) => (controller, false),
            OverlapSource::Contact(controller) => (controller, true),
        };
        let Some(ctrl) = self.controllers.get_mut(&controller) else {
            return Rejected(Rejection::StaleController);
        };
        if !touchable {
            debug!("{} overlaps untouchable {}", controller, candidate);
            return Ignored;
        }

        let list = if contact {
            &mut ctrl.contacts
        } else {
            &mut ctrl.near
        };
        if list.contains(&candidate) {
            return Ignored;
        }
        list.push(candidate);
        let idle = ctrl.touched.is_none();

        self.refresh_near(controller, candidate);
        if contact && idle {
            self.touch(controller, candidate, aliases);
        }
        Applied
    }

    fn overlap_exit(
        &mut self,
        source: OverlapSource,
        candidate: CandidateId,
        aliases: &dyn AliasState,
    ) -> TransitionOutcome {
        let (controller, contact) = match source {
            OverlapSource::Zone(zone) => return self.zone_exit(zone, candidate),
            OverlapSource::Near(controller) => (controller, false),
            OverlapSource::Contact(controller) => (controller, true),
        };
        let Some(ctrl) = self.controllers.get_mut(&controller) else {
            return Ignored;
        };
        let list = if contact {
            &mut ctrl.contacts
        } else {
            &mut ctrl.near
        };
        let Some(position) = list.iter().position(|entry| *entry == candidate) else {
            return Ignored;
        };
        list.remove(position);

        // A held candidate stays touched until it is let go
        let untouch = contact && ctrl.touched == Some(candidate) && ctrl.grabbed != Some(candidate);
        if untouch {
            self.untouch(controller, candidate);
            self.promote_touch(controller, aliases);
        }
        self.refresh_near(controller, candidate);
        Applied
    }

    fn zone_enter(&mut self, zone: ZoneId, candidate: CandidateId) -> TransitionOutcome {
        if !self.zones.contains_key(&zone) {
            return Rejected(Rejection::UnknownZone);
        }
        let sequence = self.next_sequence();
        let Some(slot) = self.candidates.get_mut(&candidate) else {
            return Rejected(Rejection::UnknownCandidate);
        };
        if slot.hovering.contains_key(&zone) {
            return Ignored;
        }
        slot.hovering.insert(zone, sequence);
        let controller = slot.grabbed_by;
        self.emit(InteractionEvent::ZoneEntered {
            zone,
            candidate,
            controller,
        });
        Applied
    }

    fn zone_exit(&mut self, zone: ZoneId, candidate: CandidateId) -> TransitionOutcome {
        let Some(slot) = self.candidates.get_mut(&candidate) else {
            return Ignored;
        };
        if slot.hovering.remove(&zone).is_none() {
            return Ignored;
        }
        let controller = slot.grabbed_by;
        self.emit(InteractionEvent::ZoneExited {
            zone,
            candidate,
            controller,
        });
        Applied
    }

    /// Emits near-touch changes so that the near flag covers proximity, contact and touch
    fn refresh_near(&mut self, controller: ControllerHandle, candidate: CandidateId) {
        let wanted = self
            .controllers
            .get(&controller)
            .map(|ctrl| {
                ctrl.near.contains(&candidate)
                    || ctrl.contacts.contains(&candidate)
                    || ctrl.touched == Some(candidate)
            })
            .unwrap_or(false);
        let Some(slot) = self.candidates.get_mut(&candidate) else {
            return;
        };
        let current = slot.near_by.contains(&controller);
        if wanted && !current {
            slot.near_by.insert(controller);
            self.emit(InteractionEvent::NearTouched {
                controller,
                candidate,
            });
        } else if !wanted && current {
            slot.near_by.remove(&controller);
            self.emit(InteractionEvent::NearUntouched {
                controller,
                candidate,
            });
        }
    }

    fn touch(&mut self, controller: ControllerHandle, candidate: CandidateId, aliases: &dyn AliasState) {
        let Some(ctrl) = self.controllers.get_mut(&controller) else {
            return;
        };
        let Some(slot) = self.candidates.get_mut(&candidate) else {
            return;
        };
        ctrl.touched = Some(candidate);
        slot.touched_by.insert(controller);
        let hands_free = ctrl.grabbed.is_none();
        let grab = slot.config.grab;
        let can_grab = slot.config.can_grab();
        self.emit(InteractionEvent::Touched {
            controller,
            candidate,
        });

        let auto_grab = grab.grab_on_touch
            || (grab.grab_if_held_on_touch
                && aliases.is_alias_active(controller, ButtonAlias::GrabAction));
        if auto_grab && can_grab && hands_free {
            debug!("{} grabs {} on touch", controller, candidate);
            self.apply(
                Request::Grab {
                    controller,
                    candidate,
                },
                aliases,
            );
        }
    }

    fn untouch(&mut self, controller: ControllerHandle, candidate: CandidateId) {
        let using = self
            .controllers
            .get(&controller)
            .map(|ctrl| ctrl.used == Some(candidate) && ctrl.grabbed != Some(candidate))
            .unwrap_or(false);
        if using {
            self.stop_use(controller);
        }
        if let Some(ctrl) = self.controllers.get_mut(&controller) {
            if ctrl.touched == Some(candidate) {
                ctrl.touched = None;
            }
        }
        if let Some(slot) = self.candidates.get_mut(&candidate) {
            slot.touched_by.remove(&controller);
        }
        self.emit(InteractionEvent::Untouched {
            controller,
            candidate,
        });
    }

    /// Touches the most recent remaining contact of an idle controller
    fn promote_touch(&mut self, controller: ControllerHandle, aliases: &dyn AliasState) {
        let next = self
            .controllers
            .get(&controller)
            .filter(|ctrl| ctrl.touched.is_none())
            .and_then(|ctrl| ctrl.contacts.last().copied());
        if let Some(candidate) = next {
            debug!("{} falls back to touching {}", controller, candidate);
            self.touch(controller, candidate, aliases);
        }
    }

    // ---- aliases ------------------------------------------------------------

    fn alias_down(
        &mut self,
        controller: ControllerHandle,
        alias: ButtonAlias,
        aliases: &dyn AliasState,
    ) -> TransitionOutcome {
        let Some(ctrl) = self.controllers.get(&controller) else {
            return Rejected(Rejection::StaleController);
        };
        match alias {
            ButtonAlias::GrabAction => {
                if let Some(held) = ctrl.grabbed {
                    if self.grab_mode(held) == Some(HoldMode::Toggle) {
                        return self.release(controller, false, aliases);
                    }
                    return Ignored;
                }
                let target = ctrl.touched;
                match target {
                    Some(candidate) if self.can(candidate, CandidateConfig::can_grab) => {
                        self.grab(controller, candidate, aliases)
                    }
                    _ => Ignored,
                }
            }
            ButtonAlias::UseAction => {
                if let Some(active) = ctrl.used {
                    if self.use_mode(active) == Some(HoldMode::Toggle) {
                        return self.stop_use(controller);
                    }
                    return Ignored;
                }
                let target = ctrl.grabbed.or(ctrl.touched);
                match target {
                    Some(candidate) if self.can(candidate, CandidateConfig::can_use) => {
                        self.start_use(controller, candidate)
                    }
                    _ => Ignored,
                }
            }
            _ => Ignored,
        }
    }

    fn alias_up(
        &mut self,
        controller: ControllerHandle,
        alias: ButtonAlias,
        aliases: &dyn AliasState,
    ) -> TransitionOutcome {
        let Some(ctrl) = self.controllers.get(&controller) else {
            return Rejected(Rejection::StaleController);
        };
        match alias {
            ButtonAlias::GrabAction => match ctrl.grabbed {
                Some(held) if self.grab_mode(held) == Some(HoldMode::Hold) => {
                    self.release(controller, false, aliases)
                }
                _ => Ignored,
            },
            ButtonAlias::UseAction => match ctrl.used {
                Some(active) if self.use_mode(active) == Some(HoldMode::Hold) => {
                    self.stop_use(controller)
                }
                _ => Ignored,
            },
            _ => Ignored,
        }
    }

    fn grab_mode(&self, candidate: CandidateId) -> Option<HoldMode> {
        self.candidates
            .get(&candidate)
            .map(|slot| slot.config.grab.mode)
    }

    fn use_mode(&self, candidate: CandidateId) -> Option<HoldMode> {
        self.candidates
            .get(&candidate)
            .map(|slot| slot.config.use_policy.mode)
    }

    fn can(&self, candidate: CandidateId, check: fn(&CandidateConfig) -> bool) -> bool {
        self.candidates
            .get(&candidate)
            .map(|slot| check(&slot.config))
            .unwrap_or(false)
    }

    // ---- grab ---------------------------------------------------------------

    fn grab(
        &mut self,
        controller: ControllerHandle,
        candidate: CandidateId,
        aliases: &dyn AliasState,
    ) -> TransitionOutcome {
        let Some(ctrl) = self.controllers.get(&controller) else {
            return Rejected(Rejection::StaleController);
        };
        let Some(slot) = self.candidates.get(&candidate) else {
            return Rejected(Rejection::UnknownCandidate);
        };
        if !slot.config.can_grab() {
            return Rejected(Rejection::NotGrabbable);
        }
        if !slot.config.grab.allowed.permits(controller) {
            return Rejected(Rejection::ControllerNotAllowed);
        }
        if slot.grabbed_by == Some(controller) {
            return Ignored;
        }
        if ctrl.grabbed.is_some() {
            return Rejected(Rejection::ControllerBusy);
        }
        let holder = slot.grabbed_by;
        let secondary = slot.config.grab.secondary;
        let snapped_in = slot.snapped_in;
        if let Some(zone) = snapped_in {
            let visible = self
                .zones
                .get(&zone)
                .map(|state| state.occupant() == Some(candidate))
                .unwrap_or(false);
            if !visible {
                return Rejected(Rejection::CandidateStashed);
            }
        }
        if let Some(holder) = holder {
            match secondary {
                SecondaryGrab::Reject => {
                    return Rejected(Rejection::ConflictingOwnership { holder });
                }
                SecondaryGrab::Swap => {
                    info!("{} takes {} over from {}", controller, candidate, holder);
                    self.release(holder, true, aliases);
                }
            }
        }
        if let Some(zone) = snapped_in {
            self.unsnap(zone, Some(controller));
        }

        if let Some(slot) = self.candidates.get_mut(&candidate) {
            slot.grabbed_by = Some(controller);
        }
        if let Some(ctrl) = self.controllers.get_mut(&controller) {
            ctrl.grabbed = Some(candidate);
        }
        info!("{} grabbed {}", controller, candidate);
        self.emit(InteractionEvent::Grabbed {
            controller,
            candidate,
        });
        Applied
    }

    fn release(
        &mut self,
        controller: ControllerHandle,
        forced: bool,
        aliases: &dyn AliasState,
    ) -> TransitionOutcome {
        let Some(ctrl) = self.controllers.get(&controller) else {
            return Rejected(Rejection::StaleController);
        };
        let Some(candidate) = ctrl.grabbed else {
            return Rejected(Rejection::NotGrabbed);
        };
        let Some(slot) = self.candidates.get(&candidate) else {
            return Rejected(Rejection::UnknownCandidate);
        };
        let drop = slot.config.grab.drop;
        let use_only_if_grabbed = slot.config.use_policy.use_only_if_grabbed;
        let using = slot.used_by == Some(controller);

        let winner = if forced {
            None
        } else {
            self.resolve_snap_zone(candidate)
        };
        if !forced {
            match drop {
                ValidDrop::NoDrop => return Rejected(Rejection::DropNotAllowed),
                ValidDrop::DropValidSnapZone if winner.is_none() => {
                    return Rejected(Rejection::NoValidSnapZone)
                }
                _ => {}
            }
        }

        if let Some(slot) = self.candidates.get_mut(&candidate) {
            slot.grabbed_by = None;
        }
        if let Some(ctrl) = self.controllers.get_mut(&controller) {
            ctrl.grabbed = None;
        }
        info!("{} released {} (forced: {})", controller, candidate, forced);
        self.emit(InteractionEvent::Ungrabbed {
            controller,
            candidate,
            forced,
        });

        if using && use_only_if_grabbed {
            self.stop_use(controller);
        }

        if let Some(zone) = winner {
            let losers: Vec<ZoneId> = self
                .candidates
                .get(&candidate)
                .map(|slot| {
                    slot.hovering
                        .keys()
                        .filter(|hovered| **hovered != zone)
                        .copied()
                        .collect()
                })
                .unwrap_or_default();
            for loser in losers {
                if let Some(slot) = self.candidates.get_mut(&candidate) {
                    slot.hovering.remove(&loser);
                }
                self.emit(InteractionEvent::ZoneExited {
                    zone: loser,
                    candidate,
                    controller: Some(controller),
                });
            }
            let transition = self
                .zones
                .get(&zone)
                .map(|state| SnapTransition::for_duration(state.config().snap_duration))
                .unwrap_or(SnapTransition::Instant);
            self.snap_into(zone, candidate, Some(controller), transition);
        }

        let lost_contact = self
            .controllers
            .get(&controller)
            .map(|ctrl| ctrl.touched == Some(candidate) && !ctrl.contacts.contains(&candidate))
            .unwrap_or(false);
        if lost_contact {
            self.untouch(controller, candidate);
            self.promote_touch(controller, aliases);
        }
        self.refresh_near(controller, candidate);
        Applied
    }

    fn force_release(&mut self, candidate: CandidateId, aliases: &dyn AliasState) -> TransitionOutcome {
        let Some(slot) = self.candidates.get(&candidate) else {
            return Rejected(Rejection::UnknownCandidate);
        };
        match slot.grabbed_by {
            Some(holder) => self.release(holder, true, aliases),
            None => Ignored,
        }
    }

    // ---- use ----------------------------------------------------------------

    fn start_use(&mut self, controller: ControllerHandle, candidate: CandidateId) -> TransitionOutcome {
        let Some(ctrl) = self.controllers.get(&controller) else {
            return Rejected(Rejection::StaleController);
        };
        let Some(slot) = self.candidates.get(&candidate) else {
            return Rejected(Rejection::UnknownCandidate);
        };
        let policy = slot.config.use_policy;
        if !slot.config.can_use() {
            return Rejected(Rejection::NotUsable);
        }
        if !policy.allowed.permits(controller) {
            return Rejected(Rejection::ControllerNotAllowed);
        }
        if policy.use_only_if_grabbed && slot.grabbed_by != Some(controller) {
            return Rejected(Rejection::UseRequiresGrab);
        }
        match slot.used_by {
            Some(user) if user == controller => return Ignored,
            Some(holder) => return Rejected(Rejection::ConflictingOwnership { holder }),
            None => {}
        }
        if ctrl.used.is_some() {
            return Rejected(Rejection::ControllerBusy);
        }

        if let Some(slot) = self.candidates.get_mut(&candidate) {
            slot.used_by = Some(controller);
        }
        if let Some(ctrl) = self.controllers.get_mut(&controller) {
            ctrl.used = Some(candidate);
        }
        self.emit(InteractionEvent::Used {
            controller,
            candidate,
        });
        Applied
    }

    fn stop_use(&mut self, controller: ControllerHandle) -> TransitionOutcome {
        let Some(ctrl) = self.controllers.get_mut(&controller) else {
            return Rejected(Rejection::StaleController);
        };
        let Some(candidate) = ctrl.used.take() else {
            return Ignored;
        };
        if let Some(slot) = self.candidates.get_mut(&candidate) {
            slot.used_by = None;
        }
        self.emit(InteractionEvent::Unused {
            controller,
            candidate,
        });
        Applied
    }

    fn click(
        &mut self,
        controller: ControllerHandle,
        candidate: CandidateId,
        synthetic: bool,
        aliases: &dyn AliasState,
    ) -> TransitionOutcome {
        let Some(ctrl) = self.controllers.get(&controller) else {
            return Rejected(Rejection::StaleController);
        };
        let hands_free = ctrl.grabbed.is_none();
        let Some(slot) = self.candidates.get(&candidate) else {
            return Rejected(Rejection::UnknownCandidate);
        };
        let grab_target = slot.config.can_grab() && slot.grabbed_by != Some(controller);

        self.emit(InteractionEvent::Clicked {
            controller,
            candidate,
            synthetic,
        });
        if grab_target && hands_free {
            return self.grab(controller, candidate, aliases);
        }
        Applied
    }

    // ---- snap zones ---------------------------------------------------------

    fn zone_accepts(&self, zone: ZoneId, candidate: CandidateId) -> bool {
        let (Some(state), Some(slot)) = (self.zones.get(&zone), self.candidates.get(&candidate))
        else {
            return false;
        };
        let occupant = state
            .occupant()
            .and_then(|occupant| self.candidates.get(&occupant))
            .map(|slot| &slot.config);
        state.accepts(&slot.config, occupant)
    }

    /// Most recently entered hovered zone that would accept the candidate
    fn resolve_snap_zone(&self, candidate: CandidateId) -> Option<ZoneId> {
        let slot = self.candidates.get(&candidate)?;
        let mut hovered: Vec<(u64, ZoneId)> = slot
            .hovering
            .iter()
            .map(|(zone, sequence)| (*sequence, *zone))
            .collect();
        hovered.sort_by(|a, b| b.cmp(a));
        hovered
            .into_iter()
            .map(|(_, zone)| zone)
            .find(|zone| self.zone_accepts(*zone, candidate))
    }

    fn snap_into(
        &mut self,
        zone: ZoneId,
        candidate: CandidateId,
        controller: Option<ControllerHandle>,
        transition: SnapTransition,
    ) {
        let Some(state) = self.zones.get_mut(&zone) else {
            return;
        };
        let stashed = state.place(candidate);
        if let Some(slot) = self.candidates.get_mut(&candidate) {
            slot.snapped_in = Some(zone);
        }
        if let Some(previous) = stashed {
            debug!("{} stashes {} below {}", zone, previous, candidate);
            self.emit(InteractionEvent::OccupantStashed {
                zone,
                candidate: previous,
            });
        }
        info!("{} snapped into {}", candidate, zone);
        self.emit(InteractionEvent::Snapped {
            zone,
            candidate,
            controller,
            transition,
        });
    }

    fn unsnap(&mut self, zone: ZoneId, controller: Option<ControllerHandle>) -> TransitionOutcome {
        let Some(state) = self.zones.get_mut(&zone) else {
            return Rejected(Rejection::UnknownZone);
        };
        let Some((removed, revealed)) = state.take_occupant() else {
            return Rejected(Rejection::ZoneEmpty);
        };
        // Only a grab takes the original out of a clone zone for good
        let clone_needed = controller.is_some()
            && state.capacity() == CapacityPolicy::CloneOnSnap
            && state.awaiting_clone().is_none();
        if clone_needed {
            state.set_awaiting_clone(Some(removed));
        }
        if let Some(slot) = self.candidates.get_mut(&removed) {
            slot.snapped_in = None;
        }

        info!("{} left {}", removed, zone);
        self.emit(InteractionEvent::Unsnapped {
            zone,
            candidate: removed,
            controller,
        });
        if clone_needed {
            self.emit(InteractionEvent::CloneRequested {
                zone,
                source: removed,
            });
        }
        if let Some(next) = revealed {
            // Revealed stack entries re-snap without animation
            self.emit(InteractionEvent::Snapped {
                zone,
                candidate: next,
                controller: None,
                transition: SnapTransition::Instant,
            });
        }
        Applied
    }

    fn force_snap(
        &mut self,
        zone: ZoneId,
        candidate: CandidateId,
        aliases: &dyn AliasState,
    ) -> TransitionOutcome {
        let Some(state) = self.zones.get(&zone) else {
            return Rejected(Rejection::UnknownZone);
        };
        let duration = state.config().snap_duration;
        let Some(slot) = self.candidates.get(&candidate) else {
            return Rejected(Rejection::UnknownCandidate);
        };
        if slot.snapped_in == Some(zone) {
            return Ignored;
        }
        let holder = slot.grabbed_by;
        let previous_zone = slot.snapped_in;
        if !self.zone_accepts(zone, candidate) {
            return Rejected(Rejection::ZoneRejected);
        }

        // The grab must be gone before the zone takes ownership
        if let Some(holder) = holder {
            self.release(holder, true, aliases);
        }
        if let Some(previous) = previous_zone {
            let visible = self
                .zones
                .get(&previous)
                .map(|state| state.occupant() == Some(candidate))
                .unwrap_or(false);
            if visible {
                self.unsnap(previous, None);
            } else {
                if let Some(state) = self.zones.get_mut(&previous) {
                    state.remove_stashed(candidate);
                }
                if let Some(slot) = self.candidates.get_mut(&candidate) {
                    slot.snapped_in = None;
                }
            }
        }
        self.snap_into(zone, candidate, None, SnapTransition::for_duration(duration));
        Applied
    }

    fn complete_clone(&mut self, zone: ZoneId, clone: CandidateId) -> TransitionOutcome {
        let Some(state) = self.zones.get(&zone) else {
            return Rejected(Rejection::UnknownZone);
        };
        let Some(source) = state.awaiting_clone() else {
            return Rejected(Rejection::NoClonePending);
        };
        if !self.candidates.contains_key(&clone) {
            // Copies the host reports by id alone inherit the original's setup
            let Some(original) = self.candidates.get(&source) else {
                return Rejected(Rejection::UnknownCandidate);
            };
            let mut config = original.config.clone();
            config.id = clone;
            debug!("Registering {} as a copy of {}", clone, source);
            self.candidates.insert(clone, CandidateSlot::new(config));
        }
        let busy = self
            .candidates
            .get(&clone)
            .map(|slot| slot.snapped_in.is_some() || slot.grabbed_by.is_some())
            .unwrap_or(false);
        if busy {
            return Rejected(Rejection::ZoneRejected);
        }
        if let Some(state) = self.zones.get_mut(&zone) {
            state.set_awaiting_clone(None);
        }
        self.snap_into(zone, clone, None, SnapTransition::Instant);
        Applied
    }

    /// Candidates spawned by the host after setup
    fn register_spawned(&mut self, config: CandidateConfig) -> TransitionOutcome {
        match self.register_candidate(config) {
            Ok(()) => Applied,
            Err(_) => Rejected(Rejection::DuplicateCandidate),
        }
    }

    // ---- teardown -----------------------------------------------------------

    fn remove_candidate(&mut self, candidate: CandidateId, aliases: &dyn AliasState) -> TransitionOutcome {
        let Some(slot) = self.candidates.get(&candidate) else {
            return Ignored;
        };
        let holder = slot.grabbed_by;
        let user = slot.used_by;
        let snapped_in = slot.snapped_in;
        let hovered: Vec<ZoneId> = slot.hovering.keys().copied().collect();

        for ctrl in self.controllers.values_mut() {
            ctrl.near.retain(|entry| *entry != candidate);
            ctrl.contacts.retain(|entry| *entry != candidate);
        }
        if let Some(holder) = holder {
            self.release(holder, true, aliases);
        }
        if let Some(user) = user {
            self.stop_use(user);
        }
        if let Some(zone) = snapped_in {
            let visible = self
                .zones
                .get(&zone)
                .map(|state| state.occupant() == Some(candidate))
                .unwrap_or(false);
            if visible {
                self.unsnap(zone, None);
            } else if let Some(state) = self.zones.get_mut(&zone) {
                state.remove_stashed(candidate);
            }
        }
        for zone in hovered {
            self.zone_exit(zone, candidate);
        }

        let controllers: Vec<ControllerHandle> = self.controllers.keys().copied().collect();
        for controller in controllers {
            if self.touched_object(controller) == Some(candidate) {
                self.untouch(controller, candidate);
                self.promote_touch(controller, aliases);
            }
            self.refresh_near(controller, candidate);
        }

        self.candidates.remove(&candidate);
        info!("Removed {}", candidate);
        Applied
    }

    fn drop_controller(&mut self, controller: ControllerHandle, aliases: &dyn AliasState) -> TransitionOutcome {
        let Some(ctrl) = self.controllers.get_mut(&controller) else {
            return Ignored;
        };
        // Clear overlaps first so nothing gets promoted to touched on the way out
        let mut overlapped: Vec<CandidateId> = ctrl.near.drain(..).collect();
        overlapped.extend(ctrl.contacts.drain(..));
        let grabbing = ctrl.grabbed.is_some();
        let using = ctrl.used.is_some();

        if grabbing {
            self.release(controller, true, aliases);
        }
        if using {
            self.stop_use(controller);
        }
        if let Some(touched) = self.touched_object(controller) {
            overlapped.push(touched);
            self.untouch(controller, touched);
        }
        for candidate in overlapped {
            self.refresh_near(controller, candidate);
        }

        self.controllers.remove(&controller);
        info!("Dropped controller {}", controller);
        Applied
    }
}

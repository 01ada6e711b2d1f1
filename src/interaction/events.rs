//! Requests, outcomes and events of the ownership arbiter

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::controller::ControllerHandle;
use crate::mapping::ButtonAlias;

use super::candidate::{CandidateConfig, CandidateId};
use super::snap_zone::{SnapTransition, ZoneId};

/// Who reported an overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OverlapSource {
    /// Proximity volume around a controller
    Near(ControllerHandle),
    /// Physical contact volume of a controller
    Contact(ControllerHandle),
    /// Capture volume of a snap zone
    Zone(ZoneId),
}

/// One unit of work for the arbiter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    OverlapEnter {
        source: OverlapSource,
        candidate: CandidateId,
    },
    OverlapExit {
        source: OverlapSource,
        candidate: CandidateId,
    },
    /// Activation edge of an alias went down
    AliasDown {
        controller: ControllerHandle,
        alias: ButtonAlias,
    },
    AliasUp {
        controller: ControllerHandle,
        alias: ButtonAlias,
    },
    Grab {
        controller: ControllerHandle,
        candidate: CandidateId,
    },
    /// Regular release of whatever `controller` holds, subject to drop policy
    Release { controller: ControllerHandle },
    /// Release that bypasses drop policy and never snaps
    ForceRelease { candidate: CandidateId },
    Use {
        controller: ControllerHandle,
        candidate: CandidateId,
    },
    Unuse { controller: ControllerHandle },
    Click {
        controller: ControllerHandle,
        candidate: CandidateId,
        synthetic: bool,
    },
    ForceSnap {
        zone: ZoneId,
        candidate: CandidateId,
    },
    Unsnap { zone: ZoneId },
    /// Host finished instantiating the replacement requested by a clone zone.
    /// An unknown `clone` id is registered with the original's configuration.
    CompleteClone { zone: ZoneId, clone: CandidateId },
    /// Object spawned by the host after setup
    RegisterCandidate { config: CandidateConfig },
    RemoveCandidate { candidate: CandidateId },
    DropController { controller: ControllerHandle },
}

/// Why a transition was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    StaleController,
    UnknownCandidate,
    UnknownZone,
    NotGrabbable,
    NotUsable,
    ControllerNotAllowed,
    /// Another controller holds the candidate and no swap policy applies
    ConflictingOwnership { holder: ControllerHandle },
    /// The controller already holds a different candidate
    ControllerBusy,
    NotGrabbed,
    DropNotAllowed,
    NoValidSnapZone,
    UseRequiresGrab,
    /// Hidden below another occupant of a stackable zone
    CandidateStashed,
    ZoneRejected,
    ZoneEmpty,
    NoClonePending,
    DuplicateCandidate,
}

/// Result of one submitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// Valid request that changed nothing
    Ignored,
    Rejected(Rejection),
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InteractionEvent {
    NearTouched {
        controller: ControllerHandle,
        candidate: CandidateId,
    },
    NearUntouched {
        controller: ControllerHandle,
        candidate: CandidateId,
    },
    Touched {
        controller: ControllerHandle,
        candidate: CandidateId,
    },
    Untouched {
        controller: ControllerHandle,
        candidate: CandidateId,
    },
    Grabbed {
        controller: ControllerHandle,
        candidate: CandidateId,
    },
    Ungrabbed {
        controller: ControllerHandle,
        candidate: CandidateId,
        forced: bool,
    },
    Used {
        controller: ControllerHandle,
        candidate: CandidateId,
    },
    Unused {
        controller: ControllerHandle,
        candidate: CandidateId,
    },
    Clicked {
        controller: ControllerHandle,
        candidate: CandidateId,
        synthetic: bool,
    },
    ZoneEntered {
        zone: ZoneId,
        candidate: CandidateId,
        controller: Option<ControllerHandle>,
    },
    /// Candidate left the zone's volume, or another zone won the snap
    ZoneExited {
        zone: ZoneId,
        candidate: CandidateId,
        controller: Option<ControllerHandle>,
    },
    Snapped {
        zone: ZoneId,
        candidate: CandidateId,
        controller: Option<ControllerHandle>,
        transition: SnapTransition,
    },
    Unsnapped {
        zone: ZoneId,
        candidate: CandidateId,
        controller: Option<ControllerHandle>,
    },
    /// Previous occupant of a stackable zone was hidden below the new one
    OccupantStashed {
        zone: ZoneId,
        candidate: CandidateId,
    },
    /// Host should instantiate a copy of `source` and report it back
    CloneRequested { zone: ZoneId, source: CandidateId },
    TransitionRejected { request: Request, reason: Rejection },
}

/// Follow-up requests raised from inside event callbacks
///
/// Callbacks never re-enter the arbiter; what they push here runs after the
/// transition that emitted the event has completed.
#[derive(Debug, Default)]
pub struct RequestQueue {
    pending: VecDeque<Request>,
}

impl RequestQueue {
    pub fn push(&mut self, request: Request) {
        self.pending.push_back(request);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn pop(&mut self) -> Option<Request> {
        self.pending.pop_front()
    }
}

pub type InteractionCallback = Box<dyn FnMut(&InteractionEvent, &mut RequestQueue) + Send>;

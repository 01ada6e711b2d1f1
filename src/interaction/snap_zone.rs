//! Snap zones: containers that claim ownership of released candidates

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::candidate::{CandidateConfig, CandidateId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub u32);

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zone:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapacityPolicy {
    /// At most one occupant
    Single,
    /// Matching stack identities pile up; the newest is the visible occupant
    Stackable,
    /// Single occupant that is replaced by a clone the moment it is grabbed away
    CloneOnSnap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ListMode {
    /// Tags in the list are refused
    #[default]
    Ignore,
    /// Only tags in the list are accepted
    Include,
}

/// Tag based admission check
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZonePolicy {
    pub mode: ListMode,
    pub tags: BTreeSet<String>,
}

impl ZonePolicy {
    pub fn include(tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            mode: ListMode::Include,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn admits(&self, candidate: &CandidateConfig) -> bool {
        if candidate.is_excluded() {
            return false;
        }
        let listed = candidate.tags.iter().any(|tag| self.tags.contains(tag));
        match self.mode {
            ListMode::Ignore => !listed,
            ListMode::Include => listed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub id: ZoneId,
    #[serde(default)]
    pub name: String,
    pub capacity: CapacityPolicy,
    #[serde(default)]
    pub policy: ZonePolicy,
    /// Seconds the snap animation takes; zero snaps instantly
    #[serde(default)]
    pub snap_duration: f32,
    /// Snapped instantly when the zone is set up
    #[serde(default)]
    pub default_occupant: Option<CandidateId>,
}

impl ZoneConfig {
    pub fn new(id: ZoneId, capacity: CapacityPolicy) -> Self {
        Self {
            id,
            name: String::new(),
            capacity,
            policy: ZonePolicy::default(),
            snap_duration: 0.0,
            default_occupant: None,
        }
    }

    pub fn with_policy(mut self, policy: ZonePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_default_occupant(mut self, candidate: CandidateId) -> Self {
        self.default_occupant = Some(candidate);
        self
    }

    pub fn with_snap_duration(mut self, seconds: f32) -> Self {
        self.snap_duration = seconds;
        self
    }
}

/// How a snapped candidate reaches its place
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapTransition {
    Instant,
    Animated { duration: f32 },
}

impl SnapTransition {
    pub(crate) fn for_duration(duration: f32) -> Self {
        if duration > 0.0 {
            SnapTransition::Animated { duration }
        } else {
            SnapTransition::Instant
        }
    }
}

/// Runtime state of a zone
///
/// Occupancy only changes through the arbiter's snap and unsnap transitions.
#[derive(Debug, Clone)]
pub struct SnapZone {
    config: ZoneConfig,
    occupant: Option<CandidateId>,
    stack: Vec<CandidateId>,
    awaiting_clone: Option<CandidateId>,
}

impl SnapZone {
    pub fn new(config: ZoneConfig) -> Self {
        Self {
            config,
            occupant: None,
            stack: Vec::new(),
            awaiting_clone: None,
        }
    }

    pub fn id(&self) -> ZoneId {
        self.config.id
    }

    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    pub fn capacity(&self) -> CapacityPolicy {
        self.config.capacity
    }

    pub fn occupant(&self) -> Option<CandidateId> {
        self.occupant
    }

    /// Hidden occupants below the visible one, oldest first
    pub fn stashed(&self) -> &[CandidateId] {
        &self.stack
    }

    /// Visible occupant plus hidden stack
    pub fn depth(&self) -> usize {
        self.stack.len() + usize::from(self.occupant.is_some())
    }

    pub fn awaiting_clone(&self) -> Option<CandidateId> {
        self.awaiting_clone
    }

    pub fn contains(&self, candidate: CandidateId) -> bool {
        self.occupant == Some(candidate) || self.stack.contains(&candidate)
    }

    /// Policy list and capacity check for `incoming`
    ///
    /// `occupant_config` describes the current occupant, if any.
    pub fn accepts(
        &self,
        incoming: &CandidateConfig,
        occupant_config: Option<&CandidateConfig>,
    ) -> bool {
        if !self.config.policy.admits(incoming) || self.awaiting_clone.is_some() {
            return false;
        }
        match (self.config.capacity, self.occupant) {
            (_, None) => true,
            (CapacityPolicy::Stackable, Some(_)) => {
                let Some(occupant) = occupant_config else {
                    return false;
                };
                incoming.capabilities.stackable
                    && incoming.stack_identity.is_some()
                    && incoming.stack_identity == occupant.stack_identity
            }
            (CapacityPolicy::Single | CapacityPolicy::CloneOnSnap, Some(_)) => false,
        }
    }

    /// Places `candidate` as visible occupant; returns the occupant pushed onto the stack
    pub(crate) fn place(&mut self, candidate: CandidateId) -> Option<CandidateId> {
        let stashed = self.occupant.replace(candidate);
        if let Some(previous) = stashed {
            self.stack.push(previous);
        }
        stashed
    }

    /// Removes the visible occupant; the next stacked candidate becomes visible
    pub(crate) fn take_occupant(&mut self) -> Option<(CandidateId, Option<CandidateId>)> {
        let removed = self.occupant.take()?;
        self.occupant = self.stack.pop();
        Some((removed, self.occupant))
    }

    /// Drops a hidden candidate from the stack
    pub(crate) fn remove_stashed(&mut self, candidate: CandidateId) -> bool {
        let before = self.stack.len();
        self.stack.retain(|entry| *entry != candidate);
        before != self.stack.len()
    }

    pub(crate) fn set_awaiting_clone(&mut self, source: Option<CandidateId>) {
        self.awaiting_clone = source;
    }
}

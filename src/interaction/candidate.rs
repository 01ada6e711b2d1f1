//! Interactable candidates and their per-object policies
//!
//! Behaviour is selected per candidate at configuration time through small policy
//! structs ([`GrabPolicy`], [`UsePolicy`]) instead of specialised object types.

use crate::controller::{ControllerHandle, Hand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub u32);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "candidate:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub touchable: bool,
    pub grabbable: bool,
    pub usable: bool,
    pub stackable: bool,
    pub climbable: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            touchable: true,
            grabbable: false,
            usable: false,
            stackable: false,
            climbable: false,
        }
    }
}

/// Explicit policy list result that overrides capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyVerdict {
    Include,
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AllowedController {
    #[default]
    Both,
    LeftOnly,
    RightOnly,
}

impl AllowedController {
    pub fn permits(&self, controller: ControllerHandle) -> bool {
        match self {
            AllowedController::Both => true,
            AllowedController::LeftOnly => controller.hand == Hand::Left,
            AllowedController::RightOnly => controller.hand == Hand::Right,
        }
    }
}

/// How the grab alias holds on to a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HoldMode {
    /// Held while the alias is down
    #[default]
    Hold,
    /// Each alias press flips the state
    Toggle,
}

/// Reaction to a second controller grabbing an already grabbed candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecondaryGrab {
    #[default]
    Reject,
    /// Force the first grabber to release, then hand over
    Swap,
}

/// Where a grabbed candidate may be let go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValidDrop {
    #[default]
    DropAnywhere,
    /// Only a forced release frees the candidate
    NoDrop,
    /// Release is only accepted above a zone that would take the candidate
    DropValidSnapZone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabPolicy {
    pub mode: HoldMode,
    /// Grab as soon as touch begins, without a button edge
    pub grab_on_touch: bool,
    /// Grab when touch begins while the grab alias is already held
    pub grab_if_held_on_touch: bool,
    pub secondary: SecondaryGrab,
    pub allowed: AllowedController,
    pub drop: ValidDrop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UsePolicy {
    pub mode: HoldMode,
    pub use_only_if_grabbed: bool,
    pub allowed: AllowedController,
}

/// Static description of one interactable object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateConfig {
    pub id: CandidateId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub policy: Option<PolicyVerdict>,
    /// Identifiers checked by snap zone policy lists
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Candidates sharing a stack identity can pile up in stackable zones
    #[serde(default)]
    pub stack_identity: Option<String>,
    #[serde(default)]
    pub grab: GrabPolicy,
    #[serde(default, rename = "use")]
    pub use_policy: UsePolicy,
}

impl CandidateConfig {
    pub fn new(id: CandidateId) -> Self {
        Self {
            id,
            name: String::new(),
            capabilities: Capabilities::default(),
            policy: None,
            tags: BTreeSet::new(),
            stack_identity: None,
            grab: GrabPolicy::default(),
            use_policy: UsePolicy::default(),
        }
    }

    /// Touchable and grabbable, the common case for props
    pub fn grabbable(id: CandidateId) -> Self {
        let mut config = Self::new(id);
        config.capabilities.grabbable = true;
        config
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_stack_identity(mut self, identity: impl Into<String>) -> Self {
        self.capabilities.stackable = true;
        self.stack_identity = Some(identity.into());
        self
    }

    pub fn is_excluded(&self) -> bool {
        self.policy == Some(PolicyVerdict::Exclude)
    }

    fn included(&self, capability: bool) -> bool {
        match self.policy {
            Some(PolicyVerdict::Include) => true,
            Some(PolicyVerdict::Exclude) => false,
            None => capability,
        }
    }

    pub fn can_touch(&self) -> bool {
        self.included(self.capabilities.touchable)
    }

    pub fn can_grab(&self) -> bool {
        self.included(self.capabilities.grabbable)
    }

    pub fn can_use(&self) -> bool {
        self.included(self.capabilities.usable)
    }
}

/// Externally visible ownership of a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnershipState {
    #[default]
    Idle,
    NearTouched,
    Touched,
    Grabbed,
    Used,
    Snapped,
}

//! Ownership of interactable candidates
//!
//! Overlap reports and alias activations become [`Request`]s. The
//! [`InteractionArbiter`] applies them one at a time and publishes
//! [`InteractionEvent`]s:
//!
//! ```text
//! overlaps ─┐
//! aliases ──┼─► Request ─► InteractionArbiter ─► InteractionEvent ─► callbacks
//! pointers ─┘                 ▲                                        │
//!                             └──────────── RequestQueue ◄─────────────┘
//! ```

pub mod arbiter;
pub mod candidate;
pub mod events;
pub mod snap_zone;

pub use arbiter::{InteractionArbiter, MAX_CHAINED_REQUESTS};
pub use candidate::{
    AllowedController, CandidateConfig, CandidateId, Capabilities, GrabPolicy, HoldMode,
    OwnershipState, PolicyVerdict, SecondaryGrab, UsePolicy, ValidDrop,
};
pub use events::{
    InteractionCallback, InteractionEvent, OverlapSource, Rejection, Request, RequestQueue,
    TransitionOutcome,
};
pub use snap_zone::{
    CapacityPolicy, ListMode, SnapTransition, SnapZone, ZoneConfig, ZoneId, ZonePolicy,
};

//! Alias mapping from physical buttons to semantic roles.
//!
//! The router is the only place that knows which physical button stands behind an
//! alias. Everything above it (arbiter, pointer, integrator callbacks) subscribes
//! to aliases such as [`ButtonAlias::GrabAction`] and keeps working when the
//! binding table changes at runtime.

pub mod alias;
pub mod error;
pub mod observer;
pub mod router;

pub use alias::{AliasBinding, AliasMap, ButtonAlias};
pub use error::MappingError;
pub use observer::{Observers, SubscriptionId};
pub use router::{AliasCallback, AliasEvent, AliasRouter, AliasSignal, AliasSnapshot, AliasState};

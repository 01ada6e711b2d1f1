//! Controller interaction core for VR toolkits
//!
//! Raw per-frame button samples become edges, edges become semantic aliases,
//! and aliases together with overlap reports drive exclusive ownership of
//! interactable objects (touch, grab, use, snap).
//!
//! ```text
//! samples ─► controller ─► mapping ─► interaction ─► FrameReport
//!                             │            ▲
//!                             └─► activation (pointers, haptics)
//! ```
//!
//! [`system::InteractionSystem`] ties the stages together behind one
//! `tick(dt)` call. [`host`] runs it as a tokio task for hosts that prefer
//! channels.

pub mod activation;
pub mod config;
pub mod controller;
pub mod host;
pub mod interaction;
pub mod mapping;
pub mod system;

pub use config::{ConfigError, InteractionConfig};
pub use system::{FrameReport, InteractionSystem, SemanticEvent};

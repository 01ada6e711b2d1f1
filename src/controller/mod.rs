//! Controller subsystem for per-frame button sampling
//!
//! Implements the bottom stage of the interaction pipeline:
//!
//! 1. [`controller_handle`] - Controller identity and analog value types
//! 2. [`button`] - Logical buttons, press types and edge events
//! 3. [`sampler`] - Raw sample history and edge detection
//!
//! # Architecture
//!
//! ```text
//! Hardware ──► Sampler ──► ButtonEdge ──► Alias Router
//!              (per frame)  (press/touch/hairline/click/axis)
//! ```
//!
//! Samples are captured once per button per frame before the frame tick runs.

pub mod button;
pub mod controller_handle;
pub mod sampler;

pub use button::{ButtonEdge, EdgeKind, LogicalButton, PressType, RawSample};
pub use controller_handle::{Axis2, ControllerHandle, Hand};
pub use sampler::{ButtonSampleState, ButtonSampler, SamplerSettings};

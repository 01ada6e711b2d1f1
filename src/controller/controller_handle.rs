//! Controller Handle - identity of one tracked controller
//!
//! Handles are handed out by the hardware layer when a controller is detected and
//! stay valid until it disconnects. Every layer above the sampler treats a handle
//! it no longer knows as stale and falls back to a neutral answer instead of failing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which hand a controller is held in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Hand {
    Left,
    Right,
    #[default]
    None,
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hand::Left => write!(f, "Left"),
            Hand::Right => write!(f, "Right"),
            Hand::None => write!(f, "None"),
        }
    }
}

/// Opaque identity of one physical controller
///
/// Ordering is by numeric index first. Whenever several controllers are processed
/// within the same frame they are visited in this order, so all events of the
/// lower index are dispatched before any event of the higher one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ControllerHandle {
    pub index: u32,
    #[serde(default)]
    pub hand: Hand,
}

impl ControllerHandle {
    pub const fn new(hand: Hand, index: u32) -> Self {
        Self { index, hand }
    }

    pub const fn left(index: u32) -> Self {
        Self::new(Hand::Left, index)
    }

    pub const fn right(index: u32) -> Self {
        Self::new(Hand::Right, index)
    }
}

impl fmt::Display for ControllerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.hand, self.index)
    }
}

/// Two dimensional analog value reported by touchpads, thumbsticks and triggers
///
/// One dimensional inputs (trigger, grip) only use `x`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Axis2 {
    pub x: f32,
    #[serde(default)]
    pub y: f32,
}

impl Axis2 {
    pub const ZERO: Axis2 = Axis2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub const fn scalar(x: f32) -> Self {
        Self { x, y: 0.0 }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x.powi(2) + self.y.powi(2)).sqrt()
    }

    /// Largest per-component distance to `other`
    pub fn max_component_delta(&self, other: &Axis2) -> f32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_order_by_index_before_hand() {
        let mut handles = vec![
            ControllerHandle::right(2),
            ControllerHandle::left(1),
            ControllerHandle::new(Hand::None, 0),
        ];
        handles.sort();
        assert_eq!(
            handles,
            vec![
                ControllerHandle::new(Hand::None, 0),
                ControllerHandle::left(1),
                ControllerHandle::right(2),
            ]
        );
    }

    #[test]
    fn axis_component_delta_uses_largest_axis() {
        let a = Axis2::new(0.5, -0.2);
        let b = Axis2::new(0.4, 0.1);
        assert!((a.max_component_delta(&b) - 0.3).abs() < 1e-6);
        assert!((Axis2::new(3.0, 4.0).magnitude() - 5.0).abs() < 1e-6);
    }
}

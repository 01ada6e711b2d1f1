// Shared button types for the sampler and the alias router

use super::controller_handle::{Axis2, ControllerHandle};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Vendor independent physical input
///
/// Declaration order is the dispatch order used within one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogicalButton {
    Trigger,
    Grip,
    Touchpad,
    ButtonOne,
    ButtonTwo,
    StartMenu,
}

impl LogicalButton {
    pub const ALL: [LogicalButton; 6] = [
        LogicalButton::Trigger,
        LogicalButton::Grip,
        LogicalButton::Touchpad,
        LogicalButton::ButtonOne,
        LogicalButton::ButtonTwo,
        LogicalButton::StartMenu,
    ];

    /// Buttons with a one dimensional pressure axis get hairline and click detection
    pub fn is_analog(&self) -> bool {
        matches!(self, LogicalButton::Trigger | LogicalButton::Grip)
    }

    pub(crate) fn slot(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for LogicalButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalButton::Trigger => write!(f, "Trigger"),
            LogicalButton::Grip => write!(f, "Grip"),
            LogicalButton::Touchpad => write!(f, "Touchpad"),
            LogicalButton::ButtonOne => write!(f, "ButtonOne"),
            LogicalButton::ButtonTwo => write!(f, "ButtonTwo"),
            LogicalButton::StartMenu => write!(f, "StartMenu"),
        }
    }
}

/// Which edge family of a button activates an alias
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum PressType {
    #[default]
    Press,
    Touch,
    Hairline,
    Click,
}

/// One raw sample as delivered by the hardware layer
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawSample {
    #[serde(default)]
    pub pressed: bool,
    #[serde(default)]
    pub touched: bool,
    #[serde(default)]
    pub axis: Axis2,
}

impl RawSample {
    pub fn new(pressed: bool, touched: bool, axis: Axis2) -> Self {
        Self {
            pressed,
            touched,
            axis,
        }
    }

    pub fn pressed() -> Self {
        Self::new(true, true, Axis2::ZERO)
    }

    pub fn released() -> Self {
        Self::default()
    }
}

/// Edge produced by the sampler for one button
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeKind {
    PressDown,
    PressUp,
    TouchStart,
    TouchEnd,
    HairlineStart,
    HairlineEnd,
    ClickDown,
    ClickUp,
    AxisChanged { value: Axis2, deadzone: f32 },
}

impl EdgeKind {
    /// Press type family and direction (`true` = down/start) of a digital edge
    pub fn family(&self) -> Option<(PressType, bool)> {
        match self {
            EdgeKind::PressDown => Some((PressType::Press, true)),
            EdgeKind::PressUp => Some((PressType::Press, false)),
            EdgeKind::TouchStart => Some((PressType::Touch, true)),
            EdgeKind::TouchEnd => Some((PressType::Touch, false)),
            EdgeKind::HairlineStart => Some((PressType::Hairline, true)),
            EdgeKind::HairlineEnd => Some((PressType::Hairline, false)),
            EdgeKind::ClickDown => Some((PressType::Click, true)),
            EdgeKind::ClickUp => Some((PressType::Click, false)),
            EdgeKind::AxisChanged { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonEdge {
    pub controller: ControllerHandle,
    pub button: LogicalButton,
    pub kind: EdgeKind,
}

//! Button State Sampler - raw per-frame samples to edge events
//!
//! Every frame the hardware layer reports one [`RawSample`] per button and
//! controller. The sampler keeps the previous sample and turns transitions into
//! [`ButtonEdge`]s. Feeding an identical sample twice never produces an edge the
//! second time, because edges are always computed against the stored state.
//!
//! Analog buttons (trigger, grip) additionally derive:
//!
//! - **Hairline** edges using a trailing limit: engaged when the axis rises
//!   `hairline_sensitivity` above the lowest value seen while released, released
//!   when it falls the same amount below the highest value seen while engaged.
//! - **Click** edges against `click_threshold` with a small release hysteresis.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::button::{ButtonEdge, EdgeKind, LogicalButton, PressType, RawSample};
use super::controller_handle::{Axis2, ControllerHandle};

/// Tuning for edge and axis detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    /// Radial rest zone around the origin; values inside count as zero
    pub axis_deadzone: f32,

    /// Minimum per-component change against the last reported axis value.
    /// `0.0` reports every distinct value outside the deadzone.
    pub axis_change_threshold: f32,

    /// Travel needed to engage or release the hairline
    pub hairline_sensitivity: f32,

    /// Axis value at which an analog button counts as clicked
    pub click_threshold: f32,

    /// How far below `click_threshold` the axis must fall to unclick
    pub click_release_hysteresis: f32,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            axis_deadzone: 0.05,
            axis_change_threshold: 0.0,
            hairline_sensitivity: 0.1,
            click_threshold: 1.0,
            click_release_hysteresis: 0.05,
        }
    }
}

/// Sample history of one (controller, button) pair
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ButtonSampleState {
    pub pressed: bool,
    pub touched: bool,
    pub previous_pressed: bool,
    pub previous_touched: bool,
    pub axis: Axis2,
    pub previous_axis: Axis2,
    /// Difference between the last two analog samples (x component)
    pub hairline_delta: f32,
    pub hairline_active: bool,
    pub clicked: bool,
    hairline_limit: f32,
    reported_axis: Axis2,
}

impl ButtonSampleState {
    /// Whether the edge family `press_type` is currently held
    pub fn is_active(&self, press_type: PressType) -> bool {
        match press_type {
            PressType::Press => self.pressed,
            PressType::Touch => self.touched,
            PressType::Hairline => self.hairline_active,
            PressType::Click => self.clicked,
        }
    }

    /// Last axis value that was reported through an `AxisChanged` edge
    pub fn reported_axis(&self) -> Axis2 {
        self.reported_axis
    }

    fn apply(
        &mut self,
        button: LogicalButton,
        raw: RawSample,
        settings: &SamplerSettings,
    ) -> Vec<EdgeKind> {
        self.previous_pressed = self.pressed;
        self.previous_touched = self.touched;
        self.previous_axis = self.axis;
        self.pressed = raw.pressed;
        self.touched = raw.touched;
        self.axis = raw.axis;
        self.hairline_delta = raw.axis.x - self.previous_axis.x;

        let mut rising = Vec::new();
        let mut falling = Vec::new();

        if self.touched && !self.previous_touched {
            rising.push(EdgeKind::TouchStart);
        } else if !self.touched && self.previous_touched {
            falling.push(EdgeKind::TouchEnd);
        }

        if button.is_analog() {
            match self.update_hairline(raw.axis.x, settings.hairline_sensitivity) {
                Some(true) => rising.push(EdgeKind::HairlineStart),
                Some(false) => falling.push(EdgeKind::HairlineEnd),
                None => {}
            }
        }

        if self.pressed && !self.previous_pressed {
            rising.push(EdgeKind::PressDown);
        } else if !self.pressed && self.previous_pressed {
            falling.push(EdgeKind::PressUp);
        }

        if button.is_analog() {
            match self.update_click(raw.axis.x, settings) {
                Some(true) => rising.push(EdgeKind::ClickDown),
                Some(false) => falling.push(EdgeKind::ClickUp),
                None => {}
            }
        }

        // Releases unwind in reverse order of engagement
        falling.reverse();
        let mut edges = rising;
        edges.extend(falling);

        if let Some(value) = self.update_axis(raw.axis, settings) {
            edges.push(EdgeKind::AxisChanged {
                value,
                deadzone: settings.axis_deadzone,
            });
        }
        edges
    }

    fn update_hairline(&mut self, value: f32, sensitivity: f32) -> Option<bool> {
        let was_active = self.hairline_active;
        if self.hairline_active {
            if value < self.hairline_limit - sensitivity || value <= 0.0 {
                self.hairline_active = false;
            }
        } else if value > self.hairline_limit + sensitivity || value >= 1.0 {
            self.hairline_active = true;
        }

        self.hairline_limit = if self.hairline_active {
            self.hairline_limit.max(value)
        } else {
            self.hairline_limit.min(value)
        };

        (was_active != self.hairline_active).then_some(self.hairline_active)
    }

    fn update_click(&mut self, value: f32, settings: &SamplerSettings) -> Option<bool> {
        if !self.clicked && value >= settings.click_threshold {
            self.clicked = true;
            Some(true)
        } else if self.clicked && value < settings.click_threshold - settings.click_release_hysteresis
        {
            self.clicked = false;
            Some(false)
        } else {
            None
        }
    }

    fn update_axis(&mut self, value: Axis2, settings: &SamplerSettings) -> Option<Axis2> {
        let deadzone = settings.axis_deadzone;
        let inside_now = value.magnitude() <= deadzone;
        let inside_before = self.reported_axis.magnitude() <= deadzone;

        if inside_now {
            if inside_before {
                return None;
            }
            // Leaving the active range reports the rest value once
            self.reported_axis = Axis2::ZERO;
            return Some(Axis2::ZERO);
        }

        if value.max_component_delta(&self.reported_axis) > settings.axis_change_threshold {
            self.reported_axis = value;
            Some(value)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ControllerSamples {
    buttons: [ButtonSampleState; LogicalButton::ALL.len()],
}

/// Per-controller sample store and edge detector
#[derive(Debug, Clone, Default)]
pub struct ButtonSampler {
    settings: SamplerSettings,
    controllers: BTreeMap<ControllerHandle, ControllerSamples>,
}

impl ButtonSampler {
    pub fn new(settings: SamplerSettings) -> Self {
        info!("Creating button sampler with settings: {:?}", settings);
        Self {
            settings,
            controllers: BTreeMap::new(),
        }
    }

    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }

    pub fn update_settings(&mut self, settings: SamplerSettings) {
        debug!("Updating sampler settings: {:?}", settings);
        self.settings = settings;
    }

    /// Starts tracking a controller. Returns `false` if it was already connected.
    pub fn connect(&mut self, controller: ControllerHandle) -> bool {
        if self.controllers.contains_key(&controller) {
            debug!("Controller {} already connected", controller);
            return false;
        }
        info!("Controller {} connected", controller);
        self.controllers
            .insert(controller, ControllerSamples::default());
        true
    }

    /// Forgets a controller and its sample history
    pub fn disconnect(&mut self, controller: ControllerHandle) -> bool {
        let removed = self.controllers.remove(&controller).is_some();
        if removed {
            info!("Controller {} disconnected", controller);
        } else {
            debug!("Disconnect for unknown controller {}", controller);
        }
        removed
    }

    pub fn is_connected(&self, controller: ControllerHandle) -> bool {
        self.controllers.contains_key(&controller)
    }

    /// Connected controllers in dispatch order
    pub fn controllers(&self) -> impl Iterator<Item = ControllerHandle> + '_ {
        self.controllers.keys().copied()
    }

    /// Applies one raw sample and returns the edges it caused.
    ///
    /// A stale handle yields no edges.
    pub fn update(
        &mut self,
        controller: ControllerHandle,
        button: LogicalButton,
        raw: RawSample,
    ) -> Vec<ButtonEdge> {
        let Some(samples) = self.controllers.get_mut(&controller) else {
            warn!(
                "Ignoring sample for stale controller {} ({})",
                controller, button
            );
            return Vec::new();
        };

        let edges: Vec<ButtonEdge> = samples.buttons[button.slot()]
            .apply(button, raw, &self.settings)
            .into_iter()
            .map(|kind| ButtonEdge {
                controller,
                button,
                kind,
            })
            .collect();

        for edge in &edges {
            debug!("Edge {:?} on {} of {}", edge.kind, button, controller);
        }
        edges
    }

    pub fn state(
        &self,
        controller: ControllerHandle,
        button: LogicalButton,
    ) -> Option<&ButtonSampleState> {
        self.controllers
            .get(&controller)
            .map(|samples| &samples.buttons[button.slot()])
    }

    pub fn is_active(
        &self,
        controller: ControllerHandle,
        button: LogicalButton,
        press_type: PressType,
    ) -> bool {
        self.state(controller, button)
            .map(|state| state.is_active(press_type))
            .unwrap_or(false)
    }

    pub fn is_pressed(&self, controller: ControllerHandle, button: LogicalButton) -> bool {
        self.is_active(controller, button, PressType::Press)
    }

    pub fn is_touched(&self, controller: ControllerHandle, button: LogicalButton) -> bool {
        self.is_active(controller, button, PressType::Touch)
    }

    /// Current axis value, zero for stale handles
    pub fn axis(&self, controller: ControllerHandle, button: LogicalButton) -> Axis2 {
        self.state(controller, button)
            .map(|state| state.axis)
            .unwrap_or_default()
    }

    pub fn hairline_delta(&self, controller: ControllerHandle, button: LogicalButton) -> f32 {
        self.state(controller, button)
            .map(|state| state.hairline_delta)
            .unwrap_or(0.0)
    }
}

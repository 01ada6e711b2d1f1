//! Pointer activation and hover auto-click
//!
//! A pointer belongs to one controller. Its activation alias switches it on and
//! off according to [`ActivationMode`]; while active, the host reports what the
//! pointer ray hits and the selection alias clicks that target. With
//! `click_after_hover` set, resting on one target for that long clicks it without
//! a button.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::controller::ControllerHandle;
use crate::interaction::{CandidateId, Request};
use crate::mapping::{AliasEvent, AliasSignal, ButtonAlias};

use super::timer::{TimedActivation, TimerStatus};
use super::{ActivationEvent, ActivationOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActivationMode {
    /// Active while the alias is held
    #[default]
    HoldButton,
    /// Each press flips the state
    ToggleButton,
    /// Ignores the alias
    AlwaysOn,
}

impl ActivationMode {
    /// Activation after this frame's alias state
    ///
    /// `held` is the alias state now, `pressed_down` whether it went down this frame.
    pub fn next(self, active: bool, held: bool, pressed_down: bool) -> bool {
        match self {
            ActivationMode::HoldButton => held,
            ActivationMode::ToggleButton => active ^ pressed_down,
            ActivationMode::AlwaysOn => true,
        }
    }
}

/// Which edge of the selection alias clicks the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClickMethod {
    #[default]
    OnPress,
    OnRelease,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerConfig {
    pub controller: ControllerHandle,
    #[serde(default)]
    pub activation_mode: ActivationMode,
    #[serde(default = "default_activation_alias")]
    pub activation_alias: ButtonAlias,
    #[serde(default = "default_selection_alias")]
    pub selection_alias: ButtonAlias,
    #[serde(default)]
    pub click_method: ClickMethod,
    /// Seconds of uninterrupted hover before a synthetic click
    #[serde(default)]
    pub click_after_hover: Option<f32>,
    /// Seconds after deactivation during which the pointer stays off
    #[serde(default)]
    pub reactivation_delay: f32,
}

fn default_activation_alias() -> ButtonAlias {
    ButtonAlias::ActivateAction
}

fn default_selection_alias() -> ButtonAlias {
    ButtonAlias::SelectAction
}

impl PointerConfig {
    pub fn new(controller: ControllerHandle, activation_mode: ActivationMode) -> Self {
        Self {
            controller,
            activation_mode,
            activation_alias: default_activation_alias(),
            selection_alias: default_selection_alias(),
            click_method: ClickMethod::default(),
            click_after_hover: None,
            reactivation_delay: 0.0,
        }
    }

    pub fn with_click_after_hover(mut self, seconds: f32) -> Self {
        self.click_after_hover = Some(seconds);
        self
    }

    pub fn with_reactivation_delay(mut self, seconds: f32) -> Self {
        self.reactivation_delay = seconds;
        self
    }
}

#[derive(Debug)]
pub struct Pointer {
    config: PointerConfig,
    active: bool,
    held: bool,
    target: Option<CandidateId>,
    hover_timer: Option<TimedActivation>,
    cooldown: Option<TimedActivation>,
}

impl Pointer {
    pub fn new(config: PointerConfig) -> Self {
        let active = config.activation_mode == ActivationMode::AlwaysOn;
        Self {
            config,
            active,
            held: false,
            target: None,
            hover_timer: None,
            cooldown: None,
        }
    }

    pub fn config(&self) -> &PointerConfig {
        &self.config
    }

    pub fn controller(&self) -> ControllerHandle {
        self.config.controller
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn target(&self) -> Option<CandidateId> {
        self.target
    }

    /// Seconds left on the hover auto-click, if one is counting
    pub fn hover_remaining(&self) -> Option<f32> {
        self.hover_timer.as_ref().map(TimedActivation::remaining)
    }

    /// Feeds an alias activation edge of this pointer's controller
    pub fn handle_alias(&mut self, event: &AliasEvent, out: &mut ActivationOutput) {
        if event.controller != self.config.controller || !event.activation {
            return;
        }
        let down = match event.signal {
            AliasSignal::Down => true,
            AliasSignal::Up => false,
            AliasSignal::Axis { .. } => return,
        };

        // Selection first so a release that also deactivates still clicks
        if event.alias == self.config.selection_alias {
            let clicks = match self.config.click_method {
                ClickMethod::OnPress => down,
                ClickMethod::OnRelease => !down,
            };
            if let (true, true, Some(candidate)) = (clicks, self.active, self.target) {
                debug!("Pointer on {} selects {}", self.config.controller, candidate);
                out.requests.push(Request::Click {
                    controller: self.config.controller,
                    candidate,
                    synthetic: false,
                });
            }
        }

        if event.alias == self.config.activation_alias {
            self.held = down;
            let wanted = self.config.activation_mode.next(self.active, down, down);
            self.apply_activation(wanted, out);
        }
    }

    /// Reports the pointer ray's current target
    pub fn set_target(&mut self, target: Option<CandidateId>, out: &mut ActivationOutput) {
        if !self.active || target == self.target {
            return;
        }
        let controller = self.config.controller;
        if let Some(previous) = self.target.take() {
            self.cancel_hover();
            out.events.push(ActivationEvent::HoverExited {
                controller,
                candidate: previous,
            });
        }
        if let Some(candidate) = target {
            self.target = Some(candidate);
            self.hover_timer = self.config.click_after_hover.map(TimedActivation::new);
            out.events.push(ActivationEvent::HoverEntered {
                controller,
                candidate,
            });
        }
    }

    pub fn tick(&mut self, dt: f32, out: &mut ActivationOutput) {
        if let Some(cooldown) = self.cooldown.as_mut() {
            if cooldown.tick(dt) != TimerStatus::Pending {
                self.cooldown = None;
                debug!("Pointer on {} may reactivate", self.config.controller);
                if self.config.activation_mode == ActivationMode::HoldButton && self.held {
                    self.apply_activation(true, out);
                }
            }
        }

        let Some(timer) = self.hover_timer.as_mut() else {
            return;
        };
        match timer.tick(dt) {
            TimerStatus::Pending => {}
            TimerStatus::Fired => {
                self.hover_timer = None;
                if let Some(candidate) = self.target {
                    info!(
                        "Hover on {} by {} clicks after {:.2}s",
                        candidate,
                        self.config.controller,
                        self.config.click_after_hover.unwrap_or_default()
                    );
                    out.requests.push(Request::Click {
                        controller: self.config.controller,
                        candidate,
                        synthetic: true,
                    });
                }
            }
            TimerStatus::Finished | TimerStatus::Cancelled => self.hover_timer = None,
        }
    }

    /// Switches the pointer off without starting the reactivation delay
    pub fn reset(&mut self, out: &mut ActivationOutput) {
        self.held = false;
        self.cooldown = None;
        if self.active && self.config.activation_mode != ActivationMode::AlwaysOn {
            self.deactivate(out);
        }
    }

    fn apply_activation(&mut self, wanted: bool, out: &mut ActivationOutput) {
        if wanted == self.active {
            return;
        }
        if wanted {
            if self.cooldown.is_some() {
                debug!(
                    "Pointer on {} is cooling down, activation ignored",
                    self.config.controller
                );
                return;
            }
            self.active = true;
            out.events.push(ActivationEvent::PointerActivated {
                controller: self.config.controller,
            });
        } else {
            self.deactivate(out);
            if self.config.reactivation_delay > 0.0 {
                self.cooldown = Some(TimedActivation::new(self.config.reactivation_delay));
            }
        }
    }

    fn deactivate(&mut self, out: &mut ActivationOutput) {
        let controller = self.config.controller;
        if let Some(candidate) = self.target.take() {
            self.cancel_hover();
            out.events.push(ActivationEvent::HoverExited {
                controller,
                candidate,
            });
        }
        self.active = false;
        out.events.push(ActivationEvent::PointerDeactivated { controller });
    }

    fn cancel_hover(&mut self) {
        if let Some(timer) = self.hover_timer.take() {
            timer.cancel();
        }
    }
}

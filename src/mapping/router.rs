//! Alias Event Router
//!
//! Re-publishes sampler edges under the alias namespace so that higher layers never
//! reference physical buttons. An alias forwards every edge family of its bound
//! button (press, touch, hairline, click) tagged with that family; only edges of the
//! binding's own press type count as *activation* of the alias.
//!
//! ```text
//! ButtonEdge ──► [default table + per-hand overrides] ──► AliasEvent ──► subscribers
//! ```
//!
//! Rebinding takes effect on the next routed edge. Subscriptions are keyed by
//! (controller, alias, press type) and survive rebinding.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::controller::{
    Axis2, ButtonEdge, ButtonSampler, ControllerHandle, EdgeKind, Hand, LogicalButton, PressType,
};

use super::alias::{AliasBinding, AliasMap, ButtonAlias};
use super::error::MappingError;
use super::observer::{Observers, SubscriptionId};

/// What happened on an alias
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AliasSignal {
    Down,
    Up,
    Axis { value: Axis2, deadzone: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AliasEvent {
    pub controller: ControllerHandle,
    pub alias: ButtonAlias,
    pub button: LogicalButton,
    pub press_type: PressType,
    pub signal: AliasSignal,
    /// Edge family matches the binding, i.e. the alias itself went down or up
    pub activation: bool,
}

impl AliasEvent {
    pub fn is_activation_down(&self) -> bool {
        self.activation && self.signal == AliasSignal::Down
    }

    pub fn is_activation_up(&self) -> bool {
        self.activation && self.signal == AliasSignal::Up
    }
}

pub type AliasCallback = Box<dyn FnMut(&AliasEvent) + Send>;

/// Synchronous "is this alias held" lookup used outside the edge flow
pub trait AliasState {
    fn is_alias_active(&self, controller: ControllerHandle, alias: ButtonAlias) -> bool;
}

/// Router and sampler viewed together as of the current frame
pub struct AliasSnapshot<'a> {
    router: &'a AliasRouter,
    sampler: &'a ButtonSampler,
}

impl<'a> AliasSnapshot<'a> {
    pub fn new(router: &'a AliasRouter, sampler: &'a ButtonSampler) -> Self {
        Self { router, sampler }
    }
}

impl AliasState for AliasSnapshot<'_> {
    fn is_alias_active(&self, controller: ControllerHandle, alias: ButtonAlias) -> bool {
        self.router.is_alias_active(self.sampler, controller, alias)
    }
}

type SubscriptionKey = (ControllerHandle, ButtonAlias, PressType);

pub struct AliasRouter {
    defaults: AliasMap,
    overrides: BTreeMap<Hand, AliasMap>,
    subscribers: Observers<SubscriptionKey, AliasCallback>,
}

impl Default for AliasRouter {
    fn default() -> Self {
        Self::new(AliasMap::standard())
    }
}

impl AliasRouter {
    pub fn new(defaults: AliasMap) -> Self {
        info!("Creating alias router with {} bindings", defaults.iter().count());
        Self {
            defaults,
            overrides: BTreeMap::new(),
            subscribers: Observers::new(),
        }
    }

    /// Rebinds an alias for every controller without a hand override
    pub fn configure(
        &mut self,
        alias: ButtonAlias,
        button: LogicalButton,
        press_type: PressType,
    ) -> Result<(), MappingError> {
        info!("Configuring {:?} -> {} ({:?})", alias, button, press_type);
        self.defaults
            .bind(alias, AliasBinding::new(button, press_type))
    }

    /// Rebinds an alias for controllers held in `hand` only
    pub fn configure_for_hand(
        &mut self,
        hand: Hand,
        alias: ButtonAlias,
        binding: AliasBinding,
    ) -> Result<(), MappingError> {
        info!(
            "Configuring {:?} for {} hand -> {} ({:?})",
            alias, hand, binding.button, binding.press_type
        );
        self.overrides.entry(hand).or_default().bind(alias, binding)
    }

    pub fn clear_hand_override(&mut self, hand: Hand, alias: ButtonAlias) {
        if let Some(map) = self.overrides.get_mut(&hand) {
            map.unbind(alias);
        }
    }

    /// Applies the undefined policy to `alias` in the default table
    pub fn unbind(&mut self, alias: ButtonAlias) {
        if self.defaults.unbind(alias).is_some() {
            info!("Unbound {:?}", alias);
        }
    }

    /// Effective binding of `alias` for `controller`
    pub fn binding_for(
        &self,
        controller: ControllerHandle,
        alias: ButtonAlias,
    ) -> Option<AliasBinding> {
        if alias == ButtonAlias::Undefined {
            return None;
        }
        self.overrides
            .get(&controller.hand)
            .and_then(|map| map.binding(alias))
            .or_else(|| self.defaults.binding(alias))
    }

    pub fn subscribe(
        &mut self,
        controller: ControllerHandle,
        alias: ButtonAlias,
        press_type: PressType,
        callback: AliasCallback,
    ) -> SubscriptionId {
        let id = self
            .subscribers
            .subscribe((controller, alias, press_type), callback);
        debug!(
            "Subscribed {:?} to {:?}/{:?} on {}",
            id, alias, press_type, controller
        );
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Translates one button edge into alias events
    pub fn route(&self, edge: &ButtonEdge) -> Vec<AliasEvent> {
        let mut events = Vec::new();
        for alias in ButtonAlias::BINDABLE {
            let Some(binding) = self.binding_for(edge.controller, alias) else {
                continue;
            };
            if binding.button != edge.button {
                continue;
            }

            let (press_type, signal) = match edge.kind {
                EdgeKind::AxisChanged { value, deadzone } => {
                    (binding.press_type, AliasSignal::Axis { value, deadzone })
                }
                kind => match kind.family() {
                    Some((family, true)) => (family, AliasSignal::Down),
                    Some((family, false)) => (family, AliasSignal::Up),
                    None => continue,
                },
            };

            events.push(AliasEvent {
                controller: edge.controller,
                alias,
                button: edge.button,
                press_type,
                signal,
                activation: press_type == binding.press_type
                    && !matches!(signal, AliasSignal::Axis { .. }),
            });
        }
        events
    }

    /// Invokes subscribers synchronously, in the order of `events`
    pub fn dispatch(&mut self, events: &[AliasEvent]) {
        for event in events {
            let key = (event.controller, event.alias, event.press_type);
            for callback in self.subscribers.for_key_mut(&key) {
                callback(event);
            }
        }
    }

    /// Whether the alias is currently held on `controller`
    ///
    /// Unbound aliases and stale controllers are never active.
    pub fn is_alias_active(
        &self,
        sampler: &ButtonSampler,
        controller: ControllerHandle,
        alias: ButtonAlias,
    ) -> bool {
        self.binding_for(controller, alias)
            .map(|binding| sampler.is_active(controller, binding.button, binding.press_type))
            .unwrap_or(false)
    }
}

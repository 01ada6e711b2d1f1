//! Semantic button aliases and their binding tables

use crate::controller::{LogicalButton, PressType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::error::MappingError;

/// Semantic input role, decoupled from the physical button
///
/// Declaration order is the dispatch order when several aliases share a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ButtonAlias {
    /// Turns a pointer on or off
    ActivateAction,
    /// Confirms the pointer target (UI click)
    SelectAction,
    GrabAction,
    UseAction,
    MenuAction,
    /// Never bound, never active, never fires
    Undefined,
}

impl ButtonAlias {
    pub const BINDABLE: [ButtonAlias; 5] = [
        ButtonAlias::ActivateAction,
        ButtonAlias::SelectAction,
        ButtonAlias::GrabAction,
        ButtonAlias::UseAction,
        ButtonAlias::MenuAction,
    ];
}

/// Physical button plus the press type that activates an alias
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AliasBinding {
    pub button: LogicalButton,
    #[serde(default)]
    pub press_type: PressType,
}

impl AliasBinding {
    pub const fn new(button: LogicalButton, press_type: PressType) -> Self {
        Self { button, press_type }
    }

    pub const fn press(button: LogicalButton) -> Self {
        Self::new(button, PressType::Press)
    }

    pub const fn touch(button: LogicalButton) -> Self {
        Self::new(button, PressType::Touch)
    }

    /// Rejects bindings that could never fire
    pub fn validate(&self, alias: ButtonAlias) -> Result<(), MappingError> {
        if alias == ButtonAlias::Undefined {
            return Err(MappingError::UndefinedAliasBound(
                self.button,
                self.press_type,
            ));
        }
        let analog_only = matches!(self.press_type, PressType::Hairline | PressType::Click);
        if analog_only && !self.button.is_analog() {
            return Err(MappingError::UnsupportedPressType {
                alias,
                button: self.button,
                press_type: self.press_type,
            });
        }
        Ok(())
    }
}

/// Alias to binding table
///
/// Several aliases may share one physical button; each alias has at most one binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliasMap {
    bindings: BTreeMap<ButtonAlias, AliasBinding>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conventional layout: pointer on the touchpad, select and use on the
    /// trigger, grab on the grip, menu on button two
    pub fn standard() -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(
            ButtonAlias::ActivateAction,
            AliasBinding::press(LogicalButton::Touchpad),
        );
        bindings.insert(
            ButtonAlias::SelectAction,
            AliasBinding::press(LogicalButton::Trigger),
        );
        bindings.insert(
            ButtonAlias::GrabAction,
            AliasBinding::press(LogicalButton::Grip),
        );
        bindings.insert(
            ButtonAlias::UseAction,
            AliasBinding::press(LogicalButton::Trigger),
        );
        bindings.insert(
            ButtonAlias::MenuAction,
            AliasBinding::press(LogicalButton::ButtonTwo),
        );
        Self { bindings }
    }

    /// Binds or rebinds an alias
    pub fn bind(&mut self, alias: ButtonAlias, binding: AliasBinding) -> Result<(), MappingError> {
        binding.validate(alias)?;
        debug!(
            "Binding {:?} to {} ({:?})",
            alias, binding.button, binding.press_type
        );
        self.bindings.insert(alias, binding);
        Ok(())
    }

    pub fn unbind(&mut self, alias: ButtonAlias) -> Option<AliasBinding> {
        self.bindings.remove(&alias)
    }

    pub fn binding(&self, alias: ButtonAlias) -> Option<AliasBinding> {
        self.bindings.get(&alias).copied()
    }

    /// Aliases bound to `button`, in alias declaration order
    pub fn aliases_for(
        &self,
        button: LogicalButton,
    ) -> impl Iterator<Item = (ButtonAlias, AliasBinding)> + '_ {
        self.bindings
            .iter()
            .filter(move |(_, binding)| binding.button == button)
            .map(|(alias, binding)| (*alias, *binding))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ButtonAlias, AliasBinding)> + '_ {
        self.bindings.iter().map(|(alias, binding)| (*alias, *binding))
    }
}

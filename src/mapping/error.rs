//! Error definitions for the alias mapping module

use crate::controller::{LogicalButton, PressType};
use thiserror::Error;

use super::alias::ButtonAlias;

/// Errors raised while configuring the alias table
///
/// These only occur at configuration time. Once a table is accepted, dispatch
/// during a frame tick cannot fail.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MappingError {
    /// The undefined alias is the explicit "never fires" policy and cannot be bound
    #[error("Undefined alias cannot be bound to {0} ({1:?})")]
    UndefinedAliasBound(LogicalButton, PressType),

    /// Analog-only press types on a digital button would never fire
    #[error("Alias {alias:?} uses {press_type:?} on digital button {button}")]
    UnsupportedPressType {
        alias: ButtonAlias,
        button: LogicalButton,
        press_type: PressType,
    },

    /// The alias appears twice in one binding table
    #[error("Alias {0:?} is bound more than once")]
    DuplicateBinding(ButtonAlias),
}

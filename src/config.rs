//! Setup-time configuration
//!
//! Everything the interaction core needs before the first frame: sampler tuning,
//! alias bindings, candidates, snap zones, pointers and haptic defaults. The
//! whole file is validated up front; a configuration that passes `validate`
//! never fails during a frame tick.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::activation::{HapticSettings, PointerConfig};
use crate::controller::{ControllerHandle, Hand, LogicalButton, PressType, SamplerSettings};
use crate::interaction::{CandidateConfig, CandidateId, ZoneConfig, ZoneId};
use crate::mapping::{AliasBinding, AliasMap, AliasRouter, ButtonAlias, MappingError};

const CONFIG_DIR: &str = "vrinteract";
const CONFIG_FILE: &str = "interaction.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid alias binding: {0}")]
    Mapping(#[from] MappingError),

    #[error("Candidate {0} is defined more than once")]
    DuplicateCandidate(CandidateId),

    #[error("Zone {0} is defined more than once")]
    DuplicateZone(ZoneId),

    #[error("Controller {0} has more than one pointer")]
    DuplicatePointer(ControllerHandle),

    #[error("Default occupant {candidate} of {zone} does not exist")]
    UnknownDefaultOccupant { zone: ZoneId, candidate: CandidateId },

    #[error("{zone} refuses its default occupant {candidate}")]
    DefaultOccupantRejected { zone: ZoneId, candidate: CandidateId },

    #[error("Snap duration of {0} must be a non-negative number of seconds, got {1}")]
    InvalidSnapDuration(ZoneId, f32),

    #[error("Setting {name} is out of range: {value}")]
    InvalidSetting { name: &'static str, value: f32 },
}

/// One alias binding as written in the configuration file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BindingEntry {
    pub alias: ButtonAlias,
    pub button: LogicalButton,
    #[serde(default)]
    pub press_type: PressType,
    /// Restricts the binding to controllers in this hand
    #[serde(default)]
    pub hand: Option<Hand>,
}

impl BindingEntry {
    pub fn binding(&self) -> AliasBinding {
        AliasBinding::new(self.button, self.press_type)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub sampler: SamplerSettings,
    /// Applied on top of the standard alias layout
    pub bindings: Vec<BindingEntry>,
    /// Aliases removed from the default table
    pub unbound: Vec<ButtonAlias>,
    pub candidates: Vec<CandidateConfig>,
    pub zones: Vec<ZoneConfig>,
    pub pointers: Vec<PointerConfig>,
    pub haptics: HapticSettings,
}

impl InteractionConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// `<config dir>/vrinteract/interaction.toml`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml_str(&content)?;
        info!(
            "Loaded interaction config from {} ({} candidates, {} zones, {} pointers)",
            path.display(),
            config.candidates.len(),
            config.zones.len(),
            config.pointers.len()
        );
        Ok(config)
    }

    /// Loads `path`, falling back to defaults when the file does not exist
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if exists {
            Self::load(path).await
        } else {
            warn!(
                "Config file {} does not exist, using default",
                path.display()
            );
            Ok(Self::default())
        }
    }

    /// Rejects everything that could only fail later, during a frame
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_sampler()?;
        self.build_router()?;

        let mut candidates = BTreeSet::new();
        for candidate in &self.candidates {
            if !candidates.insert(candidate.id) {
                return Err(ConfigError::DuplicateCandidate(candidate.id));
            }
        }

        let mut zones = BTreeSet::new();
        for zone in &self.zones {
            if !zones.insert(zone.id) {
                return Err(ConfigError::DuplicateZone(zone.id));
            }
            if zone.snap_duration.is_nan() || zone.snap_duration < 0.0 {
                return Err(ConfigError::InvalidSnapDuration(zone.id, zone.snap_duration));
            }
            if let Some(candidate) = zone.default_occupant {
                if !candidates.contains(&candidate) {
                    return Err(ConfigError::UnknownDefaultOccupant {
                        zone: zone.id,
                        candidate,
                    });
                }
            }
        }

        let mut pointers = BTreeSet::new();
        for pointer in &self.pointers {
            if !pointers.insert(pointer.controller) {
                return Err(ConfigError::DuplicatePointer(pointer.controller));
            }
            if let Some(seconds) = pointer.click_after_hover {
                non_negative("click_after_hover", seconds)?;
            }
            non_negative("reactivation_delay", pointer.reactivation_delay)?;
        }

        non_negative("haptics.duration", self.haptics.duration)?;
        debug!("Interaction config is valid");
        Ok(())
    }

    fn validate_sampler(&self) -> Result<(), ConfigError> {
        let sampler = &self.sampler;
        if !(0.0..1.0).contains(&sampler.axis_deadzone) {
            return Err(ConfigError::InvalidSetting {
                name: "sampler.axis_deadzone",
                value: sampler.axis_deadzone,
            });
        }
        if !(sampler.click_threshold > 0.0 && sampler.click_threshold <= 1.0) {
            return Err(ConfigError::InvalidSetting {
                name: "sampler.click_threshold",
                value: sampler.click_threshold,
            });
        }
        non_negative("sampler.axis_change_threshold", sampler.axis_change_threshold)?;
        non_negative("sampler.hairline_sensitivity", sampler.hairline_sensitivity)?;
        non_negative(
            "sampler.click_release_hysteresis",
            sampler.click_release_hysteresis,
        )
    }

    /// Standard layout with `bindings` and `unbound` applied
    pub fn build_router(&self) -> Result<AliasRouter, ConfigError> {
        let mut seen = BTreeSet::new();
        let mut defaults = AliasMap::standard();
        for alias in &self.unbound {
            defaults.unbind(*alias);
        }
        for entry in self.bindings.iter().filter(|entry| entry.hand.is_none()) {
            if !seen.insert((entry.alias, None)) {
                return Err(MappingError::DuplicateBinding(entry.alias).into());
            }
            defaults.bind(entry.alias, entry.binding())?;
        }

        let mut router = AliasRouter::new(defaults);
        for entry in &self.bindings {
            let Some(hand) = entry.hand else {
                continue;
            };
            if !seen.insert((entry.alias, Some(hand))) {
                return Err(MappingError::DuplicateBinding(entry.alias).into());
            }
            router.configure_for_hand(hand, entry.alias, entry.binding())?;
        }
        Ok(router)
    }
}

fn non_negative(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidSetting { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::CapacityPolicy;

    const SAMPLE: &str = r#"
[sampler]
axis_deadzone = 0.1

[[bindings]]
alias = "GrabAction"
button = "Trigger"

[[bindings]]
alias = "UseAction"
button = "Grip"
hand = "Left"

[[candidates]]
id = 1
name = "mug"
tags = ["cup"]
capabilities = { grabbable = true }
grab = { mode = "Toggle", secondary = "Swap" }

[[zones]]
id = 10
capacity = "CloneOnSnap"
snap_duration = 0.25
default_occupant = 1

[[pointers]]
controller = { index = 1, hand = "Right" }
activation_mode = "ToggleButton"
click_after_hover = 1.5
"#;

    #[test]
    fn parses_a_full_file() {
        let config = InteractionConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.sampler.axis_deadzone, 0.1);
        assert_eq!(config.sampler.click_threshold, 1.0);
        assert_eq!(config.candidates[0].tags.len(), 1);
        assert!(config.candidates[0].can_grab());
        assert_eq!(config.zones[0].capacity, CapacityPolicy::CloneOnSnap);
        assert_eq!(config.pointers[0].controller, ControllerHandle::right(1));
        assert_eq!(config.pointers[0].activation_alias, ButtonAlias::ActivateAction);

        let router = config.build_router().unwrap();
        assert_eq!(
            router.binding_for(ControllerHandle::right(1), ButtonAlias::GrabAction),
            Some(AliasBinding::press(LogicalButton::Trigger))
        );
        assert_eq!(
            router.binding_for(ControllerHandle::left(0), ButtonAlias::UseAction),
            Some(AliasBinding::press(LogicalButton::Grip))
        );
    }

    #[test]
    fn survives_a_toml_round_trip() {
        let config = InteractionConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(InteractionConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn missing_capacity_policy_is_rejected() {
        let result = InteractionConfig::from_toml_str("[[zones]]\nid = 3\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn unknown_button_is_rejected() {
        let result = InteractionConfig::from_toml_str(
            "[[bindings]]\nalias = \"GrabAction\"\nbutton = \"Joystick\"\n",
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn undefined_alias_cannot_be_bound() {
        let mut config = InteractionConfig::default();
        config.bindings.push(BindingEntry {
            alias: ButtonAlias::Undefined,
            button: LogicalButton::Grip,
            press_type: PressType::Press,
            hand: None,
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Mapping(MappingError::UndefinedAliasBound(..)))
        ));
    }

    #[test]
    fn hairline_needs_an_analog_button() {
        let mut config = InteractionConfig::default();
        config.bindings.push(BindingEntry {
            alias: ButtonAlias::GrabAction,
            button: LogicalButton::ButtonOne,
            press_type: PressType::Hairline,
            hand: None,
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Mapping(MappingError::UnsupportedPressType { .. }))
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut config = InteractionConfig::default();
        config.candidates.push(CandidateConfig::grabbable(CandidateId(1)));
        config.candidates.push(CandidateConfig::grabbable(CandidateId(1)));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateCandidate(CandidateId(1)))
        ));
    }

    #[test]
    fn default_occupant_must_be_declared() {
        let mut config = InteractionConfig::default();
        config
            .zones
            .push(ZoneConfig::new(ZoneId(2), CapacityPolicy::Single).with_default_occupant(CandidateId(9)));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownDefaultOccupant { .. })
        ));
    }

    #[test]
    fn nan_snap_duration_is_rejected() {
        for duration in [f32::NAN, -0.5] {
            let mut config = InteractionConfig::default();
            let mut zone = ZoneConfig::new(ZoneId(4), CapacityPolicy::Single);
            zone.snap_duration = duration;
            config.zones.push(zone);
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidSnapDuration(ZoneId(4), _))
            ));
        }
    }

    #[test]
    fn out_of_range_deadzone_is_rejected() {
        let mut config = InteractionConfig::default();
        config.sampler.axis_deadzone = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting { name: "sampler.axis_deadzone", .. })
        ));
    }

    #[test]
    fn default_path_ends_in_crate_folder() {
        let path = InteractionConfig::default_path();
        assert!(path.ends_with("vrinteract/interaction.toml"));
    }

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let config = InteractionConfig::load_or_default("/nonexistent/vrinteract/none.toml")
            .await
            .unwrap();
        assert_eq!(config, InteractionConfig::default());
        let result = InteractionConfig::load("/nonexistent/vrinteract/none.toml").await;
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::HostInput;
use crate::config::ConfigError;

/// Inputs delivered before one frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayFrame {
    /// Overrides the session delta for this frame
    pub delta: Option<f32>,
    /// Extra empty frames ticked after this one, for letting timers run
    pub idle_frames: u32,
    pub inputs: Vec<HostInput>,
}

/// Scripted host inputs, one entry per frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySession {
    pub frame_delta: f32,
    pub frames: Vec<ReplayFrame>,
}

impl Default for ReplaySession {
    fn default() -> Self {
        Self {
            frame_delta: 1.0 / 90.0,
            frames: Vec::new(),
        }
    }
}

impl ReplaySession {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let session = Self::from_toml_str(&text)?;
        info!(
            "Loaded replay session with {} frames from {:?}",
            session.frames.len(),
            path
        );
        Ok(session)
    }

    /// Ticks the session will run, idle frames included
    pub fn total_frames(&self) -> u64 {
        self.frames
            .iter()
            .map(|frame| 1 + u64::from(frame.idle_frames))
            .sum()
    }

    pub fn delta_for(&self, frame: &ReplayFrame) -> f32 {
        frame.delta.unwrap_or(self.frame_delta)
    }
}

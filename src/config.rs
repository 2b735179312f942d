//! Controller configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Failed to read config file: {0}")]
  Io(#[from] std::io::Error),
  #[error("Failed to parse config file: {0}")]
  Json(#[from] serde_json::Error),
}

/// Player configuration, injected at controller construction.
///
/// One instance per controller; there is no process-wide player state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
  /// MPlayer executable path (None = auto-detect).
  #[serde(default)]
  pub binary_path: Option<PathBuf>,

  /// Arguments appended to the slave-mode base set. Video-output driver
  /// selection, window-handle wiring and the rest of the platform argument
  /// logic is the caller's business and arrives here ready-made.
  #[serde(default)]
  pub extra_args: Vec<String>,
}

impl PlayerConfig {
  /// Load configuration from a JSON file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
  }

  /// Persist configuration to a JSON file.
  pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
    std::fs::write(path, serde_json::to_string_pretty(self)?)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_json_gives_defaults() {
    let config: PlayerConfig = serde_json::from_str("{}").unwrap();
    assert!(config.binary_path.is_none());
    assert!(config.extra_args.is_empty());
  }

  #[test]
  fn fields_round_trip() {
    let config = PlayerConfig {
      binary_path: Some(PathBuf::from("/opt/mplayer/bin/mplayer")),
      extra_args: vec!["-vo".to_string(), "direct3d,gl,directx,sdl".to_string()],
    };
    let json = serde_json::to_string(&config).unwrap();
    let back: PlayerConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.binary_path, config.binary_path);
    assert_eq!(back.extra_args, config.extra_args);
  }
}

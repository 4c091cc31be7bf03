use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::constants;

/// Flush interval used when the preference is unset.
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 2000;
/// Anything shorter would just hammer the store.
const MIN_FLUSH_INTERVAL_MS: u64 = 250;

/// User preferences from `prefs.toml`. Every field is optional.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Config {
  pub flush_interval_ms: Option<u64>,
  pub ready_resume_delay_ms: Option<u64>,
  pub unstarted_resume_delay_ms: Option<u64>,
  pub audio_only: Option<bool>,
  pub mpv_binary: Option<String>,
  pub store_path: Option<PathBuf>,
}

fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", &constants().app_name)
}

impl Config {
  pub fn load() -> Self {
    if let Some(proj_dirs) = project_dirs() {
      let config_file = proj_dirs.config_dir().join("prefs.toml");
      if let Ok(content) = std::fs::read_to_string(config_file) {
        return Self::parse(&content);
      }
    }
    Self::default()
  }

  /// Parse preferences, falling back to defaults on malformed input.
  pub fn parse(content: &str) -> Self {
    toml::from_str(content).unwrap_or_default()
  }

  pub fn flush_interval_ms(&self) -> u64 {
    self.flush_interval_ms.unwrap_or(DEFAULT_FLUSH_INTERVAL_MS).max(MIN_FLUSH_INTERVAL_MS)
  }

  pub fn mpv_binary(&self) -> String {
    self.mpv_binary.clone().unwrap_or_else(|| "mpv".to_string())
  }

  /// Where the key-value store lives: the preference, else the platform data dir.
  pub fn store_path(&self) -> Option<PathBuf> {
    self
      .store_path
      .clone()
      .or_else(|| project_dirs().map(|d| d.data_dir().join(&constants().store_file_name)))
  }
}

/// Directory for the rolling log file.
pub fn log_dir() -> Option<PathBuf> {
  project_dirs().map(|d| d.data_dir().join("logs"))
}

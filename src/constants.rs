//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available,
//! no runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;

/// All fixed application constants. Runtime tunables live in [`crate::config::Config`].
#[derive(Debug, Deserialize)]
pub struct Constants {
  pub app_name: String,
  pub canonical_url_prefix: String,

  // Persistence
  pub history_capacity: usize,
  pub store_file_name: String,

  // Session timing
  pub display_tick_ms: u64,
  pub ready_resume_delay_ms: u64,
  pub unstarted_resume_delay_ms: u64,

  // mpv IPC
  pub ipc_connect_attempts: u32,
  pub ipc_connect_backoff_ms: u64,
  pub ipc_request_timeout_ms: u64,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed every test fails on first access.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}

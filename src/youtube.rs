//! Video identifier resolution.
//!
//! Turns free-text input (a bare ID or any of the common YouTube URL shapes)
//! into the canonical 11-character video ID. Resolution is purely syntactic:
//! a well-formed ID is not checked against the network.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use crate::constants::constants;
use crate::error::{Error, Result};

/// Length of every YouTube video ID.
pub const VIDEO_ID_LEN: usize = 11;

/// A syntactically valid YouTube video ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// The normalized `https://youtube.com/watch?v=<id>` form that gets persisted.
  pub fn canonical_url(&self) -> String {
    format!("{}{}", constants().canonical_url_prefix, self.0)
  }
}

impl fmt::Display for VideoId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A resolved video: the canonical URL and the ID it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoReference {
  pub canonical_url: String,
  pub video_id: VideoId,
}

impl VideoReference {
  pub fn new(video_id: VideoId) -> Self {
    Self { canonical_url: video_id.canonical_url(), video_id }
  }

  /// Resolve any accepted input into a reference.
  pub fn resolve(input: &str) -> Result<Self> {
    resolve(input).map(Self::new)
  }
}

fn is_id_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_bare_id(s: &str) -> bool {
  s.len() == VIDEO_ID_LEN && s.chars().all(is_id_char)
}

/// Known URL shapes, tried in order. Each captures the ID in group 1.
static URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
  [
    r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/)([a-zA-Z0-9_-]{11})",
    r"youtube\.com/watch\?.*v=([a-zA-Z0-9_-]{11})",
    r"youtube\.com/shorts/([a-zA-Z0-9_-]{11})",
    r"m\.youtube\.com/watch\?v=([a-zA-Z0-9_-]{11})",
    r"m\.youtube\.com/watch\?.*v=([a-zA-Z0-9_-]{11})",
    r"m\.youtube\.com/shorts/([a-zA-Z0-9_-]{11})",
    r"m\.youtube\.com/\?v=([a-zA-Z0-9_-]{11})",
  ]
  .iter()
  // Safety: the patterns are literals covered by the tests below.
  .map(|p| Regex::new(p).expect("video URL pattern must compile"))
  .collect()
});

/// Resolve free-text input into a video ID.
///
/// Accepted forms, first match wins:
/// 1. a bare 11-character ID over `[A-Za-z0-9_-]`
/// 2. a watch / shorts / youtu.be / embed / mobile URL
/// 3. any well-formed URL carrying an 11-character `v` query parameter
pub fn resolve(input: &str) -> Result<VideoId> {
  let input = input.trim();

  if is_bare_id(input) {
    return Ok(VideoId(input.to_string()));
  }

  for pattern in URL_PATTERNS.iter() {
    if let Some(caps) = pattern.captures(input)
      && let Some(id) = caps.get(1)
    {
      debug!(video_id = id.as_str(), input, "resolver: matched URL shape");
      return Ok(VideoId(id.as_str().to_string()));
    }
  }

  if let Ok(url) = Url::parse(input)
    && let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v")
    && is_bare_id(&v)
  {
    debug!(video_id = %v, input, "resolver: matched v query parameter");
    return Ok(VideoId(v.into_owned()));
  }

  debug!(input, "resolver: not a video reference");
  Err(Error::NotAVideoReference)
}

/// Short label for a history row.
pub fn short_label(url: &str, video_id: &str) -> String {
  if url.contains("youtu.be/") { format!("youtu.be/{}", video_id) } else { format!("Video ID: {}", video_id) }
}

/// Render seconds as `m:ss`.
pub fn format_time(seconds: f64) -> String {
  let total = if seconds.is_finite() && seconds > 0.0 { seconds as u64 } else { 0 };
  format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
  use super::*;

  const ID: &str = "dQw4w9WgXcQ";

  fn id(input: &str) -> Option<String> {
    resolve(input).ok().map(|v| v.to_string())
  }

  #[test]
  fn bare_id_is_returned_as_is() {
    assert_eq!(id(ID).as_deref(), Some(ID));
    assert_eq!(id("a_b-c_d-e_f").as_deref(), Some("a_b-c_d-e_f"));
  }

  #[test]
  fn bare_id_is_trimmed() {
    assert_eq!(id("  dQw4w9WgXcQ \n").as_deref(), Some(ID));
  }

  #[test]
  fn bare_id_wins_over_url_shapes() {
    // Eleven chars that could never match a URL pattern still resolve directly.
    assert_eq!(id("youtu_be-v1").as_deref(), Some("youtu_be-v1"));
  }

  #[test]
  fn standard_url_shapes() {
    for url in [
      format!("https://www.youtube.com/watch?v={ID}"),
      format!("https://youtube.com/watch?v={ID}&t=42s"),
      format!("https://youtu.be/{ID}"),
      format!("https://youtu.be/{ID}?si=abcdef"),
      format!("https://www.youtube.com/embed/{ID}"),
      format!("https://www.youtube.com/v/{ID}"),
      format!("https://www.youtube.com/shorts/{ID}"),
      format!("youtube.com/watch?v={ID}"),
    ] {
      assert_eq!(id(&url).as_deref(), Some(ID), "url: {url}");
    }
  }

  #[test]
  fn watch_url_with_v_after_other_params() {
    let url = format!("https://www.youtube.com/watch?feature=share&list=PL1&v={ID}");
    assert_eq!(id(&url).as_deref(), Some(ID));
  }

  #[test]
  fn mobile_url_shapes() {
    for url in [
      format!("https://m.youtube.com/watch?v={ID}"),
      format!("https://m.youtube.com/watch?app=desktop&v={ID}"),
      format!("https://m.youtube.com/shorts/{ID}"),
      format!("https://m.youtube.com/?v={ID}"),
    ] {
      assert_eq!(id(&url).as_deref(), Some(ID), "url: {url}");
    }
  }

  #[test]
  fn generic_url_with_v_parameter() {
    let url = format!("https://invidious.example.org/watch?v={ID}");
    assert_eq!(id(&url).as_deref(), Some(ID));
  }

  #[test]
  fn generic_url_with_wrong_length_v_is_rejected() {
    assert_eq!(resolve("https://example.org/watch?v=short"), Err(Error::NotAVideoReference));
  }

  #[test]
  fn rejects_free_text() {
    assert_eq!(resolve("not a url"), Err(Error::NotAVideoReference));
    assert_eq!(resolve(""), Err(Error::NotAVideoReference));
    assert_eq!(resolve("dQw4w9WgXc"), Err(Error::NotAVideoReference));
    assert_eq!(resolve("dQw4w9WgXc!"), Err(Error::NotAVideoReference));
  }

  #[test]
  fn canonical_url_round_trips_through_resolver() {
    let reference = VideoReference::resolve(&format!("https://youtu.be/{ID}")).unwrap();
    assert_eq!(reference.canonical_url, format!("https://youtube.com/watch?v={ID}"));
    assert_eq!(resolve(&reference.canonical_url).unwrap(), reference.video_id);
  }

  #[test]
  fn short_label_prefers_short_link_form() {
    assert_eq!(short_label(&format!("https://youtu.be/{ID}"), ID), format!("youtu.be/{ID}"));
    assert_eq!(short_label(&format!("https://youtube.com/watch?v={ID}"), ID), format!("Video ID: {ID}"));
  }

  #[test]
  fn format_time_minutes_and_seconds() {
    assert_eq!(format_time(0.0), "0:00");
    assert_eq!(format_time(73.9), "1:13");
    assert_eq!(format_time(3605.0), "60:05");
    assert_eq!(format_time(-4.0), "0:00");
  }
}

use thiserror::Error;

/// Failures surfaced by the resolver, the persistence gateway and the session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
  /// Input is neither a video ID nor a recognised video URL. User-correctable.
  #[error("Invalid YouTube URL or video ID")]
  NotAVideoReference,

  /// The key-value store failed to read or write.
  #[error("Storage unavailable: {0}")]
  StorageUnavailable(String),

  /// The playback backend reported an error. Playback is halted, never retried.
  #[error("Video playback error: {0}")]
  PlaybackError(String),

  /// Nothing is persisted to resume. A normal empty state, not a failure.
  #[error("No saved video found")]
  NoReferenceFound,
}

impl Error {
  pub fn storage(message: impl Into<String>) -> Self {
    Self::StorageUnavailable(message.into())
  }

  /// Message shown inline on the entry screen for user-initiated actions.
  pub fn user_message(&self) -> String {
    match self {
      Error::NotAVideoReference => self.to_string(),
      Error::StorageUnavailable(_) => "Failed to save or load video data".to_string(),
      Error::PlaybackError(_) => self.to_string(),
      Error::NoReferenceFound => "No valid video ID found".to_string(),
    }
  }
}

pub type Result<T> = std::result::Result<T, Error>;

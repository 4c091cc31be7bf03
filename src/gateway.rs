//! Typed access to the persisted video state.
//!
//! Owns the key schema and the history list. Nothing else in the crate reads or
//! writes the store directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::constants::constants;
use crate::error::{Error, Result};
use crate::store::KeyValueStore;
use crate::youtube::{VideoId, VideoReference};

pub const KEY_VIDEO_URL: &str = "videoUrl";
pub const KEY_VIDEO_POSITION: &str = "videoPosition";
pub const KEY_LAST_PLAYED: &str = "lastPlayed";
pub const KEY_URL_HISTORY: &str = "urlHistory";

/// Keys describing the current video, as opposed to the history.
const CURRENT_KEYS: [&str; 3] = [KEY_VIDEO_URL, KEY_VIDEO_POSITION, KEY_LAST_PLAYED];

/// One row of the recently played list, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
  pub url: String,
  pub video_id: VideoId,
  pub timestamp: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
}

/// The currently saved video with its persisted progress.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentVideo {
  pub reference: VideoReference,
  /// Seconds, always finite and non-negative.
  pub position: f64,
  pub last_played_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct Gateway {
  store: Arc<dyn KeyValueStore>,
}

impl Gateway {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self { store }
  }

  /// Resolve `input`, make it the current video and push it onto the history.
  ///
  /// The persisted position is reset to zero so a new video never inherits the
  /// progress of the previous one. If any write fails, the previous current
  /// video is put back before the error is returned.
  pub async fn save_reference(&self, input: &str) -> Result<VideoReference> {
    let reference = VideoReference::resolve(input)?;
    let previous = self.snapshot_current().await?;

    match self.write_reference(&reference).await {
      Ok(history_len) => {
        info!(video_id = %reference.video_id, history_len, "gateway: saved reference");
        Ok(reference)
      }
      Err(e) => {
        warn!(video_id = %reference.video_id, err = %e, "gateway: save failed, restoring previous video");
        self.restore_current(previous).await;
        Err(e)
      }
    }
  }

  async fn write_reference(&self, reference: &VideoReference) -> Result<usize> {
    let now = Utc::now();
    self.store.set(KEY_VIDEO_URL, &reference.canonical_url).await?;
    self.store.set(KEY_LAST_PLAYED, &now.to_rfc3339()).await?;
    self.store.set(KEY_VIDEO_POSITION, "0").await?;

    let mut history = self.load_history().await?;
    history.retain(|entry| entry.video_id != reference.video_id);
    history.insert(
      0,
      HistoryEntry {
        url: reference.canonical_url.clone(),
        video_id: reference.video_id.clone(),
        timestamp: now,
        title: None,
      },
    );
    history.truncate(constants().history_capacity);
    let json = serde_json::to_string(&history).map_err(|e| Error::storage(e.to_string()))?;
    self.store.set(KEY_URL_HISTORY, &json).await?;
    Ok(history.len())
  }

  async fn snapshot_current(&self) -> Result<Vec<(&'static str, Option<String>)>> {
    let mut snapshot = Vec::with_capacity(CURRENT_KEYS.len());
    for key in CURRENT_KEYS {
      snapshot.push((key, self.store.get(key).await?));
    }
    Ok(snapshot)
  }

  /// Best effort: a store that just failed may well fail again.
  async fn restore_current(&self, snapshot: Vec<(&'static str, Option<String>)>) {
    for (key, value) in snapshot {
      let result = match value {
        Some(value) => self.store.set(key, &value).await,
        None => self.store.remove(key).await,
      };
      if let Err(e) = result {
        warn!(key, err = %e, "gateway: failed to restore key");
      }
    }
  }

  /// Overwrite the persisted position of the current video. History is untouched.
  pub async fn save_position(&self, position: f64) -> Result<()> {
    let position = sanitize_position(position);
    self.store.set(KEY_VIDEO_POSITION, &position.to_string()).await?;
    debug!(position, "gateway: saved position");
    Ok(())
  }

  /// The current video, or `None` when nothing (or nothing resolvable) is saved.
  pub async fn load_current(&self) -> Result<Option<CurrentVideo>> {
    let Some(url) = self.store.get(KEY_VIDEO_URL).await? else {
      return Ok(None);
    };
    let reference = match VideoReference::resolve(&url) {
      Ok(reference) => reference,
      Err(_) => {
        warn!(url = %url, "gateway: stored URL no longer resolves, ignoring");
        return Ok(None);
      }
    };

    let position = self
      .store
      .get(KEY_VIDEO_POSITION)
      .await?
      .and_then(|raw| raw.trim().parse::<f64>().ok())
      .map(sanitize_position)
      .unwrap_or(0.0);

    let last_played_at = self
      .store
      .get(KEY_LAST_PLAYED)
      .await?
      .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
      .map(|t| t.with_timezone(&Utc));

    Ok(Some(CurrentVideo { reference, position, last_played_at }))
  }

  /// Recently played videos, newest first. Corrupt data reads as empty.
  pub async fn load_history(&self) -> Result<Vec<HistoryEntry>> {
    let Some(raw) = self.store.get(KEY_URL_HISTORY).await? else {
      return Ok(Vec::new());
    };
    match serde_json::from_str(&raw) {
      Ok(history) => Ok(history),
      Err(e) => {
        warn!(err = %e, "gateway: history is corrupt, treating as empty");
        Ok(Vec::new())
      }
    }
  }

  /// Forget the current video and its progress. The history is kept.
  pub async fn clear_current(&self) -> Result<()> {
    for key in CURRENT_KEYS {
      self.store.remove(key).await?;
    }
    info!("gateway: cleared current video");
    Ok(())
  }
}

fn sanitize_position(position: f64) -> f64 {
  if position.is_finite() && position > 0.0 { position } else { 0.0 }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::{MemoryStore, MockKeyValueStore};
  use async_trait::async_trait;
  use std::sync::Mutex as StdMutex;

  /// Memory store that refuses writes to one chosen key.
  #[derive(Default)]
  struct KeyFailStore {
    inner: MemoryStore,
    failing: StdMutex<Option<&'static str>>,
  }

  impl KeyFailStore {
    fn fail_on(&self, key: &'static str) {
      *self.failing.lock().unwrap() = Some(key);
    }
  }

  #[async_trait]
  impl KeyValueStore for KeyFailStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
      self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
      if *self.failing.lock().unwrap() == Some(key) {
        return Err(Error::storage(format!("{key} refused")));
      }
      self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
      self.inner.remove(key).await
    }
  }

  const ID_A: &str = "dQw4w9WgXcQ";
  const ID_B: &str = "9bZkp7q19f0";

  fn gateway() -> (Gateway, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (Gateway::new(store.clone()), store)
  }

  fn nth_id(n: usize) -> String {
    format!("video{:06}", n)
  }

  #[tokio::test]
  async fn save_then_load_starts_at_zero() {
    let (gw, _) = gateway();
    let saved = gw.save_reference(&format!("https://youtu.be/{ID_A}")).await.unwrap();
    let current = gw.load_current().await.unwrap().unwrap();
    assert_eq!(current.reference, saved);
    assert_eq!(current.reference.video_id.as_str(), ID_A);
    assert_eq!(current.reference.canonical_url, format!("https://youtube.com/watch?v={ID_A}"));
    assert_eq!(current.position, 0.0);
    assert!(current.last_played_at.is_some());
  }

  #[tokio::test]
  async fn save_position_round_trips() {
    let (gw, store) = gateway();
    gw.save_reference(ID_A).await.unwrap();
    gw.save_position(73.25).await.unwrap();
    assert_eq!(store.get(KEY_VIDEO_POSITION).await.unwrap().as_deref(), Some("73.25"));
    assert_eq!(gw.load_current().await.unwrap().unwrap().position, 73.25);
  }

  #[tokio::test]
  async fn save_position_clamps_garbage() {
    let (gw, _) = gateway();
    gw.save_reference(ID_A).await.unwrap();
    gw.save_position(f64::NAN).await.unwrap();
    assert_eq!(gw.load_current().await.unwrap().unwrap().position, 0.0);
    gw.save_position(-3.0).await.unwrap();
    assert_eq!(gw.load_current().await.unwrap().unwrap().position, 0.0);
  }

  #[tokio::test]
  async fn new_reference_resets_previous_position() {
    let (gw, _) = gateway();
    gw.save_reference(ID_A).await.unwrap();
    gw.save_position(120.0).await.unwrap();
    gw.save_reference(ID_B).await.unwrap();
    let current = gw.load_current().await.unwrap().unwrap();
    assert_eq!(current.reference.video_id.as_str(), ID_B);
    assert_eq!(current.position, 0.0);
  }

  #[tokio::test]
  async fn history_dedups_by_video_id() {
    let (gw, _) = gateway();
    gw.save_reference(&format!("https://www.youtube.com/watch?v={ID_A}")).await.unwrap();
    gw.save_reference(ID_B).await.unwrap();
    gw.save_reference(&format!("https://youtu.be/{ID_A}")).await.unwrap();

    let history = gw.load_history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].video_id.as_str(), ID_A);
    assert_eq!(history[0].url, format!("https://youtube.com/watch?v={ID_A}"));
    assert_eq!(history[1].video_id.as_str(), ID_B);
  }

  #[tokio::test]
  async fn history_is_capped_oldest_first_out() {
    let (gw, _) = gateway();
    for n in 0..11 {
      gw.save_reference(&nth_id(n)).await.unwrap();
    }
    let history = gw.load_history().await.unwrap();
    assert_eq!(history.len(), 10);
    assert_eq!(history[0].video_id.as_str(), nth_id(10));
    assert!(history.iter().all(|e| e.video_id.as_str() != nth_id(0)));
  }

  #[tokio::test]
  async fn clear_preserves_history() {
    let (gw, _) = gateway();
    gw.save_reference(ID_A).await.unwrap();
    gw.save_position(30.0).await.unwrap();
    gw.clear_current().await.unwrap();

    assert_eq!(gw.load_current().await.unwrap(), None);
    let history = gw.load_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].video_id.as_str(), ID_A);
  }

  #[tokio::test]
  async fn nothing_saved_loads_none() {
    let (gw, _) = gateway();
    assert_eq!(gw.load_current().await.unwrap(), None);
    assert!(gw.load_history().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn corrupt_url_loads_none() {
    let (gw, store) = gateway();
    store.set(KEY_VIDEO_URL, "https://example.com/nothing-here").await.unwrap();
    store.set(KEY_VIDEO_POSITION, "55").await.unwrap();
    assert_eq!(gw.load_current().await.unwrap(), None);
  }

  #[tokio::test]
  async fn corrupt_history_reads_empty_and_is_replaced() {
    let (gw, store) = gateway();
    store.set(KEY_URL_HISTORY, "[{oops").await.unwrap();
    assert!(gw.load_history().await.unwrap().is_empty());
    gw.save_reference(ID_A).await.unwrap();
    assert_eq!(gw.load_history().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn reads_history_written_by_older_clients() {
    let (gw, store) = gateway();
    let raw = format!(
      r#"[{{"url":"https://youtube.com/watch?v={ID_A}","videoId":"{ID_A}","timestamp":"2024-05-01T10:00:00.000Z","title":"Old"}}]"#
    );
    store.set(KEY_URL_HISTORY, &raw).await.unwrap();
    let history = gw.load_history().await.unwrap();
    assert_eq!(history[0].video_id.as_str(), ID_A);
    assert_eq!(history[0].title.as_deref(), Some("Old"));
  }

  #[tokio::test]
  async fn invalid_input_writes_nothing() {
    // No expectations: any store call would panic the mock.
    let gw = Gateway::new(Arc::new(MockKeyValueStore::new()));
    assert_eq!(gw.save_reference("not a url").await, Err(Error::NotAVideoReference));
  }

  #[tokio::test]
  async fn storage_failure_propagates() {
    let mut store = MockKeyValueStore::new();
    store.expect_set().returning(|_, _| Err(Error::storage("disk full")));
    store.expect_get().returning(|_| Err(Error::storage("disk gone")));
    let gw = Gateway::new(Arc::new(store));

    assert!(matches!(gw.save_reference(ID_A).await, Err(Error::StorageUnavailable(_))));
    assert!(matches!(gw.save_position(1.0).await, Err(Error::StorageUnavailable(_))));
    assert!(matches!(gw.load_current().await, Err(Error::StorageUnavailable(_))));
  }

  #[tokio::test]
  async fn failed_save_keeps_previous_video_and_progress() {
    for failing in [KEY_VIDEO_URL, KEY_LAST_PLAYED, KEY_VIDEO_POSITION, KEY_URL_HISTORY] {
      let store = Arc::new(KeyFailStore::default());
      let gw = Gateway::new(store.clone());
      gw.save_reference(ID_A).await.unwrap();
      gw.save_position(120.0).await.unwrap();
      let before = gw.load_current().await.unwrap().unwrap();

      store.fail_on(failing);
      let result = gw.save_reference(ID_B).await;
      assert!(matches!(result, Err(Error::StorageUnavailable(_))), "{failing}");

      let after = gw.load_current().await.unwrap().unwrap();
      assert_eq!(after.reference.video_id.as_str(), ID_A, "{failing}");
      assert_eq!(after.position, 120.0, "{failing}");
      assert_eq!(after.last_played_at, before.last_played_at, "{failing}");
      assert_eq!(gw.load_history().await.unwrap().len(), 1, "{failing}");
    }
  }

  #[tokio::test]
  async fn failed_first_save_leaves_nothing_current() {
    let store = Arc::new(KeyFailStore::default());
    let gw = Gateway::new(store.clone());
    store.fail_on(KEY_URL_HISTORY);
    assert!(gw.save_reference(ID_A).await.is_err());
    assert_eq!(gw.load_current().await.unwrap(), None);
  }
}

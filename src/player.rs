use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::{
  io::{AsyncBufReadExt, AsyncWriteExt, BufReader as TokioBufReader},
  net::UnixStream,
  net::unix::{OwnedReadHalf, OwnedWriteHalf},
  process::{Child as TokioChild, Command},
  sync::{Mutex, mpsc, oneshot},
  task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::constants::constants;
use crate::youtube::VideoReference;

/// State notifications emitted by a playback backend.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
  /// The backend has the video loaded and accepts seeks.
  Ready,
  Unstarted,
  Playing,
  Paused,
  Buffering,
  Ended,
  Error(String),
}

/// The video backend as seen by the session.
#[async_trait]
pub trait PlaybackSurface: Send + Sync {
  /// Cue `reference`, paused. Readiness is reported through [`PlayerEvent::Ready`].
  async fn load(&self, reference: &VideoReference) -> Result<()>;
  /// Current playback offset in seconds.
  async fn current_time(&self) -> Result<f64>;
  async fn seek_to(&self, seconds: f64, allow_seek_ahead: bool) -> Result<()>;
  async fn set_playing(&self, playing: bool) -> Result<()>;
  /// Tear the backend down. Safe to call when nothing is loaded.
  async fn stop(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct MpvOptions {
  pub binary: String,
  pub audio_only: bool,
}

type PendingReplies = Arc<StdMutex<HashMap<u64, oneshot::Sender<Value>>>>;

struct MpvProcess {
  child: TokioChild,
  writer: OwnedWriteHalf,
  reader_handle: JoinHandle<()>,
  socket_path: PathBuf,
}

/// `mpv` driven over its JSON IPC socket.
///
/// A single long-lived `--idle` process is spawned on the first `load` and
/// reused for later videos. Replies are matched to requests by `request_id`;
/// everything else on the socket is an event and gets mapped to [`PlayerEvent`].
pub struct MpvPlayer {
  options: MpvOptions,
  events: mpsc::UnboundedSender<PlayerEvent>,
  process: Mutex<Option<MpvProcess>>,
  pending: PendingReplies,
  next_request_id: AtomicU64,
}

impl MpvPlayer {
  pub fn new(options: MpvOptions, events: mpsc::UnboundedSender<PlayerEvent>) -> Self {
    Self {
      options,
      events,
      process: Mutex::new(None),
      pending: Arc::new(StdMutex::new(HashMap::new())),
      next_request_id: AtomicU64::new(1),
    }
  }

  async fn ensure_running(&self, slot: &mut Option<MpvProcess>) -> Result<()> {
    if let Some(process) = slot.as_mut() {
      if process.child.try_wait().context("Failed to poll mpv process")?.is_none() {
        return Ok(());
      }
      warn!("mpv: process exited, respawning");
      process.reader_handle.abort();
    }

    let socket_path = std::env::temp_dir().join(format!("{}-mpv-{}.sock", constants().app_name, std::process::id()));
    // Stale socket from a previous crash.
    remove_socket(&socket_path).await;

    let mut cmd = Command::new(&self.options.binary);
    cmd.args(["--idle=yes", "--no-terminal"]);
    if self.options.audio_only {
      cmd.arg("--no-video");
    } else {
      cmd.arg("--force-window=yes");
    }
    cmd.arg(format!("--input-ipc-server={}", socket_path.display()));
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    // Never piped: an undrained pipe fills up and blocks mpv.
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        anyhow!("mpv not found. Install it with: brew install mpv (macOS) or apt install mpv (Linux)")
      } else {
        anyhow!(e).context("Failed to spawn mpv process")
      }
    })?;

    let stream = connect_ipc(&socket_path).await?;
    let (read_half, mut writer) = stream.into_split();
    let reader_handle = tokio::spawn(read_loop(read_half, Arc::clone(&self.pending), self.events.clone()));

    for (id, property) in [(1, "pause"), (2, "paused-for-cache")] {
      let line = format!("{}\n", json!({ "command": ["observe_property", id, property] }));
      writer.write_all(line.as_bytes()).await.context("Failed to subscribe to mpv property")?;
    }

    info!(socket = %socket_path.display(), "mpv: started");
    *slot = Some(MpvProcess { child, writer, reader_handle, socket_path });
    Ok(())
  }

  /// Send a command and wait for its reply. Returns the reply's `data` field.
  async fn request(&self, command: Value) -> Result<Value> {
    let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = oneshot::channel();
    self.pending.lock().map_err(|_| anyhow!("mpv reply table poisoned"))?.insert(id, tx);

    let line = format!("{}\n", json!({ "command": command, "request_id": id }));
    let sent = async {
      let mut slot = self.process.lock().await;
      let process = slot.as_mut().context("mpv is not running")?;
      process.writer.write_all(line.as_bytes()).await.context("Failed to write to mpv IPC socket")
    }
    .await;
    if let Err(e) = sent {
      self.forget(id);
      return Err(e);
    }

    let timeout = Duration::from_millis(constants().ipc_request_timeout_ms);
    let reply = match tokio::time::timeout(timeout, rx).await {
      Ok(Ok(reply)) => reply,
      Ok(Err(_)) => bail!("mpv closed the IPC socket before replying"),
      Err(_) => {
        self.forget(id);
        bail!("Timeout waiting for mpv IPC response");
      }
    };

    match reply.get("error").and_then(Value::as_str) {
      Some("success") => Ok(reply.get("data").cloned().unwrap_or(Value::Null)),
      Some(err) => Err(anyhow!("mpv rejected {}: {}", command, err)),
      None => Err(anyhow!("malformed mpv reply: {}", reply)),
    }
  }

  fn forget(&self, id: u64) {
    if let Ok(mut pending) = self.pending.lock() {
      pending.remove(&id);
    }
  }
}

#[async_trait]
impl PlaybackSurface for MpvPlayer {
  async fn load(&self, reference: &VideoReference) -> Result<()> {
    {
      let mut slot = self.process.lock().await;
      self.ensure_running(&mut slot).await?;
    }
    // Cue paused; the session decides when to play.
    self.request(json!(["set_property", "pause", true])).await?;
    self.request(json!(["loadfile", reference.canonical_url, "replace"])).await?;
    info!(video_id = %reference.video_id, "mpv: loading");
    Ok(())
  }

  async fn current_time(&self) -> Result<f64> {
    self.request(json!(["get_property", "time-pos"])).await?.as_f64().context("mpv time-pos is not a number")
  }

  async fn seek_to(&self, seconds: f64, _allow_seek_ahead: bool) -> Result<()> {
    // mpv always seeks into unbuffered ranges, so the flag has nothing to toggle.
    self.request(json!(["seek", seconds, "absolute"])).await?;
    debug!(seconds, "mpv: seek");
    Ok(())
  }

  async fn set_playing(&self, playing: bool) -> Result<()> {
    self.request(json!(["set_property", "pause", !playing])).await?;
    Ok(())
  }

  async fn stop(&self) -> Result<()> {
    let Some(mut process) = self.process.lock().await.take() else {
      return Ok(());
    };
    process.reader_handle.abort();
    let _ = process.reader_handle.await;
    if let Ok(mut pending) = self.pending.lock() {
      pending.clear();
    }
    process.child.kill().await.context("Failed to kill mpv process")?;
    let _ = process.child.wait().await;
    remove_socket(&process.socket_path).await;
    info!("mpv: stopped");
    Ok(())
  }
}

async fn remove_socket(path: &std::path::Path) {
  if let Err(e) = tokio::fs::remove_file(path).await
    && e.kind() != std::io::ErrorKind::NotFound
  {
    debug!(path = %path.display(), err = %e, "mpv: could not remove socket");
  }
}

/// mpv creates its socket shortly after start; retry until it accepts.
async fn connect_ipc(socket_path: &std::path::Path) -> Result<UnixStream> {
  let c = constants();
  let mut last_err = None;
  for attempt in 0..c.ipc_connect_attempts {
    match UnixStream::connect(socket_path).await {
      Ok(stream) => return Ok(stream),
      Err(e) => {
        debug!(attempt, err = %e, "mpv: IPC connect failed, retrying");
        last_err = Some(e);
        tokio::time::sleep(Duration::from_millis(c.ipc_connect_backoff_ms)).await;
      }
    }
  }
  Err(anyhow!("Failed to connect to mpv IPC socket at {}: {:?}", socket_path.display(), last_err))
}

async fn read_loop(read_half: OwnedReadHalf, pending: PendingReplies, events: mpsc::UnboundedSender<PlayerEvent>) {
  let mut lines = TokioBufReader::new(read_half).lines();
  let mut paused = true;
  loop {
    match lines.next_line().await {
      Ok(Some(line)) => {
        let Ok(msg) = serde_json::from_str::<Value>(&line) else {
          debug!(line = %line, "mpv: ignoring non-JSON line");
          continue;
        };
        if let Some(id) = msg.get("request_id").and_then(Value::as_u64)
          && id != 0
        {
          let waiter = pending.lock().ok().and_then(|mut p| p.remove(&id));
          if let Some(tx) = waiter {
            let _ = tx.send(msg);
          }
          continue;
        }
        if let Some(event) = map_event(&msg, &mut paused)
          && events.send(event).is_err()
        {
          break;
        }
      }
      Ok(None) => {
        info!("mpv: IPC socket closed");
        let _ = events.send(PlayerEvent::Ended);
        break;
      }
      Err(e) => {
        warn!(err = %e, "mpv: IPC read failed");
        break;
      }
    }
  }
}

/// Map one mpv IPC event to a player notification. `paused` tracks the last
/// observed `pause` property so the end of a cache stall can report `Playing`.
fn map_event(msg: &Value, paused: &mut bool) -> Option<PlayerEvent> {
  match msg.get("event")?.as_str()? {
    "start-file" => Some(PlayerEvent::Unstarted),
    "file-loaded" => Some(PlayerEvent::Ready),
    "end-file" => match msg.get("reason").and_then(Value::as_str) {
      Some("eof") => Some(PlayerEvent::Ended),
      Some("error") => {
        let reason = msg.get("file_error").and_then(Value::as_str).unwrap_or("playback failed");
        Some(PlayerEvent::Error(reason.to_string()))
      }
      _ => None,
    },
    "property-change" => {
      let value = msg.get("data")?.as_bool()?;
      match msg.get("name")?.as_str()? {
        "pause" => {
          *paused = value;
          Some(if value { PlayerEvent::Paused } else { PlayerEvent::Playing })
        }
        "paused-for-cache" if value => Some(PlayerEvent::Buffering),
        "paused-for-cache" if !*paused => Some(PlayerEvent::Playing),
        _ => None,
      }
    }
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn remove_socket_tolerates_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("yr-mpv-test.sock");
    remove_socket(&path).await;

    std::fs::write(&path, b"").unwrap();
    remove_socket(&path).await;
    assert!(!path.exists());
  }

  fn map(raw: &str, paused: &mut bool) -> Option<PlayerEvent> {
    map_event(&serde_json::from_str(raw).unwrap(), paused)
  }

  #[test]
  fn lifecycle_events() {
    let mut paused = true;
    assert_eq!(map(r#"{"event":"start-file","playlist_entry_id":1}"#, &mut paused), Some(PlayerEvent::Unstarted));
    assert_eq!(map(r#"{"event":"file-loaded"}"#, &mut paused), Some(PlayerEvent::Ready));
    assert_eq!(map(r#"{"event":"end-file","reason":"eof"}"#, &mut paused), Some(PlayerEvent::Ended));
    assert_eq!(map(r#"{"event":"end-file","reason":"stop"}"#, &mut paused), None);
  }

  #[test]
  fn end_file_error_carries_reason() {
    let mut paused = true;
    assert_eq!(
      map(r#"{"event":"end-file","reason":"error","file_error":"loading failed"}"#, &mut paused),
      Some(PlayerEvent::Error("loading failed".to_string()))
    );
  }

  #[test]
  fn pause_property_maps_to_play_state() {
    let mut paused = true;
    assert_eq!(
      map(r#"{"event":"property-change","id":1,"name":"pause","data":false}"#, &mut paused),
      Some(PlayerEvent::Playing)
    );
    assert!(!paused);
    assert_eq!(
      map(r#"{"event":"property-change","id":1,"name":"pause","data":true}"#, &mut paused),
      Some(PlayerEvent::Paused)
    );
    assert!(paused);
  }

  #[test]
  fn cache_stall_reports_buffering_then_resumes() {
    let mut paused = false;
    assert_eq!(
      map(r#"{"event":"property-change","id":2,"name":"paused-for-cache","data":true}"#, &mut paused),
      Some(PlayerEvent::Buffering)
    );
    assert_eq!(
      map(r#"{"event":"property-change","id":2,"name":"paused-for-cache","data":false}"#, &mut paused),
      Some(PlayerEvent::Playing)
    );
    paused = true;
    assert_eq!(map(r#"{"event":"property-change","id":2,"name":"paused-for-cache","data":false}"#, &mut paused), None);
  }

  #[test]
  fn unknown_and_unset_properties_are_ignored() {
    let mut paused = true;
    assert_eq!(map(r#"{"event":"property-change","id":1,"name":"pause"}"#, &mut paused), None);
    assert_eq!(map(r#"{"event":"seek"}"#, &mut paused), None);
    assert_eq!(map(r#"{"data":1.5,"error":"success","request_id":0}"#, &mut paused), None);
  }
}

//! Playback session lifecycle.
//!
//! A [`Session`] tracks which video is active, where it is, whether the player
//! screen has focus and whether the user intends it to play. Every input goes
//! through [`Session::handle`]; the periodic position flush and the one-time
//! resume sequence are tasks owned by the `Ready` state and are cancelled and
//! joined on every way out of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::constants;
use crate::error::Error;
use crate::gateway::Gateway;
use crate::player::{PlaybackSurface, PlayerEvent};
use crate::youtube::{VideoId, VideoReference};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
  Focused,
  Unfocused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayIntent {
  Playing,
  Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Idle,
  Loading,
  Ready,
  /// Suspended while another screen has focus. Re-entering reloads from storage.
  Unfocused,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
  Focus,
  Blur,
  /// User chose to change video: flush, clear the saved reference, go idle.
  Edit,
  /// App is exiting: flush and stop the backend.
  Shutdown,
  /// User asked to pause or resume. Intent follows once the backend reports back.
  TogglePlay,
  Player(PlayerEvent),
}

/// What the navigation shell should do after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
  /// Nothing changed (duplicate focus/blur, stale player event, ...).
  Unchanged,
  Ready { video_id: VideoId, resume_position: f64 },
  /// Nothing persisted to play. Route back to the entry screen.
  NoReference,
  /// Loading failed. Route back to the entry screen and show the error.
  LoadFailed(Error),
  Suspended,
  /// The saved reference is gone (or clearing it failed, carried here).
  Cleared(Option<Error>),
  /// The backend failed; stay on the player and show the error.
  PlaybackFailed(Error),
  /// Play intent changed or position was sampled.
  Updated,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
  pub flush_interval: Duration,
  pub ready_resume_delay: Duration,
  pub unstarted_resume_delay: Duration,
}

impl SessionSettings {
  pub fn from_config(config: &Config) -> Self {
    let c = constants();
    Self {
      flush_interval: Duration::from_millis(config.flush_interval_ms()),
      ready_resume_delay: Duration::from_millis(config.ready_resume_delay_ms.unwrap_or(c.ready_resume_delay_ms)),
      unstarted_resume_delay: Duration::from_millis(
        config.unstarted_resume_delay_ms.unwrap_or(c.unstarted_resume_delay_ms),
      ),
    }
  }
}

impl Default for SessionSettings {
  fn default() -> Self {
    Self::from_config(&Config::default())
  }
}

/// Latest position read back from the backend, tagged with its video.
#[derive(Debug, Clone, PartialEq)]
struct Observed {
  video_id: VideoId,
  position: f64,
}

type SharedObserved = Arc<StdMutex<Option<Observed>>>;

/// A spawned task scoped to one `Ready` period.
struct ScopedTask {
  token: CancellationToken,
  handle: JoinHandle<()>,
}

impl ScopedTask {
  /// Cancel and wait. Cancellation interrupts waits only, never a write in flight.
  async fn cancel(self) {
    self.token.cancel();
    if let Err(e) = self.handle.await
      && e.is_panic()
    {
      warn!(err = %e, "session: scoped task panicked");
    }
  }
}

/// Everything the flush and resume tasks need, cloned into each.
#[derive(Clone)]
struct Sampler {
  gateway: Gateway,
  surface: Arc<dyn PlaybackSurface>,
  video_id: VideoId,
  resume_position: f64,
  resumed: Arc<AtomicBool>,
  observed: SharedObserved,
}

impl Sampler {
  /// Current position. Before the resume seek lands the backend still sits at
  /// zero, so the resume target stands in for it.
  async fn sample(&self) -> anyhow::Result<f64> {
    if !self.resumed.load(Ordering::Acquire) {
      return Ok(self.resume_position);
    }
    let position = self.surface.current_time().await?;
    if let Ok(mut observed) = self.observed.lock() {
      *observed = Some(Observed { video_id: self.video_id.clone(), position });
    }
    Ok(position)
  }

  /// Sample and persist. Failures are logged and dropped; the next tick retries.
  async fn flush(&self) {
    let position = match self.sample().await {
      Ok(position) => position,
      Err(e) => {
        warn!(video_id = %self.video_id, err = %e, "session: could not read position, skipping flush");
        return;
      }
    };
    match self.gateway.save_position(position).await {
      Ok(()) => debug!(video_id = %self.video_id, position, "session: flushed position"),
      Err(e) => warn!(video_id = %self.video_id, err = %e, "session: failed to flush position"),
    }
  }

  /// Seek to zero, then to the resume target, then play.
  async fn resume(&self, token: &CancellationToken) -> anyhow::Result<()> {
    self.surface.seek_to(0.0, true).await?;
    if token.is_cancelled() {
      return Ok(());
    }
    if self.resume_position > 0.0 {
      self.surface.seek_to(self.resume_position, true).await?;
      info!(video_id = %self.video_id, position = self.resume_position, "session: seeked to resume position");
    }
    if token.is_cancelled() {
      return Ok(());
    }
    self.resumed.store(true, Ordering::Release);
    self.surface.set_playing(true).await?;
    Ok(())
  }
}

/// State held only while a video is loaded and the player has focus.
struct Active {
  reference: VideoReference,
  resume_position: f64,
  intent: PlayIntent,
  /// Whether Ready/Unstarted should still run the resume sequence. Cleared only
  /// by the video ending; leaving Ready drops it with the rest of this state.
  autoplay: bool,
  sampler: Sampler,
  flush_task: Option<ScopedTask>,
  resume_task: Option<ScopedTask>,
  display_position: f64,
  error: Option<String>,
}

impl Active {
  async fn cancel_tasks(&mut self) {
    if let Some(task) = self.resume_task.take() {
      task.cancel().await;
    }
    if let Some(task) = self.flush_task.take() {
      task.cancel().await;
    }
  }
}

pub struct Session {
  gateway: Gateway,
  surface: Arc<dyn PlaybackSurface>,
  settings: SessionSettings,
  phase: Phase,
  focus: FocusState,
  observed: SharedObserved,
  active: Option<Active>,
}

impl Session {
  pub fn new(gateway: Gateway, surface: Arc<dyn PlaybackSurface>, settings: SessionSettings) -> Self {
    Self {
      gateway,
      surface,
      settings,
      phase: Phase::Idle,
      focus: FocusState::Unfocused,
      observed: Arc::new(StdMutex::new(None)),
      active: None,
    }
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn focus_state(&self) -> FocusState {
    self.focus
  }

  pub fn reference(&self) -> Option<&VideoReference> {
    self.active.as_ref().map(|a| &a.reference)
  }

  pub fn intent(&self) -> Option<PlayIntent> {
    self.active.as_ref().map(|a| a.intent)
  }

  pub fn resume_position(&self) -> Option<f64> {
    self.active.as_ref().map(|a| a.resume_position)
  }

  /// Last position shown to the user, refreshed by [`Session::refresh_display`].
  pub fn display_position(&self) -> f64 {
    self.active.as_ref().map_or(0.0, |a| a.display_position)
  }

  pub fn playback_error(&self) -> Option<&str> {
    self.active.as_ref().and_then(|a| a.error.as_deref())
  }

  pub fn is_resumed(&self) -> bool {
    self.active.as_ref().is_some_and(|a| a.sampler.resumed.load(Ordering::Acquire))
  }

  pub async fn focus(&mut self) -> Outcome {
    self.handle(SessionInput::Focus).await
  }

  pub async fn blur(&mut self) -> Outcome {
    self.handle(SessionInput::Blur).await
  }

  /// The single transition function.
  pub async fn handle(&mut self, input: SessionInput) -> Outcome {
    match (self.phase, input) {
      (Phase::Idle | Phase::Unfocused, SessionInput::Focus) => self.load().await,
      (Phase::Loading | Phase::Ready, SessionInput::Focus) => Outcome::Unchanged,

      (Phase::Ready, SessionInput::Blur) => {
        self.suspend(false).await;
        self.phase = Phase::Unfocused;
        self.focus = FocusState::Unfocused;
        info!("session: suspended");
        Outcome::Suspended
      }
      (_, SessionInput::Blur) => {
        self.focus = FocusState::Unfocused;
        Outcome::Unchanged
      }

      (Phase::Ready, SessionInput::Edit) => {
        self.suspend(true).await;
        self.forget_observed();
        self.phase = Phase::Idle;
        self.focus = FocusState::Unfocused;
        match self.gateway.clear_current().await {
          Ok(()) => Outcome::Cleared(None),
          Err(e) => {
            warn!(err = %e, "session: failed to clear saved video");
            Outcome::Cleared(Some(e))
          }
        }
      }
      (_, SessionInput::Edit) => Outcome::Unchanged,

      (Phase::Ready, SessionInput::Shutdown) => {
        self.suspend(true).await;
        self.phase = Phase::Idle;
        self.focus = FocusState::Unfocused;
        Outcome::Suspended
      }
      (_, SessionInput::Shutdown) => {
        if let Err(e) = self.surface.stop().await {
          warn!(err = %e, "session: failed to stop player");
        }
        Outcome::Unchanged
      }

      (Phase::Ready, SessionInput::TogglePlay) => {
        let Some(active) = self.active.as_ref() else { return Outcome::Unchanged };
        let play = active.intent != PlayIntent::Playing;
        if let Err(e) = self.surface.set_playing(play).await {
          warn!(err = %e, play, "session: failed to toggle playback");
        }
        Outcome::Unchanged
      }
      (_, SessionInput::TogglePlay) => Outcome::Unchanged,

      (Phase::Ready, SessionInput::Player(event)) => self.on_player_event(event).await,
      (phase, SessionInput::Player(event)) => {
        debug!(?phase, ?event, "session: ignoring player event outside Ready");
        Outcome::Unchanged
      }
    }
  }

  /// Sample the backend for the on-screen clock while playing.
  pub async fn refresh_display(&mut self) {
    let Some(active) = self.active.as_mut() else { return };
    if self.phase != Phase::Ready || active.intent != PlayIntent::Playing {
      return;
    }
    if let Ok(position) = active.sampler.sample().await {
      active.display_position = position;
    }
  }

  async fn load(&mut self) -> Outcome {
    self.phase = Phase::Loading;
    self.focus = FocusState::Focused;

    let current = match self.gateway.load_current().await {
      Ok(Some(current)) => current,
      Ok(None) => {
        info!("session: nothing saved to play");
        self.phase = Phase::Idle;
        self.focus = FocusState::Unfocused;
        return Outcome::NoReference;
      }
      Err(e) => {
        warn!(err = %e, "session: failed to load video data");
        self.phase = Phase::Idle;
        self.focus = FocusState::Unfocused;
        return Outcome::LoadFailed(e);
      }
    };

    let video_id = current.reference.video_id.clone();
    let observed = self
      .observed
      .lock()
      .ok()
      .and_then(|o| o.as_ref().filter(|o| o.video_id == video_id).map(|o| o.position))
      .unwrap_or(0.0);
    let resume_position = current.position.max(observed);

    let sampler = Sampler {
      gateway: self.gateway.clone(),
      surface: Arc::clone(&self.surface),
      video_id: video_id.clone(),
      resume_position,
      resumed: Arc::new(AtomicBool::new(false)),
      observed: Arc::clone(&self.observed),
    };
    let flush_task = Some(spawn_flush(sampler.clone(), self.settings.flush_interval));

    let load_error = match self.surface.load(&current.reference).await {
      Ok(()) => None,
      Err(e) => {
        warn!(video_id = %video_id, err = %e, "session: player failed to load video");
        Some(Error::PlaybackError(format!("{:#}", e)))
      }
    };

    info!(video_id = %video_id, persisted = current.position, observed, resume_position, "session: ready");
    self.active = Some(Active {
      reference: current.reference,
      resume_position,
      intent: PlayIntent::Playing,
      autoplay: true,
      sampler,
      flush_task,
      resume_task: None,
      display_position: resume_position,
      error: load_error.as_ref().map(Error::to_string),
    });
    self.phase = Phase::Ready;

    match load_error {
      Some(error) => Outcome::PlaybackFailed(error),
      None => Outcome::Ready { video_id, resume_position },
    }
  }

  async fn on_player_event(&mut self, event: PlayerEvent) -> Outcome {
    let settings = self.settings;
    let Some(active) = self.active.as_mut() else {
      return Outcome::Unchanged;
    };

    match event {
      PlayerEvent::Ready | PlayerEvent::Unstarted => {
        if active.sampler.resumed.load(Ordering::Acquire) || !active.autoplay {
          return Outcome::Unchanged;
        }
        let delay =
          if event == PlayerEvent::Ready { settings.ready_resume_delay } else { settings.unstarted_resume_delay };
        if let Some(task) = active.resume_task.take() {
          task.cancel().await;
        }
        active.resume_task = Some(spawn_resume(active.sampler.clone(), delay));
        debug!(?event, ?delay, "session: resume scheduled");
        Outcome::Unchanged
      }
      PlayerEvent::Playing => {
        active.intent = PlayIntent::Playing;
        active.error = None;
        if let Ok(position) = active.sampler.sample().await {
          active.display_position = position;
        }
        Outcome::Updated
      }
      PlayerEvent::Paused | PlayerEvent::Ended => {
        if event == PlayerEvent::Ended {
          active.autoplay = false;
          if let Some(task) = active.resume_task.take() {
            task.cancel().await;
          }
        }
        active.intent = PlayIntent::Paused;
        if let Ok(position) = active.sampler.sample().await {
          active.display_position = position;
        }
        Outcome::Updated
      }
      // A stall keeps whatever the user intended.
      PlayerEvent::Buffering => Outcome::Unchanged,
      PlayerEvent::Error(message) => {
        warn!(video_id = %active.reference.video_id, err = %message, "session: playback error");
        active.intent = PlayIntent::Paused;
        let error = Error::PlaybackError(message);
        active.error = Some(error.to_string());
        Outcome::PlaybackFailed(error)
      }
    }
  }

  /// Leave `Ready`: cancel both tasks, then write the final position, then
  /// pause (or stop) the backend.
  async fn suspend(&mut self, stop: bool) {
    let Some(mut active) = self.active.take() else { return };
    active.cancel_tasks().await;
    active.sampler.flush().await;

    let result = if stop { self.surface.stop().await } else { self.surface.set_playing(false).await };
    if let Err(e) = result {
      warn!(stop, err = %e, "session: failed to release player");
    }
  }

  fn forget_observed(&self) {
    if let Ok(mut observed) = self.observed.lock() {
      *observed = None;
    }
  }
}

fn spawn_flush(sampler: Sampler, period: Duration) -> ScopedTask {
  let token = CancellationToken::new();
  let child = token.clone();
  let handle = tokio::spawn(async move {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      tokio::select! {
        biased;
        _ = child.cancelled() => break,
        _ = ticker.tick() => {}
      }
      sampler.flush().await;
    }
  });
  ScopedTask { token, handle }
}

fn spawn_resume(sampler: Sampler, delay: Duration) -> ScopedTask {
  let token = CancellationToken::new();
  let child = token.clone();
  let handle = tokio::spawn(async move {
    tokio::select! {
      biased;
      _ = child.cancelled() => return,
      _ = tokio::time::sleep(delay) => {}
    }
    // Left unresumed on failure so the next Ready notification retries.
    if let Err(e) = sampler.resume(&child).await {
      warn!(video_id = %sampler.video_id, err = %e, "session: resume sequence failed");
    }
  });
  ScopedTask { token, handle }
}

//! Routing between the entry, player and break screens.
//!
//! No data travels with a route: the player always reads what the gateway has
//! persisted. The shell's job is to fire the session's focus and blur hooks
//! exactly once per screen change.

use tracing::{info, warn};

use crate::error::Error;
use crate::gateway::{Gateway, HistoryEntry};
use crate::player::PlayerEvent;
use crate::session::{Outcome, Session, SessionInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
  /// URL/ID input plus the recently played list.
  Entry,
  Player,
  /// Static "take a break" screen with a single way back.
  Break,
}

pub struct Shell {
  gateway: Gateway,
  session: Session,
  screen: Screen,
  history: Vec<HistoryEntry>,
  /// Inline error for the entry screen.
  entry_error: Option<String>,
}

impl Shell {
  pub fn new(gateway: Gateway, session: Session) -> Self {
    Self { gateway, session, screen: Screen::Entry, history: Vec::new(), entry_error: None }
  }

  pub fn screen(&self) -> Screen {
    self.screen
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub fn history(&self) -> &[HistoryEntry] {
    &self.history
  }

  pub fn entry_error(&self) -> Option<&str> {
    self.entry_error.as_deref()
  }

  pub fn clear_entry_error(&mut self) {
    self.entry_error = None;
  }

  /// Open the first screen. With `resume`, go straight to the player; it falls
  /// back to the entry screen when nothing is saved.
  pub async fn start(&mut self, resume: bool) {
    self.reload_history().await;
    if resume {
      self.go_to(Screen::Player).await;
    }
  }

  /// Save typed input and open the player. Returns `false` when the input was rejected.
  pub async fn submit(&mut self, input: &str) -> bool {
    if input.trim().is_empty() {
      self.entry_error = Some("Please enter a YouTube URL or video ID".to_string());
      return false;
    }
    match self.gateway.save_reference(input).await {
      Ok(reference) => {
        info!(video_id = %reference.video_id, "nav: saved input, opening player");
        self.entry_error = None;
        self.go_to(Screen::Player).await;
        true
      }
      Err(Error::NotAVideoReference) => {
        self.entry_error = Some(Error::NotAVideoReference.to_string());
        false
      }
      Err(e) => {
        warn!(err = %e, "nav: failed to save input");
        self.entry_error = Some("Failed to save URL".to_string());
        false
      }
    }
  }

  /// Replay a history row.
  pub async fn select_history(&mut self, index: usize) {
    let Some(entry) = self.history.get(index) else { return };
    let url = entry.url.clone();
    match self.gateway.save_reference(&url).await {
      Ok(_) => {
        self.entry_error = None;
        self.go_to(Screen::Player).await;
      }
      Err(e) => {
        warn!(err = %e, url = %url, "nav: failed to load history entry");
        self.entry_error = Some("Failed to load video".to_string());
      }
    }
  }

  /// Drop the current video and return to the entry screen.
  pub async fn edit(&mut self) {
    if self.screen != Screen::Player {
      return;
    }
    if let Outcome::Cleared(Some(e)) = self.session.handle(SessionInput::Edit).await {
      self.entry_error = Some(e.user_message());
    }
    self.screen = Screen::Entry;
    self.reload_history().await;
  }

  pub async fn take_break(&mut self) {
    if self.screen == Screen::Player {
      self.go_to(Screen::Break).await;
    }
  }

  pub async fn back_from_break(&mut self) {
    if self.screen == Screen::Break {
      self.go_to(Screen::Player).await;
    }
  }

  pub async fn toggle_pause(&mut self) {
    if self.screen == Screen::Player {
      self.session.handle(SessionInput::TogglePlay).await;
    }
  }

  /// Flush and release the player before exit.
  pub async fn quit(&mut self) {
    self.session.handle(SessionInput::Shutdown).await;
  }

  pub async fn on_player_event(&mut self, event: PlayerEvent) {
    if self.screen != Screen::Player {
      return;
    }
    self.session.handle(SessionInput::Player(event)).await;
  }

  /// Periodic UI refresh of the on-screen clock.
  pub async fn tick(&mut self) {
    if self.screen == Screen::Player {
      self.session.refresh_display().await;
    }
  }

  async fn go_to(&mut self, target: Screen) {
    if target == self.screen {
      return;
    }
    if self.screen == Screen::Player {
      self.session.blur().await;
    }
    info!(from = ?self.screen, to = ?target, "nav: switching screen");
    self.screen = target;

    match target {
      Screen::Player => match self.session.focus().await {
        Outcome::NoReference => {
          self.entry_error = Some(Error::NoReferenceFound.user_message());
          self.screen = Screen::Entry;
          self.reload_history().await;
        }
        Outcome::LoadFailed(_) => {
          self.entry_error = Some("Failed to load video data".to_string());
          self.screen = Screen::Entry;
          self.reload_history().await;
        }
        _ => {}
      },
      Screen::Entry => self.reload_history().await,
      Screen::Break => {}
    }
  }

  async fn reload_history(&mut self) {
    match self.gateway.load_history().await {
      Ok(history) => self.history = history,
      Err(e) => warn!(err = %e, "nav: failed to load history"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::tests::{Call, ID, Rig};
  use crate::session::{FocusState, Phase};
  use std::time::Duration;

  fn shell(rig: &Rig) -> Shell {
    Shell::new(rig.gateway.clone(), rig.session())
  }

  #[tokio::test(start_paused = true)]
  async fn submit_valid_input_opens_player() {
    let rig = Rig::new();
    let mut shell = shell(&rig);
    shell.start(false).await;
    assert_eq!(shell.screen(), Screen::Entry);

    assert!(shell.submit(&format!("https://youtu.be/{ID}")).await);
    assert_eq!(shell.screen(), Screen::Player);
    assert_eq!(shell.session().phase(), Phase::Ready);
    assert_eq!(rig.surface.calls(), vec![Call::Load(ID.to_string())]);
  }

  #[tokio::test(start_paused = true)]
  async fn submit_rejects_bad_input_inline() {
    let rig = Rig::new();
    let mut shell = shell(&rig);
    assert!(!shell.submit("   ").await);
    assert_eq!(shell.entry_error(), Some("Please enter a YouTube URL or video ID"));
    assert!(!shell.submit("not a url").await);
    assert_eq!(shell.entry_error(), Some("Invalid YouTube URL or video ID"));
    assert_eq!(shell.screen(), Screen::Entry);
  }

  #[tokio::test(start_paused = true)]
  async fn resume_start_without_saved_video_stays_on_entry() {
    let rig = Rig::new();
    let mut shell = shell(&rig);
    shell.start(true).await;
    assert_eq!(shell.screen(), Screen::Entry);
    assert_eq!(shell.entry_error(), Some("No valid video ID found"));
  }

  #[tokio::test(start_paused = true)]
  async fn break_round_trip_reloads_persisted_state() {
    let rig = Rig::new();
    let mut shell = shell(&rig);
    shell.submit(ID).await;
    shell.on_player_event(PlayerEvent::Ready).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;

    rig.surface.set_position(73.0);
    shell.take_break().await;
    assert_eq!(shell.screen(), Screen::Break);
    assert_eq!(shell.session().focus_state(), FocusState::Unfocused);
    assert_eq!(rig.persisted_position().await, 73.0);

    shell.back_from_break().await;
    assert_eq!(shell.screen(), Screen::Player);
    assert_eq!(shell.session().resume_position(), Some(73.0));
    let loads = rig.surface.calls().iter().filter(|c| matches!(c, Call::Load(_))).count();
    assert_eq!(loads, 2);
  }

  #[tokio::test(start_paused = true)]
  async fn repeated_navigation_fires_hooks_once() {
    let rig = Rig::new();
    let mut shell = shell(&rig);
    shell.submit(ID).await;
    shell.back_from_break().await;
    shell.take_break().await;
    shell.take_break().await;
    shell.back_from_break().await;

    let calls = rig.surface.calls();
    assert_eq!(calls.iter().filter(|c| matches!(c, Call::Load(_))).count(), 2);
    assert_eq!(calls.iter().filter(|c| **c == Call::Play(false)).count(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn player_events_only_reach_the_focused_player() {
    let rig = Rig::new();
    let mut shell = shell(&rig);
    shell.submit(ID).await;
    shell.take_break().await;
    shell.on_player_event(PlayerEvent::Ready).await;
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert!(!rig.surface.calls().iter().any(|c| matches!(c, Call::Seek(_))));
  }

  #[tokio::test(start_paused = true)]
  async fn edit_returns_to_entry_and_keeps_history() {
    let rig = Rig::new();
    let mut shell = shell(&rig);
    shell.submit(ID).await;
    shell.edit().await;

    assert_eq!(shell.screen(), Screen::Entry);
    assert_eq!(shell.session().phase(), Phase::Idle);
    assert_eq!(shell.history().len(), 1);
    assert_eq!(rig.gateway.load_current().await.unwrap(), None);

    let writes = rig.store.write_count();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(rig.store.write_count(), writes);
  }

  #[tokio::test(start_paused = true)]
  async fn history_selection_replays_video() {
    let rig = Rig::new();
    let mut shell = shell(&rig);
    shell.submit(ID).await;
    shell.edit().await;
    shell.submit("9bZkp7q19f0").await;
    shell.edit().await;

    assert_eq!(shell.history()[1].video_id.as_str(), ID);
    shell.select_history(1).await;
    assert_eq!(shell.screen(), Screen::Player);
    assert_eq!(shell.session().reference().map(|r| r.video_id.as_str()), Some(ID));
  }

  #[tokio::test(start_paused = true)]
  async fn quit_flushes_position() {
    let rig = Rig::new();
    let mut shell = shell(&rig);
    shell.submit(ID).await;
    shell.on_player_event(PlayerEvent::Ready).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    rig.surface.set_position(12.0);
    shell.quit().await;
    assert_eq!(rig.persisted_position().await, 12.0);
  }
}

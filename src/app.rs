use ratatui::widgets::ListState;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

use crate::constants::constants;
use crate::nav::{Screen, Shell};
use crate::player::PlayerEvent;

/// Which part of the entry screen has keyboard focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFocus {
  Input,
  History,
}

pub struct App {
  pub shell: Shell,
  pub input: String,
  /// Cursor position in chars, not bytes.
  pub cursor_position: usize,
  pub input_scroll: usize,
  pub entry_focus: EntryFocus,
  pub list_state: ListState,
  pub should_quit: bool,
  player_events: mpsc::UnboundedReceiver<PlayerEvent>,
  display_tick: Duration,
  last_tick: Instant,
}

impl App {
  pub fn new(shell: Shell, player_events: mpsc::UnboundedReceiver<PlayerEvent>) -> Self {
    Self {
      shell,
      input: String::new(),
      cursor_position: 0,
      input_scroll: 0,
      entry_focus: EntryFocus::Input,
      list_state: ListState::default(),
      should_quit: false,
      player_events,
      display_tick: Duration::from_millis(constants().display_tick_ms),
      last_tick: Instant::now(),
    }
  }

  /// Forward everything the backend reported since the last frame.
  pub async fn drain_player_events(&mut self) {
    while let Ok(event) = self.player_events.try_recv() {
      debug!(?event, "app: player event");
      self.shell.on_player_event(event).await;
    }
  }

  pub async fn tick(&mut self) {
    if self.last_tick.elapsed() >= self.display_tick {
      self.last_tick = Instant::now();
      self.shell.tick().await;
    }
  }

  pub async fn submit_input(&mut self) {
    let input = self.input.clone();
    if self.shell.submit(&input).await {
      self.clear_input();
    }
    self.sync_entry();
  }

  pub async fn open_selected_history(&mut self) {
    if let Some(index) = self.list_state.selected() {
      self.shell.select_history(index).await;
      self.sync_entry();
    }
  }

  pub async fn edit(&mut self) {
    self.shell.edit().await;
    self.sync_entry();
  }

  pub fn clear_input(&mut self) {
    self.input.clear();
    self.cursor_position = 0;
    self.input_scroll = 0;
  }

  pub fn select_next(&mut self) {
    let count = self.shell.history().len();
    if count > 0 {
      let i = self.list_state.selected().map_or(0, |i| (i + 1) % count);
      self.list_state.select(Some(i));
    }
  }

  /// Move up the history list; from the top row focus returns to the input box.
  pub fn select_previous(&mut self) {
    match self.list_state.selected() {
      Some(0) | None => {
        self.list_state.select(None);
        self.entry_focus = EntryFocus::Input;
      }
      Some(i) => self.list_state.select(Some(i - 1)),
    }
  }

  pub fn focus_history(&mut self) {
    if !self.shell.history().is_empty() {
      self.entry_focus = EntryFocus::History;
      self.list_state.select(Some(0));
    }
  }

  /// Reset entry-screen focus whenever the shell lands back on it.
  fn sync_entry(&mut self) {
    if self.shell.screen() == Screen::Entry {
      let count = self.shell.history().len();
      if self.list_state.selected().is_some_and(|i| i >= count) {
        self.list_state.select(None);
      }
      if self.list_state.selected().is_none() {
        self.entry_focus = EntryFocus::Input;
      }
    } else {
      self.entry_focus = EntryFocus::Input;
      self.list_state.select(None);
    }
  }
}

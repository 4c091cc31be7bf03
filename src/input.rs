use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, EntryFocus};
use crate::nav::Screen;

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

// --- Event Handling ---

pub async fn handle_key_event(app: &mut App, key: KeyEvent) {
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return;
  }

  match app.shell.screen() {
    Screen::Entry => match app.entry_focus {
      EntryFocus::Input => handle_input_key(app, key).await,
      EntryFocus::History => handle_history_key(app, key).await,
    },
    Screen::Player => handle_player_key(app, key).await,
    Screen::Break => handle_break_key(app, key).await,
  }
}

async fn handle_input_key(app: &mut App, key: KeyEvent) {
  if !matches!(key.code, KeyCode::Enter) {
    app.shell.clear_entry_error();
  }
  match key.code {
    KeyCode::Enter => app.submit_input().await,
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
      app.input.insert(byte_idx, c);
      app.cursor_position += 1;
    }
    KeyCode::Backspace => {
      if app.cursor_position > 0 {
        app.cursor_position -= 1;
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
      }
    }
    KeyCode::Delete => {
      if app.cursor_position < app.input.chars().count() {
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
      }
    }
    KeyCode::Left => {
      app.cursor_position = app.cursor_position.saturating_sub(1);
    }
    KeyCode::Right => {
      if app.cursor_position < app.input.chars().count() {
        app.cursor_position += 1;
      }
    }
    KeyCode::Home => {
      app.cursor_position = 0;
    }
    KeyCode::End => {
      app.cursor_position = app.input.chars().count();
    }
    KeyCode::Down | KeyCode::Tab => app.focus_history(),
    KeyCode::Esc => {
      if app.input.is_empty() {
        app.should_quit = true;
      } else {
        app.clear_input();
      }
    }
    _ => {}
  }
}

async fn handle_history_key(app: &mut App, key: KeyEvent) {
  match key.code {
    KeyCode::Enter => app.open_selected_history().await,
    KeyCode::Down | KeyCode::Char('j') => app.select_next(),
    KeyCode::Up | KeyCode::Char('k') => app.select_previous(),
    KeyCode::Esc | KeyCode::Tab => {
      app.list_state.select(None);
      app.entry_focus = EntryFocus::Input;
    }
    _ => {}
  }
}

async fn handle_player_key(app: &mut App, key: KeyEvent) {
  match key.code {
    KeyCode::Char(' ') => app.shell.toggle_pause().await,
    KeyCode::Char('e') => app.edit().await,
    KeyCode::Char('b') => app.shell.take_break().await,
    KeyCode::Char('q') => app.should_quit = true,
    _ => {}
  }
}

async fn handle_break_key(app: &mut App, key: KeyEvent) {
  match key.code {
    KeyCode::Enter | KeyCode::Esc | KeyCode::Char('b') => app.shell.back_from_break().await,
    KeyCode::Char('q') => app.should_quit = true,
    _ => {}
  }
}

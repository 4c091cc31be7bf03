use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Color, Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, List, ListItem, Padding, Paragraph},
};

use crate::app::{App, EntryFocus};
use crate::nav::Screen;
use crate::session::{Phase, PlayIntent};
use crate::youtube::{format_time, short_label};

const ACCENT: Color = Color::Rgb(255, 85, 85);
const FG: Color = Color::Rgb(230, 230, 230);
const MUTED: Color = Color::Rgb(128, 128, 128);
const BORDER: Color = Color::Rgb(70, 70, 70);
const ERROR: Color = Color::Rgb(255, 120, 80);
const STATUS: Color = Color::Rgb(120, 200, 140);
const KEY_FG: Color = Color::Rgb(20, 20, 20);
const KEY_BG: Color = Color::Rgb(170, 170, 170);
const HIGHLIGHT_BG: Color = Color::Rgb(60, 40, 40);

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

fn rounded(title: &str, color: Color) -> Block<'_> {
  Block::bordered()
    .title(title)
    .title_style(Style::default().fg(color).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(color))
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let [header_area, main_area, footer_area] =
    Layout::vertical([Constraint::Length(1), Constraint::Min(3), Constraint::Length(1)]).areas(frame.area());

  render_header(frame, header_area);
  match app.shell.screen() {
    Screen::Entry => render_entry(frame, app, main_area),
    Screen::Player => render_player(frame, app, main_area),
    Screen::Break => render_break(frame, main_area),
  }
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, area: Rect) {
  let left = Line::from(Span::styled(" ▶ yr ", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)));
  frame.render_widget(left, area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Paragraph::new(version).style(Style::default().fg(MUTED)).alignment(Alignment::Right);
  frame.render_widget(right, area);
}

fn render_entry(frame: &mut Frame, app: &mut App, area: Rect) {
  let [input_area, error_area, history_area] =
    Layout::vertical([Constraint::Length(3), Constraint::Length(1), Constraint::Min(3)]).areas(area);

  render_input(frame, app, input_area);
  if let Some(err) = app.shell.entry_error() {
    frame.render_widget(Paragraph::new(format!(" ⚠  {}", err)).style(Style::default().fg(ERROR)), error_area);
  }
  render_history(frame, app, history_area);
}

fn render_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let focused = app.entry_focus == EntryFocus::Input;
  let color = if focused { ACCENT } else { BORDER };
  let block = rounded(" YouTube URL or video ID ", color).padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(&app.input, app.cursor_position);

  if cursor_col < app.input_scroll {
    app.input_scroll = cursor_col;
  } else if cursor_col >= app.input_scroll + inner_w {
    app.input_scroll = cursor_col.saturating_sub(inner_w) + 1;
  }

  let visible: String = app
    .input
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= app.input_scroll)
    .take_while(|(start, _, _)| *start < app.input_scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  frame.render_widget(Paragraph::new(visible).style(Style::default().fg(FG)).block(block), area);

  if focused {
    let cursor_x = area.x + 2 + (cursor_col - app.input_scroll) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

fn render_history(frame: &mut Frame, app: &mut App, area: Rect) {
  let color = if app.entry_focus == EntryFocus::History { ACCENT } else { BORDER };
  let block = rounded(" Recent Videos ", color);

  if app.shell.history().is_empty() {
    let empty = Paragraph::new("Nothing played yet").style(Style::default().fg(MUTED)).block(block);
    frame.render_widget(empty, area);
    return;
  }

  let inner_w = area.width.saturating_sub(4) as usize;
  let items: Vec<ListItem> = app
    .shell
    .history()
    .iter()
    .map(|entry| {
      let when = entry.timestamp.format("%Y-%m-%d").to_string();
      let label = entry.title.clone().unwrap_or_else(|| short_label(&entry.url, entry.video_id.as_str()));
      let label = truncate_str(&label, inner_w.saturating_sub(when.len() + 4));
      let gap = inner_w.saturating_sub(label.chars().count() + when.len() + 2);
      ListItem::new(Line::from(vec![
        Span::styled(label, Style::default().fg(FG)),
        Span::raw(" ".repeat(gap)),
        Span::styled(when, Style::default().fg(MUTED)),
      ]))
    })
    .collect();

  let list = List::new(items)
    .block(block)
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().bg(HIGHLIGHT_BG).add_modifier(Modifier::BOLD));
  frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_player(frame: &mut Frame, app: &App, area: Rect) {
  let session = app.shell.session();
  let block = rounded(" Now Playing ", ACCENT).padding(Padding::uniform(1));

  let mut lines = Vec::new();
  match session.reference() {
    Some(reference) => {
      lines.push(Line::from(vec![
        Span::styled("Video: ", Style::default().fg(MUTED)),
        Span::styled(reference.video_id.to_string(), Style::default().fg(FG).bold()),
      ]));
      lines.push(Line::from(Span::styled(reference.canonical_url.clone(), Style::default().fg(MUTED))));
    }
    None => lines.push(Line::from(Span::styled("Loading…", Style::default().fg(MUTED)))),
  }
  lines.push(Line::default());

  lines.push(Line::from(vec![
    Span::styled("Current Position: ", Style::default().fg(MUTED)),
    Span::styled(format_time(session.display_position()), Style::default().fg(FG).bold()),
  ]));

  let state = match (session.phase(), session.intent()) {
    (Phase::Loading, _) => "loading",
    (Phase::Ready, _) if !session.is_resumed() => "waiting for player",
    (_, Some(PlayIntent::Playing)) => "playing",
    (_, Some(PlayIntent::Paused)) => "paused",
    _ => "idle",
  };
  lines.push(Line::from(vec![
    Span::styled("State: ", Style::default().fg(MUTED)),
    Span::styled(state, Style::default().fg(STATUS)),
  ]));

  if let Some(resume) = session.resume_position()
    && resume > 0.0
  {
    lines.push(Line::from(Span::styled(
      format!("Resuming from {}", format_time(resume)),
      Style::default().fg(MUTED),
    )));
  }

  if let Some(err) = session.playback_error() {
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(format!("⚠  {}", err), Style::default().fg(ERROR))));
  }

  frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_break(frame: &mut Frame, area: Rect) {
  let [_, center, _] =
    Layout::vertical([Constraint::Fill(1), Constraint::Length(3), Constraint::Fill(1)]).areas(area);
  let lines = vec![
    Line::from(Span::styled("Time for a quick break! 😄", Style::default().fg(ACCENT).bold())),
    Line::default(),
    Line::from(Span::styled("Press Enter to go back to the video", Style::default().fg(MUTED))),
  ];
  frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), center);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let keys: Vec<(&str, &str)> = match app.shell.screen() {
    Screen::Entry => match app.entry_focus {
      EntryFocus::Input => vec![("Enter", "Play"), ("↓", "Recent"), ("Esc", "Clear/Quit")],
      EntryFocus::History => vec![("Enter", "Play"), ("j/k", "Navigate"), ("Esc", "Back")],
    },
    Screen::Player => {
      let pause = if app.shell.session().intent() == Some(PlayIntent::Playing) { "Pause" } else { "Play" };
      vec![("Space", pause), ("e", "Change Video"), ("b", "Break"), ("q", "Quit")]
    }
    Screen::Break => vec![("Enter", "Back to Video"), ("q", "Quit")],
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(KEY_FG).bg(KEY_BG)),
        Span::styled(format!(" {} ", action), Style::default().fg(MUTED)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_width_counts_wide_chars() {
    assert_eq!(display_width("abc", 2), 2);
    assert_eq!(display_width("日本語", 2), 4);
    assert_eq!(display_width("", 3), 0);
  }

  #[test]
  fn truncate_appends_ellipsis() {
    assert_eq!(truncate_str("short", 10), "short");
    assert_eq!(truncate_str("a longer label", 6), "a lon…");
  }
}

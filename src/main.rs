mod app;
mod config;
mod constants;
mod error;
mod gateway;
mod input;
mod nav;
mod player;
mod session;
mod store;
mod ui;
mod youtube;

use anyhow::{Context, Result};
use clap::Parser;
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::App;
use config::Config;
use gateway::Gateway;
use nav::Shell;
use player::{MpvOptions, MpvPlayer};
use session::{Session, SessionSettings};
use store::{FileStore, KeyValueStore, MemoryStore};

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Open the last saved video straight away instead of the entry screen
  #[arg(short, long)]
  resume: bool,

  /// Path of the JSON store file (default: platform data dir)
  #[arg(long, value_name = "PATH", conflicts_with = "ephemeral")]
  store: Option<PathBuf>,

  /// Keep everything in memory; nothing survives exit
  #[arg(long)]
  ephemeral: bool,

  /// Play sound only, without a video window
  #[arg(short, long)]
  audio_only: bool,
}

// --- Setup ---

/// Log to a daily rolling file; the terminal belongs to the UI.
fn init_logging() -> Option<WorkerGuard> {
  let dir = config::log_dir()?;
  let appender = tracing_appender::rolling::daily(dir, format!("{}.log", constants::constants().app_name));
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let filter = EnvFilter::try_from_env("YR_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
  Some(guard)
}

async fn open_store(args: &Args, config: &Config) -> Result<Arc<dyn KeyValueStore>> {
  if args.ephemeral {
    info!("store: ephemeral, nothing will be saved");
    return Ok(Arc::new(MemoryStore::new()));
  }
  match args.store.clone().or_else(|| config.store_path()) {
    Some(path) => {
      let store = FileStore::open(&path).await.with_context(|| format!("Failed to open store {}", path.display()))?;
      info!(path = %store.path().display(), "store: using file store");
      Ok(Arc::new(store))
    }
    None => {
      warn!("store: no data directory available, falling back to memory");
      Ok(Arc::new(MemoryStore::new()))
    }
  }
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let _log_guard = init_logging();

  let config = Config::load();
  let store = open_store(&args, &config).await?;
  let gateway = Gateway::new(store);

  let (events_tx, events_rx) = mpsc::unbounded_channel();
  let options =
    MpvOptions { binary: config.mpv_binary(), audio_only: args.audio_only || config.audio_only.unwrap_or(false) };
  let surface = Arc::new(MpvPlayer::new(options, events_tx));
  let session = Session::new(gateway.clone(), surface, SessionSettings::from_config(&config));
  let mut shell = Shell::new(gateway, session);
  shell.start(args.resume).await;
  let mut app = App::new(shell, events_rx);

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, &mut app).await;
  ratatui::restore();
  app.shell.quit().await;
  info!("exiting");
  result
}

async fn run(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
  loop {
    app.drain_player_events().await;
    app.tick().await;

    terminal.draw(|frame| ui::ui(frame, app))?;

    if event::poll(Duration::from_millis(100))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(app, key).await;
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }
  Ok(())
}

//! Terminal user interface.
//!
//! The UI task is the engine's only consumer: it drains published snapshots
//! from the channel on its own schedule and never compiles anything itself.
//! Keyboard input is read on a dedicated thread and bridged onto a channel,
//! so the render loop is a single `select!` over snapshots, keys, and
//! nothing else.

mod render;

use std::io::Stdout;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::prelude::CrosstermBackend;
use ratatui::Terminal;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::{Engine, Snapshot};

#[derive(Debug, Error)]
pub enum UiError {
    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),
}

/// What the status bar reports about the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Starting,
    Watching,
    Compiling,
    Error,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Status::Starting => "starting",
            Status::Watching => "watching",
            Status::Compiling => "compiling…",
            Status::Error => "error",
        }
    }
}

/// All mutable view state.
struct App {
    source_name: String,
    snapshot: Option<Arc<Snapshot>>,
    status: Status,
    /// First visible assembly line.
    scroll: usize,
    /// Selected assembly line (0-based), drives the source peek.
    cursor: usize,
    should_quit: bool,
    wants_refresh: bool,
}

impl App {
    fn new(source: &Path) -> Self {
        let source_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        Self {
            source_name,
            snapshot: None,
            status: Status::Starting,
            scroll: 0,
            cursor: 0,
            should_quit: false,
            wants_refresh: false,
        }
    }

    fn line_count(&self) -> usize {
        self.snapshot
            .as_ref()
            .map_or(0, |snap| snap.assembly.lines().count())
    }

    fn apply_snapshot(&mut self, snapshot: Arc<Snapshot>) {
        self.status = if snapshot.success {
            Status::Watching
        } else {
            Status::Error
        };
        self.snapshot = Some(snapshot);
        let last = self.line_count().saturating_sub(1);
        self.cursor = self.cursor.min(last);
        self.scroll = self.scroll.min(last);
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        let last = self.line_count().saturating_sub(1);
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            KeyCode::Char('r') => {
                self.status = Status::Compiling;
                self.wants_refresh = true;
            }
            KeyCode::Up | KeyCode::Char('k') => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => self.cursor = (self.cursor + 1).min(last),
            KeyCode::PageUp => self.cursor = self.cursor.saturating_sub(20),
            KeyCode::PageDown => self.cursor = (self.cursor + 20).min(last),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = last,
            _ => {}
        }
    }

    /// Keep the cursor inside the visible window.
    fn clamp_scroll(&mut self, viewport: usize) {
        if viewport == 0 {
            return;
        }
        if self.cursor < self.scroll {
            self.scroll = self.cursor;
        }
        if self.cursor >= self.scroll + viewport {
            self.scroll = self.cursor + 1 - viewport;
        }
    }
}

/// Restores the terminal even on early return.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<(Self, Terminal<CrosstermBackend<Stdout>>), UiError> {
        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        crossterm::execute!(stdout, EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok((Self, terminal))
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = crossterm::execute!(std::io::stdout(), LeaveAlternateScreen);
    }
}

/// Run the interactive viewer until the user quits.
pub async fn run(
    source: PathBuf,
    engine: Engine,
    mut snapshots: mpsc::Receiver<Arc<Snapshot>>,
) -> Result<(), UiError> {
    let (_guard, mut terminal) = TerminalGuard::enter()?;
    let mut keys = spawn_input_thread();
    let mut app = App::new(&source);

    loop {
        let viewport = terminal.size()?.height.saturating_sub(4) as usize;
        app.clamp_scroll(viewport);
        terminal.draw(|frame| render::draw(frame, &app))?;

        tokio::select! {
            snapshot = snapshots.recv() => {
                match snapshot {
                    Some(snapshot) => {
                        debug!(sequence = snapshot.sequence, "snapshot received");
                        app.apply_snapshot(snapshot);
                    }
                    None => break,
                }
            }
            key = keys.recv() => {
                match key {
                    Some(key) => app.handle_key(key),
                    None => break,
                }
            }
        }

        if app.wants_refresh {
            app.wants_refresh = false;
            engine.refresh().await;
        }
        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Read crossterm events on a plain thread; the channel closing on the
/// receiver side ends the thread at its next send.
fn spawn_input_thread() -> mpsc::Receiver<KeyEvent> {
    let (tx, rx) = mpsc::channel(32);
    std::thread::spawn(move || loop {
        match crossterm::event::read() {
            Ok(Event::Key(key)) => {
                if tx.blocking_send(key).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(_) => break,
        }
    });
    rx
}

//! Interactive mode.
//!
//! One loop selects over terminal events and engine events. The screen is
//! fully redrawn from the session after each batch.

use anyhow::{Context, Result};
use crossterm::event::{Event, EventStream};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use futures::StreamExt;
use neoterm_core::blocks::viewport::total_lines;
use neoterm_core::blocks::{layout, Viewport};
use neoterm_core::config::Config;
use neoterm_core::cwd::home_dir;
use neoterm_core::history::HistoryNavigator;
use neoterm_core::input::{EditorAction, KeyInput, LineEditor};
use neoterm_core::{Engine, EngineEvent, ExecuteResult};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::keyboard::{map_key, KeyAction};
use crate::render::{self, Frame};

/// Rows taken by the status and prompt lines.
const CHROME_ROWS: u16 = 2;

/// Raw mode plus the alternate screen, restored on drop.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        terminal::enable_raw_mode().context("failed to enable raw mode")?;
        io::stdout()
            .execute(EnterAlternateScreen)
            .context("failed to enter alternate screen")?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = io::stdout().execute(LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

struct Repl {
    engine: Engine,
    editor: LineEditor,
    viewport: Viewport,
    cols: u16,
    rows: u16,
    prompt: String,
    show_duration: bool,
    home: Option<PathBuf>,
    /// One-shot message for the status line.
    notice: Option<String>,
    clipboard: Option<arboard::Clipboard>,
}

pub async fn run(config: Config) -> Result<()> {
    let (tx, mut engine_events) = mpsc::unbounded_channel();
    let history_size = config.session.history_size;
    let prompt = config.ui.prompt.clone();
    let show_duration = config.ui.show_duration;

    let engine = Engine::start(config, tx)?;

    let recent = match engine.vault() {
        Some(vault) => vault.recent_unique(history_size).unwrap_or_else(|e| {
            tracing::warn!("failed to load history: {}", e);
            Vec::new()
        }),
        None => Vec::new(),
    };
    tracing::info!(entries = recent.len(), "hydrated input history");
    let editor = LineEditor::new(HistoryNavigator::with_entries(history_size, recent));

    let (cols, rows) = terminal::size().unwrap_or((80, 24));
    let body = rows.saturating_sub(CHROME_ROWS).max(1);
    engine.resize(cols, body).await?;

    let mut repl = Repl {
        engine,
        editor,
        viewport: Viewport::new(body as usize),
        cols,
        rows,
        prompt,
        show_duration,
        home: home_dir(),
        notice: Some("neoterm ready. Type !help for commands.".to_string()),
        clipboard: None,
    };
    repl.refresh_completion();

    let guard = TerminalGuard::enter()?;
    let mut terminal_events = EventStream::new();
    let mut redraw = true;

    loop {
        if redraw {
            repl.draw()?;
            redraw = false;
        }

        tokio::select! {
            Some(event) = engine_events.recv() => {
                repl.on_engine_event(event);
                // Coalesce bursts of output into one redraw
                while let Ok(more) = engine_events.try_recv() {
                    repl.on_engine_event(more);
                }
                redraw = true;
            }
            event = terminal_events.next() => match event {
                Some(Ok(event)) => {
                    if repl.on_terminal_event(event).await? == Flow::Exit {
                        break;
                    }
                    redraw = true;
                }
                Some(Err(e)) => tracing::warn!("terminal event error: {}", e),
                None => break,
            },
        }
    }

    drop(guard);
    repl.engine.shutdown().await?;
    tracing::info!("interactive session ended");
    Ok(())
}

impl Repl {
    fn body_rows(&self) -> usize {
        self.rows.saturating_sub(CHROME_ROWS).max(1) as usize
    }

    fn total_lines(&self) -> usize {
        self.engine.with_session(|s| total_lines(&layout(s)))
    }

    fn refresh_completion(&mut self) {
        let cwd = self.engine.with_session(|s| s.cwd().to_path_buf());
        self.editor
            .set_completion_context(self.engine.alias_names(), cwd);
    }

    fn status_line(&self) -> String {
        let (cwd, blocks, running) = self.engine.with_session(|s| {
            (
                render::short_path(s.cwd(), self.home.as_deref()),
                s.len(),
                s.running().last().map(|b| b.seq),
            )
        });
        let mut status = format!(" {}  ·  {} blocks", cwd, blocks);
        if let Some(seq) = running {
            status.push_str(&format!("  ·  running #{} (input goes to it)", seq));
        }
        if !self.viewport.follow {
            status.push_str("  ·  scrolled");
        }
        if let Some(notice) = &self.notice {
            status.push_str(&format!("  ·  {}", notice));
        }
        status
    }

    fn draw(&mut self) -> Result<()> {
        let lines = self
            .engine
            .with_session(|s| render::screen_lines(s, self.show_duration));
        let range = self.viewport.visible_range(lines.len());
        let status = self.status_line();
        let input = self.editor.text();

        let frame = Frame {
            lines: &lines,
            range,
            status: &status,
            prompt: &self.prompt,
            input: &input,
            cursor: self.editor.cursor(),
            cols: self.cols,
            rows: self.rows,
        };
        let mut stdout = io::stdout().lock();
        render::draw(&mut stdout, &frame).context("failed to draw")?;
        stdout.flush().context("failed to flush")?;
        Ok(())
    }

    fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::BlockStarted { seq, .. } => {
                tracing::debug!(seq, "block started");
            }
            EngineEvent::Output { .. } => {}
            EngineEvent::BlockFinished { id, status, .. } => {
                tracing::debug!(block = %id, status = status.label(), "block finished");
                // OSC 7 may have moved the cwd
                self.refresh_completion();
            }
            EngineEvent::Cleared => {
                let total = self.total_lines();
                self.viewport.scroll_to_bottom(total);
            }
        }
    }

    async fn on_terminal_event(&mut self, event: Event) -> Result<Flow> {
        match event {
            Event::Key(key) => match map_key(key) {
                Some(action) => self.on_key(action).await,
                None => Ok(Flow::Continue),
            },
            Event::Resize(cols, rows) => {
                self.cols = cols;
                self.rows = rows;
                let body = self.body_rows();
                let total = self.total_lines();
                self.viewport.set_height(body, total);
                self.engine.resize(cols, body as u16).await?;
                Ok(Flow::Continue)
            }
            Event::Paste(text) => {
                for c in text.chars().filter(|c| *c != '\r' && *c != '\n') {
                    self.editor.handle_key(KeyInput::Char(c));
                }
                Ok(Flow::Continue)
            }
            _ => Ok(Flow::Continue),
        }
    }

    async fn on_key(&mut self, action: KeyAction) -> Result<Flow> {
        let total = self.total_lines();
        let page = self.body_rows().saturating_sub(1).max(1);

        match action {
            KeyAction::ScrollUp(n) => self.viewport.scroll_up(n),
            KeyAction::ScrollDown(n) => self.viewport.scroll_down(n, total),
            KeyAction::PageUp => self.viewport.scroll_up(page),
            KeyAction::PageDown => self.viewport.scroll_down(page, total),
            KeyAction::ScrollTop => self.viewport.scroll_to_top(),
            KeyAction::ScrollBottom => self.viewport.scroll_to_bottom(total),
            KeyAction::Edit(key) => {
                self.notice = None;
                let action = self.editor.handle_key(key);
                return self.on_editor_action(action).await;
            }
        }
        Ok(Flow::Continue)
    }

    async fn on_editor_action(&mut self, action: EditorAction) -> Result<Flow> {
        match action {
            EditorAction::None | EditorAction::Redraw => {}
            EditorAction::Submit(line) => return self.submit(line).await,
            EditorAction::Interrupt => {
                if let Some(id) = self.engine.interrupt_latest().await? {
                    tracing::info!(block = %id, "interrupt sent");
                }
            }
            EditorAction::Eof => match self.engine.latest_running() {
                Some(id) => {
                    self.engine.send_input(id, &[0x04]).await?;
                }
                None => return Ok(Flow::Exit),
            },
            EditorAction::ClearScreen => return self.execute("!clear").await,
        }
        Ok(Flow::Continue)
    }

    async fn submit(&mut self, line: String) -> Result<Flow> {
        // A running block owns the input line
        if let Some(id) = self.engine.latest_running() {
            let mut bytes = line.into_bytes();
            bytes.push(b'\n');
            if !self.engine.send_input(id, &bytes).await? {
                self.notice = Some("the process has already exited".to_string());
            }
            return Ok(Flow::Continue);
        }
        self.editor.remember(&line);
        self.execute(&line).await
    }

    async fn execute(&mut self, line: &str) -> Result<Flow> {
        let result = match self.engine.submit(line).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("submit failed: {:#}", e);
                self.notice = Some(format!("{:#}", e));
                return Ok(Flow::Continue);
            }
        };

        match result {
            ExecuteResult::Started(_) | ExecuteResult::Completed(_) => {
                let total = self.total_lines();
                self.viewport.scroll_to_bottom(total);
                self.refresh_completion();
            }
            ExecuteResult::Clipboard { text, .. } => {
                self.notice = Some(match self.copy(text) {
                    Ok(()) => "copied to clipboard".to_string(),
                    Err(e) => format!("clipboard unavailable: {:#}", e),
                });
                let total = self.total_lines();
                self.viewport.scroll_to_bottom(total);
            }
            ExecuteResult::Show { block } => {
                let found = self
                    .engine
                    .with_session(|s| self.viewport.scroll_to_block_start(s, block));
                if !found {
                    self.notice = Some("block is no longer in the session".to_string());
                }
            }
            ExecuteResult::ClearScreen => {
                let total = self.total_lines();
                self.viewport.scroll_to_bottom(total);
            }
            ExecuteResult::Exit => return Ok(Flow::Exit),
            ExecuteResult::Nothing => {}
        }
        Ok(Flow::Continue)
    }

    fn copy(&mut self, text: String) -> Result<()> {
        if self.clipboard.is_none() {
            self.clipboard = Some(arboard::Clipboard::new().context("no clipboard")?);
        }
        match self.clipboard.as_mut() {
            Some(clipboard) => clipboard.set_text(text).context("failed to set clipboard"),
            None => Ok(()),
        }
    }
}

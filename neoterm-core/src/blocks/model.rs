//! Terminal block model.
//!
//! A block is one submitted command plus everything it printed. It starts
//! `Running`, moves exactly once to `Done` or `Error`, and after that only
//! its annotations (bookmark, collapsed) can change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

pub type BlockId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockStatus {
    Running,
    Done,
    Error,
}

impl BlockStatus {
    /// `Done` and `Error` are final.
    pub fn is_terminal(self) -> bool {
        !matches!(self, BlockStatus::Running)
    }

    pub fn label(self) -> &'static str {
        match self {
            BlockStatus::Running => "running",
            BlockStatus::Done => "done",
            BlockStatus::Error => "error",
        }
    }
}

/// What produced the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// A command executed by the shell through a process driver.
    Shell,
    /// A `!` command or `cd`, answered by the terminal itself.
    Builtin,
    /// An assistant prompt (`#` / `/ai`).
    Assistant,
}

impl BlockKind {
    pub fn label(self) -> &'static str {
        match self {
            BlockKind::Shell => "shell",
            BlockKind::Builtin => "builtin",
            BlockKind::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

/// One chunk of captured output, escape sequences already stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFragment {
    pub text: String,
    pub stream: Stream,
}

impl OutputFragment {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            stream: Stream::Stdout,
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            stream: Stream::Stderr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("block #{seq} already finished ({status})")]
    Finalized { seq: u64, status: &'static str },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    /// Session-local number shown to the user (`#3`).
    pub seq: u64,
    pub kind: BlockKind,
    pub command: String,
    pub output: Vec<OutputFragment>,
    pub status: BlockStatus,
    pub exit_code: Option<i32>,
    pub cwd: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Last window title the process set (OSC 0/2).
    pub title: Option<String>,
    pub bookmarked: bool,
    pub collapsed: bool,
}

impl Block {
    pub fn new(seq: u64, kind: BlockKind, command: impl Into<String>, cwd: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            seq,
            kind,
            command: command.into(),
            output: Vec::new(),
            status: BlockStatus::Running,
            exit_code: None,
            cwd,
            started_at: Utc::now(),
            finished_at: None,
            title: None,
            bookmarked: false,
            collapsed: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == BlockStatus::Running
    }

    fn ensure_running(&self) -> Result<(), BlockError> {
        if self.status.is_terminal() {
            return Err(BlockError::Finalized {
                seq: self.seq,
                status: self.status.label(),
            });
        }
        Ok(())
    }

    pub fn push_output(&mut self, fragment: OutputFragment) -> Result<(), BlockError> {
        self.ensure_running()?;
        if fragment.text.is_empty() {
            return Ok(());
        }
        // Merge with the previous fragment of the same stream to keep the
        // fragment list short for chatty processes.
        match self.output.last_mut() {
            Some(last) if last.stream == fragment.stream => last.text.push_str(&fragment.text),
            _ => self.output.push(fragment),
        }
        Ok(())
    }

    /// Exit 0 is `Done`, anything else is `Error`.
    pub fn finish(&mut self, exit_code: i32) -> Result<(), BlockError> {
        self.ensure_running()?;
        self.exit_code = Some(exit_code);
        self.status = if exit_code == 0 {
            BlockStatus::Done
        } else {
            BlockStatus::Error
        };
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// The process never produced an exit code (spawn failure, lost stream).
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), BlockError> {
        self.ensure_running()?;
        let mut message = message.into();
        if !message.ends_with('\n') {
            message.push('\n');
        }
        self.output.push(OutputFragment::stderr(message));
        self.status = BlockStatus::Error;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn set_bookmarked(&mut self, bookmarked: bool) {
        self.bookmarked = bookmarked;
    }

    /// Returns the new bookmark state.
    pub fn toggle_bookmark(&mut self) -> bool {
        self.bookmarked = !self.bookmarked;
        self.bookmarked
    }

    pub fn toggle_collapsed(&mut self) -> bool {
        self.collapsed = !self.collapsed;
        self.collapsed
    }

    pub fn output_text(&self) -> String {
        self.output.iter().map(|f| f.text.as_str()).collect()
    }

    /// Output as display lines, with carriage-return overwrites and
    /// backspaces applied.
    pub fn lines(&self) -> Vec<String> {
        display_lines(&self.output_text())
    }

    pub fn line_count(&self) -> usize {
        self.lines().len()
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.duration().map(|d| d.num_milliseconds())
    }
}

/// Split captured text into the lines a terminal would have left on screen.
pub fn display_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let body = text.strip_suffix('\n').unwrap_or(text);
    body.split('\n').map(render_line).collect()
}

fn render_line(raw: &str) -> String {
    let raw = raw.strip_suffix('\r').unwrap_or(raw);
    let mut line: Vec<char> = Vec::with_capacity(raw.len());
    let mut col = 0usize;

    for c in raw.chars() {
        match c {
            '\r' => col = 0,
            '\u{8}' => col = col.saturating_sub(1),
            c => {
                if col < line.len() {
                    line[col] = c;
                } else {
                    line.push(c);
                }
                col += 1;
            }
        }
    }

    line.into_iter().collect()
}

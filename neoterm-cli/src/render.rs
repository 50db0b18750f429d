//! Turning the session into screen lines.
//!
//! The line list built here matches `blocks::layout` one to one, so the
//! core `Viewport` can scroll it.

use crossterm::cursor::MoveTo;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::QueueableCommand;
use neoterm_core::blocks::{Block, BlockKind, BlockStatus, Session};
use std::io::Write;
use std::ops::Range;
use std::path::Path;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const TAB_STOP: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Header(BlockStatus),
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenLine {
    pub kind: LineKind,
    pub text: String,
}

// ────────────────────────────────────────────────────────────────
// Formatting
// ────────────────────────────────────────────────────────────────

pub fn format_duration(ms: i64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let secs = ms / 1000;
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Shorten a path for the status line.
pub fn short_path(path: &Path, home: Option<&Path>) -> String {
    if let Some(rest) = home.and_then(|h| path.strip_prefix(h).ok()) {
        if rest.as_os_str().is_empty() {
            return "~".to_string();
        }
        return format!("~/{}", rest.display());
    }
    let full = path.display().to_string();
    let chars: Vec<char> = full.chars().collect();
    if chars.len() > 40 {
        let tail: String = chars[chars.len() - 35..].iter().collect();
        return format!("…{}", tail);
    }
    full
}

fn status_mark(status: BlockStatus) -> &'static str {
    match status {
        BlockStatus::Running => "…",
        BlockStatus::Done => "✔",
        BlockStatus::Error => "✘",
    }
}

pub fn block_header(block: &Block, show_duration: bool) -> String {
    let mut header = format!("{} #{} ", status_mark(block.status), block.seq);
    match block.kind {
        BlockKind::Shell => header.push_str("$ "),
        BlockKind::Builtin => {}
        BlockKind::Assistant => header.push_str("ai "),
    }
    header.push_str(&block.command);

    if let (BlockStatus::Error, Some(code)) = (block.status, block.exit_code) {
        header.push_str(&format!("  [exit {}]", code));
    }
    if show_duration {
        if let Some(ms) = block.duration_ms() {
            header.push_str(&format!("  ({})", format_duration(ms)));
        }
    }
    if let Some(title) = &block.title {
        header.push_str(&format!("  · {}", title));
    }
    if block.bookmarked {
        header.push_str("  ★");
    }
    if block.collapsed {
        header.push_str(&format!("  ▸ {} lines", block.line_count()));
    }
    header
}

/// Header plus output lines for every block, in session order.
pub fn screen_lines(session: &Session, show_duration: bool) -> Vec<ScreenLine> {
    let mut lines = Vec::new();
    for block in session.blocks() {
        lines.push(ScreenLine {
            kind: LineKind::Header(block.status),
            text: block_header(block, show_duration),
        });
        if block.collapsed {
            continue;
        }
        lines.extend(block.lines().into_iter().map(|text| ScreenLine {
            kind: LineKind::Output,
            text: expand_tabs(&text),
        }));
    }
    lines
}

/// Replace tabs with spaces up to the next tab stop.
pub fn expand_tabs(text: &str) -> String {
    if !text.contains('\t') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut col = 0;
    for c in text.chars() {
        if c == '\t' {
            let pad = TAB_STOP - col % TAB_STOP;
            out.extend(std::iter::repeat_n(' ', pad));
            col += pad;
        } else {
            out.push(c);
            col += c.width().unwrap_or(0);
        }
    }
    out
}

/// Clip to `width` terminal columns. A wide char that would straddle the
/// edge is dropped.
pub fn clip(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        out.push(c);
    }
    out
}

/// The part of `input` that fits in `width` columns with the cursor visible,
/// and the cursor column within it.
pub fn input_window(input: &str, cursor: usize, width: usize) -> (String, usize) {
    let chars: Vec<char> = input.chars().collect();
    let width = width.max(1);
    let start = cursor.saturating_sub(width - 1);
    let visible: String = chars.iter().skip(start).take(width).collect();
    (visible, cursor - start)
}

// ────────────────────────────────────────────────────────────────
// Drawing
// ────────────────────────────────────────────────────────────────

pub struct Frame<'a> {
    pub lines: &'a [ScreenLine],
    pub range: Range<usize>,
    pub status: &'a str,
    pub prompt: &'a str,
    pub input: &'a str,
    pub cursor: usize,
    pub cols: u16,
    pub rows: u16,
}

fn header_color(status: BlockStatus) -> Color {
    match status {
        BlockStatus::Running => Color::Yellow,
        BlockStatus::Done => Color::Green,
        BlockStatus::Error => Color::Red,
    }
}

/// Full redraw: block area, status line, prompt line.
pub fn draw<W: Write>(out: &mut W, frame: &Frame<'_>) -> std::io::Result<()> {
    let width = frame.cols as usize;
    let body_rows = frame.rows.saturating_sub(2);

    let visible = &frame.lines[frame.range.clone()];
    for row in 0..body_rows {
        out.queue(MoveTo(0, row))?.queue(Clear(ClearType::CurrentLine))?;
        if let Some(line) = visible.get(row as usize) {
            match line.kind {
                LineKind::Header(status) => {
                    out.queue(SetForegroundColor(header_color(status)))?
                        .queue(Print(clip(&line.text, width)))?
                        .queue(ResetColor)?;
                }
                LineKind::Output => {
                    out.queue(Print(clip(&line.text, width)))?;
                }
            }
        }
    }

    out.queue(MoveTo(0, body_rows))?
        .queue(Clear(ClearType::CurrentLine))?
        .queue(SetForegroundColor(Color::DarkGrey))?
        .queue(Print(clip(frame.status, width)))?
        .queue(ResetColor)?;

    let prompt_width = frame.prompt.width();
    let (input, cursor) = input_window(
        frame.input,
        frame.cursor,
        width.saturating_sub(prompt_width),
    );
    let prompt_row = body_rows + 1;
    out.queue(MoveTo(0, prompt_row))?
        .queue(Clear(ClearType::CurrentLine))?
        .queue(SetForegroundColor(Color::Cyan))?
        .queue(Print(frame.prompt))?
        .queue(ResetColor)?
        .queue(Print(input))?
        .queue(MoveTo((prompt_width + cursor) as u16, prompt_row))?;

    out.flush()
}
